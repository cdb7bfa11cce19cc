//! Text extraction: OCR, text layers, and page rasterization

pub mod adapter;
pub mod local;

pub use adapter::{ExtractionAdapter, PageExtraction, RenderedPages, TextLayer};
pub use local::LocalToolsAdapter;
