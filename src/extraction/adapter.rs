//! Uniform interface over the text recognizer, page renderer, and text-layer
//! extractor collaborators.
//!
//! The adapter never retries; retry and fallback policy belongs to the
//! pipeline executor.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::error::Result;
use crate::types::PageMetadata;

/// Normalized output of recognizing one page image
#[derive(Debug, Clone)]
pub struct PageExtraction {
    pub text: String,
    pub metadata: PageMetadata,
}

/// Outcome of embedded-text-layer extraction.
///
/// `Insufficient` is not an error: it signals that the layer is too short to
/// trust and the caller should fall back to rasterization.
#[derive(Debug, Clone)]
pub enum TextLayer {
    Text(String),
    Insufficient,
}

/// Ordered page images rendered from a document.
///
/// The images live in a temporary directory owned by this value; each page is
/// consumed once by the pipeline and everything is deleted on drop, on every
/// exit path.
pub struct RenderedPages {
    pages: Vec<PathBuf>,
    _dir: TempDir,
}

impl RenderedPages {
    pub fn new(dir: TempDir, pages: Vec<PathBuf>) -> Self {
        Self { pages, _dir: dir }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Page image paths in page order
    pub fn paths(&self) -> &[PathBuf] {
        &self.pages
    }
}

/// Abstraction over the extraction collaborators.
///
/// Implementations:
/// - `LocalToolsAdapter`: tesseract + poppler-utils CLI tools
/// - mock adapters in executor tests
#[async_trait]
pub trait ExtractionAdapter: Send + Sync {
    /// Recognize text on a single page image
    async fn extract_page(&self, image: &Path, language: &str) -> Result<PageExtraction>;

    /// Extract the embedded text layer of a document, if any
    async fn extract_text_layer(&self, document: &[u8]) -> Result<TextLayer>;

    /// Rasterize a document into an ordered sequence of page images
    async fn render_pages(&self, document: &[u8]) -> Result<RenderedPages>;

    /// Adapter name for logging
    fn name(&self) -> &str;
}
