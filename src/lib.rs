//! textmill: asynchronous text extraction and summarization for images and PDFs
//!
//! Documents are submitted over HTTP (upload or URL), recognized in the
//! background, and retrieved by job id. PDFs with a usable embedded text
//! layer skip OCR entirely; scanned documents are rasterized and recognized
//! page-parallel with results committed in page order.

pub mod config;
pub mod error;
pub mod extraction;
pub mod fetch;
pub mod processing;
pub mod server;
pub mod service;
pub mod storage;
pub mod summarize;
pub mod types;

pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use types::{DocumentKind, Job, JobStatus, PageMetadata, PageResult, WordBox};
