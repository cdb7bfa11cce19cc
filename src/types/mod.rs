//! Core types for jobs and extraction results

pub mod job;

pub use job::{DocumentKind, Job, JobStatus, PageMetadata, PageResult, WordBox};
