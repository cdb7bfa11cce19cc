//! Job service: the public submit / status / result operations
//!
//! `submit` validates the input, persists a pending job, and hands the work
//! to the pipeline worker over a channel without waiting for execution.

use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::{ExtractionConfig, ServerConfig};
use crate::error::{Error, Result};
use crate::storage::{JobPatch, JobStore};
use crate::types::{DocumentKind, Job, JobStatus};

/// Supported tesseract language codes, served by `GET /api/languages`
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("eng", "English"),
    ("deu", "German"),
    ("fra", "French"),
    ("spa", "Spanish"),
    ("ita", "Italian"),
    ("por", "Portuguese"),
    ("nld", "Dutch"),
    ("pol", "Polish"),
    ("rus", "Russian"),
    ("jpn", "Japanese"),
    ("chi_sim", "Chinese (Simplified)"),
    ("ara", "Arabic"),
];

/// A claimable unit of work handed to the pipeline worker
#[derive(Debug)]
pub struct QueuedJob {
    pub id: Uuid,
    pub kind: DocumentKind,
    pub data: Vec<u8>,
    pub language: String,
    pub want_summary: bool,
}

/// A validated-to-be submission
#[derive(Debug)]
pub struct Submission {
    /// Original filename or source URL
    pub source_name: String,
    pub data: Vec<u8>,
    /// Language hint; falls back to the configured default
    pub language: Option<String>,
    pub want_summary: bool,
}

/// Status view returned by `get_status`
#[derive(Debug, Clone)]
pub struct JobStatusView {
    pub id: Uuid,
    pub status: JobStatus,
    /// Failure reason for failed jobs
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Public job operations over the store and the worker channel
pub struct JobService {
    store: Arc<JobStore>,
    sender: mpsc::Sender<QueuedJob>,
    max_upload_size: usize,
    default_language: String,
}

impl JobService {
    pub fn new(
        store: Arc<JobStore>,
        sender: mpsc::Sender<QueuedJob>,
        server: &ServerConfig,
        extraction: &ExtractionConfig,
    ) -> Self {
        Self {
            store,
            sender,
            max_upload_size: server.max_upload_size,
            default_language: extraction.default_language.clone(),
        }
    }

    /// Validate and enqueue a submission; returns the pending job without
    /// waiting for execution.
    pub async fn submit(&self, submission: Submission) -> Result<Job> {
        if submission.data.is_empty() {
            return Err(Error::invalid_input("Empty document"));
        }
        if submission.data.len() > self.max_upload_size {
            return Err(Error::invalid_input(format!(
                "Document is {} bytes, limit is {}",
                submission.data.len(),
                self.max_upload_size
            )));
        }

        let kind = DocumentKind::detect(&submission.source_name, &submission.data);
        if kind == DocumentKind::Unsupported {
            return Err(Error::invalid_input(format!(
                "Unsupported document type: '{}'",
                submission.source_name
            )));
        }

        let language = match submission.language {
            Some(code) => {
                if !SUPPORTED_LANGUAGES.iter().any(|(c, _)| *c == code) {
                    return Err(Error::invalid_input(format!(
                        "Unsupported language code: '{}'",
                        code
                    )));
                }
                code
            }
            None => self.default_language.clone(),
        };

        let job = Job::new(submission.source_name, language.clone(), submission.want_summary);
        self.store.create(&job)?;

        tracing::info!(
            "Submitted job {} ({}, {} bytes, kind={}, summary={})",
            job.id,
            job.source_name,
            submission.data.len(),
            kind.as_str(),
            job.want_summary
        );

        let queued = QueuedJob {
            id: job.id,
            kind,
            data: submission.data,
            language,
            want_summary: job.want_summary,
        };

        if let Err(e) = self.sender.send(queued).await {
            tracing::error!("Failed to enqueue job {}: {}", job.id, e);
            self.store.transition(
                job.id,
                JobStatus::Pending,
                JobStatus::Processing,
                JobPatch::none(),
            )?;
            self.store.transition(
                job.id,
                JobStatus::Processing,
                JobStatus::Failed,
                JobPatch::failed("worker queue unavailable"),
            )?;
            return Err(Error::internal("Worker queue unavailable"));
        }

        Ok(job)
    }

    /// Status of a job, or `NotFound`
    pub fn get_status(&self, id: Uuid) -> Result<JobStatusView> {
        let job = self.store.get(id)?.ok_or(Error::NotFound(id))?;
        Ok(JobStatusView {
            id: job.id,
            status: job.status,
            error: job.error,
            created_at: job.created_at,
            updated_at: job.updated_at,
        })
    }

    /// Full result of a completed job.
    ///
    /// `NotReady` covers both running and failed jobs; callers distinguish
    /// them via `get_status`, which exposes the failure reason.
    pub fn get_result(&self, id: Uuid) -> Result<Job> {
        let job = self.store.get(id)?.ok_or(Error::NotFound(id))?;
        if job.status != JobStatus::Completed {
            return Err(Error::NotReady {
                id,
                status: job.status,
            });
        }
        Ok(job)
    }
}
