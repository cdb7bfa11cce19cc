//! Job record, per-page results, and document classification

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job status
///
/// Transitions are monotonic along
/// `pending -> processing -> {completed | failed}`; no edge is ever skipped
/// or reversed. The store enforces legality defensively.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// No further transition occurs out of a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self -> to` is a legal state-machine edge.
    /// `processing -> processing` carries page appends during execution.
    pub fn can_transition(&self, to: JobStatus) -> bool {
        matches!(
            (self, to),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse a status stored as text
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Word-level recognition output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WordBox {
    pub text: String,
    /// Recognizer confidence, 0-100
    pub confidence: f32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Extraction metadata for one page
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PageMetadata {
    /// Source image width in pixels, when known
    pub width: Option<u32>,
    /// Source image height in pixels, when known
    pub height: Option<u32>,
    /// Mean word confidence over the page, 0-100
    pub mean_confidence: Option<f32>,
    /// Word boxes in reading order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<WordBox>,
}

/// Per-page extraction outcome
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageResult {
    /// 1-based, unique within a job, defines ordering
    pub page_number: u32,
    /// Recognized or extracted text (may be empty, never absent)
    pub text: String,
    /// Adapter-specific structured data
    pub metadata: PageMetadata,
}

/// The unit of work and its outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    /// Original filename or source URL
    pub source_name: String,
    /// Extraction language hint (tesseract code)
    pub language: String,
    pub status: JobStatus,
    /// Whether a summary was requested at submission
    pub want_summary: bool,
    /// Ordered page results; frozen once the job is terminal
    pub pages: Vec<PageResult>,
    /// Concatenation of page texts in page order; set at completion
    pub aggregated_text: Option<String>,
    /// LLM summary, present only if requested and the summarizer succeeded
    pub summary: Option<String>,
    /// Failure reason for failed jobs
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job
    pub fn new(source_name: String, language: String, want_summary: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            source_name,
            language,
            status: JobStatus::Pending,
            want_summary,
            pages: Vec::new(),
            aggregated_text: None,
            summary: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Document classification, resolved once at submission and dispatched by
/// exhaustive match in the executor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Image,
    Pdf,
    Unsupported,
}

impl DocumentKind {
    /// Classify by content sniffing with extension fallback.
    ///
    /// Magic bytes win over the filename: a `.png` upload containing a PDF is
    /// a PDF.
    pub fn detect(source_name: &str, data: &[u8]) -> Self {
        if data.starts_with(b"%PDF-") {
            return DocumentKind::Pdf;
        }
        if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
            || data.starts_with(&[0xFF, 0xD8, 0xFF])
            || data.starts_with(b"II*\0")
            || data.starts_with(b"MM\0*")
            || data.starts_with(b"BM")
            || (data.starts_with(b"RIFF") && data.get(8..12) == Some(b"WEBP"))
        {
            return DocumentKind::Image;
        }

        // Fall back to the declared name for formats without a sniffable
        // magic (or truncated test fixtures).
        let mime = mime_guess::from_path(source_name).first_or_octet_stream();
        match (mime.type_().as_str(), mime.subtype().as_str()) {
            ("application", "pdf") => DocumentKind::Pdf,
            ("image", _) => DocumentKind::Image,
            _ => DocumentKind::Unsupported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Image => "image",
            DocumentKind::Pdf => "pdf",
            DocumentKind::Unsupported => "unsupported",
        }
    }
}
