//! Error types for the document pipeline

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::types::JobStatus;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bad request: missing file/url, unsupported type, oversized input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown job id
    #[error("Job not found: {0}")]
    NotFound(Uuid),

    /// Result requested before the job reached `completed`
    #[error("Job {id} is not ready: status is {status}")]
    NotReady { id: Uuid, status: JobStatus },

    /// Recognizer/renderer/text-layer collaborator failure
    #[error("Recognition failed: {0}")]
    Recognition(String),

    /// Input exceeded a configured resource limit during execution
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Store-level race on a status transition; handled internally
    #[error("Transition conflict for job {0}")]
    Conflict(Uuid),

    /// Job id already exists in the store
    #[error("Duplicate job id: {0}")]
    DuplicateId(Uuid),

    /// Job execution exceeded its deadline
    #[error("Timeout: execution exceeded {0}s deadline")]
    Timeout(u64),

    /// Summarizer failure (non-fatal for the job)
    #[error("Summarizer error: {0}")]
    Summarizer(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a recognition error
    pub fn recognition(message: impl Into<String>) -> Self {
        Self::Recognition(message.into())
    }

    /// Create an invalid-input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            Error::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error", msg.clone()),
            Error::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "invalid_input", msg.clone()),
            Error::NotFound(id) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("Job not found: {}", id),
            ),
            Error::NotReady { id, status } => (
                StatusCode::CONFLICT,
                "not_ready",
                format!("Job {} is not ready: status is {}", id, status),
            ),
            Error::Recognition(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "recognition_error",
                msg.clone(),
            ),
            Error::ResourceExhausted(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "resource_exhausted",
                msg.clone(),
            ),
            // Conflicts and duplicate ids are handled inside the executor and
            // store; reaching a client means a bug, report as 500.
            Error::Conflict(id) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "conflict",
                format!("Transition conflict for job {}", id),
            ),
            Error::DuplicateId(id) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "duplicate_id",
                format!("Duplicate job id: {}", id),
            ),
            Error::Timeout(secs) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "timeout",
                format!("Execution exceeded {}s deadline", secs),
            ),
            Error::Summarizer(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "summarizer_error",
                msg.clone(),
            ),
            Error::Io(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "io_error",
                err.to_string(),
            ),
            Error::Json(err) => (StatusCode::BAD_REQUEST, "json_error", err.to_string()),
            Error::Http(err) => (StatusCode::BAD_GATEWAY, "http_error", err.to_string()),
            Error::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone())
            }
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_names_current_status() {
        let id = Uuid::new_v4();
        let err = Error::NotReady {
            id,
            status: JobStatus::Processing,
        };
        assert!(err.to_string().contains("processing"));
    }
}
