//! Job submission and retrieval endpoints

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::service::Submission;
use crate::types::{Job, PageResult};

/// Query parameters accepted by POST /api/jobs
#[derive(Debug, Deserialize)]
pub struct SubmitParams {
    /// Fetch the document from this URL instead of a multipart upload
    pub url: Option<String>,
    pub language: Option<String>,
    pub summarize: Option<bool>,
}

/// Response from job submission
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: String,
    pub message: String,
}

/// Response from the status endpoint
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Response from the result endpoint
#[derive(Debug, Serialize)]
pub struct JobResultResponse {
    pub job_id: Uuid,
    pub status: String,
    pub source_name: String,
    pub language: String,
    pub pages: Vec<PageResult>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub created_at: String,
    pub completed_at: String,
}

impl JobResultResponse {
    fn from_job(job: Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status.as_str().to_string(),
            source_name: job.source_name,
            language: job.language,
            pages: job.pages,
            text: job.aggregated_text.unwrap_or_default(),
            summary: job.summary,
            created_at: job.created_at.to_rfc3339(),
            completed_at: job.updated_at.to_rfc3339(),
        }
    }
}

/// POST /api/jobs - Submit a document by multipart upload or by URL
pub async fn submit_job(
    State(state): State<AppState>,
    Query(params): Query<SubmitParams>,
    multipart: Option<Multipart>,
) -> Result<(StatusCode, Json<SubmitResponse>)> {
    let submission = match params.url {
        Some(url) => {
            let (source_name, data) = state.fetcher().fetch(&url).await?;
            Submission {
                source_name,
                data,
                language: params.language,
                want_summary: params.summarize.unwrap_or(false),
            }
        }
        None => {
            let multipart = multipart
                .ok_or_else(|| Error::invalid_input("Provide a multipart file or a ?url="))?;
            read_upload(multipart, params).await?
        }
    };

    let job = state.service().submit(submission).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: job.id,
            status: job.status.as_str().to_string(),
            message: format!(
                "Job accepted. Poll /api/jobs/{}/status for progress.",
                job.id
            ),
        }),
    ))
}

/// Read a multipart upload. Form fields `language` and `summarize` override
/// the query parameters.
async fn read_upload(mut multipart: Multipart, params: SubmitParams) -> Result<Submission> {
    let mut source_name = None;
    let mut data = None;
    let mut language = params.language;
    let mut want_summary = params.summarize.unwrap_or(false);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::invalid_input(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "language" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| Error::invalid_input(format!("Failed to read language: {}", e)))?;
                if !value.is_empty() {
                    language = Some(value);
                }
            }
            "summarize" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| Error::invalid_input(format!("Failed to read summarize: {}", e)))?;
                want_summary = matches!(value.as_str(), "true" | "1" | "yes");
            }
            _ => {
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("upload_{}.bin", Uuid::new_v4()));
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| Error::invalid_input(format!("Failed to read file: {}", e)))?;
                source_name = Some(filename);
                data = Some(bytes.to_vec());
            }
        }
    }

    let (source_name, data) = match (source_name, data) {
        (Some(name), Some(data)) => (name, data),
        _ => return Err(Error::invalid_input("No file provided")),
    };

    Ok(Submission {
        source_name,
        data,
        language,
        want_summary,
    })
}

/// GET /api/jobs/:id/status - Current status of a job
pub async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>> {
    let view = state.service().get_status(id)?;

    Ok(Json(JobStatusResponse {
        job_id: view.id,
        status: view.status.as_str().to_string(),
        error: view.error,
        created_at: view.created_at.to_rfc3339(),
        updated_at: view.updated_at.to_rfc3339(),
    }))
}

/// GET /api/jobs/:id/result - Full result of a completed job
pub async fn job_result(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResultResponse>> {
    let job = state.service().get_result(id)?;
    Ok(Json(JobResultResponse::from_job(job)))
}
