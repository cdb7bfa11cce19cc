//! API routes for the pipeline server

pub mod jobs;
pub mod languages;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Submission - with larger body limit for file uploads
        .route(
            "/jobs",
            post(jobs::submit_job).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        // Retrieval
        .route("/jobs/:id/status", get(jobs::job_status))
        .route("/jobs/:id/result", get(jobs::job_result))
        // Recognition languages
        .route("/languages", get(languages::list_languages))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "textmill",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Asynchronous text extraction and summarization for images and PDFs",
        "endpoints": {
            "POST /api/jobs": "Submit a document (multipart upload or ?url=)",
            "GET /api/jobs/:id/status": "Get job status",
            "GET /api/jobs/:id/result": "Get the result of a completed job",
            "GET /api/languages": "List supported recognition languages"
        },
        "features": {
            "text_layer": "Embedded PDF text layers short-circuit OCR",
            "page_fanout": "Multi-page documents are recognized page-parallel",
            "summaries": "Optional LLM summary of the extracted text"
        }
    }))
}
