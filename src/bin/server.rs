//! Pipeline server binary
//!
//! Run with: cargo run --bin textmill-server

use textmill::{config::ServiceConfig, extraction::LocalToolsAdapter, server::PipelineServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "textmill=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = ServiceConfig::load()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Database: {}", config.storage.database_path.display());
    tracing::info!("  - Max upload: {} bytes", config.server.max_upload_size);
    tracing::info!("  - Render DPI: {}", config.extraction.render_dpi);
    tracing::info!("  - Job timeout: {}s", config.processing.job_timeout_secs);

    // Check the extraction tools
    if !LocalToolsAdapter::has_tesseract() {
        tracing::warn!("tesseract not found on PATH; image and scanned-PDF jobs will fail");
        tracing::warn!("  Install: apt install tesseract-ocr (or brew install tesseract)");
    }
    if !LocalToolsAdapter::has_pdftotext() || !LocalToolsAdapter::has_pdftoppm() {
        tracing::warn!("poppler-utils not fully available; PDF jobs will fail");
        tracing::warn!("  Install: apt install poppler-utils (or brew install poppler)");
    }

    // Create and start server
    let server = PipelineServer::new(config).await?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nEndpoints:");
    println!("  POST /api/jobs                - Submit a document");
    println!("  GET  /api/jobs/:id/status    - Check progress");
    println!("  GET  /api/jobs/:id/result    - Fetch the result");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
