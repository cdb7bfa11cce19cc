//! Application state for the pipeline server

use parking_lot::RwLock;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::extraction::{ExtractionAdapter, LocalToolsAdapter};
use crate::fetch::RemoteFetcher;
use crate::processing::{PipelineExecutor, PipelineWorker};
use crate::service::JobService;
use crate::storage::JobStore;
use crate::summarize::{OllamaSummarizer, Summarizer};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: ServiceConfig,
    /// Job submit / status / result operations
    service: JobService,
    /// URL-based submission fetcher
    fetcher: RemoteFetcher,
    /// Ready state
    ready: RwLock<bool>,
}

impl AppState {
    /// Create new application state and start the pipeline worker
    pub async fn new(config: ServiceConfig) -> Result<Self> {
        tracing::info!("Initializing application state...");

        if let Some(parent) = config.storage.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::Config(format!(
                        "Failed to create storage directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let store = Arc::new(JobStore::new(&config.storage.database_path)?);
        tracing::info!("Job store opened at {}", config.storage.database_path.display());

        // Input bytes are not persisted, so jobs interrupted by a restart
        // cannot be resumed.
        let interrupted = store.fail_interrupted()?;
        if interrupted > 0 {
            tracing::warn!("Marked {} interrupted jobs as failed", interrupted);
        }

        let adapter: Arc<dyn ExtractionAdapter> =
            Arc::new(LocalToolsAdapter::new(config.extraction.clone()));
        tracing::info!(
            "Extraction adapter '{}' initialized (tesseract: {}, pdftotext: {}, pdftoppm: {})",
            adapter.name(),
            LocalToolsAdapter::has_tesseract(),
            LocalToolsAdapter::has_pdftotext(),
            LocalToolsAdapter::has_pdftoppm()
        );

        let summarizer: Option<Arc<dyn Summarizer>> = if config.summary.enabled {
            let ollama = OllamaSummarizer::new(config.summary.clone())?;
            if !ollama.health_check().await {
                tracing::warn!(
                    "Summarizer at {} is unreachable; summaries will fail until it recovers",
                    config.summary.base_url
                );
            }
            tracing::info!("Summarizer initialized (model: {})", config.summary.model);
            Some(Arc::new(ollama))
        } else {
            tracing::info!("Summarizer disabled by configuration");
            None
        };

        let (sender, receiver) = mpsc::channel(config.processing.queue_capacity);

        let executor = Arc::new(PipelineExecutor::new(
            store.clone(),
            adapter,
            summarizer,
            Duration::from_secs(config.processing.job_timeout_secs),
            config.processing.effective_parallel_pages(),
            config.summary.prompt_chars,
        ));
        let _worker = PipelineWorker::new(executor, receiver).spawn();
        tracing::info!(
            "Pipeline worker started ({} parallel pages per job)",
            config.processing.effective_parallel_pages()
        );

        let service = JobService::new(store, sender, &config.server, &config.extraction);
        let fetcher = RemoteFetcher::new(config.server.max_upload_size)?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                service,
                fetcher,
                ready: RwLock::new(true),
            }),
        })
    }

    /// Get configuration
    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    /// Get the job service
    pub fn service(&self) -> &JobService {
        &self.inner.service
    }

    /// Get the remote fetcher
    pub fn fetcher(&self) -> &RemoteFetcher {
        &self.inner.fetcher
    }

    /// Check if the server is ready
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read()
    }

    /// Set ready state
    pub fn set_ready(&self, ready: bool) {
        *self.inner.ready.write() = ready;
    }
}
