//! Pipeline executor: turns a submitted document into a terminal job state
//! exactly once.
//!
//! The executor claims its job through the store's atomic
//! `pending -> processing` transition, so duplicate runs for the same job
//! abort cleanly. Every failure path ends in a `failed` transition; the
//! executor never leaves a job in `processing`.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::extraction::{ExtractionAdapter, TextLayer};
use crate::service::QueuedJob;
use crate::storage::{JobPatch, JobStore};
use crate::summarize::{build_prompt, Summarizer};
use crate::types::{DocumentKind, JobStatus, PageResult};

/// Executes one job at a time; cheap to share across spawned tasks
pub struct PipelineExecutor {
    store: Arc<JobStore>,
    adapter: Arc<dyn ExtractionAdapter>,
    summarizer: Option<Arc<dyn Summarizer>>,
    job_timeout: Duration,
    parallel_pages: usize,
    prompt_chars: usize,
}

impl PipelineExecutor {
    pub fn new(
        store: Arc<JobStore>,
        adapter: Arc<dyn ExtractionAdapter>,
        summarizer: Option<Arc<dyn Summarizer>>,
        job_timeout: Duration,
        parallel_pages: usize,
        prompt_chars: usize,
    ) -> Self {
        Self {
            store,
            adapter,
            summarizer,
            job_timeout,
            parallel_pages: parallel_pages.max(1),
            prompt_chars,
        }
    }

    /// Run a queued job to a terminal state. Never panics the process; all
    /// errors are converted into a `failed` transition or logged.
    pub async fn execute(&self, queued: QueuedJob) {
        let id = queued.id;

        // Exactly-once claim. A conflict means another executor instance owns
        // this job already.
        match self
            .store
            .transition(id, JobStatus::Pending, JobStatus::Processing, JobPatch::none())
        {
            Ok(()) => {}
            Err(Error::Conflict(_)) => {
                tracing::warn!("Job {} already claimed, aborting duplicate execution", id);
                return;
            }
            Err(e) => {
                tracing::error!("Failed to claim job {}: {}", id, e);
                return;
            }
        }

        tracing::info!(
            "Processing job {} ({}, {} bytes)",
            id,
            queued.kind.as_str(),
            queued.data.len()
        );

        let result = match timeout(self.job_timeout, self.run(&queued)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.job_timeout.as_secs())),
        };

        if let Err(e) = result {
            self.fail(id, e);
        }
    }

    /// Extraction, aggregation, summarization, and the terminal `completed`
    /// transition. Any `Err` is turned into a `failed` transition by `execute`.
    async fn run(&self, queued: &QueuedJob) -> Result<()> {
        let aggregated = match queued.kind {
            DocumentKind::Image => self.run_image(queued).await?,
            DocumentKind::Pdf => self.run_pdf(queued).await?,
            // Submission validation rejects these; defend anyway.
            DocumentKind::Unsupported => {
                return Err(Error::invalid_input("Unsupported document type"));
            }
        };

        let summary = if queued.want_summary {
            self.summarize(queued.id, &aggregated).await
        } else {
            None
        };

        self.store.transition(
            queued.id,
            JobStatus::Processing,
            JobStatus::Completed,
            JobPatch::completed(aggregated, summary),
        )?;

        tracing::info!("Job {} completed", queued.id);
        Ok(())
    }

    /// Single image: one recognizer call, one page
    async fn run_image(&self, queued: &QueuedJob) -> Result<String> {
        let image = tempfile::Builder::new()
            .prefix("textmill-image-")
            .tempfile()
            .map_err(|e| Error::internal(format!("Failed to create temp image: {}", e)))?;
        tokio::fs::write(image.path(), &queued.data).await?;

        let extraction = self.adapter.extract_page(image.path(), &queued.language).await?;
        let text = extraction.text.clone();

        self.store.transition(
            queued.id,
            JobStatus::Processing,
            JobStatus::Processing,
            JobPatch::page(PageResult {
                page_number: 1,
                text: extraction.text,
                metadata: extraction.metadata,
            }),
        )?;

        Ok(text)
    }

    /// PDF: embedded text layer first; rasterization is strictly a fallback,
    /// never run speculatively alongside it.
    async fn run_pdf(&self, queued: &QueuedJob) -> Result<String> {
        match self.adapter.extract_text_layer(&queued.data).await? {
            TextLayer::Text(text) => {
                tracing::info!("Job {}: text layer sufficient, skipping OCR", queued.id);
                Ok(text)
            }
            TextLayer::Insufficient => {
                tracing::info!("Job {}: text layer insufficient, rasterizing", queued.id);
                self.ocr_rendered_pages(queued).await
            }
        }
    }

    /// Rasterize and recognize each page. Extraction fans out bounded by a
    /// semaphore; `join_all` yields results in submission order, so pages are
    /// committed strictly by increasing page number whatever the completion
    /// order was.
    async fn ocr_rendered_pages(&self, queued: &QueuedJob) -> Result<String> {
        let rendered = self.adapter.render_pages(&queued.data).await?;
        tracing::info!("Job {}: rendered {} pages", queued.id, rendered.len());

        let semaphore = Arc::new(Semaphore::new(self.parallel_pages));
        let extractions = join_all(rendered.paths().iter().map(|path| {
            let adapter = self.adapter.clone();
            let semaphore = semaphore.clone();
            let language = queued.language.clone();
            let path = path.clone();
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| Error::internal("Page semaphore closed"))?;
                adapter.extract_page(&path, &language).await
            }
        }))
        .await;

        let mut aggregated = String::new();
        for (index, extraction) in extractions.into_iter().enumerate() {
            let extraction = extraction?;
            let page_number = (index + 1) as u32;
            aggregated.push_str(&extraction.text);

            self.store.transition(
                queued.id,
                JobStatus::Processing,
                JobStatus::Processing,
                JobPatch::page(PageResult {
                    page_number,
                    text: extraction.text,
                    metadata: extraction.metadata,
                }),
            )?;
        }

        // `rendered` drops here, deleting the temporary page images.
        Ok(aggregated)
    }

    /// Summarizer failure is non-fatal: the job completes without a summary.
    async fn summarize(&self, id: Uuid, aggregated: &str) -> Option<String> {
        let Some(summarizer) = &self.summarizer else {
            tracing::warn!("Job {}: summary requested but no summarizer configured", id);
            return None;
        };

        let prompt = build_prompt(aggregated, self.prompt_chars);
        match summarizer.summarize(&prompt).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!(
                    "Job {}: summarizer '{}' failed, completing without summary: {}",
                    id,
                    summarizer.name(),
                    e
                );
                None
            }
        }
    }

    fn fail(&self, id: Uuid, error: Error) {
        let reason = error.to_string();
        tracing::error!("Job {} failed: {}", id, reason);

        if let Err(e) = self.store.transition(
            id,
            JobStatus::Processing,
            JobStatus::Failed,
            JobPatch::failed(reason),
        ) {
            // Losing this race (e.g. a timeout firing after completion) is
            // harmless; the job already reached a terminal state.
            tracing::error!("Failed to record failure for job {}: {}", id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{PageExtraction, RenderedPages};
    use crate::types::{Job, PageMetadata};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scriptable adapter for executor tests
    struct MockAdapter {
        /// `None` simulates an insufficient text layer
        text_layer: Option<String>,
        /// Per-page OCR texts; also the rendered page count
        page_texts: Vec<String>,
        /// Per-call delay, keyed by page index, to force out-of-order completion
        page_delays_ms: Vec<u64>,
        fail_extraction: bool,
        render_calls: AtomicUsize,
        extract_calls: AtomicUsize,
    }

    impl MockAdapter {
        fn new(text_layer: Option<&str>, page_texts: &[&str]) -> Self {
            Self {
                text_layer: text_layer.map(String::from),
                page_texts: page_texts.iter().map(|s| s.to_string()).collect(),
                page_delays_ms: Vec::new(),
                fail_extraction: false,
                render_calls: AtomicUsize::new(0),
                extract_calls: AtomicUsize::new(0),
            }
        }

        fn page_index(path: &Path) -> usize {
            path.file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_prefix("page-"))
                .and_then(|s| s.parse::<usize>().ok())
                .map(|n| n - 1)
                .unwrap_or(0)
        }
    }

    #[async_trait]
    impl ExtractionAdapter for MockAdapter {
        async fn extract_page(&self, image: &Path, _language: &str) -> Result<PageExtraction> {
            self.extract_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_extraction {
                return Err(Error::recognition("recognizer unavailable"));
            }

            let index = Self::page_index(image);
            if let Some(delay) = self.page_delays_ms.get(index) {
                tokio::time::sleep(Duration::from_millis(*delay)).await;
            }

            Ok(PageExtraction {
                text: self.page_texts[index].clone(),
                metadata: PageMetadata::default(),
            })
        }

        async fn extract_text_layer(&self, _document: &[u8]) -> Result<TextLayer> {
            match &self.text_layer {
                Some(text) => Ok(TextLayer::Text(text.clone())),
                None => Ok(TextLayer::Insufficient),
            }
        }

        async fn render_pages(&self, _document: &[u8]) -> Result<RenderedPages> {
            self.render_calls.fetch_add(1, Ordering::SeqCst);
            let dir = tempfile::tempdir().unwrap();
            let pages = (1..=self.page_texts.len())
                .map(|n| {
                    let path = dir.path().join(format!("page-{}.png", n));
                    std::fs::write(&path, b"").unwrap();
                    path
                })
                .collect();
            Ok(RenderedPages::new(dir, pages))
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    struct FailingSummarizer;

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(&self, _prompt: &str) -> Result<String> {
            Err(Error::Summarizer("model unavailable".into()))
        }
        fn name(&self) -> &str {
            "failing"
        }
    }

    struct EchoSummarizer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Summarizer for EchoSummarizer {
        async fn summarize(&self, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("summary of {} chars", prompt.chars().count()))
        }
        fn name(&self) -> &str {
            "echo"
        }
    }

    fn executor(
        store: Arc<JobStore>,
        adapter: Arc<dyn ExtractionAdapter>,
        summarizer: Option<Arc<dyn Summarizer>>,
    ) -> PipelineExecutor {
        PipelineExecutor::new(store, adapter, summarizer, Duration::from_secs(30), 4, 4000)
    }

    fn queued(job: &Job, kind: DocumentKind, want_summary: bool) -> QueuedJob {
        QueuedJob {
            id: job.id,
            kind,
            data: vec![1, 2, 3],
            language: job.language.clone(),
            want_summary,
        }
    }

    fn pending_job(store: &JobStore, want_summary: bool) -> Job {
        let job = Job::new("doc.pdf".into(), "eng".into(), want_summary);
        store.create(&job).unwrap();
        job
    }

    #[tokio::test]
    async fn image_job_yields_single_page() {
        let store = Arc::new(JobStore::in_memory().unwrap());
        let adapter = Arc::new(MockAdapter::new(None, &["recognized text"]));
        let exec = executor(store.clone(), adapter, None);

        let job = pending_job(&store, false);
        exec.execute(queued(&job, DocumentKind::Image, false)).await;

        let done = store.get(job.id).unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.pages.len(), 1);
        assert_eq!(done.pages[0].page_number, 1);
        assert_eq!(done.aggregated_text.as_deref(), Some("recognized text"));
        assert_eq!(done.aggregated_text.as_deref(), Some(done.pages[0].text.as_str()));
    }

    #[tokio::test]
    async fn text_layer_short_circuits_rasterization() {
        let store = Arc::new(JobStore::in_memory().unwrap());
        let layer = "embedded ".repeat(60);
        let adapter = Arc::new(MockAdapter::new(Some(layer.as_str()), &["never"]));
        let exec = executor(store.clone(), adapter.clone(), None);

        let job = pending_job(&store, false);
        exec.execute(queued(&job, DocumentKind::Pdf, false)).await;

        let done = store.get(job.id).unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.pages.is_empty());
        assert_eq!(done.aggregated_text.as_deref(), Some(layer.as_str()));
        assert_eq!(adapter.render_calls.load(Ordering::SeqCst), 0);
        assert_eq!(adapter.extract_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn scanned_pdf_commits_pages_in_order() {
        let store = Arc::new(JobStore::in_memory().unwrap());
        let mut adapter = MockAdapter::new(None, &["one", "two", "three"]);
        // later pages finish first
        adapter.page_delays_ms = vec![60, 30, 0];
        let adapter = Arc::new(adapter);
        let exec = executor(store.clone(), adapter.clone(), None);

        let job = pending_job(&store, false);
        exec.execute(queued(&job, DocumentKind::Pdf, false)).await;

        let done = store.get(job.id).unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        let numbers: Vec<u32> = done.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(done.aggregated_text.as_deref(), Some("onetwothree"));
        assert_eq!(adapter.render_calls.load(Ordering::SeqCst), 1);
        assert_eq!(adapter.extract_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn summarizer_failure_is_not_fatal() {
        let store = Arc::new(JobStore::in_memory().unwrap());
        let adapter = Arc::new(MockAdapter::new(None, &["content"]));
        let exec = executor(store.clone(), adapter, Some(Arc::new(FailingSummarizer)));

        let job = pending_job(&store, true);
        exec.execute(queued(&job, DocumentKind::Image, true)).await;

        let done = store.get(job.id).unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.summary.is_none());
        assert_eq!(done.aggregated_text.as_deref(), Some("content"));
    }

    #[tokio::test]
    async fn summary_is_written_with_completion() {
        let store = Arc::new(JobStore::in_memory().unwrap());
        let adapter = Arc::new(MockAdapter::new(None, &["content"]));
        let summarizer = Arc::new(EchoSummarizer {
            calls: AtomicUsize::new(0),
        });
        let exec = executor(store.clone(), adapter, Some(summarizer.clone()));

        let job = pending_job(&store, true);
        exec.execute(queued(&job, DocumentKind::Image, true)).await;

        let done = store.get(job.id).unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.summary.is_some());
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn summarizer_is_skipped_when_not_requested() {
        let store = Arc::new(JobStore::in_memory().unwrap());
        let adapter = Arc::new(MockAdapter::new(None, &["content"]));
        let summarizer = Arc::new(EchoSummarizer {
            calls: AtomicUsize::new(0),
        });
        let exec = executor(store.clone(), adapter, Some(summarizer.clone()));

        let job = pending_job(&store, false);
        exec.execute(queued(&job, DocumentKind::Image, false)).await;

        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
        let done = store.get(job.id).unwrap().unwrap();
        assert!(done.summary.is_none());
    }

    #[tokio::test]
    async fn recognition_failure_fails_the_job() {
        let store = Arc::new(JobStore::in_memory().unwrap());
        let mut adapter = MockAdapter::new(None, &["a", "b"]);
        adapter.fail_extraction = true;
        let exec = executor(store.clone(), Arc::new(adapter), None);

        let job = pending_job(&store, false);
        exec.execute(queued(&job, DocumentKind::Pdf, false)).await;

        let done = store.get(job.id).unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error.as_deref().unwrap().contains("recognizer unavailable"));
        // the strict policy: no partial pages survive a failure
        assert!(done.pages.is_empty());
        assert!(done.aggregated_text.is_none());
    }

    #[tokio::test]
    async fn duplicate_execution_aborts_at_the_claim() {
        let store = Arc::new(JobStore::in_memory().unwrap());
        let adapter = Arc::new(MockAdapter::new(None, &["text"]));
        let exec = executor(store.clone(), adapter.clone(), None);

        let job = pending_job(&store, false);
        // another executor instance already claimed this job
        store
            .transition(job.id, JobStatus::Pending, JobStatus::Processing, JobPatch::none())
            .unwrap();

        exec.execute(queued(&job, DocumentKind::Image, false)).await;

        let current = store.get(job.id).unwrap().unwrap();
        assert_eq!(current.status, JobStatus::Processing);
        assert!(current.pages.is_empty());
        assert_eq!(adapter.extract_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_executions_complete_exactly_once() {
        let store = Arc::new(JobStore::in_memory().unwrap());
        let adapter = Arc::new(MockAdapter::new(None, &["text"]));
        let exec = Arc::new(executor(store.clone(), adapter, None));

        let job = pending_job(&store, false);

        let a = {
            let exec = exec.clone();
            let q = queued(&job, DocumentKind::Image, false);
            tokio::spawn(async move { exec.execute(q).await })
        };
        let b = {
            let exec = exec.clone();
            let q = queued(&job, DocumentKind::Image, false);
            tokio::spawn(async move { exec.execute(q).await })
        };
        a.await.unwrap();
        b.await.unwrap();

        let done = store.get(job.id).unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.pages.len(), 1);
    }

    #[tokio::test]
    async fn deadline_overrun_fails_with_timeout() {
        let store = Arc::new(JobStore::in_memory().unwrap());
        let mut adapter = MockAdapter::new(None, &["slow"]);
        adapter.page_delays_ms = vec![500];
        let exec = PipelineExecutor::new(
            store.clone(),
            Arc::new(adapter),
            None,
            Duration::from_millis(50),
            4,
            4000,
        );

        let job = pending_job(&store, false);
        exec.execute(queued(&job, DocumentKind::Image, false)).await;

        let done = store.get(job.id).unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error.as_deref().unwrap().contains("Timeout"));
    }

    #[tokio::test]
    async fn unsupported_kind_fails_fast() {
        let store = Arc::new(JobStore::in_memory().unwrap());
        let adapter = Arc::new(MockAdapter::new(None, &["text"]));
        let exec = executor(store.clone(), adapter, None);

        let job = pending_job(&store, false);
        exec.execute(queued(&job, DocumentKind::Unsupported, false)).await;

        let done = store.get(job.id).unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error.as_deref().unwrap().contains("Unsupported"));
    }
}
