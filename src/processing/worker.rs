//! Queue consumer that drives the pipeline executor.
//!
//! Jobs arrive on an mpsc channel from `JobService::submit`. Each job runs in
//! its own task, so a slow multi-page document never blocks other jobs; the
//! per-page fan-out inside the executor stays bounded by its own semaphore.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::processing::PipelineExecutor;
use crate::service::QueuedJob;

pub struct PipelineWorker {
    executor: Arc<PipelineExecutor>,
    receiver: mpsc::Receiver<QueuedJob>,
}

impl PipelineWorker {
    pub fn new(executor: Arc<PipelineExecutor>, receiver: mpsc::Receiver<QueuedJob>) -> Self {
        Self { executor, receiver }
    }

    /// Consume the queue until every sender is dropped
    pub async fn run(mut self) {
        tracing::info!("Pipeline worker started");

        while let Some(job) = self.receiver.recv().await {
            let executor = self.executor.clone();
            tokio::spawn(async move {
                executor.execute(job).await;
            });
        }

        tracing::info!("Pipeline worker stopped: submission channel closed");
    }

    /// Spawn the worker loop onto the runtime
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
