//! Optional LLM summarization of extracted text

pub mod ollama;

pub use ollama::OllamaSummarizer;

use async_trait::async_trait;

use crate::error::Result;

/// Trait for summary generation.
///
/// Summarizer failure is never fatal for a job: the pipeline completes
/// without a summary and logs the failure.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Generate a summary from a prepared prompt
    async fn summarize(&self, prompt: &str) -> Result<String>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Build a bounded summarization prompt from extracted text.
///
/// Only a fixed-size prefix of the text is sent; truncation is UTF-8
/// boundary safe.
pub fn build_prompt(text: &str, max_chars: usize) -> String {
    let excerpt: String = text.chars().take(max_chars).collect();
    format!(
        "Summarize the following document in a few sentences. \
         Describe what kind of document it is and its key content. \
         Use only the text provided.\n\nDocument text:\n{}",
        excerpt.trim()
    )
}
