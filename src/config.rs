//! Configuration for the document pipeline service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Job store configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Extraction configuration
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// Pipeline execution configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
    /// Summarizer configuration
    #[serde(default)]
    pub summary: SummaryConfig,
}

impl ServiceConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Load from `TEXTMILL_CONFIG` if set, otherwise defaults
    pub fn load() -> Result<Self> {
        match std::env::var("TEXTMILL_CONFIG") {
            Ok(path) => Self::from_file(path),
            Err(_) => Ok(Self::default()),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Maximum upload size in bytes (default: 50MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_upload_size: 50 * 1024 * 1024,
        }
    }
}

/// Job store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite job database
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/jobs.db"),
        }
    }
}

/// Extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Minimum embedded-text-layer length (chars) to accept without OCR.
    /// Shorter layers trigger the rasterization fallback.
    #[serde(default = "default_min_text_layer_chars")]
    pub min_text_layer_chars: usize,
    /// Rasterization resolution in DPI
    #[serde(default = "default_render_dpi")]
    pub render_dpi: u32,
    /// Language hint used when a submission carries none
    #[serde(default = "default_language")]
    pub default_language: String,
}

fn default_min_text_layer_chars() -> usize {
    100
}
fn default_render_dpi() -> u32 {
    150 // good balance of OCR quality and speed
}
fn default_language() -> String {
    "eng".to_string()
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_text_layer_chars: default_min_text_layer_chars(),
            render_dpi: default_render_dpi(),
            default_language: default_language(),
        }
    }
}

/// Pipeline execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Deadline for a single job in seconds (default: 300 = 5 minutes)
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,
    /// Concurrent page extractions per job (default: CPU count, max 4)
    #[serde(default)]
    pub parallel_pages: Option<usize>,
    /// Capacity of the job channel between submit and the worker
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_job_timeout() -> u64 {
    300
}
fn default_queue_capacity() -> usize {
    1024
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            job_timeout_secs: default_job_timeout(),
            parallel_pages: None,
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl ProcessingConfig {
    /// Effective page-extraction concurrency
    pub fn effective_parallel_pages(&self) -> usize {
        self.parallel_pages
            .unwrap_or_else(|| num_cpus::get().min(4))
            .max(1)
    }
}

/// Summarizer configuration (Ollama)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Enable the summarizer collaborator
    pub enabled: bool,
    /// Ollama base URL
    pub base_url: String,
    /// Generation model
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum retries with exponential backoff
    pub max_retries: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Prompt is built from at most this many characters of extracted text
    pub prompt_chars: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2:3b".to_string(),
            timeout_secs: 60,
            max_retries: 2,
            temperature: 0.2,
            prompt_chars: 4000,
        }
    }
}
