//! Remote document fetch
//!
//! Downloads a submission given by URL. Network failures and oversized
//! responses surface as `InvalidInput` at submit time.

use reqwest::Client;
use std::time::Duration;

use crate::error::{Error, Result};

/// HTTP fetcher with a byte cap
pub struct RemoteFetcher {
    client: Client,
    max_bytes: usize,
}

impl RemoteFetcher {
    pub fn new(max_bytes: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, max_bytes })
    }

    /// Download a document, returning a source name derived from the URL path
    /// and the raw bytes.
    pub async fn fetch(&self, url: &str) -> Result<(String, Vec<u8>)> {
        let parsed: reqwest::Url = url
            .parse()
            .map_err(|e| Error::invalid_input(format!("Invalid URL '{}': {}", url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::invalid_input(format!(
                "Unsupported URL scheme: {}",
                parsed.scheme()
            )));
        }

        let source_name = parsed
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|s| !s.is_empty())
            .unwrap_or("download")
            .to_string();

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| Error::invalid_input(format!("Failed to fetch '{}': {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::invalid_input(format!(
                "Fetch of '{}' returned {}",
                url,
                response.status()
            )));
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.max_bytes {
                return Err(Error::invalid_input(format!(
                    "Remote document is {} bytes, limit is {}",
                    len, self.max_bytes
                )));
            }
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| Error::invalid_input(format!("Failed to read '{}': {}", url, e)))?;

        // Servers may omit Content-Length; enforce the cap on the real body too.
        if data.len() > self.max_bytes {
            return Err(Error::invalid_input(format!(
                "Remote document is {} bytes, limit is {}",
                data.len(),
                self.max_bytes
            )));
        }

        Ok((source_name, data.to_vec()))
    }
}
