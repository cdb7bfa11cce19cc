//! Extraction via local CLI tools (poppler-utils + tesseract)
//!
//! - pdftotext: embedded text layers
//! - pdftoppm: PDF rasterization to page PNGs
//! - tesseract: OCR with TSV output for word boxes and confidence

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::adapter::{ExtractionAdapter, PageExtraction, RenderedPages, TextLayer};
use crate::config::ExtractionConfig;
use crate::error::{Error, Result};
use crate::types::{PageMetadata, WordBox};

/// CLI-tool extraction adapter
pub struct LocalToolsAdapter {
    config: ExtractionConfig,
}

impl LocalToolsAdapter {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Check if tesseract is available
    pub fn has_tesseract() -> bool {
        std::process::Command::new("tesseract")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Check if pdftotext is available
    pub fn has_pdftotext() -> bool {
        std::process::Command::new("pdftotext")
            .arg("-v")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Check if pdftoppm is available
    pub fn has_pdftoppm() -> bool {
        std::process::Command::new("pdftoppm")
            .arg("-v")
            .output()
            .map(|_| true) // pdftoppm -v writes to stderr; existence is enough
            .unwrap_or(false)
    }
}

#[async_trait]
impl ExtractionAdapter for LocalToolsAdapter {
    async fn extract_page(&self, image: &Path, language: &str) -> Result<PageExtraction> {
        let image_path = image
            .to_str()
            .ok_or_else(|| Error::recognition("Non-UTF8 image path"))?;

        let output = Command::new("tesseract")
            .args([image_path, "stdout", "-l", language, "tsv"])
            .output()
            .await
            .map_err(|e| Error::recognition(format!("Failed to spawn tesseract: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::recognition(format!(
                "tesseract failed on {}: {}",
                image.display(),
                stderr.trim()
            )));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        Ok(parse_tesseract_tsv(&tsv))
    }

    async fn extract_text_layer(&self, document: &[u8]) -> Result<TextLayer> {
        let mut child = Command::new("pdftotext")
            .args([
                "-layout",       // maintain original layout
                "-nopgbrk",      // no page-break characters
                "-enc", "UTF-8",
                "-",             // read from stdin
                "-",             // write to stdout
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::recognition(format!("Failed to spawn pdftotext: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(document)
                .await
                .map_err(|e| Error::recognition(format!("Failed to write to pdftotext: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::recognition(format!("pdftotext failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::recognition(format!(
                "pdftotext failed: {}",
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        if text.trim().chars().count() < self.config.min_text_layer_chars {
            return Ok(TextLayer::Insufficient);
        }

        Ok(TextLayer::Text(text))
    }

    async fn render_pages(&self, document: &[u8]) -> Result<RenderedPages> {
        let dir = tempfile::Builder::new()
            .prefix("textmill-render-")
            .tempdir()
            .map_err(|e| Error::recognition(format!("Failed to create temp dir: {}", e)))?;

        let pdf_path = dir.path().join("input.pdf");
        tokio::fs::write(&pdf_path, document)
            .await
            .map_err(|e| Error::recognition(format!("Failed to write temp PDF: {}", e)))?;

        let prefix = dir.path().join("page");
        let output = Command::new("pdftoppm")
            .args([
                "-png",
                "-r",
                &self.config.render_dpi.to_string(),
                pdf_path
                    .to_str()
                    .ok_or_else(|| Error::recognition("Non-UTF8 temp path"))?,
                prefix
                    .to_str()
                    .ok_or_else(|| Error::recognition("Non-UTF8 temp path"))?,
            ])
            .output()
            .await
            .map_err(|e| Error::recognition(format!("Failed to spawn pdftoppm: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::recognition(format!(
                "pdftoppm failed: {}",
                stderr.trim()
            )));
        }

        let mut pages: Vec<_> = std::fs::read_dir(dir.path())
            .map_err(|e| Error::recognition(format!("Failed to read render dir: {}", e)))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
            .collect();

        // pdftoppm zero-pads page numbers, so lexicographic order is page order
        pages.sort();

        if pages.is_empty() {
            return Err(Error::recognition("pdftoppm produced no page images"));
        }

        Ok(RenderedPages::new(dir, pages))
    }

    fn name(&self) -> &str {
        "local_tools"
    }
}

/// Parse tesseract TSV output into page text plus word-level metadata.
///
/// TSV columns: level page_num block_num par_num line_num word_num
/// left top width height conf text. Level 1 rows describe the page image,
/// level 5 rows are words.
fn parse_tesseract_tsv(tsv: &str) -> PageExtraction {
    let mut text = String::new();
    let mut words = Vec::new();
    let mut page_width = None;
    let mut page_height = None;
    let mut current_line: Option<(u32, u32, u32)> = None; // (block, par, line)

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }

        let level: u32 = cols[0].parse().unwrap_or(0);
        if level == 1 {
            page_width = cols[8].parse().ok();
            page_height = cols[9].parse().ok();
            continue;
        }
        if level != 5 {
            continue;
        }

        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }

        let line_key = (
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        match current_line {
            Some(prev) if prev == line_key => text.push(' '),
            Some(_) => text.push('\n'),
            None => {}
        }
        current_line = Some(line_key);
        text.push_str(word);

        words.push(WordBox {
            text: word.to_string(),
            confidence: cols[10].parse().unwrap_or(-1.0),
            x: cols[6].parse().unwrap_or(0),
            y: cols[7].parse().unwrap_or(0),
            width: cols[8].parse().unwrap_or(0),
            height: cols[9].parse().unwrap_or(0),
        });
    }

    let scored: Vec<f32> = words
        .iter()
        .map(|w| w.confidence)
        .filter(|c| *c >= 0.0)
        .collect();
    let mean_confidence = if scored.is_empty() {
        None
    } else {
        Some(scored.iter().sum::<f32>() / scored.len() as f32)
    };

    PageExtraction {
        text,
        metadata: PageMetadata {
            width: page_width,
            height: page_height,
            mean_confidence,
            words,
        },
    }
}
