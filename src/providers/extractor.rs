//! Text extraction capability
//!
//! Extractors turn raw uploaded bytes into UTF-8 text. Failures are
//! classified as transient (worth retrying: I/O, decoder stalls) or
//! permanent (corrupt input); the pipeline's retry policy keys off that
//! classification.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Trait for extracting text from an uploaded file
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract UTF-8 text from the raw bytes
    async fn extract(&self, data: &[u8]) -> Result<String>;

    /// Extractor name for logging
    fn name(&self) -> &str;
}

/// Plain-text extractor: UTF-8 with a Latin-1 lossy fallback
pub struct PlainTextExtractor;

#[async_trait]
impl Extractor for PlainTextExtractor {
    async fn extract(&self, data: &[u8]) -> Result<String> {
        match std::str::from_utf8(data) {
            Ok(text) => Ok(text.to_string()),
            // Latin-1 maps every byte to a char, so this cannot fail
            Err(_) => Ok(data.iter().map(|&b| b as char).collect()),
        }
    }

    fn name(&self) -> &str {
        "plain-text"
    }
}

/// PDF extractor built on pdf-extract with a lopdf validity probe
pub struct PdfExtractor;

#[async_trait]
impl Extractor for PdfExtractor {
    async fn extract(&self, data: &[u8]) -> Result<String> {
        let data = data.to_vec();
        // pdf-extract is CPU-bound and can stall on pathological files
        tokio::task::spawn_blocking(move || {
            if lopdf::Document::load_mem(&data).is_err() {
                return Err(Error::Extraction {
                    message: "not a valid PDF document".to_string(),
                    transient: false,
                });
            }
            pdf_extract::extract_text_from_mem(&data).map_err(|e| Error::Extraction {
                message: format!("PDF text extraction failed: {}", e),
                transient: false,
            })
        })
        .await
        .map_err(|e| Error::Extraction {
            message: format!("extraction task failed: {}", e),
            transient: true,
        })?
    }

    fn name(&self) -> &str {
        "pdf"
    }
}

/// The extractors available to the extract stage, selected by file suffix
#[derive(Clone)]
pub struct ExtractorSet {
    pub plain_text: Arc<dyn Extractor>,
    pub pdf: Arc<dyn Extractor>,
}

impl ExtractorSet {
    /// The standard production set
    pub fn standard() -> Self {
        Self {
            plain_text: Arc::new(PlainTextExtractor),
            pdf: Arc::new(PdfExtractor),
        }
    }

    /// Pick the extractor for a filename
    pub fn for_filename(&self, filename: &str) -> Result<Arc<dyn Extractor>> {
        match file_extension(filename).as_deref() {
            Some("txt") => Ok(self.plain_text.clone()),
            Some("pdf") => Ok(self.pdf.clone()),
            Some(other) => Err(Error::UnsupportedFileType(format!(".{}", other))),
            None => Err(Error::UnsupportedFileType(filename.to_string())),
        }
    }
}

/// Whether uploads of this filename are accepted at all
pub fn is_supported_filename(filename: &str) -> bool {
    matches!(file_extension(filename).as_deref(), Some("txt") | Some("pdf"))
}

fn file_extension(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}
