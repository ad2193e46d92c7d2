//! Document loading.
//!
//! A [`DocumentLoader`] turns a file on disk into per-page text. The PDF
//! loader wraps `pdf-extract`; the trait exists so the rest of the pipeline
//! can run against plain text in tests.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};

use crate::models::DocumentPage;

/// Errors that can occur while loading a document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Reading the file failed
    #[error("Failed to read document: {0}")]
    Io(#[from] std::io::Error),

    /// The document could not be parsed
    #[error("Text extraction failed: {0}")]
    Extraction(String),
}

/// Result type for document operations.
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Trait for loaders that extract page text from a file.
pub trait DocumentLoader: Send + Sync {
    /// Load `path` and return its pages in order.
    fn load(&self, path: &Path) -> DocumentResult<Vec<DocumentPage>>;
}

/// Loads PDF documents page by page.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    fn load(&self, path: &Path) -> DocumentResult<Vec<DocumentPage>> {
        let bytes = std::fs::read(path)?;
        let pages = guard_extraction(path, || pdf_extract::extract_text_from_mem_by_pages(&bytes))?;

        debug!("Extracted {} pages from {}", pages.len(), path.display());

        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| DocumentPage { number: i + 1, text })
            .collect())
    }
}

/// Runs `extract`, turning both its error and a panic into `DocumentError::Extraction`.
///
/// pdf-extract panics on some fonts and encodings it does not support.
fn guard_extraction<T, E, F>(path: &Path, extract: F) -> DocumentResult<T>
where
    E: std::fmt::Display,
    F: FnOnce() -> Result<T, E>,
{
    match panic::catch_unwind(AssertUnwindSafe(extract)) {
        Ok(result) => result.map_err(|e| DocumentError::Extraction(format!("{}: {}", path.display(), e))),
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!("Text extraction panicked on {}: {}", path.display(), reason);
            Err(DocumentError::Extraction(format!(
                "{}: unsupported PDF content ({})",
                path.display(),
                reason
            )))
        }
    }
}

/// Loads a UTF-8 text file, treating form feeds as page breaks.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLoader;

impl DocumentLoader for TextLoader {
    fn load(&self, path: &Path) -> DocumentResult<Vec<DocumentPage>> {
        let text = std::fs::read_to_string(path)?;
        Ok(text
            .split('\u{c}')
            .enumerate()
            .map(|(i, page)| DocumentPage {
                number: i + 1,
                text: page.to_string(),
            })
            .collect())
    }
}
