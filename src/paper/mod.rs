//! Paper identification and retrieval.
//!
//! This module turns a user-supplied arXiv URL into a [`PaperReference`],
//! looks the paper up in a [`PaperRepository`], and downloads its PDF.
//!
//! The `PaperRepository` trait abstracts the upstream source so the fetcher
//! can be exercised without network access; [`arxiv::ArxivClient`] is the
//! production implementation.

pub mod arxiv;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::models::{PaperMetadata, PaperReference};

/// Host every accepted paper URL must have.
pub const ARXIV_DOMAIN: &str = "arxiv.org";

/// Errors that can occur while identifying or fetching a paper.
#[derive(Debug, Error)]
pub enum PaperError {
    /// The URL does not point at an arXiv paper
    #[error("{0}")]
    InvalidInput(String),

    /// No paper matches the identifier
    #[error("{0}")]
    NotFound(String),

    /// The upstream answered with an error status
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// Network or connection error
    #[error("Network error: {0}")]
    Network(String),

    /// The upstream response could not be understood
    #[error("Parse error: {0}")]
    Parse(String),

    /// Writing the downloaded document failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for PaperError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => PaperError::HttpStatus {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            },
            None => PaperError::Network(err.to_string()),
        }
    }
}

/// Result type for paper operations.
pub type PaperResult<T> = Result<T, PaperError>;

/// Trait for upstream paper repositories.
#[async_trait]
pub trait PaperRepository: Send + Sync {
    /// Look up the single entry matching `id`.
    ///
    /// # Errors
    /// Returns `PaperError::NotFound` or `PaperError::HttpStatus` when the
    /// repository has no such paper, other variants for transport failures
    async fn lookup(&self, id: &PaperReference) -> PaperResult<PaperMetadata>;

    /// Download the PDF of `paper` to `destination`, overwriting it.
    async fn download(&self, paper: &PaperMetadata, destination: &Path) -> PaperResult<()>;

    /// Human-readable name of the repository, for logging.
    fn name(&self) -> &str;
}

fn invalid_url(url: &str) -> PaperError {
    PaperError::InvalidInput(format!(
        "The provided URL '{}' is not valid. Please ensure it originates from '{}' \
         and follows this format: 'https://{}/abs/<PAPER_ID>'.",
        url, ARXIV_DOMAIN, ARXIV_DOMAIN
    ))
}

/// Extracts the arXiv paper identifier from an arXiv URL.
///
/// `https://arxiv.org/abs/<ID>` and `https://arxiv.org/pdf/<ID>.pdf` both
/// yield `<ID>`; old-style identifiers containing a slash are kept whole.
///
/// # Errors
/// Returns `PaperError::InvalidInput` if the URL cannot be parsed, its host is
/// not `arxiv.org`, or no identifier remains
pub fn paper_id(url: &str) -> PaperResult<PaperReference> {
    let parsed = Url::parse(url).map_err(|_| invalid_url(url))?;
    if parsed.host_str() != Some(ARXIV_DOMAIN) {
        return Err(invalid_url(url));
    }

    let path = parsed.path();
    let id = match path.strip_prefix("/abs/").or_else(|| path.strip_prefix("/pdf/")) {
        Some(rest) => rest.trim_end_matches('/'),
        None => match path.trim_end_matches('/').rsplit('/').next() {
            // A bare listing path names no paper
            Some("abs") | Some("pdf") | None => "",
            Some(segment) => segment,
        },
    };
    let id = id.strip_suffix(".pdf").unwrap_or(id);

    if id.is_empty() {
        return Err(invalid_url(url));
    }

    Ok(PaperReference::new(id.to_string()))
}

/// Resolves `url` to a paper and downloads its PDF to `destination`.
///
/// Lookup failures meaning "no such paper" are reported as
/// `PaperError::NotFound` naming the identifier, and nothing is written.
pub async fn fetch_paper<R>(repository: &R, url: &str, destination: &Path) -> PaperResult<PaperMetadata>
where
    R: PaperRepository + ?Sized,
{
    let id = paper_id(url)?;
    debug!("Looking up paper {} in {}", id, repository.name());

    let paper = repository.lookup(&id).await.map_err(|e| match e {
        PaperError::NotFound(_) | PaperError::HttpStatus { .. } => PaperError::NotFound(format!(
            "The provided arxiv id '{}' does not correspond to any known papers. \
             Please verify the id and try again.",
            id
        )),
        other => other,
    })?;

    repository.download(&paper, destination).await?;
    debug!("Downloaded '{}' to {}", paper.title, destination.display());

    Ok(paper)
}
