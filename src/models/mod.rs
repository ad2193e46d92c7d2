//! Core data models for the paper explanation pipeline.
//!
//! This module contains the data structures that flow between the pipeline
//! stages: the paper identifier and metadata produced by the fetcher, the text
//! chunks produced by the splitter, retrieval results, and the request/response
//! types of the explanation engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical arXiv identifier extracted from a paper URL (e.g. `2103.00027`).
///
/// Only [`crate::paper::paper_id`] constructs this type, which guarantees the
/// identifier is non-empty and came from an `arxiv.org` URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaperReference(String);

impl PaperReference {
    pub(crate) fn new(id: String) -> Self {
        Self(id)
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaperReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Represents a single author with their affiliation information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Author {
    /// Full name of the author
    pub name: String,

    /// Institutional affiliation, when the repository reports one
    pub affiliation: Option<String>,
}

/// Metadata for a paper as returned by the upstream repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaperMetadata {
    /// Repository entry URL (e.g. `http://arxiv.org/abs/2103.00027v1`)
    pub entry_id: String,

    /// Paper title, whitespace-collapsed
    pub title: String,

    /// List of authors in publication order
    pub authors: Vec<Author>,

    /// Abstract text, whitespace-collapsed
    pub summary: String,

    /// Publication timestamp as reported upstream (ISO 8601)
    pub published: Option<String>,

    /// Direct link to the PDF document, if the entry advertises one
    pub pdf_url: Option<String>,
}

/// Text extracted from a single page of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPage {
    /// 1-based page number
    pub number: usize,

    /// Extracted text of the page
    pub text: String,
}

/// A contiguous, bounded slice of a document's extracted text.
///
/// Chunks are the unit of embedding and retrieval. Consecutive chunks from the
/// same page share up to the configured overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Position of the chunk in the document's chunk sequence
    pub index: usize,

    /// Page the chunk was taken from
    pub page: usize,

    /// Chunk text
    pub text: String,
}

/// A chunk returned by retrieval together with its similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// The retrieved chunk
    pub chunk: TextChunk,

    /// Cosine similarity score (higher is better)
    pub score: f32,
}

impl ScoredChunk {
    pub fn new(chunk: TextChunk, score: f32) -> Self {
        Self { chunk, score }
    }
}

/// Coarse level of prior understanding the reader has of the paper's subject.
///
/// Only changes the wording of the auto-generated prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum UnderstandingLevel {
    #[default]
    Basic,
    Intermediate,
    Advanced,
}

impl UnderstandingLevel {
    /// Lower-case name used in prompt text.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnderstandingLevel::Basic => "basic",
            UnderstandingLevel::Intermediate => "intermediate",
            UnderstandingLevel::Advanced => "advanced",
        }
    }
}

impl fmt::Display for UnderstandingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnderstandingLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(UnderstandingLevel::Basic),
            "intermediate" => Ok(UnderstandingLevel::Intermediate),
            "advanced" => Ok(UnderstandingLevel::Advanced),
            other => Err(format!(
                "unknown understanding level '{}', expected one of: basic, intermediate, advanced",
                other
            )),
        }
    }
}

/// A single explanation request.
#[derive(Debug, Clone)]
pub struct ExplanationRequest {
    /// URL of the paper (`https://arxiv.org/abs/<id>` or `.../pdf/<id>.pdf`)
    pub url: String,

    /// Explicit prompt; overrides the generated template when set
    pub prompt: Option<String>,

    /// Understanding level used to fill the template when no prompt is given
    pub understanding: UnderstandingLevel,
}

impl ExplanationRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            prompt: None,
            understanding: UnderstandingLevel::default(),
        }
    }

    pub fn with_prompt(mut self, prompt: Option<String>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_understanding(mut self, understanding: UnderstandingLevel) -> Self {
        self.understanding = understanding;
        self
    }
}

/// Outcome of an explanation request.
#[derive(Debug, Clone)]
pub struct Explanation {
    /// Metadata of the explained paper
    pub paper: PaperMetadata,

    /// Prompt that was sent through the retrieval chain
    pub prompt: String,

    /// Full generated text (the same text that was streamed)
    pub text: String,
}
