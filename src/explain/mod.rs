//! The explanation engine.
//!
//! [`Explainer`] owns every collaborator of the pipeline and runs one request
//! end to end: fetch the paper into a temporary file, split it into chunks,
//! index the chunks, and answer the explanation prompt with the retrieval
//! chain while streaming the answer.

use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chunking::{ChunkError, RecursiveCharacterSplitter};
use crate::config::ExplainerConfig;
use crate::document::{DocumentError, DocumentLoader, PdfLoader};
use crate::embedding::fastembed::FastEmbedProvider;
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::generation::candle::{CandleGenerator, HubOptions};
use crate::generation::{GenerationError, TextGenerator};
use crate::index::{IndexError, VectorIndex, VectorStoreRetriever, DEFAULT_TOP_K};
use crate::models::{Explanation, ExplanationRequest, UnderstandingLevel};
use crate::paper::arxiv::ArxivClient;
use crate::paper::{fetch_paper, PaperError, PaperRepository};
use crate::rag::{RagError, RetrievalQa};
use crate::stdio::StdoutGuard;

/// Errors that can occur while explaining a paper.
#[derive(Debug, Error)]
pub enum ExplainError {
    /// The paper could not be identified or fetched
    #[error(transparent)]
    Paper(#[from] PaperError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Chunking error: {0}")]
    Chunking(#[from] ChunkError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Answering failed: {0}")]
    Rag(#[from] RagError),

    /// Temporary file handling failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExplainError {
    /// Whether the error was caused by the request itself (bad URL, unknown paper).
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ExplainError::Paper(PaperError::InvalidInput(_) | PaperError::NotFound(_))
        )
    }
}

/// Result type for explanation operations.
pub type ExplainResult<T> = Result<T, ExplainError>;

const PROMPT_TEMPLATE: &str = "
    I'd like a detailed explanation of the research paper titled '{title}'.

    My current understanding of the subject is {understanding}. Please tailor the
    explanation to this level.

    Could you provide the following:
    1. Information about the authors and their affiliations
    2. A summary of the abstract
    3. Key objectives of the research
    4. The methodology used
    5. The findings/results of the paper
    6. The conclusion and implications of the study

    Any critiques or points of discussion that are noteworthy. In particular,
    if there are any unique or novel techniques or concepts introduced in this
    paper, please elaborate on those.
    ";

/// Build the default explanation prompt for a paper.
pub fn build_prompt(title: &str, understanding: UnderstandingLevel) -> String {
    dedent(
        &PROMPT_TEMPLATE
            .replace("{understanding}", understanding.as_str())
            .replace("{title}", title),
    )
}

/// Remove the longest common leading whitespace from every non-blank line.
///
/// Blank lines are emptied and do not count towards the common prefix.
pub fn dedent(text: &str) -> String {
    let margin = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut out = text
        .split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                ""
            } else {
                line.get(margin..).unwrap_or(line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    if text.ends_with('\n') && !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Explains papers with a retrieval-augmented language model.
pub struct Explainer<E, G, R = ArxivClient, L = PdfLoader> {
    embeddings: E,
    generator: G,
    repository: R,
    loader: L,
    splitter: RecursiveCharacterSplitter,
    top_k: usize,
}

impl Explainer<FastEmbedProvider, CandleGenerator> {
    /// Load both models and build the production pipeline.
    ///
    /// Standard output is suppressed while the models load.
    ///
    /// # Errors
    /// Returns `ExplainError` if a model cannot be loaded or the configuration is invalid
    pub fn load(config: &ExplainerConfig) -> ExplainResult<Self> {
        let splitter = RecursiveCharacterSplitter::new(config.chunk_size, config.chunk_overlap)?;
        let repository = ArxivClient::with_endpoints(&config.arxiv_api_url, &config.arxiv_pdf_url)?;

        let _quiet = StdoutGuard::suppress()?;

        let start = Instant::now();
        let embeddings = FastEmbedProvider::new(
            &config.embeddings_model_name,
            config.embeddings_cache_dir(),
            config.show_download_progress,
        )?;
        info!(
            "Loaded embeddings model {} in {:.2?}",
            config.embeddings_model_name,
            start.elapsed()
        );

        let start = Instant::now();
        let hub = HubOptions {
            cache_dir: config.hub_cache_dir(),
            show_progress: config.show_download_progress,
        };
        let generator = CandleGenerator::load(&config.chatbot_model_name, &hub, config.generation.clone())?;
        info!(
            "Loaded chatbot model {} in {:.2?}",
            config.chatbot_model_name,
            start.elapsed()
        );

        Ok(Explainer::new(embeddings, generator, repository, PdfLoader, splitter).with_top_k(config.top_k))
    }
}

impl<E, G, R, L> Explainer<E, G, R, L>
where
    E: EmbeddingProvider,
    G: TextGenerator,
    R: PaperRepository,
    L: DocumentLoader,
{
    pub fn new(embeddings: E, generator: G, repository: R, loader: L, splitter: RecursiveCharacterSplitter) -> Self {
        Self {
            embeddings,
            generator,
            repository,
            loader,
            splitter,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Number of chunks given to the generator as context.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Explain the paper named by `request`, streaming the answer to `on_token`.
    ///
    /// # Errors
    /// Returns `ExplainError::Paper` for invalid URLs and unknown papers, and
    /// the underlying error for any later failure
    pub async fn explain(
        &mut self,
        request: &ExplanationRequest,
        on_token: &mut dyn FnMut(&str),
    ) -> ExplainResult<Explanation> {
        let start = Instant::now();

        let download = tempfile::Builder::new().prefix("paper-").suffix(".pdf").tempfile()?;
        let paper = fetch_paper(&self.repository, &request.url, download.path()).await?;
        info!("Explaining '{}'", paper.title);

        let pages = self.loader.load(download.path())?;
        let chunks = self.splitter.split_pages(&pages);
        drop(download);
        debug!("Split {} pages into {} chunks", pages.len(), chunks.len());
        if chunks.is_empty() {
            warn!("No text could be extracted from '{}'", paper.title);
        }

        let index = VectorIndex::build(&self.embeddings, chunks).await?;
        debug!("Indexed paper in {:.2?}", start.elapsed());

        let prompt = match &request.prompt {
            Some(prompt) if !prompt.trim().is_empty() => prompt.clone(),
            _ => {
                debug!("Target understanding of the topic: {}", request.understanding);
                build_prompt(&paper.title, request.understanding)
            }
        };
        debug!("Prompt:\n{}", prompt);

        let retriever = VectorStoreRetriever::new(&index, &self.embeddings).with_top_k(self.top_k);
        let text = RetrievalQa::new(&retriever, &mut self.generator)
            .run(&prompt, on_token)
            .await?;

        info!("Explanation finished in {:.2?}", start.elapsed());

        Ok(Explanation { paper, prompt, text })
    }
}
