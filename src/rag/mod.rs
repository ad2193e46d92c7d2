//! Retrieval-augmented question answering.
//!
//! [`RetrievalQa`] is a "stuff" chain: every retrieved chunk is placed into a
//! single prompt together with the question, and the generator answers from
//! that context.

use thiserror::Error;
use tracing::{debug, info};

use crate::generation::{GenerationError, TextGenerator};
use crate::index::{IndexError, Retriever};
use crate::models::ScoredChunk;

/// Instructions placed before the retrieved context.
pub const STUFF_PROMPT_PREAMBLE: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

/// Errors that can occur while answering a question.
#[derive(Debug, Error)]
pub enum RagError {
    /// Retrieval failed
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] IndexError),

    /// Generation failed
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),
}

/// Result type for RAG operations.
pub type RagResult<T> = Result<T, RagError>;

/// Fill the template with the chunk texts, separated by blank lines.
pub fn stuff_prompt(chunks: &[ScoredChunk], question: &str) -> String {
    let context = chunks
        .iter()
        .map(|c| c.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "{}\n\n{}\n\nQuestion: {}\nHelpful Answer:",
        STUFF_PROMPT_PREAMBLE, context, question
    )
}

/// Question answering over a retriever.
pub struct RetrievalQa<'a, R: ?Sized, G: ?Sized> {
    retriever: &'a R,
    generator: &'a mut G,
}

impl<'a, R, G> RetrievalQa<'a, R, G>
where
    R: Retriever + ?Sized,
    G: TextGenerator + ?Sized,
{
    pub fn new(retriever: &'a R, generator: &'a mut G) -> Self {
        Self { retriever, generator }
    }

    /// Answer `question`, streaming the answer to `on_token`.
    ///
    /// # Errors
    /// Returns `RagError` if retrieval or generation fails
    pub async fn run(&mut self, question: &str, on_token: &mut dyn FnMut(&str)) -> RagResult<String> {
        let sources = self.retriever.retrieve(question).await?;
        info!("Answering from {} source chunks", sources.len());
        for source in &sources {
            debug!(
                "Source chunk {} (page {}) score {:.3}",
                source.chunk.index, source.chunk.page, source.score
            );
        }

        let prompt = stuff_prompt(&sources, question);
        Ok(self.generator.generate(&prompt, on_token)?)
    }
}
