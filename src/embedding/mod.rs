//! Embedding provider abstraction and implementations.
//!
//! This module defines the interface for text embedding generation and the
//! local fastembed-backed implementation used for chunk and query embeddings.
//!
//! The abstraction keeps index construction and retrieval independent of the
//! embedding runtime.

pub mod fastembed;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Invalid input text (e.g., empty)
    #[error("Invalid input text: {0}")]
    InvalidInput(String),

    /// Configuration error (e.g., unknown model name)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Other unexpected errors
    #[error("Unexpected error: {0}")]
    Other(String),
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Trait for text embedding providers.
///
/// Implementors generate vector embeddings from text inputs. Document chunks
/// go through [`embed_batch`](EmbeddingProvider::embed_batch); retrieval
/// queries go through [`embed_query`](EmbeddingProvider::embed_query) so that
/// instruction-tuned models can prefix them.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text.
    ///
    /// # Errors
    /// Returns `EmbeddingError` if the embedding generation fails
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Generate embeddings for multiple texts in a single batch.
    ///
    /// # Returns
    /// A vector of embedding vectors, in the same order as the input texts
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Generate an embedding for a retrieval query.
    ///
    /// Defaults to [`embed`](EmbeddingProvider::embed).
    async fn embed_query(&self, query: &str) -> EmbeddingResult<Vec<f32>> {
        self.embed(query).await
    }

    /// Get the dimension of embeddings produced by this provider.
    fn dimension(&self) -> usize;

    /// Get the model name/identifier for this provider.
    fn model_name(&self) -> &str;
}
