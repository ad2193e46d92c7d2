//! In-memory vector index and retrieval.
//!
//! The index holds one embedding per chunk and ranks chunks against a query
//! embedding by cosine similarity. It is built fresh for every paper and never
//! persisted.
//!
//! # Usage
//!
//! ```rust,no_run
//! use paper_explain::embedding::fastembed::FastEmbedProvider;
//! use paper_explain::index::{Retriever, VectorIndex, VectorStoreRetriever};
//! # use paper_explain::models::TextChunk;
//!
//! # async fn example(chunks: Vec<TextChunk>) -> Result<(), Box<dyn std::error::Error>> {
//! let provider = FastEmbedProvider::new("BAAI/bge-base-en-v1.5", None, false)?;
//! let index = VectorIndex::build(&provider, chunks).await?;
//!
//! let retriever = VectorStoreRetriever::new(&index, &provider);
//! for result in retriever.retrieve("What is the main contribution?").await? {
//!     println!("page {} - Score: {:.3}", result.chunk.page, result.score);
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::models::{ScoredChunk, TextChunk};

/// Number of chunks returned by a retriever unless configured otherwise.
pub const DEFAULT_TOP_K: usize = 4;

/// Errors that can occur while building or querying the index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// A vector did not have the index dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The provider returned a different number of vectors than texts
    #[error("Expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Compute cosine similarity between two vectors.
///
/// Returns 0 when either vector has zero magnitude.
///
/// # Panics
/// Panics if the vectors have different lengths
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vectors must have the same length");

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[derive(Debug, Clone)]
struct IndexEntry {
    embedding: Vec<f32>,
    chunk: TextChunk,
}

/// Brute-force similarity index over document chunks.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    dimension: usize,
}

impl VectorIndex {
    /// Embed every chunk in one batch and index the results.
    ///
    /// # Errors
    /// Returns `IndexError` if embedding fails or a vector has the wrong dimension
    pub async fn build<E>(provider: &E, chunks: Vec<TextChunk>) -> IndexResult<Self>
    where
        E: EmbeddingProvider + ?Sized,
    {
        let dimension = provider.dimension();
        if chunks.is_empty() {
            return Ok(Self {
                entries: Vec::new(),
                dimension,
            });
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = provider.embed_batch(&texts).await?;

        if embeddings.len() != chunks.len() {
            return Err(IndexError::CountMismatch {
                expected: chunks.len(),
                actual: embeddings.len(),
            });
        }

        let entries = embeddings
            .into_iter()
            .zip(chunks)
            .map(|(embedding, chunk)| {
                if embedding.len() != dimension {
                    return Err(IndexError::DimensionMismatch {
                        expected: dimension,
                        actual: embedding.len(),
                    });
                }
                Ok(IndexEntry { embedding, chunk })
            })
            .collect::<IndexResult<Vec<_>>>()?;

        debug!(
            "Indexed {} chunks with {} ({} dimensions)",
            entries.len(),
            provider.model_name(),
            dimension
        );

        Ok(Self { entries, dimension })
    }

    /// Return the `k` chunks most similar to `query`, highest score first.
    ///
    /// # Errors
    /// Returns `IndexError::DimensionMismatch` if the query has the wrong dimension
    pub fn search(&self, query: &[f32], k: usize) -> IndexResult<Vec<ScoredChunk>> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut results: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|entry| {
                ScoredChunk::new(entry.chunk.clone(), cosine_similarity(query, &entry.embedding))
            })
            .collect();

        // Stable sort keeps document order among equal scores
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(k);

        Ok(results)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Trait for components that find the chunks relevant to a question.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return relevant chunks, most relevant first.
    ///
    /// # Errors
    /// Returns `IndexError` if the query cannot be embedded or searched
    async fn retrieve(&self, query: &str) -> IndexResult<Vec<ScoredChunk>>;
}

/// Retriever backed by a [`VectorIndex`] and the provider that built it.
pub struct VectorStoreRetriever<'a, E: ?Sized> {
    index: &'a VectorIndex,
    provider: &'a E,
    top_k: usize,
}

impl<'a, E> VectorStoreRetriever<'a, E>
where
    E: EmbeddingProvider + ?Sized,
{
    pub fn new(index: &'a VectorIndex, provider: &'a E) -> Self {
        Self {
            index,
            provider,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

#[async_trait]
impl<'a, E> Retriever for VectorStoreRetriever<'a, E>
where
    E: EmbeddingProvider + ?Sized,
{
    async fn retrieve(&self, query: &str) -> IndexResult<Vec<ScoredChunk>> {
        let query_embedding = self.provider.embed_query(query).await?;
        self.index.search(&query_embedding, self.top_k)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::embedding::EmbeddingResult;
    use std::sync::{Arc, Mutex};

    /// Deterministic provider: the vector counts a fixed vocabulary of words.
    pub(crate) struct MockEmbeddingProvider {
        pub(crate) calls: Arc<Mutex<Vec<String>>>,
        pub(crate) should_fail: bool,
        dimension: usize,
    }

    const VOCABULARY: [&str; 4] = ["attention", "convolution", "dataset", "results"];

    impl MockEmbeddingProvider {
        pub(crate) fn new() -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                should_fail: false,
                dimension: VOCABULARY.len(),
            }
        }

        pub(crate) fn with_failure() -> Self {
            Self {
                should_fail: true,
                ..Self::new()
            }
        }

        fn vectorize(&self, text: &str) -> Vec<f32> {
            let lower = text.to_lowercase();
            let mut embedding: Vec<f32> =
                VOCABULARY.iter().map(|word| lower.matches(word).count() as f32).collect();
            embedding.truncate(self.dimension);
            embedding.resize(self.dimension, 0.0);
            embedding
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockEmbeddingProvider {
        async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
            if self.should_fail {
                return Err(EmbeddingError::Other("Mock embedding failure".to_string()));
            }
            self.calls.lock().unwrap().push(text.to_string());
            Ok(self.vectorize(text))
        }

        async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            let mut results = Vec::new();
            for text in texts {
                results.push(self.embed(text).await?);
            }
            Ok(results)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            "mock-model"
        }
    }

    /// Provider that reports one dimension but produces another.
    struct WrongDimensionProvider;

    #[async_trait]
    impl EmbeddingProvider for WrongDimensionProvider {
        async fn embed(&self, _text: &str) -> EmbeddingResult<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            3
        }

        fn model_name(&self) -> &str {
            "wrong-dimension"
        }
    }

    fn chunk(index: usize, text: &str) -> TextChunk {
        TextChunk {
            index,
            page: 1,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);

        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);

        let a = vec![1.0, 1.0];
        let b = vec![-1.0, -1.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_build_embeds_all_chunks_once() {
        let provider = MockEmbeddingProvider::new();
        let chunks = vec![chunk(0, "attention is all you need"), chunk(1, "the dataset")];

        let index = VectorIndex::build(&provider, chunks).await.unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.dimension(), 4);
        assert_eq!(provider.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_build_empty() {
        let provider = MockEmbeddingProvider::new();
        let index = VectorIndex::build(&provider, Vec::new()).await.unwrap();

        assert!(index.is_empty());
        assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 4).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_rejects_wrong_dimension() {
        let result = VectorIndex::build(&WrongDimensionProvider, vec![chunk(0, "text")]).await;

        match result {
            Err(IndexError::DimensionMismatch { expected, actual }) => {
                assert_eq!(expected, 3);
                assert_eq!(actual, 2);
            }
            other => panic!("Expected DimensionMismatch, got {:?}", other.map(|i| i.len())),
        }
    }

    #[tokio::test]
    async fn test_search_sorted_and_truncated() {
        let provider = MockEmbeddingProvider::new();
        let chunks = vec![
            chunk(0, "dataset dataset"),
            chunk(1, "attention attention attention"),
            chunk(2, "attention and dataset"),
            chunk(3, "convolution"),
            chunk(4, "results"),
            chunk(5, "attention results"),
        ];
        let index = VectorIndex::build(&provider, chunks).await.unwrap();

        let results = index.search(&[1.0, 0.0, 0.0, 0.0], 3).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].chunk.index, 1);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_search_rejects_wrong_query_dimension() {
        let provider = MockEmbeddingProvider::new();
        let index = VectorIndex::build(&provider, vec![chunk(0, "results")]).await.unwrap();

        assert!(matches!(
            index.search(&[1.0], 1),
            Err(IndexError::DimensionMismatch { expected: 4, actual: 1 })
        ));
    }

    #[tokio::test]
    async fn test_retriever_defaults_to_four_results() {
        let provider = MockEmbeddingProvider::new();
        let chunks = (0..10).map(|i| chunk(i, "attention results")).collect();
        let index = VectorIndex::build(&provider, chunks).await.unwrap();

        let retriever = VectorStoreRetriever::new(&index, &provider);
        let results = retriever.retrieve("attention").await.unwrap();

        assert_eq!(results.len(), DEFAULT_TOP_K);
        assert_eq!(provider.calls.lock().unwrap().last().unwrap(), "attention");
    }

    #[tokio::test]
    async fn test_retriever_finds_relevant_chunk() {
        let provider = MockEmbeddingProvider::new();
        let chunks = vec![
            chunk(0, "We describe the dataset."),
            chunk(1, "Our convolution layers are deep."),
            chunk(2, "The results improve on prior work."),
        ];
        let index = VectorIndex::build(&provider, chunks).await.unwrap();

        let retriever = VectorStoreRetriever::new(&index, &provider).with_top_k(1);
        let results = retriever.retrieve("What are the results?").await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.index, 2);
    }

    #[tokio::test]
    async fn test_retriever_propagates_embedding_error() {
        let index = VectorIndex::build(&MockEmbeddingProvider::new(), vec![chunk(0, "results")])
            .await
            .unwrap();
        let failing = MockEmbeddingProvider::with_failure();
        let retriever = VectorStoreRetriever::new(&index, &failing);

        assert!(matches!(retriever.retrieve("query").await, Err(IndexError::Embedding(_))));
    }
}
