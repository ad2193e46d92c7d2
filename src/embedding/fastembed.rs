//! FastEmbed embedding provider implementation.
//!
//! This module provides an implementation of the `EmbeddingProvider` trait
//! using the fastembed library for local embedding generation. Models are
//! selected by their Hugging Face name and downloaded on first use.

use super::{EmbeddingError, EmbeddingProvider, EmbeddingResult};
use ::fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Query prefix recommended for BGE retrieval models.
pub const BGE_QUERY_INSTRUCTION: &str = "Represent this sentence for searching relevant passages: ";

/// A fastembed model resolved from a user-supplied name.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModel {
    /// fastembed model variant
    pub model: EmbeddingModel,

    /// Repository code fastembed downloads the model from
    pub model_code: String,

    /// Embedding dimension
    pub dimension: usize,
}

/// Resolve a model name against fastembed's supported models.
///
/// Accepts the full repository code (`Xenova/bge-base-en-v1.5`), the name
/// without its organisation (`bge-base-en-v1.5`, so `BAAI/bge-base-en-v1.5`
/// matches too) or the enum variant name (`BGEBaseENV15`), ignoring case.
///
/// # Errors
/// Returns `EmbeddingError::ConfigError` if no supported model matches
pub fn resolve_model(name: &str) -> EmbeddingResult<ResolvedModel> {
    let wanted = name.trim().to_lowercase();
    let wanted_suffix = wanted.rsplit('/').next().unwrap_or(wanted.as_str()).to_string();

    TextEmbedding::list_supported_models()
        .into_iter()
        .find(|info| {
            let code = info.model_code.to_lowercase();
            let code_suffix = code.rsplit('/').next().unwrap_or(code.as_str());
            code == wanted
                || code_suffix == wanted_suffix
                || code_suffix.trim_end_matches("-onnx") == wanted_suffix
                || format!("{:?}", info.model).to_lowercase() == wanted
        })
        .map(|info| ResolvedModel {
            model: info.model.clone(),
            model_code: info.model_code.clone(),
            dimension: info.dim,
        })
        .ok_or_else(|| {
            EmbeddingError::ConfigError(format!("Unsupported embedding model '{}'", name))
        })
}

/// FastEmbed embedding provider.
///
/// Holds the loaded model and the instruction prefix applied to queries.
#[derive(Clone)]
pub struct FastEmbedProvider {
    /// The embedding model instance (wrapped in Arc<Mutex> for thread-safety)
    model: Arc<Mutex<TextEmbedding>>,

    /// Model identifier as requested by the caller
    model_name: String,

    /// Expected dimension of the embedding vectors
    embedding_dimension: usize,

    /// Prefix prepended to retrieval queries
    query_instruction: Option<String>,
}

impl FastEmbedProvider {
    /// Create a new FastEmbed embedding provider from a model name.
    ///
    /// # Arguments
    /// * `model_name` - Hugging Face name of the model (see [`resolve_model`])
    /// * `cache_dir` - Optional cache directory for model files
    /// * `show_download_progress` - Whether fastembed prints download progress
    ///
    /// # Errors
    /// Returns `EmbeddingError` if the name is unknown or model initialization fails
    pub fn new(
        model_name: &str,
        cache_dir: Option<PathBuf>,
        show_download_progress: bool,
    ) -> EmbeddingResult<Self> {
        let resolved = resolve_model(model_name)?;
        debug!(
            "Resolved embedding model '{}' to {} ({} dimensions)",
            model_name, resolved.model_code, resolved.dimension
        );

        let mut init_options = InitOptions::new(resolved.model.clone())
            .with_show_download_progress(show_download_progress);
        if let Some(dir) = cache_dir {
            init_options = init_options.with_cache_dir(dir);
        }

        let text_embedding = TextEmbedding::try_new(init_options).map_err(|e| {
            EmbeddingError::ConfigError(format!("Failed to initialize FastEmbed model: {}", e))
        })?;

        let query_instruction = resolved
            .model_code
            .to_lowercase()
            .contains("bge-")
            .then(|| BGE_QUERY_INSTRUCTION.to_string());

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            model_name: model_name.to_string(),
            embedding_dimension: resolved.dimension,
            query_instruction,
        })
    }

    /// Prefix applied to queries, if any.
    pub fn query_instruction(&self) -> Option<&str> {
        self.query_instruction.as_deref()
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Text cannot be empty".to_string()));
        }

        let model = self.model.lock().await;

        let embeddings = model
            .embed(vec![text.to_string()], None)
            .map_err(|e| EmbeddingError::Other(format!("Embedding generation failed: {}", e)))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Other("No embedding generated".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        if texts.iter().any(|text| text.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput("All texts must be non-empty".to_string()));
        }

        let model = self.model.lock().await;

        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();

        model
            .embed(text_strings, None)
            .map_err(|e| EmbeddingError::Other(format!("Batch embedding generation failed: {}", e)))
    }

    async fn embed_query(&self, query: &str) -> EmbeddingResult<Vec<f32>> {
        match &self.query_instruction {
            Some(instruction) if !query.trim().is_empty() => {
                self.embed(&format!("{}{}", instruction, query)).await
            }
            _ => self.embed(query).await,
        }
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

// TextEmbedding does not implement Debug
impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model_name", &self.model_name)
            .field("embedding_dimension", &self.embedding_dimension)
            .field("query_instruction", &self.query_instruction)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_EMBEDDING_MODEL;

    /// Helper function to create a provider for the default model
    fn create_test_provider() -> FastEmbedProvider {
        FastEmbedProvider::new(DEFAULT_EMBEDDING_MODEL, None, false)
            .expect("Failed to create default FastEmbedProvider")
    }

    #[test]
    fn test_resolve_default_model() {
        let resolved = resolve_model(DEFAULT_EMBEDDING_MODEL).unwrap();
        assert_eq!(resolved.model, EmbeddingModel::BGEBaseENV15);
        assert_eq!(resolved.dimension, 768);
    }

    #[test]
    fn test_resolve_model_by_variant_name_and_case() {
        let by_variant = resolve_model("BGESmallENV15").unwrap();
        assert_eq!(by_variant.model, EmbeddingModel::BGESmallENV15);
        assert_eq!(by_variant.dimension, 384);

        let by_lowercase = resolve_model("baai/BGE-small-en-v1.5").unwrap();
        assert_eq!(by_lowercase.model, EmbeddingModel::BGESmallENV15);
    }

    #[test]
    fn test_resolve_model_suffix_matches_onnx_repositories() {
        let resolved = resolve_model("sentence-transformers/all-MiniLM-L6-v2").unwrap();
        assert_eq!(resolved.model, EmbeddingModel::AllMiniLML6V2);
        assert_eq!(resolved.dimension, 384);
    }

    #[test]
    fn test_resolve_unknown_model() {
        let result = resolve_model("hkunlp/instructor-xl-does-not-exist");
        match result {
            Err(EmbeddingError::ConfigError(msg)) => assert!(msg.contains("instructor-xl")),
            other => panic!("Expected ConfigError, got {:?}", other),
        }
    }

    #[tokio::test]
    #[ignore = "downloads embedding model weights"]
    async fn test_embed_single_text() {
        let provider = create_test_provider();
        let embedding = provider.embed("This is a test sentence for embedding generation.").await.unwrap();

        assert_eq!(embedding.len(), provider.dimension());
        assert!(embedding.iter().all(|&x| x.is_finite()));
    }

    #[tokio::test]
    #[ignore = "downloads embedding model weights"]
    async fn test_embed_empty_text() {
        let provider = create_test_provider();

        match provider.embed("   \n\t  ").await {
            Err(EmbeddingError::InvalidInput(msg)) => assert!(msg.contains("empty")),
            other => panic!("Expected InvalidInput error, got {:?}", other.map(|v| v.len())),
        }
    }

    #[tokio::test]
    #[ignore = "downloads embedding model weights"]
    async fn test_embed_batch_consistency_with_single_embed() {
        let provider = create_test_provider();
        let text = "Test text for consistency";

        let single = provider.embed(text).await.unwrap();
        let batch = provider.embed_batch(&[text, "Another chunk"]).await.unwrap();

        assert_eq!(batch.len(), 2);
        let distance: f32 = single.iter().zip(&batch[0]).map(|(a, b)| (a - b).abs()).sum();
        assert!(distance < 1e-3);
    }

    #[tokio::test]
    #[ignore = "downloads embedding model weights"]
    async fn test_query_instruction_changes_embedding() {
        let provider = create_test_provider();
        assert_eq!(provider.query_instruction(), Some(BGE_QUERY_INSTRUCTION));

        let plain = provider.embed("methodology").await.unwrap();
        let query = provider.embed_query("methodology").await.unwrap();
        assert_ne!(plain, query);
    }

    #[test]
    #[ignore = "downloads embedding model weights"]
    fn test_debug_implementation() {
        let provider = create_test_provider();
        let debug_str = format!("{:?}", provider);

        assert!(debug_str.contains("FastEmbedProvider"));
        assert!(debug_str.contains("model_name"));
        assert!(debug_str.contains("embedding_dimension"));
    }
}
