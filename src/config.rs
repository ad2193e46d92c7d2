//! Runtime configuration for the explanation engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::chunking::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::generation::GenerationConfig;
use crate::index::DEFAULT_TOP_K;
use crate::paper::arxiv::{ARXIV_API_URL, ARXIV_PDF_URL};
use crate::{DEFAULT_CHATBOT_MODEL, DEFAULT_EMBEDDING_MODEL};

/// Everything [`crate::explain::Explainer::load`] needs to build the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainerConfig {
    /// Hugging Face name of the chat model
    pub chatbot_model_name: String,

    /// Hugging Face name of the embedding model
    pub embeddings_model_name: String,

    /// Root directory for downloaded model files
    pub cache_dir: Option<PathBuf>,

    /// Show model download progress bars
    pub show_download_progress: bool,

    pub chunk_size: usize,
    pub chunk_overlap: usize,

    /// Number of chunks handed to the generator as context
    pub top_k: usize,

    /// arXiv query API endpoint
    pub arxiv_api_url: String,

    /// Base URL PDFs are downloaded from when an entry has no PDF link
    pub arxiv_pdf_url: String,

    pub generation: GenerationConfig,
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        Self {
            chatbot_model_name: DEFAULT_CHATBOT_MODEL.to_string(),
            embeddings_model_name: DEFAULT_EMBEDDING_MODEL.to_string(),
            cache_dir: default_cache_dir(),
            show_download_progress: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
            arxiv_api_url: ARXIV_API_URL.to_string(),
            arxiv_pdf_url: ARXIV_PDF_URL.to_string(),
            generation: GenerationConfig::default(),
        }
    }
}

impl ExplainerConfig {
    /// Directory fastembed stores its models in.
    pub fn embeddings_cache_dir(&self) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| dir.join("fastembed"))
    }

    /// Directory the Hugging Face Hub client stores its models in.
    pub fn hub_cache_dir(&self) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| dir.join("huggingface"))
    }
}

/// Per-user cache directory, e.g. `~/.cache/paper-explain` on Linux.
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join(env!("CARGO_PKG_NAME")))
}
