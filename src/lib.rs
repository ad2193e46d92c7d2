//! paper-explain - explain arXiv papers with a local language model.
//!
//! The library downloads a paper from arXiv, splits its text into overlapping
//! chunks, embeds them into an in-memory index, and answers an explanation
//! prompt with retrieval-augmented generation on a local causal language
//! model, streaming the answer as it is generated.
//!
//! # Architecture
//!
//! - **models**: Data structures shared by the pipeline stages
//! - **paper**: arXiv identifier extraction, lookup and download
//! - **document**: Per-page text extraction from PDFs
//! - **chunking**: Recursive character text splitter
//! - **embedding**: Text embedding generation (fastembed)
//! - **index**: In-memory vector index and retrievers
//! - **generation**: Local causal LM inference (candle) with token streaming
//! - **rag**: "Stuff" retrieval question answering chain
//! - **explain**: The engine tying it all together
//!
//! # Workflow
//!
//! 1. Extract the arXiv id from the URL and look the paper up
//! 2. Download the PDF into a temporary file and extract its pages
//! 3. Split the pages into chunks of 1000 characters overlapping by 200
//! 4. Embed the chunks into a fresh vector index
//! 5. Retrieve the chunks most relevant to the prompt
//! 6. Generate the explanation from the retrieved context, streaming tokens
//!
//! # Example
//!
//! ```ignore
//! use paper_explain::{ExplainerConfig, Explainer, ExplanationRequest, UnderstandingLevel};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut explainer = Explainer::load(&ExplainerConfig::default())?;
//!
//!     let request = ExplanationRequest::new("https://arxiv.org/abs/2112.14777")
//!         .with_understanding(UnderstandingLevel::Intermediate);
//!     explainer.explain(&request, &mut |token| print!("{}", token)).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod explain;
pub mod generation;
pub mod index;
pub mod logging;
pub mod models;
pub mod paper;
pub mod rag;
pub mod stdio;

// Re-export commonly used types at the crate root
pub use config::ExplainerConfig;
pub use embedding::EmbeddingProvider;
pub use explain::{ExplainError, Explainer};
pub use generation::{GenerationConfig, Precision, TextGenerator};
pub use index::{Retriever, VectorIndex};
pub use models::{Explanation, ExplanationRequest, PaperMetadata, TextChunk, UnderstandingLevel};
pub use paper::{fetch_paper, paper_id, PaperRepository};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default chat model
pub const DEFAULT_CHATBOT_MODEL: &str = "Qwen/Qwen2.5-3B-Instruct";

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "BAAI/bge-base-en-v1.5";
