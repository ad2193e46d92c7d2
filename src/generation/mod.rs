//! Local text generation.
//!
//! [`TextGenerator`] is the seam between the retrieval chain and the language
//! model. The production implementation, [`candle::CandleGenerator`], runs a
//! causal language model from the Hugging Face Hub with candle and streams the
//! decoded text as it is produced.

pub mod candle;
pub mod stream;

use candle_core::{DType, Device};
use candle_transformers::generation::Sampling;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading a model or generating text.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Model files could not be loaded
    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    /// Downloading from the Hugging Face Hub failed
    #[error("Hub error: {0}")]
    Hub(#[from] hf_hub::api::sync::ApiError),

    /// Tokenizer failure
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Tensor computation failed
    #[error("Inference error: {0}")]
    Inference(#[from] candle_core::Error),

    /// The prompt leaves no room for generated tokens
    #[error("Prompt is {prompt_tokens} tokens long, which reaches the maximum length of {max_length}")]
    PromptTooLong { prompt_tokens: usize, max_length: usize },

    /// The model architecture is not supported
    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    /// Model configuration could not be parsed
    #[error("Invalid model configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),

    /// Reading a model file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for generation operations.
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Floating point precision for model weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// F16 on GPU, BF16 on CPU
    #[default]
    Auto,
    F32,
    F16,
    Bf16,
}

impl Precision {
    /// Concrete dtype for `device`.
    pub fn dtype(&self, device: &Device) -> DType {
        match self {
            Precision::Auto if device.is_cuda() => DType::F16,
            Precision::Auto => DType::BF16,
            Precision::F32 => DType::F32,
            Precision::F16 => DType::F16,
            Precision::Bf16 => DType::BF16,
        }
    }
}

/// Decoding parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum total length in tokens, prompt included
    pub max_length: usize,

    /// Sampling temperature; zero or below selects greedy decoding
    pub temperature: f64,

    /// Nucleus sampling threshold, used only when sampling
    pub top_p: Option<f64>,

    /// Penalty applied to the logits of tokens already in the sequence
    pub repetition_penalty: f32,

    /// Seed for the sampler
    pub seed: u64,

    /// Weight precision
    #[serde(default)]
    pub precision: Precision,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_length: 2048,
            temperature: 0.0,
            top_p: Some(0.95),
            repetition_penalty: 1.15,
            seed: 299_792_458,
            precision: Precision::Auto,
        }
    }
}

impl GenerationConfig {
    /// Sampling strategy implied by the temperature and top-p settings.
    pub fn sampling(&self) -> Sampling {
        if self.temperature <= 0.0 {
            return Sampling::ArgMax;
        }
        match self.top_p {
            Some(p) if p > 0.0 && p < 1.0 => Sampling::TopP {
                p,
                temperature: self.temperature,
            },
            _ => Sampling::All {
                temperature: self.temperature,
            },
        }
    }
}

/// Trait for language models that turn a prompt into text.
pub trait TextGenerator {
    /// Generate a completion for `prompt`.
    ///
    /// Text fragments are passed to `on_token` as soon as they decode to
    /// complete characters; the concatenation of all fragments equals the
    /// returned string. Prompt text is never streamed.
    ///
    /// # Errors
    /// Returns `GenerationError` if tokenization or inference fails
    fn generate(&mut self, prompt: &str, on_token: &mut dyn FnMut(&str)) -> GenerationResult<String>;

    /// Identifier of the underlying model.
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GenerationConfig::default();
        assert_eq!(config.max_length, 2048);
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.top_p, Some(0.95));
        assert!((config.repetition_penalty - 1.15).abs() < f32::EPSILON);
        assert_eq!(config.seed, 299792458);
        assert_eq!(config.precision, Precision::Auto);
    }

    #[test]
    fn test_auto_precision_is_reduced_on_cpu() {
        assert_eq!(Precision::Auto.dtype(&Device::Cpu), DType::BF16);
        assert_eq!(Precision::F32.dtype(&Device::Cpu), DType::F32);
        assert_eq!(Precision::F16.dtype(&Device::Cpu), DType::F16);
    }

    #[test]
    fn test_zero_temperature_is_greedy() {
        assert!(matches!(GenerationConfig::default().sampling(), Sampling::ArgMax));
    }

    #[test]
    fn test_positive_temperature_uses_top_p() {
        let config = GenerationConfig {
            temperature: 0.7,
            ..GenerationConfig::default()
        };
        let Sampling::TopP { p, temperature } = config.sampling() else {
            panic!("Expected TopP sampling");
        };
        assert_eq!(p, 0.95);
        assert_eq!(temperature, 0.7);

        let config = GenerationConfig {
            temperature: 0.7,
            top_p: None,
            ..GenerationConfig::default()
        };
        assert!(matches!(config.sampling(), Sampling::All { .. }));
    }

    #[test]
    fn test_prompt_too_long_message() {
        let err = GenerationError::PromptTooLong {
            prompt_tokens: 4096,
            max_length: 2048,
        };
        assert!(err.to_string().contains("4096"));
        assert!(err.to_string().contains("2048"));
    }
}
