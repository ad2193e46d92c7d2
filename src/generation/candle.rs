//! Causal language model inference with candle.
//!
//! Model files are fetched from the Hugging Face Hub on first use and cached
//! by `hf-hub`. The architecture is read from `config.json`; Qwen2 and Llama
//! checkpoints are supported.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::{llama, qwen2};
use hf_hub::api::sync::{ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use serde::Deserialize;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use super::stream::TokenStreamer;
use super::{GenerationConfig, GenerationError, GenerationResult, TextGenerator};

const SINGLE_WEIGHTS_FILE: &str = "model.safetensors";
const SHARDED_WEIGHTS_INDEX: &str = "model.safetensors.index.json";

/// Model families with a known architecture and chat format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Qwen2,
    Llama,
}

impl ModelFamily {
    /// Map the `model_type` field of `config.json` to a family.
    pub fn from_model_type(model_type: &str) -> GenerationResult<Self> {
        match model_type {
            "qwen2" => Ok(ModelFamily::Qwen2),
            "llama" | "mistral" => Ok(ModelFamily::Llama),
            other => Err(GenerationError::UnsupportedModel(format!(
                "architecture '{}' is not supported (expected qwen2 or llama)",
                other
            ))),
        }
    }

    /// Wrap a user message in the family's chat format.
    pub fn chat_prompt(&self, message: &str) -> String {
        match self {
            ModelFamily::Qwen2 => format!(
                "<|im_start|>system\nYou are a helpful assistant.<|im_end|>\n\
                 <|im_start|>user\n{}<|im_end|>\n<|im_start|>assistant\n",
                message
            ),
            ModelFamily::Llama => format!("[INST] {} [/INST]", message),
        }
    }

    /// Tokens that end a turn.
    pub fn eos_tokens(&self) -> &'static [&'static str] {
        match self {
            ModelFamily::Qwen2 => &["<|im_end|>", "<|endoftext|>"],
            ModelFamily::Llama => &["</s>", "<|eot_id|>", "<|end_of_text|>"],
        }
    }
}

#[derive(Debug, Deserialize)]
struct ArchitectureProbe {
    model_type: Option<String>,
}

/// Names of the shard files listed in a safetensors index, deduplicated and sorted.
pub fn shard_names(index: &serde_json::Value) -> GenerationResult<Vec<String>> {
    let weight_map = index
        .get("weight_map")
        .and_then(|map| map.as_object())
        .ok_or_else(|| GenerationError::ModelLoad(format!("{} has no weight_map", SHARDED_WEIGHTS_INDEX)))?;

    let names: BTreeSet<&str> = weight_map.values().filter_map(|v| v.as_str()).collect();
    if names.is_empty() {
        return Err(GenerationError::ModelLoad(format!(
            "{} lists no weight files",
            SHARDED_WEIGHTS_INDEX
        )));
    }

    Ok(names.into_iter().map(str::to_string).collect())
}

fn weight_files(repo: &ApiRepo) -> GenerationResult<Vec<PathBuf>> {
    match repo.get(SINGLE_WEIGHTS_FILE) {
        Ok(path) => Ok(vec![path]),
        Err(single_err) => {
            debug!("No {} ({}), trying sharded weights", SINGLE_WEIGHTS_FILE, single_err);
            let index_path = repo.get(SHARDED_WEIGHTS_INDEX)?;
            let index: serde_json::Value = serde_json::from_slice(&std::fs::read(index_path)?)?;
            shard_names(&index)?
                .iter()
                .map(|name| repo.get(name).map_err(GenerationError::from))
                .collect()
        }
    }
}

/// Pick the inference device.
pub fn select_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if candle_core::utils::cuda_is_available() {
            match Device::new_cuda(0) {
                Ok(device) => {
                    info!("Using CUDA device");
                    return device;
                }
                Err(e) => warn!("CUDA device creation failed: {}, falling back to CPU", e),
            }
        } else {
            warn!("CUDA not available, using CPU");
        }
    }

    debug!("Using CPU");
    Device::Cpu
}

enum CausalModel {
    Qwen2(qwen2::ModelForCausalLM),
    Llama {
        model: llama::Llama,
        cache: llama::Cache,
        config: llama::Config,
        dtype: DType,
        device: Device,
    },
}

impl CausalModel {
    fn load(
        family: ModelFamily,
        config_json: &[u8],
        weights: &[PathBuf],
        dtype: DType,
        device: &Device,
    ) -> GenerationResult<Self> {
        // SAFETY: the weight files are not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(weights, dtype, device)? };

        match family {
            ModelFamily::Qwen2 => {
                let config: qwen2::Config = serde_json::from_slice(config_json)?;
                Ok(CausalModel::Qwen2(qwen2::ModelForCausalLM::new(&config, vb)?))
            }
            ModelFamily::Llama => {
                let config: llama::LlamaConfig = serde_json::from_slice(config_json)?;
                let config = config.into_config(false);
                let model = llama::Llama::load(vb, &config)?;
                let cache = llama::Cache::new(true, dtype, &config, device)?;
                Ok(CausalModel::Llama {
                    model,
                    cache,
                    config,
                    dtype,
                    device: device.clone(),
                })
            }
        }
    }

    /// Logits for the last input position, as a flat F32 vector.
    fn forward(&mut self, input: &Tensor, position: usize) -> candle_core::Result<Tensor> {
        let logits = match self {
            CausalModel::Qwen2(model) => model.forward(input, position)?,
            CausalModel::Llama { model, cache, .. } => model.forward(input, position, cache)?,
        };
        logits.flatten_all()?.to_dtype(DType::F32)
    }

    fn reset(&mut self) -> candle_core::Result<()> {
        match self {
            CausalModel::Qwen2(model) => model.clear_kv_cache(),
            CausalModel::Llama {
                cache,
                config,
                dtype,
                device,
                ..
            } => *cache = llama::Cache::new(true, *dtype, config, device)?,
        }
        Ok(())
    }
}

/// Options for fetching model files.
#[derive(Debug, Clone, Default)]
pub struct HubOptions {
    /// Cache directory; the hub default when unset
    pub cache_dir: Option<PathBuf>,

    /// Show download progress bars
    pub show_progress: bool,
}

/// Text generator backed by a local candle model.
pub struct CandleGenerator {
    model: CausalModel,
    tokenizer: Tokenizer,
    family: ModelFamily,
    eos_tokens: Vec<u32>,
    device: Device,
    config: GenerationConfig,
    model_name: String,
}

impl CandleGenerator {
    /// Download (if needed) and load `model_name` from the Hugging Face Hub.
    ///
    /// # Errors
    /// Returns `GenerationError` if a file cannot be fetched, the architecture
    /// is unsupported or the weights fail to load
    pub fn load(model_name: &str, hub: &HubOptions, config: GenerationConfig) -> GenerationResult<Self> {
        let mut builder = ApiBuilder::new().with_progress(hub.show_progress);
        if let Some(dir) = &hub.cache_dir {
            builder = builder.with_cache_dir(dir.clone());
        }
        let api = builder.build()?;
        let repo = api.repo(Repo::new(model_name.to_string(), RepoType::Model));

        let config_path = repo.get("config.json")?;
        let tokenizer_path = repo.get("tokenizer.json")?;
        let weights = weight_files(&repo)?;
        debug!("Fetched {} weight file(s) for {}", weights.len(), model_name);

        Self::from_files(model_name, &config_path, &tokenizer_path, &weights, config)
    }

    /// Load a model from files already on disk.
    pub fn from_files(
        model_name: &str,
        config_path: &Path,
        tokenizer_path: &Path,
        weights: &[PathBuf],
        config: GenerationConfig,
    ) -> GenerationResult<Self> {
        let start = Instant::now();

        let config_json = std::fs::read(config_path)?;
        let probe: ArchitectureProbe = serde_json::from_slice(&config_json)?;
        let family = ModelFamily::from_model_type(probe.model_type.as_deref().unwrap_or_default())?;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| GenerationError::Tokenizer(e.to_string()))?;
        let eos_tokens: Vec<u32> = family
            .eos_tokens()
            .iter()
            .filter_map(|token| tokenizer.token_to_id(token))
            .collect();
        if eos_tokens.is_empty() {
            warn!("No end-of-sequence token found for {}, generation runs to max length", model_name);
        }

        let device = select_device();
        let dtype = config.precision.dtype(&device);
        let model = CausalModel::load(family, &config_json, weights, dtype, &device)?;

        info!(
            "Loaded {} ({:?}, {:?}) in {:.2?}",
            model_name,
            family,
            dtype,
            start.elapsed()
        );

        Ok(Self {
            model,
            tokenizer,
            family,
            eos_tokens,
            device,
            config,
            model_name: model_name.to_string(),
        })
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }
}

impl TextGenerator for CandleGenerator {
    fn generate(&mut self, prompt: &str, on_token: &mut dyn FnMut(&str)) -> GenerationResult<String> {
        let chat = self.family.chat_prompt(prompt);
        let mut tokens = self
            .tokenizer
            .encode(chat, true)
            .map_err(|e| GenerationError::Tokenizer(e.to_string()))?
            .get_ids()
            .to_vec();

        let prompt_tokens = tokens.len();
        let max_length = self.config.max_length;
        if prompt_tokens >= max_length {
            return Err(GenerationError::PromptTooLong {
                prompt_tokens,
                max_length,
            });
        }
        debug!("Prompt is {} tokens, generating up to {}", prompt_tokens, max_length - prompt_tokens);

        self.model.reset()?;
        let mut logits_processor = LogitsProcessor::from_sampling(self.config.seed, self.config.sampling());
        let mut streamer = TokenStreamer::new(&self.tokenizer);
        let mut output = String::new();
        let start = Instant::now();

        for step in 0..(max_length - prompt_tokens) {
            let context_size = if step > 0 { 1 } else { tokens.len() };
            let position = tokens.len() - context_size;
            let input = Tensor::new(&tokens[position..], &self.device)?.unsqueeze(0)?;

            let logits = self.model.forward(&input, position)?;
            let logits = if self.config.repetition_penalty == 1.0 {
                logits
            } else {
                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    self.config.repetition_penalty,
                    &tokens,
                )?
            };

            let next = logits_processor.sample(&logits)?;
            tokens.push(next);

            if self.eos_tokens.contains(&next) {
                break;
            }
            if let Some(fragment) = streamer.next_token(next)? {
                on_token(&fragment);
                output.push_str(&fragment);
            }
        }

        if let Some(rest) = streamer.flush()? {
            on_token(&rest);
            output.push_str(&rest);
        }

        let generated = tokens.len() - prompt_tokens;
        let elapsed = start.elapsed();
        debug!(
            "Generated {} tokens in {:.2?} ({:.1} tokens/s)",
            generated,
            elapsed,
            generated as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
        );

        Ok(output)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl std::fmt::Debug for CandleGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleGenerator")
            .field("model_name", &self.model_name)
            .field("family", &self.family)
            .field("device", &self.device)
            .field("config", &self.config)
            .finish()
    }
}
