//! Command-line entry point.
//!
//! Loads the embedding and chat models once, then explains a single arXiv
//! paper, printing the answer to stdout as it is generated. Logs go to stderr.
//!
//! # Examples
//!
//! ```bash
//! explain https://arxiv.org/abs/2112.14777
//! explain https://arxiv.org/pdf/2112.14777.pdf -u advanced
//! explain https://arxiv.org/abs/2112.14777 -p "What dataset do the authors use?"
//! ```

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use paper_explain::{
    logging, paper_id, Explainer, ExplainerConfig, ExplanationRequest, GenerationConfig, Precision,
    UnderstandingLevel, DEFAULT_CHATBOT_MODEL, DEFAULT_EMBEDDING_MODEL,
};
use tracing::{debug, info};

/// Explain an arXiv paper with a local large language model
#[derive(Parser, Debug)]
#[command(name = "explain", version, about)]
struct Args {
    /// Paper URL, e.g. https://arxiv.org/abs/2112.14777
    url: String,

    /// Optional prompt to guide the explanation (overrides --understanding)
    #[arg(short, long)]
    prompt: Option<String>,

    /// Level of understanding the explanation should target
    #[arg(short, long, value_enum, ignore_case = true, default_value_t = UnderstandingLevel::Basic)]
    understanding: UnderstandingLevel,

    /// Model name for the chatbot
    #[arg(long, value_name = "MODEL", default_value = DEFAULT_CHATBOT_MODEL)]
    chatbot_model_name: String,

    /// Model name for generating embeddings
    #[arg(long, value_name = "MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embeddings_model_name: String,

    /// Weight precision for the chatbot (auto: f16 on GPU, bf16 on CPU)
    #[arg(long, value_enum, ignore_case = true, default_value_t = Precision::Auto)]
    dtype: Precision,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> ExplainerConfig {
        ExplainerConfig {
            chatbot_model_name: self.chatbot_model_name.clone(),
            embeddings_model_name: self.embeddings_model_name.clone(),
            show_download_progress: self.verbose,
            generation: GenerationConfig {
                precision: self.dtype,
                ..GenerationConfig::default()
            },
            ..ExplainerConfig::default()
        }
    }

    fn request(&self) -> ExplanationRequest {
        ExplanationRequest::new(self.url.clone())
            .with_prompt(self.prompt.clone())
            .with_understanding(self.understanding)
    }
}

/// Spinner shown on stderr while the models load
fn create_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Loading models");
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init(args.verbose).context("Failed to initialize logging")?;
    debug!("CLI arguments: {:?}", args);

    // Reject bad URLs before spending time on model loading
    paper_id(&args.url)?;

    let config = args.config();
    let spinner = create_spinner();
    let loaded = Explainer::load(&config);
    spinner.finish_and_clear();
    let mut explainer = loaded.context("Failed to load models")?;
    info!("Models ready");

    let mut stdout = std::io::stdout();
    let mut sink = |token: &str| {
        // A closed stdout must not abort generation
        let _ = stdout.write_all(token.as_bytes());
        let _ = stdout.flush();
    };

    explainer.explain(&args.request(), &mut sink).await?;
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_only() {
        let args = Args::try_parse_from(["explain", "https://arxiv.org/abs/2112.14777"]).unwrap();

        assert_eq!(args.url, "https://arxiv.org/abs/2112.14777");
        assert_eq!(args.prompt, None);
        assert_eq!(args.understanding, UnderstandingLevel::Basic);
        assert_eq!(args.chatbot_model_name, DEFAULT_CHATBOT_MODEL);
        assert_eq!(args.embeddings_model_name, DEFAULT_EMBEDDING_MODEL);
        assert!(!args.verbose);
        assert_eq!(args.dtype, Precision::Auto);
    }

    #[test]
    fn test_dtype_override() {
        let args = Args::try_parse_from(["explain", "https://arxiv.org/abs/1", "--dtype", "F32"]).unwrap();
        assert_eq!(args.config().generation.precision, Precision::F32);
        assert_eq!(args.config().generation.max_length, 2048);
        assert!(Args::try_parse_from(["explain", "https://arxiv.org/abs/1", "--dtype", "f8"]).is_err());
    }

    #[test]
    fn test_understanding_is_case_insensitive() {
        for value in ["ADVANCED", "Advanced", "advanced"] {
            let args = Args::try_parse_from(["explain", "https://arxiv.org/abs/1", "-u", value]).unwrap();
            assert_eq!(args.understanding, UnderstandingLevel::Advanced);
        }
        assert!(Args::try_parse_from(["explain", "https://arxiv.org/abs/1", "-u", "expert"]).is_err());
    }

    #[test]
    fn test_all_options() {
        let args = Args::try_parse_from([
            "explain",
            "https://arxiv.org/pdf/2112.14777.pdf",
            "--prompt",
            "Summarize the method",
            "--understanding",
            "intermediate",
            "--chatbot-model-name",
            "meta-llama/Llama-2-7b-chat-hf",
            "--embeddings-model-name",
            "BAAI/bge-small-en-v1.5",
            "-v",
        ])
        .unwrap();

        let config = args.config();
        assert_eq!(config.chatbot_model_name, "meta-llama/Llama-2-7b-chat-hf");
        assert_eq!(config.embeddings_model_name, "BAAI/bge-small-en-v1.5");
        assert!(config.show_download_progress);

        let request = args.request();
        assert_eq!(request.prompt.as_deref(), Some("Summarize the method"));
        assert_eq!(request.understanding, UnderstandingLevel::Intermediate);
    }

    #[test]
    fn test_url_is_required() {
        assert!(Args::try_parse_from(["explain"]).is_err());
    }
}
