//! Tracing subscriber setup.
//!
//! Logs go to stderr so generated text on stdout stays clean. `RUST_LOG`
//! overrides the default filter.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Dependencies that log too much at info level.
const NOISY_TARGETS: [&str; 5] = ["hyper", "reqwest", "hf_hub", "ort", "tokenizers"];

/// Default filter directives for the given verbosity.
pub fn filter_directives(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    std::iter::once(format!("{}={}", env!("CARGO_CRATE_NAME"), level))
        .chain(NOISY_TARGETS.iter().map(|target| format!("{}=warn", target)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber.
///
/// # Errors
/// Fails if a global subscriber is already installed
pub fn init(verbose: bool) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directives(verbose)));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives() {
        assert_eq!(
            filter_directives(false),
            "paper_explain=info,hyper=warn,reqwest=warn,hf_hub=warn,ort=warn,tokenizers=warn"
        );
        assert!(filter_directives(true).starts_with("paper_explain=debug,"));
    }

    #[test]
    fn test_directives_parse() {
        assert!(EnvFilter::try_new(filter_directives(true)).is_ok());
    }
}
