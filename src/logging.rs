//! Logging bootstrap.
//!
//! The core already instruments itself with `tracing` spans, so this sets
//! up a `tracing-subscriber` `EnvFilter` to sink them.

use anyhow::{Context as _, Result};
use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber. `logger_params` is treated as an
/// `EnvFilter` directive string (e.g. `"mergebot=debug,warn"`); when absent,
/// falls back to warnings everywhere and debug-level detail for this crate.
pub fn init(logger_params: Option<&str>) -> Result<()> {
    let filter = match logger_params {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid logger_params directive: '{directives}'"))?,
        None => EnvFilter::new("warn,mergebot=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("unable to configure logging: {e}"))
}
