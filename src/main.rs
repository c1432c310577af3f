use anyhow::{Context as _, Result};
use clap::Parser;
use mergebot::{config::Config, App};
use std::path::PathBuf;

/// Fast-forward pull-request merge bot gated on review quorum and
/// staging-branch status checks.
#[derive(Parser)]
struct Cli {
    /// Path to the configuration document.
    #[arg(default_value = "./config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    real_main().await.map_err(|e| {
        tracing::error!("{:#}", e);
        e
    })
}

async fn real_main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

    mergebot::logging::init(config.logger_params.as_deref())?;
    tracing::debug!(owner = %config.owner, repo = %config.repo, "loaded configuration");

    let app = App::new(config)?;
    app.run().await
}
