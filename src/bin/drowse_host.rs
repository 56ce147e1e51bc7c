//! Headless host bridge binary for stdin/stdout JSON communication.
//!
//! Loads `config.toml`, reconciles leftover schedules, then serves
//! `schedule`, `cancel` and `status` commands as newline-delimited JSON.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean JSON protocol channel.

use drowse::config::DrowseConfig;
use drowse::host::{CommandRouter, run_stdio_bridge};
use drowse::schedule::Orchestrator;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("drowse=info")),
        )
        .init();

    let config_path = drowse::drowse_dirs::config_file();
    let config = DrowseConfig::load_or_default(&config_path)
        .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", config_path.display()))?;
    config.validate()?;

    tracing::info!(config = %config_path.display(), "drowse-host starting");

    let orchestrator = Arc::new(Orchestrator::from_config(&config));
    let report = orchestrator.restore().await?;
    tracing::info!(
        scheduled = report.state.is_scheduled(),
        discarded = report.discarded.len(),
        orphans = report.orphans_removed.len(),
        "startup reconciliation finished"
    );

    run_stdio_bridge(CommandRouter::new(orchestrator))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "drowse-host exited with error");
            anyhow::anyhow!("drowse-host failed: {e}")
        })?;

    tracing::info!("drowse-host shut down cleanly");
    Ok(())
}
