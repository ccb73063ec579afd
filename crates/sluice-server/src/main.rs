//! Sluice mirror daemon binary.

use anyhow::Context;
use sluice_server::ServerConfig;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::load().context("failed to load configuration")?;

    tracing::info!("Starting Sluice v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("Revision store: {}", config.state_file_path().display());

    sluice_server::run(config)
        .await
        .context("daemon failed")?;

    Ok(())
}
