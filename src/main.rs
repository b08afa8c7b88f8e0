//! `pagehub` server binary
//!
//! Usage: `pagehub [CONFIG.yaml]`. Without an argument the path is taken from
//! `PAGEHUB_CONFIG`; without either the built-in defaults are used. Log
//! verbosity follows `RUST_LOG` (default `pagehub=info`).

use anyhow::{Context, Result};
use pagehub::config::HubConfig;
use pagehub::server::HubBuilder;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pagehub=info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PAGEHUB_CONFIG").ok());

    let config = match config_path {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path);
            HubConfig::from_yaml_file(&path)
                .with_context(|| format!("failed to load configuration from '{}'", path))?
        }
        None => HubConfig::default(),
    };

    HubBuilder::new().with_config(config).serve().await
}
