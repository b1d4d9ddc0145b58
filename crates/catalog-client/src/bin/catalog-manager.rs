//! Catalog manager binary

use anyhow::{Context, Result};
use catalog_client::{CatalogManager, HttpCatalog};
use catalog_registry::ManagerConfig;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "catalog-manager")]
#[command(about = "Removes stale and orphaned entries from the catalog", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Catalog base URL, overrides the configuration
    #[arg(long)]
    catalog_url: Option<String>,

    /// Seconds between sweeps, overrides the configuration
    #[arg(long)]
    control_interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ManagerConfig::from_file(path)
            .await
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ManagerConfig::default(),
    };
    if let Some(url) = args.catalog_url {
        config.client.catalog_url = url;
    }
    if let Some(secs) = args.control_interval {
        config.reaper.control_interval_secs = secs;
    }

    info!("Managing catalog at {}", config.client.catalog_url);
    let catalog = HttpCatalog::from_config(&config.client);
    CatalogManager::new(catalog, config).run().await;
    Ok(())
}
