//! Catalog server binary

use anyhow::{Context, Result};
use catalog_registry::CatalogConfig;
use catalog_server::Server;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "catalog")]
#[command(about = "Catalog registry for devices, services, patients, medications and chats", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the configuration
    #[arg(short, long)]
    listen: Option<String>,

    /// Catalog snapshot path, overrides the configuration
    #[arg(long)]
    catalog_file: Option<PathBuf>,

    /// Analytics adaptor base URL, overrides the configuration
    #[arg(long)]
    adaptor_url: Option<String>,
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
        Some(path) => CatalogConfig::from_file(path)
            .await
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => CatalogConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    if let Some(catalog_file) = args.catalog_file {
        config.server.catalog_file = catalog_file;
    }
    if let Some(adaptor_url) = args.adaptor_url {
        config.provisioner.adaptor_url = Some(adaptor_url);
    }

    info!("Catalog snapshot: {}", config.server.catalog_file.display());
    Server::new(config).await.run().await
}
