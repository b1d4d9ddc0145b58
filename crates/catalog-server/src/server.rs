//! Server setup and lifecycle management

use crate::provisioner::HttpProvisioner;
use crate::routes::{AppState, create_router};
use anyhow::{Context, Result};
use catalog_registry::{CatalogConfig, ChannelProvisioner, MemoryProvisioner, Registry};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Catalog server
pub struct Server {
    config: CatalogConfig,
    registry: Arc<Registry>,
}

impl Server {
    /// Load the catalog and wire up the channel provisioner
    pub async fn new(config: CatalogConfig) -> Self {
        let provisioner: Arc<dyn ChannelProvisioner> = match &config.provisioner.adaptor_url {
            Some(url) => {
                info!("Provisioning analytics channels through {}", url);
                Arc::new(HttpProvisioner::new(url.clone()))
            }
            None => {
                warn!("No analytics adaptor configured, channel credentials are generated locally");
                Arc::new(MemoryProvisioner::new())
            }
        };

        let registry = Registry::open(config.server.catalog_file.clone(), provisioner).await;
        Self {
            config,
            registry: Arc::new(registry),
        }
    }

    /// The registry served by this server
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Serve until a shutdown signal arrives
    pub async fn run(self) -> Result<()> {
        let addr = &self.config.server.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        info!("Catalog listening on {}", listener.local_addr()?);

        self.serve(listener).await
    }

    /// Serve on an already bound listener until a shutdown signal arrives
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let registry = self.registry.clone();
        let interval = self.config.server.backup_interval();
        let backups = tokio::spawn(async move { registry.run_backups(interval).await });
        #[cfg(unix)]
        let reloads = tokio::spawn(reload_on_hangup(self.registry.clone()));

        let app = create_router(AppState::new(self.registry.clone()));
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Catalog server failed")?;

        info!("Catalog shutting down");
        backups.abort();
        #[cfg(unix)]
        reloads.abort();
        self.registry.backup().await;
        Ok(())
    }
}

/// Reload the catalog from its snapshot on every SIGHUP
#[cfg(unix)]
async fn reload_on_hangup(registry: Arc<Registry>) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            warn!("Failed to install hangup handler, reload disabled: {}", e);
            return;
        }
    };

    while hangup.recv().await.is_some() {
        info!("Received SIGHUP, reloading catalog from {:?}", registry.store().path());
        registry.reload().await;
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
