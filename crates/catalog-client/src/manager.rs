//! Catalog manager service
//!
//! Registers itself in the catalog as a service, keeps that registration
//! alive with heartbeats, and runs the reaper on the control interval.

use catalog_registry::{
    CatalogApi, Clock, EntityId, ManagerConfig, Reaper, Registration, Service, SystemClock,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// The catalog-manager service
pub struct CatalogManager<C> {
    api: Arc<C>,
    config: ManagerConfig,
    clock: Arc<dyn Clock>,
}

impl<C: CatalogApi + 'static> CatalogManager<C> {
    /// Create a manager talking to the catalog through `api`
    pub fn new(api: C, config: ManagerConfig) -> Self {
        Self {
            api: Arc::new(api),
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Judge staleness against a different time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register as a service and start the heartbeat task
    pub async fn register(&self) -> (EntityId, JoinHandle<()>) {
        let mut registration = Registration::from_config(
            self.api.clone(),
            Service::new(0, self.config.service_name.clone()),
            &self.config.client,
        );
        let id = registration.register().await;
        info!("{} registered as service {}", self.config.service_name, id);

        (id, tokio::spawn(registration.run()))
    }

    /// Reaper configured from the manager settings
    pub fn reaper(&self) -> Reaper<Arc<C>> {
        Reaper::with_clock(
            self.api.clone(),
            self.config.reaper.thresholds,
            self.clock.clone(),
        )
    }

    /// Register, then sweep the catalog forever
    pub async fn run(self) {
        let (_, heartbeat) = self.register().await;
        self.reaper().run(self.config.reaper.control_interval()).await;
        heartbeat.abort();
    }
}
