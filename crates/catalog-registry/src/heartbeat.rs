//! Registration and heartbeat for self-registering clients
//!
//! A client allocates an ID, creates its record, and then re-announces it
//! on a fixed interval so the reaper sees it as alive. If the registry has
//! lost the record, the next heartbeat registers it again from scratch.

use crate::{
    allocator::Allocator,
    api::CatalogApi,
    config::ClientConfig,
    models::{Device, EntityId, Record, Service},
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default interval between heartbeats
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(10);

/// Default backoff between failed registry calls
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// A record whose ID the client allocates itself
pub trait Allocatable: Record<Id = EntityId> {
    /// Replace the record ID
    fn set_id(&mut self, id: EntityId);
}

impl Allocatable for Device {
    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }
}

impl Allocatable for Service {
    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }
}

/// Result of a single heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heartbeat {
    /// The record was updated
    Refreshed,
    /// The record was missing and has been registered again under this ID
    Reregistered(EntityId),
    /// The update failed and will be retried on the next beat
    Failed,
}

/// A client's registration in the catalog
pub struct Registration<C, R> {
    api: C,
    record: R,
    assigned: Option<EntityId>,
    ping_interval: Duration,
    retry_delay: Duration,
}

impl<C: CatalogApi, R: Allocatable> Registration<C, R> {
    /// Create a registration with default intervals
    pub fn new(api: C, record: R) -> Self {
        Self::with_intervals(api, record, DEFAULT_PING_INTERVAL, DEFAULT_RETRY_DELAY)
    }

    /// Create a registration with explicit intervals
    pub fn with_intervals(api: C, record: R, ping_interval: Duration, retry_delay: Duration) -> Self {
        Self {
            api,
            record,
            assigned: None,
            ping_interval,
            retry_delay,
        }
    }

    /// Create a registration using the client configuration intervals
    pub fn from_config(api: C, record: R, config: &ClientConfig) -> Self {
        Self::with_intervals(api, record, config.ping_interval(), config.retry_delay())
    }

    /// Reuse an ID held from an earlier run, unless it has been taken since
    pub fn with_prior_id(mut self, id: EntityId) -> Self {
        self.assigned = Some(id);
        self.record.set_id(id);
        self
    }

    /// Current record
    pub fn record(&self) -> &R {
        &self.record
    }

    /// Mutable record; changes are sent with the next heartbeat
    pub fn record_mut(&mut self) -> &mut R {
        &mut self.record
    }

    /// ID the record was last registered under
    pub fn id(&self) -> Option<EntityId> {
        self.assigned
    }

    /// Registry client
    pub fn api(&self) -> &C {
        &self.api
    }

    /// Register the record, retrying until the registry accepts it
    ///
    /// A duplicate ID sends the client straight back to the allocator. A
    /// missing owner keeps the ID and waits, since the patient may simply
    /// not have been added yet. Anything else waits and reallocates.
    pub async fn register(&mut self) -> EntityId {
        let allocator = Allocator::new(&self.api, self.retry_delay);
        let mut prior = self.assigned;

        loop {
            let id = allocator.allocate::<R>(prior).await;
            self.record.set_id(id);
            prior = Some(id);

            match self.api.create_record(&self.record).await {
                Ok(message) => {
                    info!("{}", message);
                    self.assigned = Some(id);
                    return id;
                }
                Err(e) if e.is_conflict() => {
                    debug!("{} taken, allocating again", self.record.describe());
                }
                Err(e) if e.is_not_found() => {
                    warn!(
                        "Cannot register {} yet ({}), retrying in {:?}",
                        self.record.describe(),
                        e,
                        self.retry_delay
                    );
                    async_io::Timer::after(self.retry_delay).await;
                }
                Err(e) => {
                    warn!(
                        "Failed to register {}, retrying in {:?}: {}",
                        self.record.describe(),
                        self.retry_delay,
                        e
                    );
                    async_io::Timer::after(self.retry_delay).await;
                }
            }
        }
    }

    /// Announce the record once
    pub async fn heartbeat(&mut self) -> Heartbeat {
        if self.assigned.is_none() {
            return Heartbeat::Reregistered(self.register().await);
        }

        match self.api.update_record(&self.record).await {
            Ok(_) => {
                debug!("Heartbeat sent for {}", self.record.describe());
                Heartbeat::Refreshed
            }
            Err(e) if e.is_not_found() => {
                warn!("{} no longer registered, registering again", self.record.describe());
                Heartbeat::Reregistered(self.register().await)
            }
            Err(e) => {
                warn!("Heartbeat for {} failed: {}", self.record.describe(), e);
                Heartbeat::Failed
            }
        }
    }

    /// Register if needed, then send heartbeats forever
    pub async fn run(mut self) {
        if self.assigned.is_none() {
            self.register().await;
        }
        loop {
            async_io::Timer::after(self.ping_interval).await;
            self.heartbeat().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Patient;
    use crate::provisioner::MemoryProvisioner;
    use crate::registry::Registry;
    use std::sync::Arc;

    async fn registry(dir: &tempfile::TempDir) -> Arc<Registry> {
        Arc::new(
            Registry::open(
                dir.path().join("catalog.json"),
                Arc::new(MemoryProvisioner::new()),
            )
            .await,
        )
    }

    fn fast<R: Allocatable>(api: Arc<Registry>, record: R) -> Registration<Arc<Registry>, R> {
        Registration::with_intervals(
            api,
            record,
            Duration::from_millis(10),
            Duration::from_millis(10),
        )
    }

    #[smol_potat::test]
    async fn test_register_allocates_sequential_ids() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir).await;

        let mut first = fast(registry.clone(), Service::new(0, "bot"));
        let mut second = fast(registry.clone(), Service::new(0, "adaptor"));
        assert_eq!(first.register().await, 1);
        assert_eq!(second.register().await, 2);
        assert_eq!(second.record().id, 2);
    }

    #[smol_potat::test]
    async fn test_prior_id_kept_when_free() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir).await;
        registry.create(Service::new(1, "bot")).await.unwrap();

        let mut free = fast(registry.clone(), Service::new(0, "adaptor")).with_prior_id(7);
        assert_eq!(free.register().await, 7);

        let mut taken = fast(registry.clone(), Service::new(0, "stats")).with_prior_id(1);
        assert_eq!(taken.register().await, 8);
    }

    #[smol_potat::test]
    async fn test_heartbeat_reregisters_lost_record() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir).await;
        registry.create(Patient::new(3, "Ada", "Lovelace")).await.unwrap();

        let mut sensor = fast(registry.clone(), Device::new(0, "oximeter", 3));
        let id = sensor.register().await;
        assert_eq!(sensor.heartbeat().await, Heartbeat::Refreshed);

        registry.delete::<Device>(&id).await.unwrap();
        assert_eq!(sensor.heartbeat().await, Heartbeat::Reregistered(id));
        assert_eq!(registry.get::<Patient>(&3).await.unwrap().devices, vec![id]);
    }

    #[smol_potat::test]
    async fn test_heartbeat_refreshes_last_update() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir).await;

        let mut service = fast(registry.clone(), Service::new(0, "bot"));
        let id = service.register().await;
        let before = registry.get::<Service>(&id).await.unwrap().last_update;

        async_io::Timer::after(Duration::from_millis(5)).await;
        service.heartbeat().await;
        let after = registry.get::<Service>(&id).await.unwrap().last_update;
        assert!(after > before);
    }
}
