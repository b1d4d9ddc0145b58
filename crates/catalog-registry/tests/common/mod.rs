//! Shared fixtures for catalog registry integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use catalog_registry::{
    CatalogApi, ChannelInfo, ChannelProvisioner, EntityId, Error, ManualClock, MemoryProvisioner,
    Record, Registry, Result, Store,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Registry over a temporary snapshot, with a manual clock and local provisioner
pub struct TestCatalog {
    pub dir: TempDir,
    pub registry: Arc<Registry>,
    pub provisioner: Arc<MemoryProvisioner>,
    pub clock: Arc<ManualClock>,
}

impl TestCatalog {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = Store::open(dir.path().join("catalog.json")).await;
        let provisioner = Arc::new(MemoryProvisioner::new());
        let clock = Arc::new(ManualClock::default());
        let registry = Arc::new(Registry::with_store(
            store,
            provisioner.clone(),
            clock.clone(),
        ));

        Self {
            dir,
            registry,
            provisioner,
            clock,
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.path().join("catalog.json")
    }

    pub async fn snapshot(&self) -> String {
        async_fs::read_to_string(self.snapshot_path())
            .await
            .expect("Failed to read snapshot")
    }
}

/// Failures and stale reads to inject, consumed in order
#[derive(Debug, Default)]
pub struct Script {
    /// List calls answered with an empty collection
    pub stale_lists: usize,
    /// List calls failing with a transport error
    pub failed_lists: usize,
    /// Create calls failing with a transport error
    pub failed_creates: usize,
    /// Delete calls failing with a transport error
    pub failed_deletes: usize,
}

/// `CatalogApi` over a real registry with scripted misbehavior
pub struct ScriptedCatalog {
    pub registry: Arc<Registry>,
    script: Mutex<Script>,
    pub lists: AtomicUsize,
    pub creates: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl ScriptedCatalog {
    pub fn new(registry: Arc<Registry>, script: Script) -> Self {
        Self {
            registry,
            script: Mutex::new(script),
            lists: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    fn take(counter: &mut usize) -> bool {
        if *counter > 0 {
            *counter -= 1;
            true
        } else {
            false
        }
    }

    fn unavailable() -> Error {
        Error::Transport("connection refused".to_string())
    }
}

#[async_trait]
impl CatalogApi for ScriptedCatalog {
    async fn list_records<R: Record>(&self) -> Result<Vec<R>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        {
            let mut script = self.script.lock().unwrap();
            if Self::take(&mut script.failed_lists) {
                return Err(Self::unavailable());
            }
            if Self::take(&mut script.stale_lists) {
                return Ok(Vec::new());
            }
        }
        self.registry.list_records::<R>().await
    }

    async fn get_record<R: Record>(&self, id: &R::Id) -> Result<R> {
        self.registry.get_record::<R>(id).await
    }

    async fn create_record<R: Record>(&self, record: &R) -> Result<String> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let fail = Self::take(&mut self.script.lock().unwrap().failed_creates);
        if fail {
            return Err(Self::unavailable());
        }
        self.registry.create_record(record).await
    }

    async fn update_record<R: Record>(&self, record: &R) -> Result<String> {
        self.registry.update_record(record).await
    }

    async fn delete_record<R: Record>(&self, id: &R::Id) -> Result<String> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let fail = Self::take(&mut self.script.lock().unwrap().failed_deletes);
        if fail {
            return Err(Self::unavailable());
        }
        self.registry.delete_record::<R>(id).await
    }
}

/// Provisioner that takes a while to open each channel
#[derive(Default)]
pub struct SlowProvisioner {
    pub inner: MemoryProvisioner,
    pub opened: AtomicUsize,
}

#[async_trait]
impl ChannelProvisioner for SlowProvisioner {
    async fn create_channel(&self, patient_id: EntityId) -> Result<ChannelInfo> {
        async_io::Timer::after(Duration::from_millis(20)).await;
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.inner.create_channel(patient_id).await
    }

    async fn delete_channel(&self, patient_id: EntityId) -> Result<()> {
        self.inner.delete_channel(patient_id).await
    }
}
