//! Catalog store: in-memory collections, durable snapshot and backup
//!
//! The store owns the only copy of the catalog. Every read and write goes
//! through a single async mutex; mutations are followed by a snapshot
//! written while the lock is still held, so snapshots land in mutation
//! order. Snapshot failures are logged and never fail the caller.

use crate::{
    error::{Error, Result},
    models::{Catalog, Collection},
};
use futures::lock::{Mutex, MutexGuard};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Catalog store backed by a JSON snapshot document
pub struct Store {
    /// Snapshot location
    path: PathBuf,
    /// Live catalog plus last-known-good backup, behind one lock
    state: Mutex<StoreState>,
}

struct StoreState {
    catalog: Catalog,
    backup: Option<Catalog>,
}

/// Exclusive access to the catalog
///
/// Dereferences to [`Catalog`]; call [`StoreGuard::persist`] after a
/// mutation to write the snapshot.
pub struct StoreGuard<'a> {
    path: &'a Path,
    state: MutexGuard<'a, StoreState>,
}

impl Store {
    /// Open the store, loading (and if necessary healing) the snapshot
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!("Loading catalog from {:?}", path);
        let catalog = load(&path, None).await;

        Self {
            path,
            state: Mutex::new(StoreState {
                catalog,
                backup: None,
            }),
        }
    }

    /// Snapshot location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lock the catalog
    pub async fn lock(&self) -> StoreGuard<'_> {
        StoreGuard {
            path: &self.path,
            state: self.state.lock().await,
        }
    }

    /// Refresh the last-known-good copy
    ///
    /// Also checks that the snapshot on disk is still readable and rewrites
    /// it from memory when it has gone missing or corrupt.
    pub async fn backup(&self) {
        let mut state = self.state.lock().await;
        state.backup = Some(state.catalog.clone());

        if let Err(e) = read_snapshot(&self.path).await {
            warn!("Snapshot unreadable during backup ({}), rewriting from memory", e);
            if let Err(e) = write_snapshot(&self.path, &state.catalog).await {
                warn!("Failed to rewrite catalog snapshot: {}", e);
            }
        }
        debug!("Catalog backup refreshed");
    }

    /// Current backup, if one has been taken
    #[cfg(test)]
    pub(crate) async fn backup_copy(&self) -> Option<Catalog> {
        self.state.lock().await.backup.clone()
    }

    /// Reload the catalog from the snapshot, falling back to the backup
    pub async fn reload(&self) {
        let mut state = self.state.lock().await;
        let catalog = load(&self.path, state.backup.as_ref()).await;
        state.catalog = catalog;
    }

    /// Take a backup every `interval`, forever
    pub async fn run_backups(&self, interval: Duration) {
        loop {
            async_io::Timer::after(interval).await;
            self.backup().await;
        }
    }
}

impl StoreGuard<'_> {
    /// Write the snapshot; failures are logged, not returned
    pub async fn persist(&self) {
        if let Err(e) = write_snapshot(self.path, &self.state.catalog).await {
            warn!("Failed to save catalog snapshot to {:?}: {}", self.path, e);
        }
    }
}

impl Deref for StoreGuard<'_> {
    type Target = Catalog;

    fn deref(&self) -> &Catalog {
        &self.state.catalog
    }
}

impl DerefMut for StoreGuard<'_> {
    fn deref_mut(&mut self) -> &mut Catalog {
        &mut self.state.catalog
    }
}

/// Load the catalog snapshot
///
/// A missing or unparsable document is replaced by the backup if one is
/// given, otherwise by an empty catalog. Each collection is then checked on
/// its own: a key that is absent, or whose records do not decode, is
/// restored the same way while the other collections are kept. Whenever
/// anything had to be restored the snapshot is rewritten.
pub async fn load(path: &Path, backup: Option<&Catalog>) -> Catalog {
    let (catalog, healed) = match read_document(path).await {
        Ok(document) => restore_collections(document, backup),
        Err(e) => {
            warn!("Catalog {:?} unavailable ({}), {}", path, e, fallback_source(backup));
            (backup.cloned().unwrap_or_default(), true)
        }
    };

    if healed {
        if let Err(e) = write_snapshot(path, &catalog).await {
            warn!("Failed to rewrite catalog snapshot {:?}: {}", path, e);
        }
    }
    catalog
}

fn fallback_source<T>(backup: Option<&T>) -> &'static str {
    if backup.is_some() {
        "restoring from backup"
    } else {
        "creating a new one"
    }
}

/// Read and fully parse the snapshot
async fn read_snapshot(path: &Path) -> Result<Catalog> {
    let document = read_document(path).await?;
    serde_json::from_value(Value::Object(document)).map_err(|e| Error::CorruptState(e.to_string()))
}

async fn read_document(path: &Path) -> Result<Map<String, Value>> {
    let bytes = async_fs::read(path).await?;
    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(_) => Err(Error::CorruptState("document is not a JSON object".to_string())),
        Err(e) => Err(Error::CorruptState(e.to_string())),
    }
}

/// Decode every collection of the document; returns the catalog and whether anything was restored
fn restore_collections(mut document: Map<String, Value>, backup: Option<&Catalog>) -> (Catalog, bool) {
    let mut healed = false;
    let document = &mut document;
    let catalog = Catalog {
        devices: restore(document, Collection::Devices, backup.map(|b| &b.devices), &mut healed),
        services: restore(document, Collection::Services, backup.map(|b| &b.services), &mut healed),
        patients: restore(document, Collection::Patients, backup.map(|b| &b.patients), &mut healed),
        medications: restore(
            document,
            Collection::Medications,
            backup.map(|b| &b.medications),
            &mut healed,
        ),
        chats: restore(document, Collection::Chats, backup.map(|b| &b.chats), &mut healed),
    };
    (catalog, healed)
}

/// Decode one collection, falling back to the backup copy or an empty list
fn restore<T: DeserializeOwned + Clone>(
    document: &mut Map<String, Value>,
    collection: Collection,
    backup: Option<&Vec<T>>,
    healed: &mut bool,
) -> Vec<T> {
    match document.remove(collection.as_str()) {
        None => info!("Key {} not found, {}", collection, fallback_source(backup)),
        Some(value) => match serde_json::from_value(value) {
            Ok(records) => return records,
            Err(e) => warn!("Key {} is corrupt ({}), {}", collection, e, fallback_source(backup)),
        },
    }
    *healed = true;
    backup.cloned().unwrap_or_default()
}

/// Write the snapshot through a temporary file and an atomic rename
async fn write_snapshot(path: &Path, catalog: &Catalog) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            async_fs::create_dir_all(parent).await?;
        }
    }

    let bytes = serde_json::to_vec_pretty(catalog)?;
    let tmp = temporary_path(path);
    async_fs::write(&tmp, bytes).await?;
    async_fs::rename(&tmp, path).await?;
    Ok(())
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
