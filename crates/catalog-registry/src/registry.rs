//! Registry API core
//!
//! Create, read, update and delete for every collection, with the
//! uniqueness, ownership and back-reference rules applied under the store
//! lock. Every successful mutation is followed by a snapshot.

use crate::{
    clock::{Clock, SystemClock},
    error::{Error, Result},
    models::{Catalog, Record, describe},
    provisioner::ChannelProvisioner,
    store::Store,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of a successful mutation
#[derive(Debug, Clone)]
pub struct Mutation<R> {
    /// Human-readable confirmation
    pub message: String,
    /// Record as stored (or as it was before removal)
    pub record: R,
}

/// The catalog registry
pub struct Registry {
    /// Collections and snapshot
    store: Store,
    /// Analytics channel collaborator
    provisioner: Arc<dyn ChannelProvisioner>,
    /// Source of `last_update` stamps
    clock: Arc<dyn Clock>,
    /// Provisioned records whose creation is in flight
    reservations: Reservations,
}

impl Registry {
    /// Open a registry on the snapshot at `path`
    pub async fn open(path: impl Into<PathBuf>, provisioner: Arc<dyn ChannelProvisioner>) -> Self {
        let store = Store::open(path).await;
        Self::with_store(store, provisioner, Arc::new(SystemClock))
    }

    /// Create a registry over an existing store
    pub fn with_store(
        store: Store,
        provisioner: Arc<dyn ChannelProvisioner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            provisioner,
            clock,
            reservations: Reservations::default(),
        }
    }

    /// Underlying store
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Add a record
    ///
    /// Fails with `Conflict` if the ID is taken and with `NotFound` if the
    /// owning patient does not exist. Provisioned records acquire their
    /// external resources before insertion, outside the store lock.
    pub async fn create<R: Record>(&self, mut record: R) -> Result<Mutation<R>> {
        record.validate()?;

        let _reservation = if R::PROVISIONED {
            let reservation = {
                let catalog = self.store.lock().await;
                check_insertable(&catalog, &record)?;
                self.reservations
                    .hold(reservation_key::<R>(record.id()))
                    .ok_or_else(|| Error::Conflict(record.describe()))?
            };
            record.provision(self.provisioner.as_ref()).await?;
            Some(reservation)
        } else {
            None
        };

        let mut catalog = self.store.lock().await;
        if let Err(e) = check_insertable(&catalog, &record) {
            drop(catalog);
            if R::PROVISIONED {
                self.release(&record).await;
            }
            return Err(e);
        }

        record.touch(self.clock.now());
        record.attach(&mut catalog);
        R::entries_mut(&mut catalog).push(record.clone());
        catalog.persist().await;

        let message = match record.owner() {
            Some(owner) => format!("{} has been added to patient with ID {}", record.describe(), owner),
            None => format!("{} has been added", record.describe()),
        };
        info!("{}", message);
        Ok(Mutation { message, record })
    }

    /// All records of a collection
    pub async fn list<R: Record>(&self) -> Vec<R> {
        let catalog = self.store.lock().await;
        debug!("Listing {}", R::COLLECTION);
        R::entries(&catalog).clone()
    }

    /// A single record by ID
    pub async fn get<R: Record>(&self, id: &R::Id) -> Result<R> {
        let catalog = self.store.lock().await;
        R::entries(&catalog)
            .iter()
            .find(|r| r.id() == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(describe::<R>(id)))
    }

    /// Replace a record
    ///
    /// The stored record must match both the ID and, where the collection
    /// declares one, the secondary key. Refreshes `last_update`.
    pub async fn update<R: Record>(&self, mut record: R) -> Result<Mutation<R>> {
        record.validate()?;
        if let Some(key) = R::SECONDARY_KEY {
            if record.secondary_key().is_none_or(str::is_empty) {
                return Err(Error::Validation(format!(
                    "missing {} in {} body",
                    key,
                    R::COLLECTION.singular()
                )));
            }
        }

        let mut catalog = self.store.lock().await;
        let position = R::entries(&catalog)
            .iter()
            .position(|stored| {
                stored.id() == record.id() && stored.secondary_key() == record.secondary_key()
            })
            .ok_or_else(|| match R::SECONDARY_KEY {
                Some(key) => Error::NotFound(format!(
                    "{} and {} '{}'",
                    record.describe(),
                    key,
                    record.secondary_key().unwrap_or_default()
                )),
                None => Error::NotFound(record.describe()),
            })?;

        if let Some(owner) = record.owner() {
            if !catalog.has_patient(owner) {
                return Err(Error::NotFound(format!("Patient with ID {}", owner)));
            }
        }

        let stored = R::entries(&catalog)[position].clone();
        stored.detach(&mut catalog);
        record.inherit(&stored);
        record.touch(self.clock.now());
        record.attach(&mut catalog);
        R::entries_mut(&mut catalog)[position] = record.clone();
        catalog.persist().await;

        let message = format!("{} has been updated", record.describe());
        debug!("{}", message);
        Ok(Mutation { message, record })
    }

    /// Remove a record
    ///
    /// Owned records leave their patient's back-reference list; removing a
    /// patient also removes its devices and medications. Provisioned
    /// records release their external resources first and are retained if
    /// that fails.
    pub async fn delete<R: Record>(&self, id: &R::Id) -> Result<Mutation<R>> {
        if R::PROVISIONED {
            let record = self.get::<R>(id).await?;
            record.deprovision(self.provisioner.as_ref()).await?;
        }

        let mut catalog = self.store.lock().await;
        let position = R::entries(&catalog)
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| Error::NotFound(describe::<R>(id)))?;

        let record = R::entries_mut(&mut catalog).remove(position);
        record.detach(&mut catalog);
        let cascaded = record.cascade(&mut catalog);
        catalog.persist().await;

        let message = match cascaded {
            0 => format!("{} has been removed", record.describe()),
            n => format!(
                "{} has been removed along with {} associated records",
                record.describe(),
                n
            ),
        };
        info!("{}", message);
        Ok(Mutation { message, record })
    }

    /// Copy of the full catalog document
    pub async fn catalog(&self) -> Catalog {
        self.store.lock().await.clone()
    }

    /// Refresh the in-memory backup
    pub async fn backup(&self) {
        self.store.backup().await
    }

    /// Reload the catalog from its snapshot
    ///
    /// Picks up edits made to the snapshot file by hand; collections that
    /// no longer decode come from the last backup.
    pub async fn reload(&self) {
        self.store.reload().await
    }

    /// Refresh the backup every `interval`, forever
    pub async fn run_backups(&self, interval: Duration) {
        info!("Backing up catalog every {:?}", interval);
        self.store.run_backups(interval).await
    }

    /// Best-effort release of a channel provisioned for a rejected record
    async fn release<R: Record>(&self, record: &R) {
        if let Err(e) = record.deprovision(self.provisioner.as_ref()).await {
            warn!(
                "Failed to release resources of rejected {}: {}",
                record.describe(),
                e
            );
        }
    }
}

/// IDs of provisioned records between provisioning and insertion
///
/// A second create for a reserved ID is rejected before it reaches the
/// provisioner, so channels are only ever released by the create that
/// opened them.
#[derive(Default)]
struct Reservations(Mutex<HashSet<String>>);

impl Reservations {
    fn held(&self) -> MutexGuard<'_, HashSet<String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve `key`, or `None` if another create holds it
    fn hold(&self, key: String) -> Option<Reservation<'_>> {
        if !self.held().insert(key.clone()) {
            return None;
        }
        Some(Reservation { owner: self, key })
    }
}

/// Released when the create finishes, fails or is cancelled
struct Reservation<'a> {
    owner: &'a Reservations,
    key: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.owner.held().remove(&self.key);
    }
}

fn reservation_key<R: Record>(id: &R::Id) -> String {
    format!("{}/{}", R::COLLECTION, id)
}

/// Uniqueness and ownership checks for a record about to be inserted
fn check_insertable<R: Record>(catalog: &Catalog, record: &R) -> Result<()> {
    if R::entries(catalog).iter().any(|r| r.id() == record.id()) {
        return Err(Error::Conflict(record.describe()));
    }
    if let Some(owner) = record.owner() {
        if !catalog.has_patient(owner) {
            return Err(Error::NotFound(format!("Patient with ID {}", owner)));
        }
    }
    Ok(())
}
