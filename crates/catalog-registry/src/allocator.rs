//! Client-side ID allocation
//!
//! A client picks its own integer ID from the current contents of the
//! target collection. Two clients allocating at the same time can pick the
//! same ID; the registry's uniqueness check on create settles the race and
//! the loser allocates again.

use crate::{
    api::CatalogApi,
    models::{EntityId, Record},
};
use std::time::Duration;
use tracing::{debug, warn};

/// Pick an ID not present in `existing`
///
/// A prior ID is kept unless it is already taken; otherwise the result is
/// one past the largest existing ID, or 1 for an empty collection.
pub fn next_id(existing: &[EntityId], prior: Option<EntityId>) -> EntityId {
    match prior {
        Some(id) if !existing.contains(&id) => id,
        _ => existing.iter().max().map_or(1, |max| max + 1),
    }
}

/// Allocates IDs against a live catalog
pub struct Allocator<'a, C> {
    api: &'a C,
    retry_delay: Duration,
}

impl<'a, C: CatalogApi> Allocator<'a, C> {
    /// Create an allocator retrying every `retry_delay`
    pub fn new(api: &'a C, retry_delay: Duration) -> Self {
        Self { api, retry_delay }
    }

    /// Allocate an ID in the collection of `R`
    ///
    /// Retries with a fixed delay until the collection can be read.
    pub async fn allocate<R: Record<Id = EntityId>>(&self, prior: Option<EntityId>) -> EntityId {
        loop {
            match self.api.list_records::<R>().await {
                Ok(records) => {
                    let existing: Vec<EntityId> = records.iter().map(|r| *r.id()).collect();
                    let id = next_id(&existing, prior);
                    debug!("Allocated {} ID {}", R::COLLECTION.singular(), id);
                    return id;
                }
                Err(e) => {
                    warn!(
                        "Failed to read {} for ID allocation, retrying in {:?}: {}",
                        R::COLLECTION,
                        self.retry_delay,
                        e
                    );
                    async_io::Timer::after(self.retry_delay).await;
                }
            }
        }
    }
}
