//! Client view of the registry
//!
//! Allocator, heartbeat and reaper talk to the catalog only through
//! [`CatalogApi`], so the same logic runs against the in-process
//! [`Registry`] and against the HTTP client.

use crate::{error::Result, models::Record, registry::Registry};
use async_trait::async_trait;
use std::sync::Arc;

/// Registry operations available to clients
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// All records of a collection
    async fn list_records<R: Record>(&self) -> Result<Vec<R>>;

    /// A single record by ID
    async fn get_record<R: Record>(&self, id: &R::Id) -> Result<R>;

    /// Create a record, returning the confirmation message
    async fn create_record<R: Record>(&self, record: &R) -> Result<String>;

    /// Update a record, returning the confirmation message
    async fn update_record<R: Record>(&self, record: &R) -> Result<String>;

    /// Delete a record, returning the confirmation message
    async fn delete_record<R: Record>(&self, id: &R::Id) -> Result<String>;
}

#[async_trait]
impl CatalogApi for Registry {
    async fn list_records<R: Record>(&self) -> Result<Vec<R>> {
        Ok(self.list::<R>().await)
    }

    async fn get_record<R: Record>(&self, id: &R::Id) -> Result<R> {
        self.get::<R>(id).await
    }

    async fn create_record<R: Record>(&self, record: &R) -> Result<String> {
        Ok(self.create(record.clone()).await?.message)
    }

    async fn update_record<R: Record>(&self, record: &R) -> Result<String> {
        Ok(self.update(record.clone()).await?.message)
    }

    async fn delete_record<R: Record>(&self, id: &R::Id) -> Result<String> {
        Ok(self.delete::<R>(id).await?.message)
    }
}

#[async_trait]
impl<T: CatalogApi> CatalogApi for Arc<T> {
    async fn list_records<R: Record>(&self) -> Result<Vec<R>> {
        (**self).list_records::<R>().await
    }

    async fn get_record<R: Record>(&self, id: &R::Id) -> Result<R> {
        (**self).get_record::<R>(id).await
    }

    async fn create_record<R: Record>(&self, record: &R) -> Result<String> {
        (**self).create_record(record).await
    }

    async fn update_record<R: Record>(&self, record: &R) -> Result<String> {
        (**self).update_record(record).await
    }

    async fn delete_record<R: Record>(&self, id: &R::Id) -> Result<String> {
        (**self).delete_record::<R>(id).await
    }
}
