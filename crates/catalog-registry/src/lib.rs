//! Runtime-agnostic catalog registry
//!
//! This crate provides the core of the entity catalog: a store of devices,
//! services, patients, medications and chat sessions, the registry
//! operations that keep it consistent, and the client-side protocol
//! (ID allocation plus heartbeats) together with the reaper that removes
//! stale and orphaned records.
//!
//! # Architecture
//!
//! The registry is designed to be runtime-agnostic, working with any async
//! runtime (tokio, async-std, smol, etc). It uses:
//!
//! - `futures` locks to serialize access to the catalog
//! - `async-fs` for snapshot persistence
//! - `async-io` timers for backup, heartbeat and sweep intervals
//! - `async-trait` for the provisioner and client seams
//!
//! # Example
//!
//! ```no_run
//! use catalog_registry::{MemoryProvisioner, Registry, Service};
//! use std::sync::Arc;
//!
//! # async fn example() -> catalog_registry::Result<()> {
//! let registry = Registry::open("catalog.json", Arc::new(MemoryProvisioner::new())).await;
//!
//! let created = registry.create(Service::new(1, "Telegram Bot")).await?;
//! println!("{}", created.message);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod allocator;
pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod models;
pub mod provisioner;
pub mod reaper;
pub mod registry;
pub mod store;

pub use allocator::{Allocator, next_id};
pub use api::CatalogApi;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    CatalogConfig, ClientConfig, ManagerConfig, ProvisionerConfig, ReaperConfig, ServerConfig,
    StalenessThresholds,
};
pub use error::{Error, Result};
pub use heartbeat::{Allocatable, Heartbeat, Registration};
pub use models::*;
pub use provisioner::{ChannelProvisioner, MemoryProvisioner};
pub use reaper::{Reaper, SweepReport};
pub use registry::{Mutation, Registry};
pub use store::Store;

/// Re-export key types for convenience
pub mod prelude {
    pub use crate::{
        CatalogApi, ChannelProvisioner, Device, EntityId, Error, Medication, Patient, Reaper,
        Record, Registration, Registry, Result, Service,
    };
}
