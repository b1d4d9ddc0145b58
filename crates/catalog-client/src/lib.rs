//! Client side of the catalog registry
//!
//! [`HttpCatalog`] implements [`catalog_registry::CatalogApi`] over the
//! catalog's HTTP API, so any entity client can run the allocation and
//! heartbeat protocol with [`catalog_registry::Registration`]:
//!
//! ```no_run
//! use catalog_client::HttpCatalog;
//! use catalog_registry::{Device, Registration};
//!
//! # async fn example() {
//! let catalog = HttpCatalog::new("http://localhost:8080");
//! let sensor = Registration::new(catalog, Device::new(0, "oximeter", 1));
//! sensor.run().await;
//! # }
//! ```
//!
//! The crate also contains the catalog-manager service, which runs the
//! reaper against a remote catalog.

#![warn(missing_docs)]

pub mod http;
pub mod manager;

pub use http::HttpCatalog;
pub use manager::CatalogManager;
