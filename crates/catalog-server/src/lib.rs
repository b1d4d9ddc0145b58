//! HTTP surface of the catalog registry
//!
//! Exposes every catalog collection over a small JSON API, provisions
//! analytics channels for new patients through the analytics adaptor, and
//! refreshes the in-memory backup on a fixed interval.
//!
//! # Example
//!
//! ```no_run
//! use catalog_registry::CatalogConfig;
//! use catalog_server::Server;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = CatalogConfig::from_file("catalog.yaml").await?;
//! Server::new(config).await.run().await
//! # }
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod provisioner;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use provisioner::HttpProvisioner;
pub use routes::{AppState, create_router};
pub use server::Server;
