//! Configuration structures for the catalog and its clients

use crate::error::Result;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Catalog server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Analytics channel provisioner
    #[serde(default)]
    pub provisioner: ProvisionerConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:8080")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Path of the catalog snapshot document
    #[serde(default = "default_catalog_file")]
    pub catalog_file: PathBuf,
    /// Seconds between in-memory backups
    #[serde(default = "default_backup_interval")]
    pub backup_interval_secs: u64,
}

/// Analytics channel provisioner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Base URL of the analytics adaptor; channels are simulated locally when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adaptor_url: Option<String>,
}

/// Registry client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the catalog
    #[serde(default = "default_catalog_url")]
    pub catalog_url: String,
    /// Seconds between heartbeats
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    /// Seconds to wait before retrying a failed registry call
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

/// Reaper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// Seconds between sweeps
    #[serde(default = "default_control_interval")]
    pub control_interval_secs: u64,
    /// Per-collection staleness thresholds
    #[serde(default)]
    pub thresholds: StalenessThresholds,
}

/// Age after which a record without heartbeats is considered dead
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StalenessThresholds {
    /// Threshold for devices, in seconds
    #[serde(default = "default_threshold")]
    pub devices_secs: u64,
    /// Threshold for services, in seconds
    #[serde(default = "default_threshold")]
    pub services_secs: u64,
}

/// Catalog manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// How to reach the catalog
    #[serde(default)]
    pub client: ClientConfig,
    /// Sweep settings
    #[serde(default)]
    pub reaper: ReaperConfig,
    /// Name the manager registers under
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_catalog_file() -> PathBuf {
    PathBuf::from("catalog.json")
}

fn default_backup_interval() -> u64 {
    60
}

fn default_catalog_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_ping_interval() -> u64 {
    10
}

fn default_retry_delay() -> u64 {
    5
}

fn default_control_interval() -> u64 {
    60
}

fn default_threshold() -> u64 {
    60
}

fn default_service_name() -> String {
    "Catalog Manager".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            catalog_file: default_catalog_file(),
            backup_interval_secs: default_backup_interval(),
        }
    }
}

impl ServerConfig {
    /// Interval between in-memory backups
    pub fn backup_interval(&self) -> Duration {
        Duration::from_secs(self.backup_interval_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            catalog_url: default_catalog_url(),
            ping_interval_secs: default_ping_interval(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

impl ClientConfig {
    /// Interval between heartbeats
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Backoff between retries
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            control_interval_secs: default_control_interval(),
            thresholds: StalenessThresholds::default(),
        }
    }
}

impl ReaperConfig {
    /// Interval between sweeps
    pub fn control_interval(&self) -> Duration {
        Duration::from_secs(self.control_interval_secs)
    }
}

impl Default for StalenessThresholds {
    fn default() -> Self {
        Self {
            devices_secs: default_threshold(),
            services_secs: default_threshold(),
        }
    }
}

impl StalenessThresholds {
    /// Same threshold for every collection
    pub fn uniform(threshold: Duration) -> Self {
        Self {
            devices_secs: threshold.as_secs(),
            services_secs: threshold.as_secs(),
        }
    }

    /// Device staleness threshold
    pub fn devices(&self) -> Duration {
        Duration::from_secs(self.devices_secs)
    }

    /// Service staleness threshold
    pub fn services(&self) -> Duration {
        Duration::from_secs(self.services_secs)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            reaper: ReaperConfig::default(),
            service_name: default_service_name(),
        }
    }
}

impl CatalogConfig {
    /// Load configuration from file
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        read_config(path.as_ref()).await
    }
}

impl ManagerConfig {
    /// Load configuration from file
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        read_config(path.as_ref()).await
    }
}

/// Read a YAML (`.yaml`/`.yml`) or JSON configuration file
async fn read_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = async_fs::read_to_string(path).await?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&contents)?),
        _ => Ok(serde_json::from_str(&contents)?),
    }
}
