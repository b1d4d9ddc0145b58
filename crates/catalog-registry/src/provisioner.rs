//! Analytics channel provisioning
//!
//! Creating a patient opens a data channel at the analytics provider and
//! deleting one closes it. The registry only sees this seam; the HTTP
//! implementation lives with the server.

use crate::{
    error::{Error, Result},
    models::{ChannelInfo, EntityId},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Provisions and releases per-patient analytics channels
#[async_trait]
pub trait ChannelProvisioner: Send + Sync {
    /// Open a channel for a patient and return its credentials
    async fn create_channel(&self, patient_id: EntityId) -> Result<ChannelInfo>;

    /// Close the channel of a patient
    async fn delete_channel(&self, patient_id: EntityId) -> Result<()>;
}

/// In-process provisioner that hands out local channel credentials
///
/// Used when no analytics adaptor is configured, and in tests, where it
/// can be switched into a failing mode.
#[derive(Default)]
pub struct MemoryProvisioner {
    channels: Mutex<HashMap<EntityId, ChannelInfo>>,
    next_channel: AtomicI64,
    failing: AtomicBool,
}

impl MemoryProvisioner {
    /// Create a new in-memory provisioner
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a transport error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Whether a channel is currently open for the patient
    pub fn has_channel(&self, patient_id: EntityId) -> bool {
        self.channels().contains_key(&patient_id)
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<EntityId, ChannelInfo>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Transport("analytics provider unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelProvisioner for MemoryProvisioner {
    async fn create_channel(&self, patient_id: EntityId) -> Result<ChannelInfo> {
        self.check_available()?;

        let channel_id = self.next_channel.fetch_add(1, Ordering::SeqCst) + 1;
        let info = ChannelInfo {
            channel_id: Some(channel_id),
            read_api_key: Some(format!("local-read-{}", patient_id)),
            write_api_key: Some(format!("local-write-{}", patient_id)),
        };

        debug!("Opened local channel {} for patient {}", channel_id, patient_id);
        self.channels().insert(patient_id, info.clone());
        Ok(info)
    }

    async fn delete_channel(&self, patient_id: EntityId) -> Result<()> {
        self.check_available()?;

        debug!("Closing local channel for patient {}", patient_id);
        self.channels().remove(&patient_id);
        Ok(())
    }
}
