//! Analytics channel provisioning over HTTP
//!
//! Talks to the analytics adaptor: `POST {adaptor}/channels` with
//! `{"patientID": <id>}` opens a channel and returns its credentials,
//! `DELETE {adaptor}/channels/<id>` closes it.

use async_trait::async_trait;
use catalog_registry::{ChannelInfo, ChannelProvisioner, EntityId, Error, Result};
use serde_json::json;
use tracing::{debug, info};

/// Channel provisioner backed by the analytics adaptor
pub struct HttpProvisioner {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProvisioner {
    /// Create a provisioner for the adaptor at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a provisioner reusing an HTTP client
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn unreachable(&self, e: reqwest::Error) -> Error {
        Error::Transport(format!("analytics adaptor at {} unreachable: {}", self.base_url, e))
    }
}

#[async_trait]
impl ChannelProvisioner for HttpProvisioner {
    async fn create_channel(&self, patient_id: EntityId) -> Result<ChannelInfo> {
        let response = self
            .client
            .post(format!("{}/channels", self.base_url))
            .json(&json!({ "patientID": patient_id }))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "error creating channel for patient with ID {}: {} {}",
                patient_id, status, text
            )));
        }

        let channel: ChannelInfo = response.json().await.map_err(|e| self.unreachable(e))?;
        info!(
            "Opened channel {:?} for patient with ID {}",
            channel.channel_id, patient_id
        );
        Ok(channel)
    }

    async fn delete_channel(&self, patient_id: EntityId) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/channels/{}", self.base_url, patient_id))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "error deleting channel for patient with ID {}: {} {}",
                patient_id, status, text
            )));
        }

        debug!("Closed channel for patient with ID {}", patient_id);
        Ok(())
    }
}
