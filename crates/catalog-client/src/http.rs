//! HTTP client for the catalog

use async_trait::async_trait;
use catalog_registry::{CatalogApi, ClientConfig, Error, Record, Result};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Catalog reached over its HTTP API
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpCatalog {
    /// Create a client for the catalog at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an HTTP client
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Create a client from configuration
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.catalog_url.clone())
    }

    /// Catalog base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url<R: Record>(&self) -> String {
        format!("{}/{}", self.base_url, R::COLLECTION)
    }

    fn record_url<R: Record>(&self, id: &R::Id) -> String {
        format!("{}/{}/{}", self.base_url, R::COLLECTION, id)
    }

    /// Payload under `key` of a JSON response
    async fn unwrap_json<T: serde::de::DeserializeOwned>(response: Response, key: &str) -> Result<T> {
        let mut body: Value = response.json().await.map_err(transport)?;
        let payload = body
            .get_mut(key)
            .map(Value::take)
            .ok_or_else(|| Error::Transport(format!("catalog response is missing '{}'", key)))?;
        serde_json::from_value(payload)
            .map_err(|e| Error::Transport(format!("unexpected '{}' payload from catalog: {}", key, e)))
    }
}

#[async_trait]
impl CatalogApi for HttpCatalog {
    async fn list_records<R: Record>(&self) -> Result<Vec<R>> {
        let url = self.collection_url::<R>();
        debug!("GET {}", url);
        let response = check(self.client.get(&url).send().await.map_err(transport)?).await?;
        Self::unwrap_json(response, R::COLLECTION.as_str()).await
    }

    async fn get_record<R: Record>(&self, id: &R::Id) -> Result<R> {
        let url = self.record_url::<R>(id);
        debug!("GET {}", url);
        let response = check(self.client.get(&url).send().await.map_err(transport)?).await?;
        Self::unwrap_json(response, R::COLLECTION.singular()).await
    }

    async fn create_record<R: Record>(&self, record: &R) -> Result<String> {
        let url = self.collection_url::<R>();
        debug!("POST {}", url);
        let request = self.client.post(&url).json(record);
        let response = check(request.send().await.map_err(transport)?).await?;
        response.text().await.map_err(transport)
    }

    async fn update_record<R: Record>(&self, record: &R) -> Result<String> {
        let url = self.collection_url::<R>();
        debug!("PUT {}", url);
        let request = self.client.put(&url).json(record);
        let response = check(request.send().await.map_err(transport)?).await?;
        response.text().await.map_err(transport)
    }

    async fn delete_record<R: Record>(&self, id: &R::Id) -> Result<String> {
        let url = self.record_url::<R>(id);
        debug!("DELETE {}", url);
        let response = check(self.client.delete(&url).send().await.map_err(transport)?).await?;
        response.text().await.map_err(transport)
    }
}

fn transport(e: reqwest::Error) -> Error {
    Error::Transport(e.to_string())
}

/// Turn an error response back into a registry error
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };
    Err(error_from_status(status, message))
}

fn error_from_status(status: StatusCode, message: String) -> Error {
    let strip = |affix: &str, prefix: bool| {
        let stripped = if prefix {
            message.strip_prefix(affix)
        } else {
            message.strip_suffix(affix)
        };
        stripped.unwrap_or(&message).to_string()
    };

    match status {
        StatusCode::BAD_REQUEST => Error::Validation(strip("Invalid request: ", true)),
        StatusCode::NOT_FOUND => Error::NotFound(strip(" not found", false)),
        StatusCode::CONFLICT => Error::Conflict(strip(" already exists", false)),
        _ => Error::Transport(format!("catalog returned {}: {}", status, message)),
    }
}
