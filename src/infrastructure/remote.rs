use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::models::Dataset;
use crate::domain::mutation::MutationEnvelope;
use crate::error::RemoteError;

/// Remote acknowledgment of one submitted mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Ack {
    /// Authoritative dataset returned alongside the acknowledgment, if any.
    #[serde(default)]
    pub dataset: Option<Dataset>,
}

/// The server that local mutations are replayed to.
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    async fn submit(&self, envelope: &MutationEnvelope<'_>) -> Result<Ack, RemoteError>;

    async fn fetch_dataset(&self) -> Result<Dataset, RemoteError>;
}

/// JSON over HTTP: mutations are posted to `{endpoint}/{entity_type}` and the
/// full dataset is read from `{endpoint}/dataset`.
pub struct HttpRemoteAuthority {
    endpoint: String,
    client: reqwest::Client,
    timeout_ms: u64,
}

impl HttpRemoteAuthority {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn transport_error(&self, e: reqwest::Error) -> RemoteError {
        if e.is_timeout() {
            RemoteError::Timeout(self.timeout_ms)
        } else {
            RemoteError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl RemoteAuthority for HttpRemoteAuthority {
    async fn submit(&self, envelope: &MutationEnvelope<'_>) -> Result<Ack, RemoteError> {
        let url = format!("{}/{}", self.endpoint, envelope.entity_type.as_str());

        let response = self
            .client
            .post(&url)
            .json(envelope)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(map_http_error(status, &body));
        }

        // an empty or non-JSON 2xx body is still an acknowledgment
        Ok(serde_json::from_str(&body).unwrap_or_default())
    }

    async fn fetch_dataset(&self) -> Result<Dataset, RemoteError> {
        let url = format!("{}/dataset", self.endpoint);

        let response = self.client.get(&url).send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(map_http_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| RemoteError::Rejected {
            status: status.as_u16(),
            message: format!("malformed dataset: {e}"),
        })
    }
}

/// Map a non-success response onto a retryable or permanent error.
pub fn map_http_error(status: reqwest::StatusCode, body: &str) -> RemoteError {
    let message = if body.is_empty() {
        status.canonical_reason().unwrap_or("no response body").to_string()
    } else {
        body.chars().take(500).collect()
    };

    match status.as_u16() {
        408 | 429 => RemoteError::Unavailable { status: status.as_u16(), message },
        s if s >= 500 => RemoteError::Unavailable { status: s, message },
        s => RemoteError::Rejected { status: s, message },
    }
}
