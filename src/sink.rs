//! ==============================================================================
//! sink.rs - where the simulator's messages go
//! ==============================================================================
//!
//! purpose:
//!     a module output: `send_output_event(channel, payload)`.
//!
//! ```text
//!     - HttpSink: pushes to an ingest node (spoke -> hub)
//!     - StoreSink: ingests straight into a local store (all-in-one)
//! ```
//!
//! relationships:
//!     - used by: simulator.rs (publish loop)
//!     - uses: ingest.rs (StoreSink shares the routing step)
//!     - uses: reqwest (HttpSink)
//!
//! ==============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::ingest;
use crate::store::{RecordStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("message rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("channel {0} is not routed")]
    Unrouted(String),
}

#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send_output_event(&self, channel: &str, payload: Vec<u8>) -> Result<(), SinkError>;
}

/// posts each message to `{hub_url}/messages/{channel}`
pub struct HttpSink {
    hub_url: String,
    client: reqwest::Client,
}

impl HttpSink {
    fn new(hub_url: &str) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        Ok(Self {
            hub_url: hub_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// open the transport: the hub must answer `GET /health` before anything is published
    pub async fn connect(hub_url: &str) -> Result<Self, SinkError> {
        let sink = Self::new(hub_url)?;
        let response = sink
            .client
            .get(format!("{}/health", sink.hub_url))
            .send()
            .await
            .map_err(|e| SinkError::Transport(format!("{}: {}", sink.hub_url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(sink)
    }
}

#[async_trait]
impl MessageSink for HttpSink {
    async fn send_output_event(&self, channel: &str, payload: Vec<u8>) -> Result<(), SinkError> {
        let response = self
            .client
            .post(format!("{}/messages/{}", self.hub_url, channel))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// in-process routing: only `channel` lands in the store
pub struct StoreSink {
    store: Arc<dyn RecordStore>,
    channel: String,
}

impl StoreSink {
    pub fn new(store: Arc<dyn RecordStore>, channel: &str) -> Self {
        Self {
            store,
            channel: channel.to_string(),
        }
    }
}

#[async_trait]
impl MessageSink for StoreSink {
    async fn send_output_event(&self, channel: &str, payload: Vec<u8>) -> Result<(), SinkError> {
        if channel != self.channel {
            return Err(SinkError::Unrouted(channel.to_string()));
        }
        ingest::route_message(self.store.as_ref(), &payload).await?;
        Ok(())
    }
}

/// keeps every message in memory
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSink {
    sent: std::sync::Mutex<Vec<(String, Vec<u8>)>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn sent(&self) -> Vec<(String, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl MessageSink for RecordingSink {
    async fn send_output_event(&self, channel: &str, payload: Vec<u8>) -> Result<(), SinkError> {
        self.sent.lock().unwrap().push((channel.to_string(), payload));
        Ok(())
    }
}
