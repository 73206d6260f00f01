//! record store living on an ingest node, read over http.
//!
//! talks to the routes served by ingest.rs:
//!     GET /records/latest        -> 200 record | 204 empty
//!     GET /records?from=&to=     -> 200 [record, ...]
//!     GET /health                -> 200

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

use super::{RecordStore, StoreError};
use crate::domain::StoredRecord;

pub struct RemoteStore {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteStore {
    pub fn new(base_url: &str) -> Result<Self, StoreError> {
        Self::with_timeout(base_url, Duration::from_secs(10))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Backend(format!("failed to build http client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response, StoreError> {
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(StoreError::Unavailable(format!("{} answered {}", self.base_url, status)));
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Backend(format!("{} answered {}: {}", self.base_url, status, body)))
    }
}

// only a refused or failed connect means the store is down; a slow store is a backend error
fn transport_error(e: reqwest::Error) -> StoreError {
    if e.is_connect() {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Backend(e.to_string())
    }
}

#[async_trait]
impl RecordStore for RemoteStore {
    async fn insert(&self, _record: StoredRecord) -> Result<StoredRecord, StoreError> {
        // writes go through the ingest node's message route
        Err(StoreError::Backend(format!(
            "{} is read-only from here; publish to /messages instead",
            self.base_url
        )))
    }

    async fn latest(&self) -> Result<Option<StoredRecord>, StoreError> {
        let response = self.get("/records/latest", &[]).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let record = response
            .json::<StoredRecord>()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(Some(record))
    }

    async fn between(&self, start: f64, end: f64) -> Result<Vec<StoredRecord>, StoreError> {
        let query = [("from", start.to_string()), ("to", end.to_string())];
        self.get("/records", &query)
            .await?
            .json::<Vec<StoredRecord>>()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.get("/health", &[]).await.map(|_| ())
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}
