//! ==============================================================================
//! ingest.rs - message routing into the document store
//! ==============================================================================
//!
//! purpose:
//!     stands in for the broker + routing rule. a message published on the
//!     routed channel becomes a StoredRecord:
//!
//! ```text
//!         payload bytes ──base64──▶ Body
//!         arrival time  ──────────▶ _ts (epoch seconds)
//!
//!     the node also exposes its store read-only so a backend elsewhere can
//!     use it through store::RemoteStore.
//! ```
//!
//! routes:
//!     POST /messages/:channel
//!     GET  /records/latest
//!     GET  /records?from=<s>&to=<s>
//!     GET  /health
//!
//! relationships:
//!     - used by: main.rs (ingest / all-in-one roles)
//!     - used by: sink.rs (StoreSink reuses route_message)
//!     - serves: store/remote.rs
//!
//! ==============================================================================

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::domain::StoredRecord;
use crate::error::ApiError;
use crate::store::{RecordStore, StoreError};

#[derive(Clone)]
pub struct IngestState {
    pub store: Arc<dyn RecordStore>,
    /// the only channel that lands in the store
    pub channel: String,
}

pub fn router(store: Arc<dyn RecordStore>, channel: &str) -> Router {
    routes().with_state(IngestState {
        store,
        channel: channel.to_string(),
    })
}

pub fn routes() -> Router<IngestState> {
    Router::new()
        .route("/messages/:channel", post(receive_message))
        .route("/records/latest", get(latest_record))
        .route("/records", get(records_between))
        .route("/health", get(health))
}

/// wrap and store one message, stamped with the current time
pub async fn route_message(
    store: &dyn RecordStore,
    payload: &[u8],
) -> Result<StoredRecord, StoreError> {
    let record = StoredRecord::from_payload(payload, Utc::now().timestamp());
    let stored = store.insert(record).await?;
    tracing::debug!(id = ?stored.id, ts = stored.ts, "record stored");
    Ok(stored)
}

async fn receive_message(
    State(state): State<IngestState>,
    Path(channel): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    if channel != state.channel {
        return Err(ApiError::NotFound(format!("no route for channel {channel}")));
    }
    let stored = route_message(state.store.as_ref(), &body).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "id": stored.id, "_ts": stored.ts }))).into_response())
}

async fn latest_record(State(state): State<IngestState>) -> Result<Response, ApiError> {
    Ok(match state.store.latest().await? {
        Some(record) => Json(record).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

#[derive(Deserialize)]
struct RecordRange {
    from: f64,
    to: f64,
}

async fn records_between(
    State(state): State<IngestState>,
    Query(range): Query<RecordRange>,
) -> Result<Json<Vec<StoredRecord>>, ApiError> {
    Ok(Json(state.store.between(range.from, range.to).await?))
}

async fn health(State(state): State<IngestState>) -> Result<StatusCode, ApiError> {
    state.store.ping().await?;
    Ok(StatusCode::OK)
}
