//! ==============================================================================
//! api.rs - query backend
//! ==============================================================================
//!
//! purpose:
//!     the two read endpoints the dashboard polls:
//!
//! ```text
//!     GET /latest-data
//!         newest record by ingestion time, body decoded, returned verbatim
//!
//!     GET /data-between?startEpoch=<ms>&endEpoch=<ms>
//!         every record ingested in [start, end], folded into three series
//!
//!     both are stateless; the only shared thing is the store handle.
//! ```
//!
//! relationships:
//!     - uses: store (RecordStore trait object)
//!     - uses: domain.rs (record decoding, series building)
//!     - uses: error.rs (status mapping)
//!     - used by: main.rs (serve / all-in-one roles)
//!
//! ==============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::domain::{build_series, Series};
use crate::error::ApiError;
use crate::store::RecordStore;

pub const NO_DATA: &str = "No data found";
pub const NO_DATA_IN_RANGE: &str = "No data found within the given time range";
pub const MISSING_RANGE: &str = "Both startEpoch and endEpoch are required";
pub const INVALID_RANGE: &str = "startEpoch and endEpoch must be valid numbers";

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn RecordStore>,
}

/// backend routes; the trailing-slash variants are what browsers tend to hit
pub fn router(store: Arc<dyn RecordStore>) -> Router {
    routes().with_state(ApiState { store })
}

/// routes without state, for merging into a bigger router
pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/latest-data", get(latest_data))
        .route("/latest-data/", get(latest_data))
        .route("/data-between", get(data_between))
        .route("/data-between/", get(data_between))
        .layer(CorsLayer::permissive())
}

/// GET /latest-data
async fn latest_data(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let record = state
        .store
        .latest()
        .await?
        .ok_or_else(|| ApiError::NotFound(NO_DATA.to_string()))?;

    let reading = record.decode_body().map_err(ApiError::internal)?;
    Ok(Json(reading))
}

/// GET /data-between
async fn data_between(
    State(state): State<ApiState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Series>>, ApiError> {
    let (start, end) = parse_range(&params)?;
    tracing::debug!(start, end, "range query");

    // only /latest-data reports an unreachable store as 503
    let records = state
        .store
        .between(start, end)
        .await
        .map_err(ApiError::internal)?;

    if records.is_empty() {
        return Err(ApiError::NotFound(NO_DATA_IN_RANGE.to_string()));
    }

    let readings = records
        .iter()
        .map(|r| r.decode_body())
        .collect::<Result<Vec<_>, _>>()
        .map_err(ApiError::internal)?;

    Ok(Json(build_series(&readings)))
}

/// millisecond query params -> second bounds, unrounded
pub fn parse_range(params: &HashMap<String, String>) -> Result<(f64, f64), ApiError> {
    let present = |key: &str| params.get(key).filter(|v| !v.is_empty());

    let (Some(start), Some(end)) = (present("startEpoch"), present("endEpoch")) else {
        return Err(ApiError::BadRequest(MISSING_RANGE.to_string()));
    };

    match (parse_epoch(start), parse_epoch(end)) {
        (Some(start_ms), Some(end_ms)) => Ok((start_ms / 1000.0, end_ms / 1000.0)),
        _ => Err(ApiError::BadRequest(INVALID_RANGE.to_string())),
    }
}

/// lenient numeric parse: whitespace-only reads as 0, NaN is rejected
fn parse_epoch(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    trimmed.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// log whether the store answers; never fatal
pub async fn health_check(store: &dyn RecordStore) {
    match store.ping().await {
        Ok(()) => tracing::info!("store {} is accessible", store.describe()),
        Err(e) => tracing::error!("health check failed for {}: {}", store.describe(), e),
    }
}

/// bind 0.0.0.0:`port`; done before anything else starts so a taken port fails fast
pub async fn bind(port: u16) -> Result<TcpListener> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    Ok(listener)
}

/// serve until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn range_requires_both_bounds() {
        for p in [
            params(&[("startEpoch", "1000")]),
            params(&[("endEpoch", "1000")]),
            params(&[("startEpoch", ""), ("endEpoch", "1000")]),
            params(&[]),
        ] {
            assert!(matches!(parse_range(&p), Err(ApiError::BadRequest(m)) if m == MISSING_RANGE));
        }
    }

    #[test]
    fn range_rejects_non_numbers() {
        let p = params(&[("startEpoch", "yesterday"), ("endEpoch", "1000")]);
        assert!(matches!(parse_range(&p), Err(ApiError::BadRequest(m)) if m == INVALID_RANGE));

        let p = params(&[("startEpoch", "1000"), ("endEpoch", "NaN")]);
        assert!(matches!(parse_range(&p), Err(ApiError::BadRequest(m)) if m == INVALID_RANGE));
    }

    #[test]
    fn range_divides_without_rounding() {
        let p = params(&[("startEpoch", "1731664800500"), ("endEpoch", " 1731664801999 ")]);
        let (start, end) = parse_range(&p).unwrap();
        assert_eq!(start, 1_731_664_800.5);
        assert_eq!(end, 1_731_664_801.999);
    }

    #[test]
    fn zero_bounds_are_valid() {
        let p = params(&[("startEpoch", "0"), ("endEpoch", "0")]);
        assert_eq!(parse_range(&p).unwrap(), (0.0, 0.0));
    }

    #[tokio::test]
    async fn taken_port_fails_at_bind() {
        let held = bind(0).await.unwrap();
        let port = held.local_addr().unwrap().port();

        let err = bind(port).await.unwrap_err();
        assert!(err.to_string().contains(&format!("failed to bind port {port}")));
    }
}
