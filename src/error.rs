//! http-facing error taxonomy. every handler returns `Result<_, ApiError>`
//! so nothing escapes the request boundary as a panic or a bare 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::store::StoreError;

pub const INTERNAL_MESSAGE: &str = "Internal Server Error";
pub const UNAVAILABLE_MESSAGE: &str = "Database connection failed";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// anything at all, reported as 500 with its message
    pub fn internal(e: impl std::fmt::Display) -> Self {
        ApiError::Internal(e.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// unreachable store -> 503, the rest -> 500
impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => ApiError::ServiceUnavailable(msg),
            other => ApiError::internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) => json!({ "message": msg }),
            ApiError::ServiceUnavailable(cause) => {
                tracing::warn!("store unreachable: {}", cause);
                json!({ "message": UNAVAILABLE_MESSAGE })
            }
            ApiError::Internal(cause) => {
                tracing::error!("request failed: {}", cause);
                json!({ "message": INTERNAL_MESSAGE, "error": cause })
            }
        };
        (status, Json(body)).into_response()
    }
}
