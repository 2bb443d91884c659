//! JSON API handlers for the eventgate server.

use crate::pipeline::IngestError;
use crate::store::StoreError;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use eventgate_broker::PublishError;
use eventgate_types::{StoredEvent, Summary, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Most recent events returned by `GET /api/events`.
pub const RECENT_EVENTS_LIMIT: usize = 100;

/// Response body for an accepted event.
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    /// Always `"accepted"`.
    pub status: String,
    /// Identifier assigned to the envelope.
    pub id: Uuid,
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("failed to serialize envelope: {0}")]
    Marshal(String),
    #[error("publish unavailable: {0}")]
    PublishUnavailable(PublishError),
    #[error("store query timed out")]
    StoreTimeout,
    #[error("store error: {0}")]
    Store(String),
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Validation(v) => Self::Validation(v),
            IngestError::Serialization(s) => Self::Marshal(s.to_string()),
            IngestError::Unavailable(p) => Self::PublishUnavailable(p),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Timeout(_) => Self::StoreTimeout,
            other => Self::Store(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Validation(v) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "validation_failed",
                    "reason": v.reason(),
                    "details": v.to_string(),
                }),
            ),
            ApiError::Marshal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "marshal_failed" }),
            ),
            ApiError::PublishUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": "publish_unavailable" }),
            ),
            ApiError::StoreTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                json!({ "error": "store_timeout" }),
            ),
            ApiError::Store(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": msg }),
            ),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        }

        (status, Json(body)).into_response()
    }
}

/// Handler for `POST /ingest`.
///
/// The raw body is bound by the pipeline itself so that malformed JSON gets
/// the same structured rejection as a failed field check.
pub async fn ingest_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let id = state.pipeline.accept_json(&body)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            status: "accepted".to_string(),
            id,
        }),
    ))
}

/// Handler for `GET /api/events`.
///
/// Up to [`RECENT_EVENTS_LIMIT`] events, newest first.
pub async fn list_events_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<StoredEvent>>, ApiError> {
    let events = state.store.list_recent(RECENT_EVENTS_LIMIT).await?;
    Ok(Json(events))
}

/// Handler for `GET /api/stats`.
pub async fn stats_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Summary>, ApiError> {
    Ok(Json(state.stats.stats().await?))
}

/// Health check handler.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
