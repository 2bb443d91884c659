//! Shared types, error definitions, and constants for the eventgate gateway.
//!
//! This crate provides the records that flow through the system: the
//! caller-supplied [`IngestRequest`], the [`EventEnvelope`] handed to the
//! durable log, and the [`StoredEvent`] read back from the document store,
//! plus the [`Summary`] produced by the aggregation engine.
//!
//! No crate in the workspace depends on anything *except* `eventgate-types`
//! for cross-cutting type definitions. This keeps the dependency graph clean
//! and prevents circular dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

mod retry;
mod summary;

pub use retry::RetryPolicy;
pub use summary::{Sentiment, SentimentBreakdown, SourceCount, Summary};

/// Log channel that receives every accepted envelope.
pub const RAW_EVENTS_CHANNEL: &str = "raw_events";

/// Payload key that downstream enrichment reads; required on every request.
pub const TEXT_KEY: &str = "text";

/// `strftime` pattern for envelope timestamps.
///
/// RFC 3339, UTC, millisecond precision. Every rendered value has the same
/// width, so lexical order of the strings is chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Renders an instant in the canonical envelope timestamp format.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Client-caused rejection of an ingest request.
///
/// Raised before any side effect takes place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The body is not JSON, or lacks `source` / `payload`, or has the wrong shape.
    #[error("{0}")]
    InvalidBody(String),

    /// `source` is present but empty.
    #[error("source must not be empty")]
    EmptySource,

    /// `payload` has no `text` key.
    #[error("payload must contain a 'text' field")]
    MissingText,
}

impl ValidationError {
    /// Stable machine-readable reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidBody(_) => "invalid_body",
            Self::EmptySource => "empty_source",
            Self::MissingText => "missing_text",
        }
    }
}

/// An event as submitted by an external caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    /// Free-form name of the producing system.
    pub source: String,
    /// Opaque event body. Must contain [`TEXT_KEY`].
    pub payload: Map<String, Value>,
}

impl IngestRequest {
    /// Binds a raw request body (structural validation stage).
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidBody`] if the body is not a JSON
    /// object with a string `source` and an object `payload`.
    pub fn from_slice(body: &[u8]) -> Result<Self, ValidationError> {
        serde_json::from_slice(body).map_err(|e| ValidationError::InvalidBody(e.to_string()))
    }

    /// Checks the field and domain preconditions, in that order.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptySource`] or
    /// [`ValidationError::MissingText`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.source.is_empty() {
            return Err(ValidationError::EmptySource);
        }
        if !self.payload.contains_key(TEXT_KEY) {
            return Err(ValidationError::MissingText);
        }
        Ok(())
    }
}

/// The canonical record handed to the durable log.
///
/// Created once per accepted request and serialized exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Globally unique identifier assigned at accept time.
    pub id: Uuid,
    /// Copied from the request.
    pub source: String,
    /// Copied from the request, opaque to the gateway.
    pub payload: Map<String, Value>,
    /// Acceptance instant, see [`TIMESTAMP_FORMAT`].
    pub timestamp: String,
}

impl EventEnvelope {
    /// Wraps a validated request with a fresh identifier.
    pub fn new(request: IngestRequest, timestamp: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: request.source,
            payload: request.payload,
            timestamp,
        }
    }
}

/// Enrichment attached to a stored event by the out-of-band consumer.
///
/// The enrichment stage owns this document, so decoding never fails on
/// it: a `sentiment` that is not a string or a `score` that is not a
/// number leaves the typed field empty and keeps the raw value in
/// [`extra`](Self::extra).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct Analysis {
    /// Sentiment label, normally one of [`Sentiment`]'s labels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    /// Numeric sentiment score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Any further fields the enrichment stage recorded.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Map<String, Value>> for Analysis {
    fn from(mut fields: Map<String, Value>) -> Self {
        let sentiment = take_typed(&mut fields, "sentiment", |v| v.as_str().map(str::to_owned));
        let score = take_typed(&mut fields, "score", Value::as_f64);
        Self {
            sentiment,
            score,
            extra: fields,
        }
    }
}

/// Removes `key` if it converts; a non-null value of the wrong type stays put.
fn take_typed<T>(
    fields: &mut Map<String, Value>,
    key: &str,
    convert: impl FnOnce(&Value) -> Option<T>,
) -> Option<T> {
    let value = fields.remove(key)?;
    let typed = convert(&value);
    if typed.is_none() && !value.is_null() {
        fields.insert(key.to_string(), value);
    }
    typed
}

/// An event document as persisted in the `events` collection.
///
/// Read-only to the gateway: a superset of [`EventEnvelope`] whose
/// `analysis` may be absent at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Identifier assigned by the gateway at accept time.
    pub id: String,
    /// Producer of the event, as submitted.
    pub source: String,
    /// Submitted payload, always carrying a `text` key.
    pub payload: Map<String, Value>,
    /// Enrichment result, absent until the enrichment stage lands it.
    #[serde(default)]
    pub analysis: Option<Analysis>,
    /// Acceptance instant, see [`TIMESTAMP_FORMAT`].
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn timestamp_format_is_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_timestamp(whole), "2026-01-02T03:04:05.000Z");

        let fractional = whole + chrono::Duration::milliseconds(7);
        assert_eq!(format_timestamp(fractional), "2026-01-02T03:04:05.007Z");
        assert!(format_timestamp(whole) < format_timestamp(fractional));
    }

    #[test]
    fn from_slice_rejects_missing_fields() {
        let missing_source = IngestRequest::from_slice(br#"{"payload":{"text":"hi"}}"#);
        assert!(matches!(missing_source, Err(ValidationError::InvalidBody(_))));

        let missing_payload = IngestRequest::from_slice(br#"{"source":"cli"}"#);
        assert!(matches!(missing_payload, Err(ValidationError::InvalidBody(_))));

        let null_payload = IngestRequest::from_slice(br#"{"source":"cli","payload":null}"#);
        assert!(matches!(null_payload, Err(ValidationError::InvalidBody(_))));

        let not_json = IngestRequest::from_slice(b"source=cli");
        assert!(matches!(not_json, Err(ValidationError::InvalidBody(_))));
    }

    #[test]
    fn validate_checks_source_before_text() {
        let req = IngestRequest::from_slice(br#"{"source":"","payload":{}}"#).unwrap();
        assert_eq!(req.validate(), Err(ValidationError::EmptySource));

        let req = IngestRequest::from_slice(br#"{"source":"cli","payload":{"body":1}}"#).unwrap();
        assert_eq!(req.validate(), Err(ValidationError::MissingText));

        let req =
            IngestRequest::from_slice(br#"{"source":"cli","payload":{"text":null}}"#).unwrap();
        assert_eq!(req.validate(), Ok(()), "presence of the key is enough");
    }

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(ValidationError::InvalidBody("x".into()).reason(), "invalid_body");
        assert_eq!(ValidationError::EmptySource.reason(), "empty_source");
        assert_eq!(ValidationError::MissingText.reason(), "missing_text");
    }

    #[test]
    fn envelope_serializes_id_as_string() {
        let req = IngestRequest::from_slice(br#"{"source":"cli","payload":{"text":"hi"}}"#).unwrap();
        let envelope = EventEnvelope::new(req, "2026-01-02T03:04:05.000Z".into());
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["id"], json!(envelope.id.to_string()));
        assert_eq!(value["source"], "cli");
        assert_eq!(value["payload"]["text"], "hi");
        assert_eq!(value["timestamp"], "2026-01-02T03:04:05.000Z");
    }

    #[test]
    fn stored_event_tolerates_missing_and_partial_analysis() {
        let bare: StoredEvent = serde_json::from_value(json!({
            "id": "a", "source": "s", "payload": {"text": "t"}, "timestamp": "x"
        }))
        .unwrap();
        assert_eq!(bare.analysis, None);

        let partial: StoredEvent = serde_json::from_value(json!({
            "id": "b", "source": "s", "payload": {"text": "t"}, "timestamp": "x",
            "analysis": {"sentiment": "Neutral", "score": null, "processing_time_ms": 1.5}
        }))
        .unwrap();
        let analysis = partial.analysis.unwrap();
        assert_eq!(analysis.sentiment.as_deref(), Some("Neutral"));
        assert_eq!(analysis.score, None);
        assert_eq!(analysis.extra["processing_time_ms"], json!(1.5));
        assert!(!analysis.extra.contains_key("score"));
    }

    #[test]
    fn analysis_with_wrong_field_types_still_decodes() {
        let analysis: Analysis = serde_json::from_value(json!({
            "sentiment": 3, "score": "high", "model": "v2"
        }))
        .unwrap();

        assert_eq!(analysis.sentiment, None);
        assert_eq!(analysis.score, None);
        assert_eq!(analysis.extra["score"], "high");
        assert_eq!(analysis.extra["sentiment"], 3);

        let back = serde_json::to_value(&analysis).unwrap();
        assert_eq!(back, json!({"sentiment": 3, "score": "high", "model": "v2"}));
    }

    #[test]
    fn analysis_accepts_integer_scores() {
        let analysis: Analysis =
            serde_json::from_value(json!({"sentiment": "Positive", "score": 1})).unwrap();
        assert_eq!(analysis.score, Some(1.0));
        assert!(analysis.extra.is_empty());
    }
}
