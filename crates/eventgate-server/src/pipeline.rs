//! Ingestion pipeline: validate, enrich, hand off.
//!
//! `accept` never waits on the durable log. An `Ok` id means the envelope
//! was queued for delivery; delivery failures after that point only show up
//! in the producer's logs.

use chrono::{DateTime, Utc};
use eventgate_broker::{Publish, PublishError};
use eventgate_types::{format_timestamp, EventEnvelope, IngestRequest, ValidationError};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Why a request was not accepted.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Client-caused; nothing was published.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The envelope could not be encoded.
    #[error("failed to serialize envelope: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The publish queue refused the envelope.
    #[error("publish unavailable: {0}")]
    Unavailable(#[from] PublishError),
}

/// Issues arrival timestamps that never go backwards within the process.
///
/// A wall clock that steps back yields the previous stamp again instead of
/// an earlier one.
#[derive(Debug, Default)]
pub struct ArrivalClock {
    last_ms: AtomicI64,
}

impl ArrivalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamps the current instant.
    pub fn stamp(&self) -> String {
        self.stamp_at(Utc::now())
    }

    fn stamp_at(&self, now: DateTime<Utc>) -> String {
        let now_ms = now.timestamp_millis();
        let previous = self.last_ms.fetch_max(now_ms, Ordering::AcqRel);
        let issued = DateTime::from_timestamp_millis(previous.max(now_ms)).unwrap_or(now);
        format_timestamp(issued)
    }
}

/// Validates requests and publishes their envelopes.
pub struct IngestPipeline {
    publisher: Arc<dyn Publish>,
    clock: ArrivalClock,
    channel: String,
}

impl IngestPipeline {
    pub fn new(publisher: Arc<dyn Publish>, channel: impl Into<String>) -> Self {
        Self {
            publisher,
            clock: ArrivalClock::new(),
            channel: channel.into(),
        }
    }

    /// Binds a raw JSON body, then runs [`accept`](Self::accept).
    ///
    /// # Errors
    ///
    /// `IngestError::Validation` with `InvalidBody` when the body does not
    /// bind; otherwise as for `accept`.
    pub fn accept_json(&self, body: &[u8]) -> Result<Uuid, IngestError> {
        let request = IngestRequest::from_slice(body)?;
        self.accept(request)
    }

    /// Validates `request`, wraps it in a fresh envelope, and publishes it.
    ///
    /// Exactly one publish call is made for a valid request and none for an
    /// invalid one.
    ///
    /// # Errors
    ///
    /// - `IngestError::Validation` if `source` is empty or `payload.text` is missing.
    /// - `IngestError::Serialization` if the envelope cannot be encoded.
    /// - `IngestError::Unavailable` if the publish queue is full or closed.
    pub fn accept(&self, request: IngestRequest) -> Result<Uuid, IngestError> {
        request.validate()?;

        let envelope = EventEnvelope::new(request, self.clock.stamp());
        let bytes = serde_json::to_vec(&envelope)?;

        if let Err(e) = self.publisher.publish(&self.channel, bytes) {
            tracing::warn!(id = %envelope.id, error = %e, "envelope not queued");
            return Err(e.into());
        }

        tracing::debug!(
            id = %envelope.id,
            source = %envelope.source,
            timestamp = %envelope.timestamp,
            "event accepted"
        );
        Ok(envelope.id)
    }
}
