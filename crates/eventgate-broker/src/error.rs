//! Error types for the broker client.

use thiserror::Error;

/// Errors raised by transports and by producer startup.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The transport could not be configured.
    #[error("invalid broker configuration: {0}")]
    Config(String),

    /// No configured broker address answered.
    #[error("broker connection failed: {0}")]
    Connection(String),

    /// A message was not accepted by the log.
    #[error("broker send failed: {0}")]
    Send(String),

    /// Every attempt in the connect budget failed.
    #[error("broker unreachable after {attempts} attempts: {last}")]
    ConnectExhausted {
        /// Attempts made.
        attempts: u32,
        /// The error of the final attempt.
        last: Box<BrokerError>,
    },
}

/// Why a message could not be enqueued. Returned without waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PublishError {
    /// The bounded publish queue is at capacity.
    #[error("publish queue is full")]
    QueueFull,

    /// The producer is shutting down or has shut down.
    #[error("producer is closed")]
    Closed,
}
