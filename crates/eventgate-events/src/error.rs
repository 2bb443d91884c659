//! Error types for the events collection.

/// Errors that can occur during event collection operations.
#[derive(Debug, thiserror::Error)]
pub enum EventsError {
    /// A database operation failed.
    #[error("events database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored document could not be encoded or decoded.
    #[error("events serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
