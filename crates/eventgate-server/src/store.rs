//! Async access to the document store with per-call deadlines.
//!
//! Every query runs on the blocking pool; the caller's deadline bounds how
//! long it waits for the result. A query that overruns is abandoned, not
//! cancelled: the blocking task finishes on its own and its result is
//! dropped.

use eventgate_db::DbPool;
use eventgate_events::EventsError;
use eventgate_types::{StoredEvent, Summary};
use rusqlite::Connection;
use std::time::Duration;
use thiserror::Error;

/// Deadline for the one-shot recent-events listing.
pub const LIST_DEADLINE: Duration = Duration::from_secs(5);

/// Deadline for the aggregation rollups.
pub const STATS_DEADLINE: Duration = Duration::from_secs(10);

/// Failure of one store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The operation did not finish before its deadline.
    #[error("store query exceeded {0:?}")]
    Timeout(Duration),

    /// No pooled connection became available.
    #[error("store connection unavailable: {0}")]
    Pool(#[from] r2d2::Error),

    /// The query itself failed.
    #[error(transparent)]
    Events(#[from] EventsError),

    /// The blocking task panicked or was cancelled.
    #[error("store task failed: {0}")]
    Join(String),
}

/// Shared handle to the `events` collection.
///
/// Cheap to clone; every clone uses the same pool.
#[derive(Clone)]
pub struct StoreClient {
    pool: DbPool,
}

impl StoreClient {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Runs `op` against a pooled connection, waiting at most `deadline`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Timeout` when the deadline passes first, or the
    /// error of `op`.
    pub async fn run<T, F>(&self, deadline: Duration, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, EventsError> + Send + 'static,
    {
        let pool = self.pool.clone();
        let task = tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            op(&conn).map_err(StoreError::from)
        });

        match tokio::time::timeout(deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(StoreError::Join(join.to_string())),
            Err(_) => Err(StoreError::Timeout(deadline)),
        }
    }

    /// Creates the descending `timestamp` index.
    ///
    /// # Errors
    ///
    /// Returns the store error; callers treat it as non-fatal.
    pub async fn ensure_index(&self) -> Result<(), StoreError> {
        self.run(LIST_DEADLINE, eventgate_events::ensure_index).await
    }

    /// The `limit` most recent events, newest first.
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<StoredEvent>, StoreError> {
        self.run(LIST_DEADLINE, move |conn| {
            eventgate_events::list_recent(conn, limit)
        })
        .await
    }

    /// Events strictly after `cursor`, oldest first.
    pub async fn list_after(
        &self,
        cursor: Option<String>,
        limit: usize,
        deadline: Duration,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        self.run(deadline, move |conn| {
            eventgate_events::list_after(conn, cursor.as_deref(), limit)
        })
        .await
    }

    /// Both rollups over the full collection.
    pub async fn summarize(&self) -> Result<Summary, StoreError> {
        self.run(STATS_DEADLINE, eventgate_events::summarize).await
    }
}
