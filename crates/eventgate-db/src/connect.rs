//! Bounded connection establishment with a liveness check.
//!
//! A connection attempt builds the pool, checks out one connection and
//! pings it. An attempt that cannot be pinged counts as failed.

use eventgate_types::RetryPolicy;
use thiserror::Error;

use crate::pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};

/// Errors raised while connecting to the store.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The pool could not be built.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// No connection could be checked out of the pool.
    #[error("failed to check out a store connection: {0}")]
    Checkout(#[from] r2d2::Error),

    /// The liveness query failed.
    #[error("store ping failed: {0}")]
    Ping(#[from] rusqlite::Error),

    /// Every attempt in the retry budget failed.
    #[error("store unreachable after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// The error of the final attempt.
        last: Box<ConnectError>,
    },
}

/// Checks that a pooled connection answers a trivial query.
///
/// # Errors
///
/// Returns `ConnectError::Checkout` or `ConnectError::Ping`.
pub fn ping(pool: &DbPool) -> Result<(), ConnectError> {
    let conn = pool.get()?;
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
    Ok(())
}

/// Connects to the store, retrying within the given budget.
///
/// Blocks the calling thread while sleeping between attempts; call it from
/// `spawn_blocking` in async contexts.
///
/// # Errors
///
/// Returns `ConnectError::Exhausted` carrying the last failure once
/// `retry.attempts` attempts have failed.
pub fn connect(
    db_path: &str,
    settings: DbRuntimeSettings,
    retry: RetryPolicy,
) -> Result<DbPool, ConnectError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = create_pool(db_path, settings)
            .map_err(ConnectError::from)
            .and_then(|pool| {
                ping(&pool)?;
                Ok(pool)
            });

        match result {
            Ok(pool) => {
                tracing::info!(path = db_path, attempt, "store connected");
                return Ok(pool);
            }
            Err(e) if retry.is_last(attempt) => {
                return Err(ConnectError::Exhausted {
                    attempts: attempt,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                tracing::warn!(
                    path = db_path,
                    attempt,
                    attempts = retry.attempts,
                    error = %e,
                    "waiting for store"
                );
                std::thread::sleep(retry.interval);
            }
        }
    }
}
