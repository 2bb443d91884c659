//! Store connection layer for the eventgate gateway.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization
//! and bounded connect-with-ping. The schema of the `events` collection
//! lives with its queries in `eventgate-events`.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: concurrent readers (listing, stats, every
//!   live-tail session) with a single writer.
//! - **`r2d2` connection pool**: one process-wide pool, shared by all
//!   request handlers without further locking.

mod connect;
mod pool;

pub use connect::{connect, ping, ConnectError};
pub use pool::{create_pool, database_path, DbPool, DbRuntimeSettings, PoolError, IN_MEMORY};
