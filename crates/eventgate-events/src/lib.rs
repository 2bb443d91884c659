//! The `events` collection of the eventgate document store.
//!
//! Stored events are written out of band by the enrichment consumer; the
//! gateway itself only reads them. This crate holds every statement the
//! gateway issues against the collection:
//!
//! | Operation | Used by |
//! |-----------|---------|
//! | [`ensure_schema`], [`ensure_index`] | startup |
//! | [`list_recent`] | recent-events listing (newest first) |
//! | [`list_after`] | live tail (ascending, strictly after a cursor) |
//! | [`summarize`], [`top_sources`] | aggregation engine |
//! | [`insert_event`] | out-of-band writers and test fixtures |
//!
//! # Usage
//!
//! ```rust,ignore
//! use eventgate_events::{list_after, summarize};
//!
//! let batch = list_after(&conn, Some("2026-10-18T09:30:00.000Z"), 50)?;
//! let summary = summarize(&conn)?;
//! ```

mod error;
mod rollup;
mod store;

pub use error::EventsError;
pub use rollup::{summarize, top_sources, TOP_SOURCES_LIMIT};
pub use store::{ensure_index, ensure_schema, insert_event, list_after, list_recent, TIMESTAMP_INDEX};
