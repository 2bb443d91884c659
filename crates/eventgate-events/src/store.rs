//! Persistence operations for stored event documents.
//!
//! Reads go through [`list_recent`] and [`list_after`]; both decode the
//! JSON columns back into [`StoredEvent`] values. Ties on `timestamp` are
//! ordered by `id` so a given snapshot always reads back the same way.
//! A row whose payload cannot be decoded is logged and skipped rather than
//! failing the rest of the read.

use eventgate_types::{Analysis, StoredEvent};
use rusqlite::{params, Connection};

use crate::error::EventsError;

/// Name of the descending index on `timestamp`.
pub const TIMESTAMP_INDEX: &str = "idx_events_timestamp_desc";

const SCHEMA: &str = include_str!("schema.sql");

/// Creates the `events` table if it does not exist yet.
///
/// Safe to call on every startup; an existing table and its rows are left
/// untouched.
///
/// # Errors
///
/// Returns `EventsError::Database` on SQL failure.
pub fn ensure_schema(conn: &Connection) -> Result<(), EventsError> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Creates the descending `timestamp` index if it does not exist yet.
///
/// Safe to call on every startup.
///
/// # Errors
///
/// Returns `EventsError::Database` on SQL failure.
pub fn ensure_index(conn: &Connection) -> Result<(), EventsError> {
    conn.execute_batch(&format!(
        "CREATE INDEX IF NOT EXISTS {TIMESTAMP_INDEX} ON events (timestamp DESC);"
    ))?;
    tracing::debug!(index = TIMESTAMP_INDEX, "timestamp index ensured");
    Ok(())
}

/// Writes a stored event, replacing any earlier version with the same id.
///
/// This is how enrichment results are merged into the collection.
///
/// # Errors
///
/// Returns `EventsError::Serialization` if the payload or analysis cannot be
/// encoded, or `EventsError::Database` on SQL failure.
pub fn insert_event(conn: &Connection, event: &StoredEvent) -> Result<(), EventsError> {
    let payload_json = serde_json::to_string(&event.payload)?;
    let analysis_json = event
        .analysis
        .as_ref()
        .map(|analysis| serde_json::to_string(analysis))
        .transpose()?;

    conn.execute(
        "INSERT INTO events (id, source, payload_json, analysis_json, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            source = excluded.source,
            payload_json = excluded.payload_json,
            analysis_json = excluded.analysis_json,
            timestamp = excluded.timestamp",
        params![
            event.id,
            event.source,
            payload_json,
            analysis_json,
            event.timestamp
        ],
    )?;
    Ok(())
}

/// Returns up to `limit` events, most recent first.
///
/// # Errors
///
/// Returns `EventsError::Database` on SQL failure or
/// `EventsError::Serialization` if a stored document is malformed.
pub fn list_recent(conn: &Connection, limit: usize) -> Result<Vec<StoredEvent>, EventsError> {
    let mut stmt = conn.prepare(
        "SELECT id, source, payload_json, analysis_json, timestamp
         FROM events
         ORDER BY timestamp DESC, id DESC
         LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], RawEvent::from_row)?;
    collect(rows)
}

/// Returns up to `limit` events with `timestamp` strictly greater than
/// `cursor`, oldest first. A `None` cursor applies no lower bound.
///
/// # Errors
///
/// Returns `EventsError::Database` on SQL failure or
/// `EventsError::Serialization` if a stored document is malformed.
pub fn list_after(
    conn: &Connection,
    cursor: Option<&str>,
    limit: usize,
) -> Result<Vec<StoredEvent>, EventsError> {
    let mut stmt = conn.prepare(
        "SELECT id, source, payload_json, analysis_json, timestamp
         FROM events
         WHERE ?1 IS NULL OR timestamp > ?1
         ORDER BY timestamp ASC, id ASC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![cursor, limit as i64], RawEvent::from_row)?;
    collect(rows)
}

/// Looks up a single event by id.
#[cfg(test)]
pub(crate) fn find_event(conn: &Connection, id: &str) -> Result<Option<StoredEvent>, EventsError> {
    use rusqlite::OptionalExtension;

    conn.query_row(
        "SELECT id, source, payload_json, analysis_json, timestamp FROM events WHERE id = ?1",
        params![id],
        RawEvent::from_row,
    )
    .optional()?
    .map(RawEvent::decode)
    .transpose()
}

/// A row as read from SQLite, before the JSON columns are decoded.
struct RawEvent {
    id: String,
    source: String,
    payload_json: String,
    analysis_json: Option<String>,
    timestamp: String,
}

impl RawEvent {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source: row.get(1)?,
            payload_json: row.get(2)?,
            analysis_json: row.get(3)?,
            timestamp: row.get(4)?,
        })
    }

    /// Decodes the JSON columns.
    ///
    /// Only an unreadable payload fails the row. An unreadable analysis is
    /// logged and dropped, since enrichment is optional anyway.
    fn decode(self) -> Result<StoredEvent, EventsError> {
        let payload = serde_json::from_str(&self.payload_json)?;
        let analysis = match self.analysis_json.as_deref() {
            None => None,
            Some(json) => match serde_json::from_str::<Analysis>(json) {
                Ok(analysis) => Some(analysis),
                Err(e) => {
                    tracing::warn!(id = %self.id, error = %e, "ignoring undecodable analysis");
                    None
                }
            },
        };
        Ok(StoredEvent {
            id: self.id,
            source: self.source,
            payload,
            analysis,
            timestamp: self.timestamp,
        })
    }
}

/// Decodes a result set, skipping rows whose documents cannot be read.
///
/// A SQL error still fails the whole read.
fn collect(
    rows: impl Iterator<Item = rusqlite::Result<RawEvent>>,
) -> Result<Vec<StoredEvent>, EventsError> {
    let mut events = Vec::new();
    for row in rows {
        let raw = row?;
        let id = raw.id.clone();
        match raw.decode() {
            Ok(event) => events.push(event),
            Err(e) => tracing::warn!(%id, error = %e, "skipping undecodable stored event"),
        }
    }
    Ok(events)
}
