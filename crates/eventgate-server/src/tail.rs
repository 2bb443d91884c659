//! Live tail: turns repeated cursor queries into an ordered push feed.
//!
//! Each session owns a [`LiveTail`] holding its cursor, the highest
//! timestamp already emitted. Every tick asks an [`IncrementalReader`] for
//! records strictly after the cursor, emits them in ascending order, and
//! moves the cursor to the last one. A failed poll emits nothing and leaves
//! the cursor where it was, so the next tick picks up the same range.
//!
//! Records that share a timestamp across a batch boundary can be skipped,
//! because the next query excludes the cursor value itself.

use async_trait::async_trait;
use chrono::Utc;
use eventgate_types::{format_timestamp, StoredEvent};
use futures_util::{stream, Stream, StreamExt};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

use crate::store::{StoreClient, StoreError};

/// Shortest tick period [`LiveTail::into_stream`] will run at.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Source of records newer than a cursor.
///
/// The polling [`StoreReader`] is one implementation; a change-notification
/// feed could be another without touching [`LiveTail`].
#[async_trait]
pub trait IncrementalReader: Send + Sync {
    /// Up to `limit` records with `timestamp > cursor`, oldest first.
    /// With no cursor, the oldest `limit` records.
    async fn read_after(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, StoreError>;
}

/// Polling cadence and per-poll limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailSettings {
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub query_timeout: Duration,
}

impl Default for TailSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            batch_size: 50,
            query_timeout: Duration::from_secs(3),
        }
    }
}

/// Reads from the `events` collection with a deadline per query.
#[derive(Clone)]
pub struct StoreReader {
    store: StoreClient,
    deadline: Duration,
}

impl StoreReader {
    pub fn new(store: StoreClient, deadline: Duration) -> Self {
        Self { store, deadline }
    }
}

#[async_trait]
impl IncrementalReader for StoreReader {
    async fn read_after(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        self.store
            .list_after(cursor.map(str::to_string), limit, self.deadline)
            .await
    }
}

/// One live-tail session.
pub struct LiveTail<R> {
    reader: R,
    cursor: Option<String>,
    batch_size: usize,
}

impl<R: IncrementalReader> LiveTail<R> {
    /// A session with an empty cursor; the first tick reads from the
    /// beginning of the collection.
    pub fn new(reader: R, batch_size: usize) -> Self {
        Self {
            reader,
            cursor: None,
            batch_size: batch_size.max(1),
        }
    }

    /// A session whose cursor is the current instant, so nothing stored
    /// before the session opened is emitted.
    pub fn starting_now(reader: R, batch_size: usize) -> Self {
        let mut tail = Self::new(reader, batch_size);
        tail.cursor = Some(format_timestamp(Utc::now()));
        tail
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Polls once and returns the records to emit, in order.
    ///
    /// Errors are logged and produce an empty batch; the cursor only moves
    /// on success.
    pub async fn tick(&mut self) -> Vec<StoredEvent> {
        match self
            .reader
            .read_after(self.cursor.as_deref(), self.batch_size)
            .await
        {
            Ok(batch) => {
                if let Some(last) = batch.last() {
                    self.cursor = Some(last.timestamp.clone());
                }
                batch
            }
            Err(e) => {
                tracing::warn!(
                    cursor = self.cursor.as_deref().unwrap_or(""),
                    error = %e,
                    "live-tail poll failed, retrying next tick"
                );
                Vec::new()
            }
        }
    }

    /// Ticks every `period`, first one period after the call, and yields
    /// each polled record.
    ///
    /// A tick that overruns delays the following ones rather than bursting.
    /// A zero `period` is raised to one millisecond. Dropping the stream
    /// ends the session.
    pub fn into_stream(self, period: Duration) -> impl Stream<Item = StoredEvent> + Send
    where
        R: 'static,
    {
        let period = period.max(MIN_PERIOD);
        let mut timer = tokio::time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        stream::unfold((self, timer), |(mut tail, mut timer)| async move {
            timer.tick().await;
            let batch = tail.tick().await;
            Some((stream::iter(batch), (tail, timer)))
        })
        .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// In-memory collection with scriptable poll failures.
    #[derive(Default)]
    struct MemoryReader {
        events: Mutex<Vec<StoredEvent>>,
        failures_left: AtomicU32,
        reads: AtomicU32,
    }

    impl MemoryReader {
        fn push(&self, id: &str, timestamp: &str) {
            self.events.lock().unwrap().push(StoredEvent {
                id: id.to_string(),
                source: "test".to_string(),
                payload: Map::new(),
                analysis: None,
                timestamp: timestamp.to_string(),
            });
        }

        fn fail_next(&self, polls: u32) {
            self.failures_left.store(polls, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl IncrementalReader for Arc<MemoryReader> {
        async fn read_after(
            &self,
            cursor: Option<&str>,
            limit: usize,
        ) -> Result<Vec<StoredEvent>, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(StoreError::Timeout(Duration::from_secs(3)));
            }
            let mut matching: Vec<StoredEvent> = self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| cursor.map_or(true, |c| e.timestamp.as_str() > c))
                .cloned()
                .collect();
            matching.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
            matching.truncate(limit);
            Ok(matching)
        }
    }

    fn ts(second: u32) -> String {
        format!("2026-10-18T09:30:{second:02}.000Z")
    }

    fn ids(batch: &[StoredEvent]) -> Vec<&str> {
        batch.iter().map(|e| e.id.as_str()).collect()
    }

    #[tokio::test]
    async fn emits_new_records_in_order_exactly_once() {
        let reader = Arc::new(MemoryReader::default());
        let mut tail = LiveTail::new(reader.clone(), 50);

        reader.push("a", &ts(1));
        reader.push("b", &ts(2));
        assert_eq!(ids(&tail.tick().await), ["a", "b"]);
        assert_eq!(tail.cursor(), Some(ts(2).as_str()));

        assert!(tail.tick().await.is_empty());

        reader.push("c", &ts(3));
        reader.push("d", &ts(4));
        assert_eq!(ids(&tail.tick().await), ["c", "d"]);
        assert_eq!(tail.cursor(), Some(ts(4).as_str()));
    }

    #[tokio::test]
    async fn failed_tick_keeps_cursor_and_next_tick_catches_up() {
        let reader = Arc::new(MemoryReader::default());
        let mut tail = LiveTail::new(reader.clone(), 50);

        reader.push("a", &ts(1));
        assert_eq!(ids(&tail.tick().await), ["a"]);

        reader.push("b", &ts(2));
        reader.push("c", &ts(3));
        reader.fail_next(1);
        assert!(tail.tick().await.is_empty());
        assert_eq!(tail.cursor(), Some(ts(1).as_str()));

        assert_eq!(ids(&tail.tick().await), ["b", "c"]);
    }

    #[tokio::test]
    async fn large_backlog_drains_one_batch_per_tick() {
        let reader = Arc::new(MemoryReader::default());
        for i in 0..12 {
            reader.push(&format!("e{i:02}"), &ts(i));
        }
        let mut tail = LiveTail::new(reader.clone(), 5);

        assert_eq!(tail.tick().await.len(), 5);
        assert_eq!(tail.tick().await.len(), 5);
        let last = tail.tick().await;
        assert_eq!(ids(&last), ["e10", "e11"]);
    }

    #[tokio::test]
    async fn starting_now_skips_existing_records() {
        let reader = Arc::new(MemoryReader::default());
        reader.push("old", "2000-01-01T00:00:00.000Z");

        let mut tail = LiveTail::starting_now(reader.clone(), 50);
        assert!(tail.tick().await.is_empty());

        reader.push("new", "2999-01-01T00:00:00.000Z");
        assert_eq!(ids(&tail.tick().await), ["new"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_waits_one_period_before_first_poll() {
        let reader = Arc::new(MemoryReader::default());
        reader.push("a", &ts(1));
        reader.push("b", &ts(2));

        let period = Duration::from_secs(2);
        let mut feed = Box::pin(LiveTail::new(reader.clone(), 50).into_stream(period));

        let early = tokio::time::timeout(period - Duration::from_millis(10), feed.next()).await;
        assert!(early.is_err(), "nothing is polled before the first period");
        assert_eq!(reader.reads.load(Ordering::SeqCst), 0);

        assert_eq!(feed.next().await.unwrap().id, "a");
        assert_eq!(feed.next().await.unwrap().id, "b");
        assert_eq!(reader.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn store_backed_tail_moves_past_bad_documents() {
        use eventgate_db::{create_pool, DbRuntimeSettings, IN_MEMORY};

        let pool = create_pool(IN_MEMORY, DbRuntimeSettings::default()).unwrap();
        let conn = pool.get().unwrap();
        eventgate_events::ensure_schema(&conn).unwrap();
        let rows = [
            ("a", r#"{"text":"a"}"#, None),
            ("b", r#"{"text":"b"}"#, Some(r#"{"sentiment":"Neutral","score":"high"}"#)),
            ("c", "not json", None),
            ("d", r#"{"text":"d"}"#, Some(r#"{"sentiment":"Positive","score":0.9}"#)),
        ];
        for (n, (id, payload, analysis)) in (1..).zip(rows) {
            conn.execute(
                "INSERT INTO events (id, source, payload_json, analysis_json, timestamp)
                 VALUES (?1, 'feed', ?2, ?3, ?4)",
                rusqlite::params![id, payload, analysis, ts(n)],
            )
            .unwrap();
        }
        drop(conn);

        let reader = StoreReader::new(StoreClient::new(pool), Duration::from_secs(3));
        let mut tail = LiveTail::new(reader, 2);

        let first = tail.tick().await;
        assert_eq!(ids(&first), ["a", "b"]);
        assert_eq!(first[1].analysis.as_ref().unwrap().score, None);

        assert_eq!(ids(&tail.tick().await), ["d"]);
        assert_eq!(tail.cursor(), Some(ts(4).as_str()));
        assert!(tail.tick().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_still_streams() {
        let reader = Arc::new(MemoryReader::default());
        reader.push("a", &ts(1));

        let mut feed = Box::pin(LiveTail::new(reader.clone(), 50).into_stream(Duration::ZERO));

        assert_eq!(feed.next().await.unwrap().id, "a");
    }

    #[tokio::test(start_paused = true)]
    async fn stream_survives_failing_polls() {
        let reader = Arc::new(MemoryReader::default());
        reader.push("a", &ts(1));
        reader.fail_next(3);

        let mut feed = Box::pin(LiveTail::new(reader.clone(), 50).into_stream(Duration::from_secs(2)));

        assert_eq!(feed.next().await.unwrap().id, "a");
        assert_eq!(reader.reads.load(Ordering::SeqCst), 4);
    }
}
