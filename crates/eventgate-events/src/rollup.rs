//! Rollup aggregations over the whole collection.
//!
//! Both rollups are computed at query time; nothing is cached.

use eventgate_types::{Sentiment, SentimentBreakdown, SourceCount, Summary};
use rusqlite::{params, Connection};

use crate::error::EventsError;

/// Number of entries in the top-sources ranking.
pub const TOP_SOURCES_LIMIT: usize = 5;

/// Computes the global summary in one pass, plus the top-sources ranking.
///
/// Only numeric `analysis.score` values enter the average; missing, `null`
/// and non-numeric scores are excluded rather than counted as zero. Events
/// whose `analysis.sentiment` is absent or not one of the three labels count
/// toward no sentiment bucket. An empty collection yields
/// [`Summary::default`].
///
/// # Errors
///
/// Returns `EventsError::Database` on SQL failure.
pub fn summarize(conn: &Connection) -> Result<Summary, EventsError> {
    let (total, avg_score, positive, neutral, negative, last_event_at) = conn.query_row(
        "SELECT
            COUNT(*),
            AVG(CASE WHEN json_type(analysis_json, '$.score') IN ('integer', 'real')
                     THEN json_extract(analysis_json, '$.score') END),
            COALESCE(SUM(json_extract(analysis_json, '$.sentiment') = ?1), 0),
            COALESCE(SUM(json_extract(analysis_json, '$.sentiment') = ?2), 0),
            COALESCE(SUM(json_extract(analysis_json, '$.sentiment') = ?3), 0),
            MAX(timestamp)
         FROM events",
        params![
            Sentiment::Positive.as_str(),
            Sentiment::Neutral.as_str(),
            Sentiment::Negative.as_str()
        ],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<f64>>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        },
    )?;

    if total == 0 {
        return Ok(Summary::default());
    }

    Ok(Summary {
        total_events: count(total),
        avg_score: avg_score.unwrap_or(0.0),
        sentiment_breakdown: SentimentBreakdown {
            positive: count(positive),
            neutral: count(neutral),
            negative: count(negative),
        },
        top_sources: top_sources(conn, TOP_SOURCES_LIMIT)?,
        last_event_at: last_event_at.unwrap_or_default(),
    })
}

/// Groups events by `source` and returns the `limit` largest groups.
///
/// Sorted by count descending; equal counts are ordered by source name so
/// the ranking is deterministic for a given snapshot.
///
/// # Errors
///
/// Returns `EventsError::Database` on SQL failure.
pub fn top_sources(conn: &Connection, limit: usize) -> Result<Vec<SourceCount>, EventsError> {
    let mut stmt = conn.prepare(
        "SELECT source, COUNT(*) AS n
         FROM events
         GROUP BY source
         ORDER BY n DESC, source ASC
         LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], |row| {
        Ok(SourceCount {
            source: row.get(0)?,
            count: count(row.get(1)?),
        })
    })?;

    let mut sources = Vec::new();
    for row in rows {
        sources.push(row?);
    }
    Ok(sources)
}

fn count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or_default()
}
