//! Aggregation engine: rollups over the whole collection, computed on every call.

use eventgate_types::Summary;

use crate::store::{StoreClient, StoreError};

/// Computes [`Summary`] values from the store. Nothing is cached.
#[derive(Clone)]
pub struct StatsEngine {
    store: StoreClient,
}

impl StatsEngine {
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }

    /// Totals, sentiment breakdown, average score, top five sources, and
    /// the latest event time. An empty collection yields the zero summary.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Timeout` after ten seconds, or the store failure.
    pub async fn stats(&self) -> Result<Summary, StoreError> {
        let summary = self.store.summarize().await?;
        tracing::debug!(
            total_events = summary.total_events,
            top_sources = summary.top_sources.len(),
            "computed stats"
        );
        Ok(summary)
    }
}
