//! Rollup statistics over the stored event collection.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The three sentiment labels the rollup counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    /// All labels, in breakdown order.
    pub const ALL: [Sentiment; 3] = [Self::Positive, Self::Neutral, Self::Negative];

    /// The label as stored in `analysis.sentiment`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "Positive",
            Self::Neutral => "Neutral",
            Self::Negative => "Negative",
        }
    }

    /// Parses a stored label. Matching is exact; anything else is `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == label)
    }
}

/// Per-label event counts. The three are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SentimentBreakdown {
    pub positive: u64,
    pub neutral: u64,
    pub negative: u64,
}

/// One entry of the top-sources ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCount {
    pub source: String,
    pub count: u64,
}

/// Aggregate statistics, computed fresh on every request.
///
/// The default value is the well-defined empty-collection summary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total_events: u64,
    /// Mean of the numeric `analysis.score` values; rendered with four decimals.
    #[serde(serialize_with = "render_score", deserialize_with = "parse_score")]
    pub avg_score: f64,
    pub sentiment_breakdown: SentimentBreakdown,
    pub top_sources: Vec<SourceCount>,
    /// Greatest stored timestamp, or empty when there are no events.
    pub last_event_at: String,
}

impl Summary {
    /// `avg_score` in its externally visible form.
    pub fn avg_score_display(&self) -> String {
        format!("{:.4}", self.avg_score)
    }
}

fn render_score<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{value:.4}"))
}

fn parse_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(f64),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Number(n) => Ok(n),
        Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
