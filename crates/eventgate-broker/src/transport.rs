//! The transport seam between the producer and a concrete durable log.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BrokerError;

/// Sends raw message bytes to a named channel of the durable log.
///
/// Implementations must be safe to call concurrently; the producer issues
/// several sends at once.
#[async_trait]
pub trait LogTransport: Send + Sync {
    /// Short name for logs, e.g. `"rest"` or `"kafka"`.
    fn name(&self) -> &'static str;

    /// Checks that at least one broker is reachable.
    async fn probe(&self) -> Result<(), BrokerError>;

    /// Delivers one message.
    async fn send(&self, channel: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Flushes and releases the connection. Called once, at shutdown.
    async fn close(&self) {}
}

/// How many replicas must acknowledge a write before it counts as delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Acks {
    /// Do not wait for any acknowledgment.
    None,
    /// Wait for the partition leader only.
    #[default]
    Leader,
    /// Wait for all in-sync replicas.
    All,
}

impl Acks {
    /// The value of Kafka's `acks` producer property.
    pub fn as_kafka(self) -> &'static str {
        match self {
            Self::None => "0",
            Self::Leader => "1",
            Self::All => "all",
        }
    }
}

impl std::str::FromStr for Acks {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "0" => Ok(Self::None),
            "leader" | "1" => Ok(Self::Leader),
            "all" | "-1" => Ok(Self::All),
            other => Err(BrokerError::Config(format!("unknown acks level: {other}"))),
        }
    }
}
