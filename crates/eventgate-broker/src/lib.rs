//! Broker client for the eventgate gateway.
//!
//! Delivers serialized envelopes to named channels of a durable,
//! partitioned log without blocking request handlers. The moving parts:
//!
//! - [`LogTransport`]: the seam to a concrete log. [`RestProxyTransport`]
//!   speaks to a Kafka REST proxy; `KafkaTransport` (behind the `kafka`
//!   cargo feature) uses librdkafka directly.
//! - [`Producer`]: probes the transport within a bounded retry budget, then
//!   runs a bounded publish queue, a dispatcher, and a drain task that logs
//!   delivery failures.
//! - [`Publish`]: the one-method interface the ingestion pipeline sees.
//!
//! Delivery is best-effort: once [`Publish::publish`] returns `Ok`, a later
//! failure is visible only in the logs.

mod error;
#[cfg(feature = "kafka")]
mod kafka;
mod producer;
mod rest;
mod transport;

pub use error::{BrokerError, PublishError};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaSettings, KafkaTransport};
pub use producer::{DeliveryFailure, Producer, ProducerSettings, Publish};
pub use rest::RestProxyTransport;
pub use transport::{Acks, LogTransport};
