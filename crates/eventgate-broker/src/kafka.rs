//! Native Kafka transport backed by librdkafka.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as _};
use rdkafka::util::Timeout;
use std::time::Duration;

use crate::error::BrokerError;
use crate::transport::{Acks, LogTransport};

/// Producer properties for the native client.
#[derive(Debug, Clone)]
pub struct KafkaSettings {
    /// Acknowledgment level.
    pub acks: Acks,
    /// `compression.type`, e.g. `snappy`.
    pub compression: String,
    /// Client-side send retries before a delivery is reported failed.
    pub max_retries: u32,
    /// Upper bound for metadata fetches and per-message delivery.
    pub request_timeout: Duration,
}

/// Kafka producer transport.
pub struct KafkaTransport {
    producer: FutureProducer,
    request_timeout: Duration,
}

impl KafkaTransport {
    /// Builds the producer. No connection is made until the first probe or send.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Config` if librdkafka rejects the configuration.
    pub fn new(addresses: &[String], settings: &KafkaSettings) -> Result<Self, BrokerError> {
        let timeout_ms = settings.request_timeout.as_millis().to_string();
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", addresses.join(","))
            .set("acks", settings.acks.as_kafka())
            .set("compression.type", &settings.compression)
            .set("message.send.max.retries", settings.max_retries.to_string())
            .set("socket.timeout.ms", &timeout_ms)
            .set("message.timeout.ms", &timeout_ms)
            .create()
            .map_err(|e| BrokerError::Config(e.to_string()))?;

        Ok(Self {
            producer,
            request_timeout: settings.request_timeout,
        })
    }
}

#[async_trait]
impl LogTransport for KafkaTransport {
    fn name(&self) -> &'static str {
        "kafka"
    }

    async fn probe(&self) -> Result<(), BrokerError> {
        let producer = self.producer.clone();
        let timeout = self.request_timeout;
        tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(None, Timeout::After(timeout))
                .map(|_| ())
        })
        .await
        .map_err(|e| BrokerError::Connection(format!("metadata task failed: {e}")))?
        .map_err(|e| BrokerError::Connection(e.to_string()))
    }

    async fn send(&self, channel: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let record: FutureRecord<'_, (), [u8]> = FutureRecord::to(channel).payload(payload);
        self.producer
            .send(record, Timeout::After(self.request_timeout))
            .await
            .map(|_| ())
            .map_err(|(e, _)| BrokerError::Send(e.to_string()))
    }

    async fn close(&self) {
        let producer = self.producer.clone();
        let timeout = self.request_timeout;
        let flushed = tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout))).await;
        match flushed {
            Ok(Ok(())) => tracing::info!("kafka producer flushed"),
            Ok(Err(e)) => tracing::warn!(error = %e, "kafka producer flush incomplete"),
            Err(e) => tracing::warn!(error = %e, "kafka flush task failed"),
        }
    }
}
