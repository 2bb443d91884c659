//! Produces through a Kafka REST proxy (v2 API, binary embedded format).
//!
//! Message bytes travel base64-encoded inside the JSON request body, so the
//! log receives exactly the bytes handed to [`LogTransport::send`].

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::time::Duration;

use crate::error::BrokerError;
use crate::transport::LogTransport;

const BINARY_V2: &str = "application/vnd.kafka.binary.v2+json";
const ACCEPT_V2: &str = "application/vnd.kafka.v2+json";

/// HTTP transport to one or more REST proxy instances.
///
/// Addresses are tried in configured order until one accepts the request.
pub struct RestProxyTransport {
    client: reqwest::Client,
    addresses: Vec<String>,
}

/// Per-record outcome in a produce response.
#[derive(Debug, Deserialize)]
struct ProduceResponse {
    #[serde(default)]
    offsets: Vec<RecordOffset>,
}

#[derive(Debug, Deserialize)]
struct RecordOffset {
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    error: Option<String>,
}

impl RestProxyTransport {
    /// Creates a transport for the given proxy base URLs.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Config` if `addresses` is empty or the HTTP
    /// client cannot be built.
    pub fn new(addresses: &[String], request_timeout: Duration) -> Result<Self, BrokerError> {
        let addresses: Vec<String> = addresses
            .iter()
            .map(|a| a.trim().trim_end_matches('/').to_string())
            .filter(|a| !a.is_empty())
            .collect();
        if addresses.is_empty() {
            return Err(BrokerError::Config("no broker addresses configured".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| BrokerError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, addresses })
    }

    async fn produce_to(
        &self,
        address: &str,
        channel: &str,
        body: &serde_json::Value,
    ) -> Result<(), String> {
        let response = self
            .client
            .post(format!("{address}/topics/{channel}"))
            .header(reqwest::header::CONTENT_TYPE, BINARY_V2)
            .header(reqwest::header::ACCEPT, ACCEPT_V2)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(format!("{status}: {detail}"));
        }

        let produced: ProduceResponse = response.json().await.map_err(|e| e.to_string())?;
        if let Some(rejected) = produced
            .offsets
            .iter()
            .find(|o| o.error_code.is_some() || o.error.is_some())
        {
            return Err(format!(
                "record rejected (code {:?}): {}",
                rejected.error_code,
                rejected.error.as_deref().unwrap_or("unknown error")
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl LogTransport for RestProxyTransport {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn probe(&self) -> Result<(), BrokerError> {
        let mut last_error = String::new();
        for address in &self.addresses {
            match self
                .client
                .get(format!("{address}/topics"))
                .header(reqwest::header::ACCEPT, ACCEPT_V2)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => last_error = format!("{address}: {}", response.status()),
                Err(e) => last_error = format!("{address}: {e}"),
            }
        }
        Err(BrokerError::Connection(last_error))
    }

    async fn send(&self, channel: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let body = serde_json::json!({
            "records": [{ "value": STANDARD.encode(payload) }]
        });

        let mut last_error = String::new();
        for address in &self.addresses {
            match self.produce_to(address, channel, &body).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::debug!(address = %address, channel, error = %e, "produce attempt failed");
                    last_error = format!("{address}: {e}");
                }
            }
        }
        Err(BrokerError::Send(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_empty_address_list() {
        let err = RestProxyTransport::new(&[" ".to_string()], Duration::from_secs(1))
            .err()
            .expect("blank addresses should be rejected");
        assert!(matches!(err, BrokerError::Config(_)));
    }

    #[test]
    fn new_strips_trailing_slashes() {
        let transport = RestProxyTransport::new(
            &["http://proxy:8082/".to_string(), "http://backup:8082".to_string()],
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            transport.addresses,
            vec!["http://proxy:8082", "http://backup:8082"]
        );
    }
}
