//! Server configuration loading from file and environment variables.

use eventgate_broker::{Acks, ProducerSettings};
use eventgate_db::DbRuntimeSettings;
use eventgate_types::{RetryPolicy, RAW_EVENTS_CHANNEL};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;

use crate::tail::TailSettings;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Durable log (broker) settings.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Document store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Live-tail polling settings.
    #[serde(default)]
    pub tail: TailConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Which client carries messages to the durable log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// HTTP Kafka REST proxy.
    #[default]
    Rest,
    /// Native Kafka client; requires the `kafka` feature.
    Kafka,
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rest" => Ok(Self::Rest),
            "kafka" => Ok(Self::Kafka),
            other => Err(format!("unknown broker transport: {other}")),
        }
    }
}

/// Broker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Transport used to reach the log.
    #[serde(default)]
    pub transport: TransportKind,

    /// Broker addresses: proxy base URLs for `rest`, `host:port` for `kafka`.
    #[serde(default = "default_broker_addresses")]
    pub addresses: Vec<String>,

    /// Channel (topic) that receives accepted envelopes.
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Replica acknowledgment level.
    #[serde(default)]
    pub acks: Acks,

    /// Compression codec for the native client.
    #[serde(default = "default_compression")]
    pub compression: String,

    /// Delivery retries after the first failed send.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Messages that may wait for delivery before ingest reports back-pressure.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Concurrent sends.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Per-request timeout toward the broker, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Startup connection attempts before giving up.
    #[serde(default = "default_broker_connect_attempts")]
    pub connect_attempts: u32,

    /// Pause between startup connection attempts, in milliseconds.
    #[serde(default = "default_connect_interval_ms")]
    pub connect_interval_ms: u64,
}

/// Document store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the database file, or `:memory:`.
    #[serde(default = "default_store_uri")]
    pub uri: String,

    /// Database name; the file is `<uri>/<database>.db`.
    #[serde(default = "default_store_database")]
    pub database: String,

    /// Startup connection attempts before giving up.
    #[serde(default = "default_store_connect_attempts")]
    pub connect_attempts: u32,

    /// Pause between startup connection attempts, in milliseconds.
    #[serde(default = "default_connect_interval_ms")]
    pub connect_interval_ms: u64,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Live-tail configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TailConfig {
    /// Time between polls of one session, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Records fetched per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Deadline for one poll's query, in milliseconds.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "eventgate_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8090
}

fn default_broker_addresses() -> Vec<String> {
    vec!["http://localhost:8082".to_string()]
}

fn default_channel() -> String {
    RAW_EVENTS_CHANNEL.to_string()
}

fn default_compression() -> String {
    "snappy".to_string()
}

fn default_max_retries() -> u32 {
    5
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_max_in_flight() -> usize {
    16
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_broker_connect_attempts() -> u32 {
    30
}

fn default_store_connect_attempts() -> u32 {
    15
}

fn default_connect_interval_ms() -> u64 {
    2_000
}

fn default_store_uri() -> String {
    ".".to_string()
}

fn default_store_database() -> String {
    "pipeline".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_batch_size() -> usize {
    50
}

fn default_query_timeout_ms() -> u64 {
    3_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            addresses: default_broker_addresses(),
            channel: default_channel(),
            acks: Acks::default(),
            compression: default_compression(),
            max_retries: default_max_retries(),
            queue_capacity: default_queue_capacity(),
            max_in_flight: default_max_in_flight(),
            request_timeout_ms: default_request_timeout_ms(),
            connect_attempts: default_broker_connect_attempts(),
            connect_interval_ms: default_connect_interval_ms(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: default_store_uri(),
            database: default_store_database(),
            connect_attempts: default_store_connect_attempts(),
            connect_interval_ms: default_connect_interval_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl BrokerConfig {
    pub fn connect_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.connect_attempts,
            Duration::from_millis(self.connect_interval_ms),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn producer_settings(&self) -> ProducerSettings {
        ProducerSettings {
            queue_capacity: self.queue_capacity,
            max_in_flight: self.max_in_flight,
            max_retries: self.max_retries,
            ..ProducerSettings::default()
        }
    }
}

impl StoreConfig {
    pub fn connect_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.connect_attempts,
            Duration::from_millis(self.connect_interval_ms),
        )
    }

    pub fn runtime_settings(&self) -> DbRuntimeSettings {
        DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
            ..DbRuntimeSettings::default()
        }
    }

    /// Resolved database file path.
    pub fn path(&self) -> String {
        eventgate_db::database_path(&self.uri, &self.database)
    }
}

/// Floor for `tail.poll_interval_ms`.
const MIN_TAIL_POLL_MS: u64 = 10;

/// Floor for `tail.query_timeout_ms`.
const MIN_TAIL_QUERY_TIMEOUT_MS: u64 = 100;

impl TailConfig {
    /// Live-tail settings, with values below their floors raised to them.
    pub fn settings(&self) -> TailSettings {
        let poll_ms = self.poll_interval_ms.max(MIN_TAIL_POLL_MS);
        let timeout_ms = self.query_timeout_ms.max(MIN_TAIL_QUERY_TIMEOUT_MS);
        let batch_size = self.batch_size.max(1);
        if poll_ms != self.poll_interval_ms
            || timeout_ms != self.query_timeout_ms
            || batch_size != self.batch_size
        {
            tracing::warn!(
                poll_interval_ms = poll_ms,
                query_timeout_ms = timeout_ms,
                batch_size,
                "raised out-of-range tail settings"
            );
        }

        TailSettings {
            poll_interval: Duration::from_millis(poll_ms),
            batch_size,
            query_timeout: Duration::from_millis(timeout_ms),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `EVENTGATE_HOST` overrides `server.host`
/// - `EVENTGATE_PORT` overrides `server.port`
/// - `EVENTGATE_BROKERS` overrides `broker.addresses` (comma separated)
/// - `EVENTGATE_BROKER_TRANSPORT` overrides `broker.transport`
/// - `EVENTGATE_BROKER_ACKS` overrides `broker.acks`
/// - `EVENTGATE_STORE_URI` overrides `store.uri`
/// - `EVENTGATE_STORE_DB` overrides `store.database`
/// - `EVENTGATE_LOG_LEVEL` overrides `logging.level`
/// - `EVENTGATE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies `EVENTGATE_*` overrides read through `lookup`.
///
/// Values that fail to parse are ignored with a warning.
pub fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("EVENTGATE_HOST") {
        match host.parse() {
            Ok(parsed) => config.server.host = parsed,
            Err(_) => tracing::warn!(value = %host, "ignoring invalid EVENTGATE_HOST"),
        }
    }
    if let Some(port) = lookup("EVENTGATE_PORT") {
        match port.parse() {
            Ok(parsed) => config.server.port = parsed,
            Err(_) => tracing::warn!(value = %port, "ignoring invalid EVENTGATE_PORT"),
        }
    }
    if let Some(brokers) = lookup("EVENTGATE_BROKERS") {
        let addresses: Vec<String> = brokers
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect();
        if !addresses.is_empty() {
            config.broker.addresses = addresses;
        }
    }
    if let Some(transport) = lookup("EVENTGATE_BROKER_TRANSPORT") {
        match transport.parse() {
            Ok(parsed) => config.broker.transport = parsed,
            Err(e) => tracing::warn!(error = %e, "ignoring invalid EVENTGATE_BROKER_TRANSPORT"),
        }
    }
    if let Some(acks) = lookup("EVENTGATE_BROKER_ACKS") {
        match acks.parse() {
            Ok(parsed) => config.broker.acks = parsed,
            Err(e) => tracing::warn!(error = %e, "ignoring invalid EVENTGATE_BROKER_ACKS"),
        }
    }
    if let Some(uri) = lookup("EVENTGATE_STORE_URI") {
        config.store.uri = uri;
    }
    if let Some(database) = lookup("EVENTGATE_STORE_DB") {
        config.store.database = database;
    }
    if let Some(level) = lookup("EVENTGATE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("EVENTGATE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.server.port, 8090);
        assert_eq!(config.server.host, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.broker.channel, "raw_events");
        assert_eq!(config.broker.acks, Acks::Leader);
        assert_eq!(config.broker.transport, TransportKind::Rest);
        assert_eq!(config.broker.connect_attempts, 30);
        assert_eq!(config.store.connect_attempts, 15);
        assert_eq!(config.store.database, "pipeline");
        assert_eq!(config.tail.batch_size, 50);
        assert_eq!(config.tail.settings().poll_interval, Duration::from_secs(2));
        assert_eq!(config.tail.settings().query_timeout, Duration::from_secs(3));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9000

            [broker]
            acks = "all"
            addresses = ["http://proxy-a:8082", "http://proxy-b:8082"]

            [store]
            uri = "/var/lib/eventgate"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.broker.acks, Acks::All);
        assert_eq!(config.broker.addresses.len(), 2);
        assert_eq!(config.broker.max_retries, 5);
        assert_eq!(config.store.path(), "/var/lib/eventgate/pipeline.db");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config = Config::default();
        apply_overrides(
            &mut config,
            lookup_from(&[
                ("EVENTGATE_PORT", "7001"),
                ("EVENTGATE_BROKERS", "http://a:8082, http://b:8082,,"),
                ("EVENTGATE_BROKER_ACKS", "all"),
                ("EVENTGATE_STORE_DB", "events_test"),
                ("EVENTGATE_LOG_JSON", "1"),
            ]),
        );

        assert_eq!(config.server.port, 7001);
        assert_eq!(config.broker.addresses, vec!["http://a:8082", "http://b:8082"]);
        assert_eq!(config.broker.acks, Acks::All);
        assert_eq!(config.store.database, "events_test");
        assert!(config.logging.json);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut config = Config::default();
        apply_overrides(
            &mut config,
            lookup_from(&[
                ("EVENTGATE_PORT", "not-a-port"),
                ("EVENTGATE_BROKER_ACKS", "quorum"),
                ("EVENTGATE_BROKER_TRANSPORT", "carrier-pigeon"),
                ("EVENTGATE_BROKERS", " , "),
            ]),
        );

        assert_eq!(config.server.port, 8090);
        assert_eq!(config.broker.acks, Acks::Leader);
        assert_eq!(config.broker.transport, TransportKind::Rest);
        assert_eq!(config.broker.addresses, default_broker_addresses());
    }

    #[test]
    fn zero_tail_values_are_raised_to_floors() {
        let config: Config = toml::from_str(
            r#"
            [tail]
            poll_interval_ms = 0
            batch_size = 0
            query_timeout_ms = 0
            "#,
        )
        .unwrap();

        let settings = config.tail.settings();
        assert_eq!(settings.poll_interval, Duration::from_millis(MIN_TAIL_POLL_MS));
        assert_eq!(settings.batch_size, 1);
        assert_eq!(
            settings.query_timeout,
            Duration::from_millis(MIN_TAIL_QUERY_TIMEOUT_MS)
        );
    }

    #[test]
    fn in_range_tail_values_pass_through() {
        let config: Config = toml::from_str(
            r#"
            [tail]
            poll_interval_ms = 250
            batch_size = 10
            query_timeout_ms = 1500
            "#,
        )
        .unwrap();

        let settings = config.tail.settings();
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.batch_size, 10);
        assert_eq!(settings.query_timeout, Duration::from_millis(1_500));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.tail.poll_interval_ms, 2_000);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        let err = load_config(path.to_str()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
