//! eventgate server library logic.
//!
//! Wires the ingestion pipeline, live tail and aggregation engine to the
//! broker producer and the document store, and exposes them over HTTP.

pub mod api;
pub mod api_sse;
pub mod config;
pub mod pipeline;
pub mod stats;
pub mod store;
pub mod tail;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{get, post},
    Extension, Router,
};
use config::{BrokerConfig, Config, StoreConfig, TransportKind};
use eventgate_broker::{BrokerError, LogTransport, Producer, Publish, RestProxyTransport};
use eventgate_db::{ConnectError, DbPool};
use eventgate_events::EventsError;
use pipeline::IngestPipeline;
use stats::StatsEngine;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use store::StoreClient;
use tail::TailSettings;
use thiserror::Error;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Maximum request body size (1 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// How long browsers may cache a CORS preflight answer.
const CORS_MAX_AGE: Duration = Duration::from_secs(12 * 60 * 60);

/// Tells long-lived responses that the server is going away.
///
/// Live-tail streams never finish on their own, so graceful shutdown would
/// wait on them forever without this.
#[derive(Clone)]
pub struct Shutdown(Arc<watch::Sender<bool>>);

impl Shutdown {
    pub fn new() -> Self {
        let (closing, _) = watch::channel(false);
        Self(Arc::new(closing))
    }

    pub fn trigger(&self) {
        self.0.send_replace(true);
    }

    /// Resolves once [`trigger`](Self::trigger) has been called.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.0.subscribe();
        async move {
            let _ = rx.wait_for(|closing| *closing).await;
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Validates and publishes inbound events.
    pub pipeline: Arc<IngestPipeline>,
    /// Read access to the `events` collection.
    pub store: StoreClient,
    /// Rollup statistics.
    pub stats: StatsEngine,
    /// Live-tail cadence and limits.
    pub tail: TailSettings,
    /// Ends live-tail streams on shutdown.
    pub shutdown: Shutdown,
}

impl AppState {
    pub fn new(
        publisher: Arc<dyn Publish>,
        channel: &str,
        store: StoreClient,
        tail: TailSettings,
    ) -> Self {
        Self {
            pipeline: Arc::new(IngestPipeline::new(publisher, channel)),
            stats: StatsEngine::new(store.clone()),
            store,
            tail,
            shutdown: Shutdown::new(),
        }
    }
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/ingest", post(api::ingest_handler))
        .route("/api/events", get(api::list_events_handler))
        .route("/api/events/stream", get(api_sse::live_tail_handler))
        .route("/api/stats", get(api::stats_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE])
                .max_age(CORS_MAX_AGE),
        )
        .layer(Extension(Arc::new(state)))
}

/// Reasons the server refuses to start.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Store(#[from] ConnectError),

    #[error("failed to prepare the events table: {0}")]
    Schema(#[from] EventsError),

    #[error("failed to check out a store connection: {0}")]
    Checkout(#[from] r2d2::Error),

    #[error("startup task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("broker transport 'kafka' requires building with the `kafka` feature")]
    KafkaUnavailable,
}

/// Connects the broker, then the store, and wires the application state.
///
/// Both connections use their bounded retry budgets. A missing timestamp
/// index is logged and tolerated.
///
/// # Errors
///
/// Returns `StartupError` if either dependency stays unreachable or the
/// events table cannot be created.
pub async fn bootstrap(config: &Config) -> Result<(AppState, Arc<Producer>), StartupError> {
    let transport = build_transport(&config.broker)?;
    tracing::info!(
        transport = transport.name(),
        addresses = ?config.broker.addresses,
        channel = %config.broker.channel,
        "connecting to broker"
    );
    let producer = Arc::new(
        Producer::connect(
            transport,
            config.broker.connect_retry(),
            config.broker.producer_settings(),
        )
        .await?,
    );

    let store = StoreClient::new(connect_store(&config.store).await?);
    if let Err(e) = store.ensure_index().await {
        tracing::warn!(error = %e, "failed to ensure timestamp index; queries will be slower");
    }

    let state = AppState::new(
        producer.clone(),
        &config.broker.channel,
        store,
        config.tail.settings(),
    );
    Ok((state, producer))
}

fn build_transport(broker: &BrokerConfig) -> Result<Arc<dyn LogTransport>, StartupError> {
    match broker.transport {
        TransportKind::Rest => {
            if broker.acks != eventgate_broker::Acks::default() {
                tracing::info!(
                    acks = broker.acks.as_kafka(),
                    "acks is set by the REST proxy's own producer configuration"
                );
            }
            Ok(Arc::new(RestProxyTransport::new(
                &broker.addresses,
                broker.request_timeout(),
            )?))
        }
        #[cfg(feature = "kafka")]
        TransportKind::Kafka => {
            let settings = eventgate_broker::KafkaSettings {
                acks: broker.acks,
                compression: broker.compression.clone(),
                max_retries: broker.max_retries,
                request_timeout: broker.request_timeout(),
            };
            Ok(Arc::new(eventgate_broker::KafkaTransport::new(
                &broker.addresses,
                &settings,
            )?))
        }
        #[cfg(not(feature = "kafka"))]
        TransportKind::Kafka => Err(StartupError::KafkaUnavailable),
    }
}

async fn connect_store(store: &StoreConfig) -> Result<DbPool, StartupError> {
    let path = store.path();
    let settings = store.runtime_settings();
    let retry = store.connect_retry();

    tokio::task::spawn_blocking(move || -> Result<DbPool, StartupError> {
        let pool = eventgate_db::connect(&path, settings, retry)?;
        let conn = pool.get()?;
        eventgate_events::ensure_schema(&conn)?;
        Ok(pool)
    })
    .await?
}
