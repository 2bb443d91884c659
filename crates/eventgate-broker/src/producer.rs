//! Fire-and-forget producer: bounded queue, dispatcher, and error drain.
//!
//! ```text
//! publish() ──try_send──► [queue] ──► dispatcher ──► transport.send()
//!                                         │ (after retries)
//!                                         └──try_send──► [failures] ──► drain (logs)
//! ```
//!
//! `publish` never awaits. A slow or failing log fills the queue, and a
//! full queue is reported to the caller right away. The drain task only
//! logs, and a full failure channel drops reports instead of stalling
//! delivery.

use eventgate_types::RetryPolicy;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use crate::error::{BrokerError, PublishError};
use crate::transport::LogTransport;

/// Non-blocking hand-off of serialized messages to the durable log.
pub trait Publish: Send + Sync {
    /// Enqueues `payload` for `channel` and returns immediately.
    ///
    /// `Ok` means the message was queued, not that it reached the log.
    fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), PublishError>;
}

/// Tunables for the publish path.
#[derive(Debug, Clone)]
pub struct ProducerSettings {
    /// Messages that may wait for delivery before `publish` reports `QueueFull`.
    pub queue_capacity: usize,
    /// Concurrent sends in flight.
    pub max_in_flight: usize,
    /// Extra delivery attempts after the first failure.
    pub max_retries: u32,
    /// Base pause between delivery attempts; grows linearly per attempt.
    pub retry_backoff: Duration,
    /// Delivery failures buffered for the drain task.
    pub failure_capacity: usize,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            max_in_flight: 16,
            max_retries: 5,
            retry_backoff: Duration::from_millis(100),
            failure_capacity: 1_024,
        }
    }
}

/// A message waiting for delivery.
#[derive(Debug)]
struct Record {
    channel: String,
    payload: Vec<u8>,
}

/// A message the log did not accept after all delivery attempts.
#[derive(Debug)]
pub struct DeliveryFailure {
    pub channel: String,
    pub payload_len: usize,
    pub attempts: u32,
    pub error: BrokerError,
}

/// Handle to the running publish path.
///
/// Shared by every request handler; `publish` takes `&self` and no lock.
pub struct Producer {
    queue: mpsc::Sender<Record>,
    transport: Arc<dyn LogTransport>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    drain: Mutex<Option<JoinHandle<()>>>,
}

impl Producer {
    /// Probes the transport within the retry budget, then starts the
    /// dispatcher and drain tasks.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::ConnectExhausted` carrying the last probe error
    /// once `retry.attempts` probes have failed.
    pub async fn connect(
        transport: Arc<dyn LogTransport>,
        retry: RetryPolicy,
        settings: ProducerSettings,
    ) -> Result<Self, BrokerError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match transport.probe().await {
                Ok(()) => {
                    tracing::info!(
                        transport = transport.name(),
                        attempt,
                        "async producer ready"
                    );
                    return Ok(Self::start(transport, settings));
                }
                Err(e) if retry.is_last(attempt) => {
                    return Err(BrokerError::ConnectExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        transport = transport.name(),
                        attempt,
                        attempts = retry.attempts,
                        error = %e,
                        "waiting for broker"
                    );
                    tokio::time::sleep(retry.interval).await;
                }
            }
        }
    }

    /// Starts the background tasks without probing.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(transport: Arc<dyn LogTransport>, settings: ProducerSettings) -> Self {
        let (queue, records) = mpsc::channel(settings.queue_capacity.max(1));
        let (failures_tx, failures_rx) = mpsc::channel(settings.failure_capacity.max(1));
        let (stop, stopped) = oneshot::channel();

        let dispatcher = tokio::spawn(dispatch(
            records,
            transport.clone(),
            settings,
            failures_tx,
            stopped,
        ));
        let drain = tokio::spawn(drain_failures(failures_rx));

        Self {
            queue,
            transport,
            stop: Mutex::new(Some(stop)),
            dispatcher: Mutex::new(Some(dispatcher)),
            drain: Mutex::new(Some(drain)),
        }
    }

    /// Messages currently waiting in the queue.
    pub fn queued(&self) -> usize {
        self.queue.max_capacity() - self.queue.capacity()
    }

    /// Stops accepting messages, delivers what is queued within `grace`,
    /// then closes the transport.
    ///
    /// Messages still undelivered when `grace` expires are dropped. Calling
    /// this more than once is a no-op.
    pub async fn shutdown(&self, grace: Duration) {
        let stop = self.stop.lock().ok().and_then(|mut s| s.take());
        let Some(stop) = stop else {
            return;
        };
        let _ = stop.send(());

        let dispatcher = self.dispatcher.lock().ok().and_then(|mut d| d.take());
        if let Some(mut dispatcher) = dispatcher {
            match tokio::time::timeout(grace, &mut dispatcher).await {
                Ok(_) => tracing::info!("publish queue flushed"),
                Err(_) => {
                    tracing::warn!(
                        grace_ms = grace.as_millis() as u64,
                        "publish queue not flushed before grace period, dropping remainder"
                    );
                    dispatcher.abort();
                }
            }
        }

        self.transport.close().await;

        let drain = self.drain.lock().ok().and_then(|mut d| d.take());
        if let Some(drain) = drain {
            let _ = drain.await;
        }
        tracing::info!("producer closed");
    }
}

impl Publish for Producer {
    fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        self.queue
            .try_send(Record {
                channel: channel.to_string(),
                payload,
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => PublishError::QueueFull,
                TrySendError::Closed(_) => PublishError::Closed,
            })
    }
}

/// Moves records from the queue to the transport with bounded concurrency.
///
/// On stop (or when the producer is dropped) the queue is closed and the
/// records already in it are still delivered.
async fn dispatch(
    mut records: mpsc::Receiver<Record>,
    transport: Arc<dyn LogTransport>,
    settings: ProducerSettings,
    failures: mpsc::Sender<DeliveryFailure>,
    mut stopped: oneshot::Receiver<()>,
) {
    let in_flight = Arc::new(Semaphore::new(settings.max_in_flight.max(1)));
    let mut sends = JoinSet::new();
    let mut closing = false;

    loop {
        let record = tokio::select! {
            _ = &mut stopped, if !closing => {
                records.close();
                closing = true;
                continue;
            }
            record = records.recv() => match record {
                Some(record) => record,
                None => break,
            },
        };

        let Ok(permit) = in_flight.clone().acquire_owned().await else {
            break;
        };
        let transport = transport.clone();
        let failures = failures.clone();
        let (max_retries, backoff) = (settings.max_retries, settings.retry_backoff);
        sends.spawn(async move {
            deliver(transport.as_ref(), record, max_retries, backoff, &failures).await;
            drop(permit);
        });

        while sends.try_join_next().is_some() {}
    }

    while sends.join_next().await.is_some() {}
}

async fn deliver(
    transport: &dyn LogTransport,
    record: Record,
    max_retries: u32,
    backoff: Duration,
    failures: &mpsc::Sender<DeliveryFailure>,
) {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match transport.send(&record.channel, &record.payload).await {
            Ok(()) => return,
            Err(error) if attempt > max_retries => {
                let failure = DeliveryFailure {
                    channel: record.channel,
                    payload_len: record.payload.len(),
                    attempts: attempt,
                    error,
                };
                if let Err(TrySendError::Full(dropped)) = failures.try_send(failure) {
                    tracing::warn!(
                        channel = %dropped.channel,
                        error = %dropped.error,
                        "delivery failure channel full, report dropped"
                    );
                }
                return;
            }
            Err(error) => {
                tracing::debug!(channel = %record.channel, attempt, error = %error, "send failed, retrying");
                tokio::time::sleep(backoff * attempt).await;
            }
        }
    }
}

/// Logs every delivery failure. Ends when all senders are gone.
async fn drain_failures(mut failures: mpsc::Receiver<DeliveryFailure>) {
    while let Some(failure) = failures.recv().await {
        tracing::error!(
            channel = %failure.channel,
            bytes = failure.payload_len,
            attempts = failure.attempts,
            error = %failure.error,
            "produce error"
        );
    }
}
