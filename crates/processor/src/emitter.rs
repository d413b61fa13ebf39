//! Emission of count updates
//!
//! Every successful increment produces one [`WindowedCount`] update. The
//! [`Emitter`] puts updates on a bounded queue; a single delivery task drains
//! the queue in order and hands each update to an [`OutputSink`], retrying
//! retryable failures with exponential backoff.
//!
//! Counting never waits on delivery for longer than the enqueue timeout, and
//! a failed delivery never changes the in-memory count.
//!
//! A [barrier](Emitter::barrier) travels through the same queue and resolves
//! once every update queued ahead of it is settled, which is what offset
//! commits wait on.

use crate::config::EmitterConfig;
use crate::core::{CounterEntry, WindowedCount};
use crate::error::{EmitError, EmitResult};
use crate::metrics::{DropReason, WordCountMetrics};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Outbound transport for count updates
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Deliver one update
    ///
    /// Return [`EmitError::Rejected`] with `retryable: true` for transient
    /// failures that are worth another attempt.
    async fn deliver(&self, record: &WindowedCount) -> EmitResult<()>;

    /// Wait for in-flight deliveries to be acknowledged
    async fn flush(&self) -> EmitResult<()> {
        Ok(())
    }

    /// Sink name for logs and topology
    fn name(&self) -> &str;
}

/// In-memory sink that keeps every delivered update, in delivery order
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    records: Arc<Mutex<Vec<WindowedCount>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything delivered so far
    pub fn records(&self) -> Vec<WindowedCount> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl OutputSink for CollectingSink {
    async fn deliver(&self, record: &WindowedCount) -> EmitResult<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "collecting"
    }
}

/// Emitter statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitterStats {
    /// Updates accepted onto the queue
    pub enqueued: u64,
    /// Updates acknowledged by the sink
    pub delivered: u64,
    /// Repeated delivery attempts
    pub retries: u64,
    /// Updates dropped because the queue stayed full
    pub dropped_queue_full: u64,
    /// Updates dropped after delivery failed
    pub dropped_delivery: u64,
}

#[derive(Debug, Default)]
struct EmitterCounters {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    retries: AtomicU64,
    dropped_queue_full: AtomicU64,
    dropped_delivery: AtomicU64,
}

impl EmitterCounters {
    fn snapshot(&self) -> EmitterStats {
        EmitterStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            dropped_queue_full: self.dropped_queue_full.load(Ordering::Relaxed),
            dropped_delivery: self.dropped_delivery.load(Ordering::Relaxed),
        }
    }
}

enum Queued {
    Update(WindowedCount),
    Barrier(oneshot::Sender<()>),
}

/// Queues count updates and delivers them to an [`OutputSink`]
pub struct Emitter {
    sender: Mutex<Option<mpsc::Sender<Queued>>>,
    delivery_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    config: EmitterConfig,
    counters: Arc<EmitterCounters>,
    metrics: WordCountMetrics,
    sink_name: String,
}

impl Emitter {
    /// Create an emitter and spawn its delivery task
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        sink: Arc<dyn OutputSink>,
        config: EmitterConfig,
        metrics: WordCountMetrics,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let counters = Arc::new(EmitterCounters::default());
        let sink_name = sink.name().to_string();

        let delivery = DeliveryLoop {
            sink,
            config,
            counters: Arc::clone(&counters),
            metrics: metrics.clone(),
        };
        let handle = tokio::spawn(delivery.run(rx));

        info!(
            sink = %sink_name,
            queue_capacity = config.queue_capacity,
            max_retries = config.max_retries,
            "Emitter started"
        );

        Self {
            sender: Mutex::new(Some(tx)),
            delivery_task: tokio::sync::Mutex::new(Some(handle)),
            config,
            counters,
            metrics,
            sink_name,
        }
    }

    /// Queue the update for `entry`
    ///
    /// Waits at most the configured enqueue timeout for room in the queue.
    pub async fn emit(&self, entry: &CounterEntry) -> EmitResult<()> {
        let sender = self.sender.lock().clone();
        let Some(sender) = sender else {
            self.metrics.emission_dropped(DropReason::Closed);
            return Err(EmitError::Closed);
        };

        let record = Queued::Update(entry.to_windowed_count());
        match sender.send_timeout(record, self.config.enqueue_timeout()).await {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                self.metrics.emission_enqueued();
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => {
                self.counters
                    .dropped_queue_full
                    .fetch_add(1, Ordering::Relaxed);
                self.metrics.emission_dropped(DropReason::QueueTimeout);
                warn!(
                    word = %entry.key.word,
                    count = entry.count,
                    timeout_ms = self.config.enqueue_timeout_ms,
                    "Emission queue full, dropping update"
                );
                Err(EmitError::QueueTimeout {
                    word: entry.key.word.clone(),
                    timeout_ms: self.config.enqueue_timeout_ms,
                })
            }
            Err(SendTimeoutError::Closed(_)) => {
                self.metrics.emission_dropped(DropReason::Closed);
                Err(EmitError::Closed)
            }
        }
    }

    /// Queue a marker behind every update accepted so far
    ///
    /// The receiver resolves once the delivery task has delivered or dropped
    /// each of those updates. Never waits: returns `None` when the queue is
    /// full or the emitter is shut down.
    pub fn barrier(&self) -> Option<oneshot::Receiver<()>> {
        let sender = self.sender.lock().clone()?;
        let (tx, rx) = oneshot::channel();
        sender.try_send(Queued::Barrier(tx)).ok()?;
        Some(rx)
    }

    /// Get current statistics
    pub fn stats(&self) -> EmitterStats {
        self.counters.snapshot()
    }

    pub fn sink_name(&self) -> &str {
        &self.sink_name
    }

    /// Stop accepting updates, deliver what is queued and flush the sink
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        // Dropping the last sender ends the delivery loop once the queue drains
        drop(self.sender.lock().take());

        let handle = self.delivery_task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Emitter delivery task failed");
            }
        }

        let stats = self.stats();
        info!(
            enqueued = stats.enqueued,
            delivered = stats.delivered,
            dropped = stats.dropped_queue_full + stats.dropped_delivery,
            "Emitter shut down"
        );
    }
}

struct DeliveryLoop {
    sink: Arc<dyn OutputSink>,
    config: EmitterConfig,
    counters: Arc<EmitterCounters>,
    metrics: WordCountMetrics,
}

impl DeliveryLoop {
    async fn run(self, mut rx: mpsc::Receiver<Queued>) {
        while let Some(queued) = rx.recv().await {
            let record = match queued {
                Queued::Update(record) => record,
                Queued::Barrier(ack) => {
                    // the waiter may have given up
                    let _ = ack.send(());
                    continue;
                }
            };
            match self.deliver_with_retry(&record).await {
                Ok(()) => {
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    self.metrics.emission_delivered();
                }
                Err(e) => {
                    self.counters
                        .dropped_delivery
                        .fetch_add(1, Ordering::Relaxed);
                    self.metrics.emission_dropped(DropReason::DeliveryFailure);
                    error!(
                        sink = %self.sink.name(),
                        word = %record.word,
                        count = record.count,
                        error = %e,
                        "Dropping update after delivery failure"
                    );
                }
            }
        }

        if let Err(e) = self.sink.flush().await {
            error!(sink = %self.sink.name(), error = %e, "Failed to flush sink");
        }
        debug!(sink = %self.sink.name(), "Delivery loop finished");
    }

    async fn deliver_with_retry(&self, record: &WindowedCount) -> EmitResult<()> {
        let mut retries = 0u32;

        loop {
            match self.sink.deliver(record).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && retries < self.config.max_retries => {
                    let backoff = calculate_backoff(&self.config, retries);
                    retries += 1;
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    self.metrics.delivery_retried();
                    warn!(
                        word = %record.word,
                        retry = retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Delivery failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    return Err(EmitError::DeliveryFailure {
                        attempts: retries + 1,
                        reason: e.to_string(),
                    })
                }
            }
        }
    }
}

/// Exponential backoff: `base * 2^retry`, capped at the configured maximum
fn calculate_backoff(config: &EmitterConfig, retry_count: u32) -> Duration {
    let backoff_ms = config
        .base_backoff_ms
        .saturating_mul(2u64.pow(retry_count.min(10)));
    Duration::from_millis(backoff_ms.min(config.max_backoff_ms))
}
