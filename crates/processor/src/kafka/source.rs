//! Kafka source consumer
//!
//! Reads text messages from the input topic and hands them to a
//! [`PartitionRuntime`] as [`InboundRecord`]s.
//!
//! Only offsets the executors report as processed are committed, never the
//! consumer's read position. On each commit tick the pending offsets are
//! snapshotted together with an emitter barrier; they are committed on a
//! later tick once the barrier shows every update they produced has been
//! settled. After the runtime drains, everything processed is committed
//! synchronously. A crash therefore only ever redelivers records.

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::{ClientContext, Message, Offset, TopicPartitionList};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, error, info, warn};

use super::config::KafkaConfig;
use super::error::KafkaError;
use crate::core::InboundRecord;
use crate::error::Result;
use crate::pipeline::{ExecutorStats, OffsetTracker, PartitionOffset, PartitionRuntime};

/// Timestamp used when a message carries none; rejected by window assignment
pub const MISSING_TIMESTAMP: i64 = -1;

/// Consumer context that logs rebalances and commit results
pub struct SourceConsumerContext;

impl ClientContext for SourceConsumerContext {}

impl ConsumerContext for SourceConsumerContext {
    fn pre_rebalance(&self, rebalance: &Rebalance) {
        match rebalance {
            Rebalance::Revoke(tpl) => info!(partitions = tpl.count(), "Partitions revoked"),
            Rebalance::Assign(tpl) => info!(partitions = tpl.count(), "Partitions assigned"),
            Rebalance::Error(e) => error!(error = %e, "Rebalance error"),
        }
    }

    fn commit_callback(&self, result: KafkaResult<()>, _offsets: &TopicPartitionList) {
        match result {
            Ok(_) => debug!("Offsets committed"),
            Err(e) => warn!(error = %e, "Offset commit failed"),
        }
    }
}

/// Consumption counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    pub messages_consumed: u64,
    pub messages_without_value: u64,
    pub messages_without_timestamp: u64,
    pub consume_errors: u64,
    pub commits: u64,
}

#[derive(Default)]
struct SourceCounters {
    messages_consumed: AtomicU64,
    messages_without_value: AtomicU64,
    messages_without_timestamp: AtomicU64,
    consume_errors: AtomicU64,
    commits: AtomicU64,
}

/// Offsets waiting for their updates to be delivered
struct PendingCommit {
    offsets: Vec<PartitionOffset>,
    settled: oneshot::Receiver<()>,
}

/// Kafka consumer feeding the word-count runtime
pub struct KafkaSource {
    consumer: StreamConsumer<SourceConsumerContext>,
    config: KafkaConfig,
    counters: Arc<SourceCounters>,
}

impl KafkaSource {
    /// Create a consumer and subscribe to the input topic
    pub fn new(config: KafkaConfig) -> super::error::Result<Self> {
        config.validate()?;

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "false")
            .set("auto.offset.reset", &config.auto_offset_reset);

        for (key, value) in &config.consumer_config {
            client_config.set(key, value);
        }

        let consumer: StreamConsumer<SourceConsumerContext> =
            client_config.create_with_context(SourceConsumerContext)?;
        consumer.subscribe(&[config.input_topic.as_str()])?;

        info!(
            brokers = %config.brokers,
            group_id = %config.group_id,
            topic = %config.input_topic,
            "Kafka source subscribed"
        );

        Ok(Self {
            consumer,
            config,
            counters: Arc::new(SourceCounters::default()),
        })
    }

    /// Consume until `shutdown` resolves or the runtime fails, then drain
    ///
    /// The runtime is shut down before the final offset commit so that every
    /// processed record's updates have been delivered by then. Offsets of
    /// records processed before a fatal error are still committed.
    pub async fn run<F>(&self, mut runtime: PartitionRuntime, shutdown: F) -> Result<Vec<ExecutorStats>>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut commit_ticker = tokio::time::interval(self.config.commit_interval());
        commit_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut outcome = Ok(());
        let mut pending = None;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Kafka source received shutdown signal");
                    break;
                }
                _ = commit_ticker.tick() => {
                    self.on_commit_tick(&runtime, &mut pending);
                }
                message = self.consumer.recv() => {
                    match message {
                        Ok(msg) => {
                            let record = self.to_record(&msg);
                            if let Err(e) = runtime.dispatch(record).await {
                                error!(error = %e, "Runtime refused record, stopping source");
                                outcome = Err(e);
                                break;
                            }
                        }
                        Err(e) => {
                            self.counters.consume_errors.fetch_add(1, Ordering::Relaxed);
                            let err = KafkaError::consumption(&e, self.config.input_topic.as_str());
                            if err.is_fatal() {
                                error!(error = %err, "Unrecoverable consumer error, stopping source");
                                outcome = Err(err.into());
                                break;
                            }
                            warn!(error = %err, retryable = err.is_retryable(), "Error receiving message");
                        }
                    }
                }
            }
        }

        let offsets = Arc::clone(runtime.pipeline().offsets());
        let drained = runtime.shutdown().await;
        // the emitter has flushed: everything processed is settled
        self.commit(&offsets, offsets.pending(), CommitMode::Sync);

        let stats = self.stats();
        info!(
            consumed = stats.messages_consumed,
            errors = stats.consume_errors,
            "Kafka source stopped"
        );

        outcome?;
        drained
    }

    fn to_record<M: Message>(&self, msg: &M) -> InboundRecord {
        self.counters.messages_consumed.fetch_add(1, Ordering::Relaxed);
        let record = record_from_message(msg);
        if record.value.is_none() {
            self.counters
                .messages_without_value
                .fetch_add(1, Ordering::Relaxed);
        }
        if record.timestamp == MISSING_TIMESTAMP {
            self.counters
                .messages_without_timestamp
                .fetch_add(1, Ordering::Relaxed);
        }
        record
    }

    /// Commit the previous snapshot if its updates have settled, then take a
    /// new one
    fn on_commit_tick(&self, runtime: &PartitionRuntime, pending: &mut Option<PendingCommit>) {
        let pipeline = runtime.pipeline();
        let offsets = pipeline.offsets();

        if let Some(mut waiting) = pending.take() {
            match waiting.settled.try_recv() {
                Ok(()) => self.commit(offsets, waiting.offsets, CommitMode::Async),
                Err(TryRecvError::Empty) => {
                    debug!("Updates still in flight, postponing offset commit");
                    *pending = Some(waiting);
                    return;
                }
                Err(TryRecvError::Closed) => {
                    warn!("Emitter closed before offsets settled");
                }
            }
        }

        let snapshot = offsets.pending();
        if snapshot.is_empty() {
            return;
        }
        match pipeline.emitter().barrier() {
            Some(settled) => {
                *pending = Some(PendingCommit {
                    offsets: snapshot,
                    settled,
                })
            }
            None => debug!("Emission queue full, retrying offset snapshot next tick"),
        }
    }

    fn commit(&self, tracker: &OffsetTracker, offsets: Vec<PartitionOffset>, mode: CommitMode) {
        if offsets.is_empty() {
            return;
        }

        let result = commit_list(&self.config.input_topic, &offsets)
            .and_then(|tpl| self.consumer.commit(&tpl, mode));
        match result {
            Ok(()) => {
                tracker.mark_committed(&offsets);
                self.counters.commits.fetch_add(1, Ordering::Relaxed);
                debug!(partitions = offsets.len(), "Committed processed offsets");
            }
            Err(e) => {
                let err = KafkaError::OffsetCommit {
                    message: e.to_string(),
                    group_id: self.config.group_id.clone(),
                };
                warn!(error = %err, "Failed to commit offsets");
            }
        }
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            messages_consumed: self.counters.messages_consumed.load(Ordering::Relaxed),
            messages_without_value: self.counters.messages_without_value.load(Ordering::Relaxed),
            messages_without_timestamp: self
                .counters
                .messages_without_timestamp
                .load(Ordering::Relaxed),
            consume_errors: self.counters.consume_errors.load(Ordering::Relaxed),
            commits: self.counters.commits.load(Ordering::Relaxed),
        }
    }

    pub fn config(&self) -> &KafkaConfig {
        &self.config
    }
}

/// Build the commit list for processed offsets
///
/// Kafka expects the offset of the next record to read, one past the last
/// processed record.
pub fn commit_list(topic: &str, offsets: &[PartitionOffset]) -> KafkaResult<TopicPartitionList> {
    let mut tpl = TopicPartitionList::with_capacity(offsets.len());
    for po in offsets {
        tpl.add_partition_offset(topic, po.partition, Offset::Offset(po.offset + 1))?;
    }
    Ok(tpl)
}

/// Convert a Kafka message into an inbound record
///
/// A payload that is missing or not valid UTF-8 becomes an absent value. A
/// missing timestamp becomes [`MISSING_TIMESTAMP`].
pub fn record_from_message<M: Message>(msg: &M) -> InboundRecord {
    let value = match msg.payload_view::<str>() {
        Some(Ok(text)) => Some(text.to_string()),
        Some(Err(e)) => {
            debug!(
                partition = msg.partition(),
                offset = msg.offset(),
                error = %e,
                "Payload is not valid UTF-8"
            );
            None
        }
        None => None,
    };

    InboundRecord {
        key: msg.key().map(<[u8]>::to_vec),
        value,
        timestamp: msg.timestamp().to_millis().unwrap_or(MISSING_TIMESTAMP),
        partition: msg.partition(),
        offset: Some(msg.offset()),
    }
}
