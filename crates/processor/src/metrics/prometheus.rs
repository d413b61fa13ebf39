//! Word-count processor metrics
//!
//! Every handle is cheap to clone and shares its underlying series, so one
//! `WordCountMetrics` is built by the bootstrap and cloned into each stage.

use super::labels::{DropLabels, DropReason, PartitionLabels, RejectLabels, RejectReason};
use super::registry::MetricsRegistry;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use serde::{Deserialize, Serialize};

/// Prometheus metrics of the counting pipeline and its emitter
#[derive(Debug, Clone, Default)]
pub struct WordCountMetrics {
    records_processed: Counter,
    records_rejected: Family<RejectLabels, Counter>,
    tokens_counted: Counter,
    late_records_dropped: Counter,
    store_failures: Counter,
    counters_expired: Counter,
    live_counters: Gauge,
    stream_time: Family<PartitionLabels, Gauge>,
    emissions_enqueued: Counter,
    emissions_delivered: Counter,
    emissions_dropped: Family<DropLabels, Counter>,
    delivery_retries: Counter,
}

impl WordCountMetrics {
    /// Create metrics that are not yet exposed anywhere
    pub fn new() -> Self {
        Self::default()
    }

    /// Create metrics and register them in `registry`
    pub fn registered(registry: &MetricsRegistry) -> Self {
        let metrics = Self::new();
        metrics.register(registry);
        metrics
    }

    /// Register every series in `registry`
    pub fn register(&self, registry: &MetricsRegistry) {
        let registry = registry.registry();
        let mut registry = registry.write();

        registry.register(
            "records_processed",
            "Inbound records accepted for counting",
            self.records_processed.clone(),
        );
        registry.register(
            "records_rejected",
            "Inbound records skipped before counting",
            self.records_rejected.clone(),
        );
        registry.register(
            "tokens_counted",
            "Successful counter increments",
            self.tokens_counted.clone(),
        );
        registry.register(
            "late_records_dropped",
            "Tokens dropped because their window was closed",
            self.late_records_dropped.clone(),
        );
        registry.register(
            "store_failures",
            "Increments refused by the counter store",
            self.store_failures.clone(),
        );
        registry.register(
            "counters_expired",
            "Counters removed after their window closed",
            self.counters_expired.clone(),
        );
        registry.register(
            "live_counters",
            "Counters currently held by the store",
            self.live_counters.clone(),
        );
        registry.register(
            "stream_time_ms",
            "Largest event timestamp seen per partition",
            self.stream_time.clone(),
        );
        registry.register(
            "emissions_enqueued",
            "Count updates queued for delivery",
            self.emissions_enqueued.clone(),
        );
        registry.register(
            "emissions_delivered",
            "Count updates acknowledged by the sink",
            self.emissions_delivered.clone(),
        );
        registry.register(
            "emissions_dropped",
            "Count updates that never reached the sink",
            self.emissions_dropped.clone(),
        );
        registry.register(
            "delivery_retries",
            "Delivery attempts repeated after a retryable failure",
            self.delivery_retries.clone(),
        );
    }

    pub fn record_processed(&self) {
        self.records_processed.inc();
    }

    pub fn record_rejected(&self, reason: RejectReason) {
        self.records_rejected
            .get_or_create(&RejectLabels { reason })
            .inc();
    }

    pub fn token_counted(&self) {
        self.tokens_counted.inc();
    }

    pub fn late_record_dropped(&self) {
        self.late_records_dropped.inc();
    }

    pub fn store_failure(&self) {
        self.store_failures.inc();
    }

    pub fn counters_expired(&self, removed: usize) {
        self.counters_expired.inc_by(removed as u64);
    }

    pub fn set_live_counters(&self, live: usize) {
        self.live_counters
            .set(i64::try_from(live).unwrap_or(i64::MAX));
    }

    pub fn set_stream_time(&self, partition: i32, stream_time: i64) {
        self.stream_time
            .get_or_create(&PartitionLabels::new(partition))
            .set(stream_time);
    }

    pub fn emission_enqueued(&self) {
        self.emissions_enqueued.inc();
    }

    pub fn emission_delivered(&self) {
        self.emissions_delivered.inc();
    }

    pub fn emission_dropped(&self, reason: DropReason) {
        self.emissions_dropped
            .get_or_create(&DropLabels { reason })
            .inc();
    }

    pub fn delivery_retried(&self) {
        self.delivery_retries.inc();
    }

    /// Point-in-time copy of the unlabeled series
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_processed: self.records_processed.get(),
            records_rejected: self
                .records_rejected
                .get_or_create(&RejectLabels {
                    reason: RejectReason::InvalidInput,
                })
                .get()
                + self
                    .records_rejected
                    .get_or_create(&RejectLabels {
                        reason: RejectReason::InvalidTimestamp,
                    })
                    .get(),
            tokens_counted: self.tokens_counted.get(),
            late_records_dropped: self.late_records_dropped.get(),
            store_failures: self.store_failures.get(),
            counters_expired: self.counters_expired.get(),
            live_counters: self.live_counters.get(),
            emissions_enqueued: self.emissions_enqueued.get(),
            emissions_delivered: self.emissions_delivered.get(),
            emissions_dropped: [
                DropReason::QueueTimeout,
                DropReason::DeliveryFailure,
                DropReason::Closed,
            ]
            .into_iter()
            .map(|reason| {
                self.emissions_dropped
                    .get_or_create(&DropLabels { reason })
                    .get()
            })
            .sum(),
            delivery_retries: self.delivery_retries.get(),
        }
    }
}

/// Plain-value view of [`WordCountMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub records_processed: u64,
    pub records_rejected: u64,
    pub tokens_counted: u64,
    pub late_records_dropped: u64,
    pub store_failures: u64,
    pub counters_expired: u64,
    pub live_counters: i64,
    pub emissions_enqueued: u64,
    pub emissions_delivered: u64,
    pub emissions_dropped: u64,
    pub delivery_retries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_series() {
        let metrics = WordCountMetrics::new();
        let clone = metrics.clone();

        clone.record_processed();
        clone.token_counted();
        clone.token_counted();
        clone.record_rejected(RejectReason::InvalidInput);
        clone.record_rejected(RejectReason::InvalidTimestamp);
        clone.emission_dropped(DropReason::DeliveryFailure);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.records_processed, 1);
        assert_eq!(snapshot.tokens_counted, 2);
        assert_eq!(snapshot.records_rejected, 2);
        assert_eq!(snapshot.emissions_dropped, 1);
    }

    #[test]
    fn test_registered_metrics_are_encoded() {
        let registry = MetricsRegistry::new();
        let metrics = WordCountMetrics::registered(&registry);
        metrics.late_record_dropped();
        metrics.set_stream_time(2, 90_000);
        metrics.set_live_counters(3);

        let text = registry.encode().unwrap();
        assert!(text.contains("late_records_dropped_total 1"));
        assert!(text.contains("live_counters 3"));
        assert!(text.contains("stream_time_ms{partition=\"2\"} 90000"));
    }
}
