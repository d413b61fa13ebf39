//! Per-record word counting
//!
//! [`WordCountPipeline`] runs one inbound record through the whole linear
//! pass: validate timestamp, tokenize, advance stream time, then for each
//! token assign the window, increment the counter and emit the new count.
//!
//! The pipeline holds no counts itself. It can be shared by any number of
//! partition workers.

use crate::config::ProcessorConfig;
use crate::core::{CounterKey, InboundRecord};
use crate::emitter::Emitter;
use crate::error::{ProcessorError, Result, StateError};
use crate::metrics::{RejectReason, WordCountMetrics};
use crate::monitor::Topology;
use crate::pipeline::offsets::OffsetTracker;
use crate::state::CounterStore;
use crate::tokenizer::tokenize;
use crate::watermark::StreamTimeTracker;
use crate::window::WindowAssigner;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// What happened to the tokens of one record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordOutcome {
    /// Tokens whose counter was incremented
    pub counted: usize,
    /// Tokens dropped because their window was closed
    pub late: usize,
    /// Updates accepted by the emitter
    pub emitted: usize,
    /// Partition stream time after this record
    pub stream_time: i64,
}

/// Statistics for a pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Records that reached the counting stage
    pub records_processed: u64,
    /// Records skipped for an absent value or an invalid timestamp
    pub records_rejected: u64,
    /// Successful increments
    pub tokens_counted: u64,
    /// Tokens dropped as late
    pub late_tokens_dropped: u64,
    /// Updates the emitter did not accept
    pub emit_failures: u64,
    /// Expiry sweeps run
    pub expiry_sweeps: u64,
    /// Counters removed by expiry
    pub counters_expired: u64,
}

#[derive(Debug, Default)]
struct PipelineCounters {
    records_processed: AtomicU64,
    records_rejected: AtomicU64,
    tokens_counted: AtomicU64,
    late_tokens_dropped: AtomicU64,
    emit_failures: AtomicU64,
    expiry_sweeps: AtomicU64,
    counters_expired: AtomicU64,
}

/// The windowed word-count pipeline
pub struct WordCountPipeline {
    name: String,
    config: ProcessorConfig,
    assigner: Arc<dyn WindowAssigner>,
    store: Arc<dyn CounterStore>,
    emitter: Arc<Emitter>,
    stream_time: Arc<StreamTimeTracker>,
    offsets: Arc<OffsetTracker>,
    metrics: WordCountMetrics,
    counters: PipelineCounters,
}

impl WordCountPipeline {
    pub(crate) fn new(
        name: String,
        config: ProcessorConfig,
        assigner: Arc<dyn WindowAssigner>,
        store: Arc<dyn CounterStore>,
        emitter: Arc<Emitter>,
        stream_time: Arc<StreamTimeTracker>,
        offsets: Arc<OffsetTracker>,
        metrics: WordCountMetrics,
    ) -> Self {
        Self {
            name,
            config,
            assigner,
            store,
            emitter,
            stream_time,
            offsets,
            metrics,
            counters: PipelineCounters::default(),
        }
    }

    /// Count the words of one record
    ///
    /// # Errors
    ///
    /// - `ProcessorError::Window` for a negative or unrepresentable timestamp
    /// - `ProcessorError::Input` for an absent value
    /// - `ProcessorError::State` with `StoreUnavailable` when the store refuses a
    ///   write; this is the only fatal error and no update is emitted for the
    ///   failing token
    ///
    /// Late tokens are not errors: they are reported in the outcome.
    pub async fn process(&self, record: &InboundRecord) -> Result<RecordOutcome> {
        let window = match self.assigner.assign(record.timestamp) {
            Ok(window) => window,
            Err(e) => {
                self.reject(RejectReason::InvalidTimestamp);
                warn!(
                    partition = record.partition,
                    timestamp = record.timestamp,
                    error = %e,
                    "Skipping record with invalid timestamp"
                );
                return Err(e.into());
            }
        };

        let tokens = match tokenize(record.value.as_deref()) {
            Ok(tokens) => tokens,
            Err(e) => {
                self.reject(RejectReason::InvalidInput);
                warn!(
                    partition = record.partition,
                    timestamp = record.timestamp,
                    error = %e,
                    "Skipping record without text"
                );
                return Err(e.into());
            }
        };

        let stream_time = self.stream_time.advance(record.partition, record.timestamp);
        self.metrics.set_stream_time(record.partition, stream_time);
        self.counters
            .records_processed
            .fetch_add(1, Ordering::Relaxed);
        self.metrics.record_processed();

        let grace_ms = self.config.window.grace_period_ms;
        let mut outcome = RecordOutcome {
            stream_time,
            ..Default::default()
        };

        for token in tokens.iter() {
            let key = CounterKey::new(token, window);
            match self.store.increment(key, stream_time, grace_ms).await {
                Ok(entry) => {
                    outcome.counted += 1;
                    self.counters.tokens_counted.fetch_add(1, Ordering::Relaxed);
                    self.metrics.token_counted();
                    if entry.count == 1 {
                        self.metrics.set_live_counters(self.store.len().await?);
                    }

                    match self.emitter.emit(&entry).await {
                        Ok(()) => outcome.emitted += 1,
                        Err(e) => {
                            self.counters.emit_failures.fetch_add(1, Ordering::Relaxed);
                            debug!(key = %entry.key, error = %e, "Update not emitted");
                        }
                    }
                }
                Err(StateError::LateRecordDropped {
                    word,
                    window_end,
                    ..
                }) => {
                    outcome.late += 1;
                    self.counters
                        .late_tokens_dropped
                        .fetch_add(1, Ordering::Relaxed);
                    self.metrics.late_record_dropped();
                    debug!(
                        word = %word,
                        window_end = window_end,
                        stream_time = stream_time,
                        grace_ms = grace_ms,
                        "Dropping late token"
                    );
                }
                Err(e) => {
                    self.metrics.store_failure();
                    error!(
                        pipeline = %self.name,
                        partition = record.partition,
                        error = %e,
                        "Counter store refused increment"
                    );
                    return Err(ProcessorError::State(e));
                }
            }
        }

        trace!(
            partition = record.partition,
            counted = outcome.counted,
            late = outcome.late,
            "Record processed"
        );

        Ok(outcome)
    }

    /// Remove every counter whose window is closed at `stream_time`
    pub async fn expire(&self, stream_time: i64) -> Result<usize> {
        let removed = self
            .store
            .expire(stream_time, self.config.window.grace_period_ms)
            .await?;

        self.counters.expiry_sweeps.fetch_add(1, Ordering::Relaxed);
        self.counters
            .counters_expired
            .fetch_add(removed as u64, Ordering::Relaxed);
        self.metrics.counters_expired(removed);
        self.metrics.set_live_counters(self.store.len().await?);

        Ok(removed)
    }

    fn reject(&self, reason: RejectReason) {
        self.counters.records_rejected.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_rejected(reason);
    }

    /// Get current statistics
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            records_processed: self.counters.records_processed.load(Ordering::Relaxed),
            records_rejected: self.counters.records_rejected.load(Ordering::Relaxed),
            tokens_counted: self.counters.tokens_counted.load(Ordering::Relaxed),
            late_tokens_dropped: self.counters.late_tokens_dropped.load(Ordering::Relaxed),
            emit_failures: self.counters.emit_failures.load(Ordering::Relaxed),
            expiry_sweeps: self.counters.expiry_sweeps.load(Ordering::Relaxed),
            counters_expired: self.counters.counters_expired.load(Ordering::Relaxed),
        }
    }

    /// Describe the topology, reading from `source`
    pub fn topology(&self, source: impl Into<String>) -> Topology {
        Topology {
            name: self.name.clone(),
            source: source.into(),
            stages: vec![
                "tokenize".to_string(),
                format!(
                    "assign-tumbling-window({}ms)",
                    self.assigner.window_size().num_milliseconds()
                ),
                "count".to_string(),
                "emit".to_string(),
            ],
            sink: self.emitter.sink_name().to_string(),
            window_size_ms: self.config.window.size_ms,
            grace_period_ms: self.config.window.grace_period_ms,
            max_entries: self.config.store.max_entries,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    pub fn emitter(&self) -> &Arc<Emitter> {
        &self.emitter
    }

    pub fn stream_time(&self) -> &Arc<StreamTimeTracker> {
        &self.stream_time
    }

    /// Offsets of records the executors have finished with
    pub fn offsets(&self) -> &Arc<OffsetTracker> {
        &self.offsets
    }

    pub fn metrics(&self) -> &WordCountMetrics {
        &self.metrics
    }
}

impl std::fmt::Debug for WordCountPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordCountPipeline")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("assigner", &self.assigner)
            .finish()
    }
}
