//! Partition executor
//!
//! One executor runs per input partition. It takes records off its channel
//! strictly in arrival order, runs them through the shared pipeline and
//! periodically sweeps closed windows out of the store.

use crate::core::InboundRecord;
use crate::error::Result;
use crate::pipeline::word_count::WordCountPipeline;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Statistics for one partition executor
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Partition served by the executor
    pub partition: i32,

    /// Records taken off the channel
    pub records_received: u64,

    /// Records skipped because of a per-record error
    pub records_skipped: u64,

    /// Tokens counted
    pub tokens_counted: u64,

    /// Tokens dropped as late
    pub late_tokens: u64,

    /// Expiry sweeps triggered by record cadence
    pub expiry_sweeps: u64,

    /// Stream time after the last record
    pub stream_time: Option<i64>,
}

impl ExecutorStats {
    fn new(partition: i32) -> Self {
        Self {
            partition,
            ..Default::default()
        }
    }
}

/// Drives one partition's records through the pipeline
pub struct PartitionExecutor {
    partition: i32,
    pipeline: Arc<WordCountPipeline>,
    stats: ExecutorStats,
}

impl PartitionExecutor {
    pub fn new(partition: i32, pipeline: Arc<WordCountPipeline>) -> Self {
        Self {
            partition,
            pipeline,
            stats: ExecutorStats::new(partition),
        }
    }

    /// Process records until the channel closes
    ///
    /// Per-record errors are logged and the record skipped. A fatal error
    /// stops the executor and is returned to the caller.
    pub async fn run(mut self, mut rx: mpsc::Receiver<InboundRecord>) -> Result<ExecutorStats> {
        info!(
            pipeline = %self.pipeline.name(),
            partition = self.partition,
            "Starting partition executor"
        );

        while let Some(record) = rx.recv().await {
            if let Err(e) = self.process_record(&record).await {
                error!(
                    partition = self.partition,
                    error = %e,
                    "Partition executor stopping on fatal error"
                );
                return Err(e);
            }
        }

        info!(
            partition = self.partition,
            records = self.stats.records_received,
            skipped = self.stats.records_skipped,
            "Partition executor drained"
        );
        Ok(self.stats)
    }

    /// Process one record, returning only fatal errors
    ///
    /// A record's offset is reported as processed once its updates are on
    /// the emission queue or it has been skipped. A record that fails fatally
    /// is never reported.
    pub async fn process_record(&mut self, record: &InboundRecord) -> Result<()> {
        self.stats.records_received += 1;

        match self.pipeline.process(record).await {
            Ok(outcome) => {
                self.stats.tokens_counted += outcome.counted as u64;
                self.stats.late_tokens += outcome.late as u64;
                self.stats.stream_time = Some(outcome.stream_time);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                self.stats.records_skipped += 1;
                debug!(partition = self.partition, error = %e, "Record skipped");
            }
        }

        if let Some(offset) = record.offset {
            self.pipeline.offsets().update_offset(self.partition, offset);
        }

        let every = self.pipeline.config().expire_every_records;
        if every > 0 && self.stats.records_received % every == 0 {
            if let Some(stream_time) = self.stats.stream_time {
                let removed = self.pipeline.expire(stream_time).await?;
                self.stats.expiry_sweeps += 1;
                debug!(
                    partition = self.partition,
                    stream_time,
                    removed,
                    "Record-cadence expiry sweep"
                );
            }
        }

        Ok(())
    }

    pub fn stats(&self) -> &ExecutorStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::CollectingSink;
    use crate::pipeline::WordCountPipelineBuilder;

    fn pipeline(expire_every: u64, max_entries: Option<usize>) -> (Arc<WordCountPipeline>, CollectingSink) {
        let sink = CollectingSink::new();
        let mut builder = WordCountPipelineBuilder::new()
            .with_grace_period_ms(0)
            .with_expire_every_records(expire_every)
            .with_sink(Arc::new(sink.clone()));
        if let Some(max) = max_entries {
            builder = builder.with_max_entries(max);
        }
        (Arc::new(builder.build().unwrap()), sink)
    }

    #[tokio::test]
    async fn test_executor_drains_channel() {
        let (pipeline, sink) = pipeline(0, None);
        let (tx, rx) = mpsc::channel(8);

        tx.send(InboundRecord::new("a b a", 1_000)).await.unwrap();
        tx.send(InboundRecord::without_value(1_000)).await.unwrap();
        tx.send(InboundRecord::new("a", 2_000)).await.unwrap();
        drop(tx);

        let stats = PartitionExecutor::new(0, pipeline.clone())
            .run(rx)
            .await
            .unwrap();
        assert_eq!(stats.records_received, 3);
        assert_eq!(stats.records_skipped, 1);
        assert_eq!(stats.tokens_counted, 4);
        assert_eq!(stats.stream_time, Some(2_000));

        pipeline.emitter().shutdown().await;
        let counts: Vec<_> = sink.records().iter().map(|r| r.count).collect();
        assert_eq!(counts, vec![1, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_record_cadence_expiry() {
        let (pipeline, _sink) = pipeline(2, None);
        let mut executor = PartitionExecutor::new(0, pipeline.clone());

        executor
            .process_record(&InboundRecord::new("old", 0))
            .await
            .unwrap();
        assert_eq!(pipeline.store().len().await.unwrap(), 1);

        // second record moves stream time past the first window and sweeps
        executor
            .process_record(&InboundRecord::new("new", 30_000))
            .await
            .unwrap();
        assert_eq!(executor.stats().expiry_sweeps, 1);
        let entries = pipeline.store().entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key.word, "new");

        pipeline.emitter().shutdown().await;
    }

    #[tokio::test]
    async fn test_fatal_error_stops_executor() {
        let (pipeline, _sink) = pipeline(0, Some(1));
        let (tx, rx) = mpsc::channel(8);

        tx.send(InboundRecord::new("a", 0)).await.unwrap();
        tx.send(InboundRecord::new("b", 0)).await.unwrap();
        tx.send(InboundRecord::new("a", 0)).await.unwrap();
        drop(tx);

        let err = PartitionExecutor::new(0, pipeline.clone())
            .run(rx)
            .await
            .unwrap_err();
        assert!(err.is_fatal());

        // the third record was never processed
        pipeline.emitter().shutdown().await;
        assert_eq!(pipeline.stats().tokens_counted, 1);
    }

    #[tokio::test]
    async fn test_reports_processed_offsets() {
        let (pipeline, _sink) = pipeline(0, Some(1));
        let mut executor = PartitionExecutor::new(3, pipeline.clone());

        executor
            .process_record(&InboundRecord::new("a", 0).with_partition(3).with_offset(40))
            .await
            .unwrap();
        // skipped records still count as processed
        executor
            .process_record(&InboundRecord::without_value(0).with_partition(3).with_offset(41))
            .await
            .unwrap();
        assert_eq!(pipeline.offsets().processed(3), Some(41));

        // a fatal record leaves the offset where it was
        let err = executor
            .process_record(&InboundRecord::new("b", 0).with_partition(3).with_offset(42))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(pipeline.offsets().processed(3), Some(41));

        pipeline.emitter().shutdown().await;
    }
}
