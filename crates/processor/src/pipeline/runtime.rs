//! Partition-routing runtime
//!
//! The runtime owns one [`PartitionExecutor`] task per input partition,
//! spawned the first time a partition is seen, plus the background expiry
//! task. Shutdown drains every executor before flushing the emitter.

use crate::core::InboundRecord;
use crate::error::{ProcessorError, Result};
use crate::pipeline::executor::{ExecutorStats, PartitionExecutor};
use crate::pipeline::word_count::WordCountPipeline;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct WorkerHandle {
    tx: mpsc::Sender<InboundRecord>,
    handle: JoinHandle<Result<ExecutorStats>>,
}

/// Routes records to per-partition executors
pub struct PartitionRuntime {
    pipeline: Arc<WordCountPipeline>,
    workers: HashMap<i32, WorkerHandle>,
    expiry_task: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl PartitionRuntime {
    /// Create a runtime and start the background expiry task if configured
    pub fn new(pipeline: Arc<WordCountPipeline>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let expiry_task = pipeline
            .config()
            .expiry_interval()
            .map(|interval| spawn_expiry_task(Arc::clone(&pipeline), interval, shutdown_rx));

        info!(pipeline = %pipeline.name(), "Partition runtime started");

        Self {
            pipeline,
            workers: HashMap::new(),
            expiry_task,
            shutdown_tx,
        }
    }

    /// Hand a record to its partition's executor
    ///
    /// Waits while the executor's channel is full. Fails if the executor has
    /// stopped on a fatal error; the returned error is the executor's own.
    pub async fn dispatch(&mut self, record: InboundRecord) -> Result<()> {
        let partition = record.partition;
        let tx = self.worker(partition).tx.clone();

        if tx.send(record).await.is_err() {
            let worker = self.workers.remove(&partition);
            return Err(match worker {
                Some(worker) => match worker.handle.await {
                    Ok(Err(e)) => e,
                    Ok(Ok(_)) => ProcessorError::Unexpected(format!(
                        "executor for partition {} exited early",
                        partition
                    )),
                    Err(e) => ProcessorError::Execution {
                        source: Box::new(e),
                    },
                },
                None => ProcessorError::Unexpected(format!(
                    "no executor for partition {}",
                    partition
                )),
            });
        }

        Ok(())
    }

    fn worker(&mut self, partition: i32) -> &WorkerHandle {
        let pipeline = &self.pipeline;
        self.workers.entry(partition).or_insert_with(|| {
            let (tx, rx) = mpsc::channel(pipeline.config().worker_buffer_size);
            let executor = PartitionExecutor::new(partition, Arc::clone(pipeline));
            debug!(partition, "Spawning partition executor");
            WorkerHandle {
                tx,
                handle: tokio::spawn(executor.run(rx)),
            }
        })
    }

    /// Partitions that currently have an executor
    pub fn partitions(&self) -> Vec<i32> {
        let mut partitions: Vec<_> = self.workers.keys().copied().collect();
        partitions.sort_unstable();
        partitions
    }

    pub fn pipeline(&self) -> &Arc<WordCountPipeline> {
        &self.pipeline
    }

    /// Drain all executors, stop the expiry task and flush the emitter
    ///
    /// Returns each executor's final statistics. The first fatal executor
    /// error, if any, is returned after everything has been shut down.
    pub async fn shutdown(mut self) -> Result<Vec<ExecutorStats>> {
        info!(pipeline = %self.pipeline.name(), "Shutting down partition runtime");

        let mut stats = Vec::with_capacity(self.workers.len());
        let mut first_error = None;

        let mut workers: Vec<_> = self.workers.drain().collect();
        workers.sort_unstable_by_key(|(partition, _)| *partition);

        for (partition, worker) in workers {
            drop(worker.tx);
            match worker.handle.await {
                Ok(Ok(executor_stats)) => stats.push(executor_stats),
                Ok(Err(e)) => {
                    error!(partition, error = %e, "Executor failed");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    error!(partition, error = %e, "Executor task panicked");
                    first_error.get_or_insert(ProcessorError::Execution {
                        source: Box::new(e),
                    });
                }
            }
        }

        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.expiry_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Expiry task ended abnormally");
            }
        }

        self.pipeline.emitter().shutdown().await;

        let pipeline_stats = self.pipeline.stats();
        info!(
            records = pipeline_stats.records_processed,
            rejected = pipeline_stats.records_rejected,
            tokens = pipeline_stats.tokens_counted,
            late = pipeline_stats.late_tokens_dropped,
            "Partition runtime stopped"
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }
}

/// Periodically expire closed windows at the largest stream time seen on any
/// partition
fn spawn_expiry_task(
    pipeline: Arc<WordCountPipeline>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(stream_time) = pipeline.stream_time().max_stream_time() else {
                        continue;
                    };
                    match pipeline.expire(stream_time).await {
                        Ok(removed) if removed > 0 => {
                            debug!(removed, stream_time, "Background expiry removed counters");
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Background expiry failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Expiry task stopping");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::CollectingSink;
    use crate::pipeline::WordCountPipelineBuilder;

    fn runtime(expiry_interval_ms: u64) -> (PartitionRuntime, CollectingSink) {
        let sink = CollectingSink::new();
        let pipeline = WordCountPipelineBuilder::new()
            .with_grace_period_ms(0)
            .with_expire_every_records(0)
            .with_expiry_interval_ms(expiry_interval_ms)
            .with_sink(Arc::new(sink.clone()))
            .build()
            .unwrap();
        (PartitionRuntime::new(Arc::new(pipeline)), sink)
    }

    #[tokio::test]
    async fn test_spawns_executor_per_partition() {
        let (mut runtime, sink) = runtime(0);

        runtime
            .dispatch(InboundRecord::new("a", 1_000).with_partition(1))
            .await
            .unwrap();
        runtime
            .dispatch(InboundRecord::new("a", 1_000).with_partition(0))
            .await
            .unwrap();
        runtime
            .dispatch(InboundRecord::new("b", 2_000).with_partition(1))
            .await
            .unwrap();
        assert_eq!(runtime.partitions(), vec![0, 1]);

        let stats = runtime.shutdown().await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].partition, 0);
        assert_eq!(stats[0].records_received, 1);
        assert_eq!(stats[1].records_received, 2);

        // shared store: both partitions count into the same key
        let mut a_counts: Vec<_> = sink
            .records()
            .into_iter()
            .filter(|r| r.word == "a")
            .map(|r| r.count)
            .collect();
        a_counts.sort_unstable();
        assert_eq!(a_counts, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_dispatch_after_fatal_error_reports_it() {
        let sink = CollectingSink::new();
        let pipeline = WordCountPipelineBuilder::new()
            .with_max_entries(1)
            .with_expiry_interval_ms(0)
            .with_sink(Arc::new(sink.clone()))
            .build()
            .unwrap();
        let mut runtime = PartitionRuntime::new(Arc::new(pipeline));

        runtime.dispatch(InboundRecord::new("a b", 0)).await.unwrap();

        // the executor stops on the refused write; keep feeding until the
        // closed channel surfaces its error
        let mut result = Ok(());
        for _ in 0..100 {
            result = runtime.dispatch(InboundRecord::new("c", 0)).await;
            if result.is_err() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let err = result.unwrap_err();
        assert!(err.is_fatal());

        runtime.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_expiry() {
        let (mut runtime, _sink) = runtime(1_000);

        runtime
            .dispatch(InboundRecord::new("old", 0).with_partition(0))
            .await
            .unwrap();
        runtime
            .dispatch(InboundRecord::new("new", 30_000).with_partition(1))
            .await
            .unwrap();

        // let executors run, then let the interval fire
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let pipeline = Arc::clone(runtime.pipeline());
        let entries = pipeline.store().entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key.word, "new");
        assert!(pipeline.stats().expiry_sweeps >= 1);

        runtime.shutdown().await.unwrap();
    }
}
