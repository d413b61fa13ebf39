//! End-to-end tests for the word-count pipeline
//!
//! Covers tokenization, window assignment, incremental counting and
//! emission, late-record handling at the grace boundary, and the fatal
//! store path through the partition runtime.

use processor::core::{CounterKey, InboundRecord, WindowedCount};
use processor::emitter::CollectingSink;
use processor::error::ProcessorError;
use processor::metrics::{MetricsRegistry, WordCountMetrics};
use processor::monitor::ProcessorMonitor;
use processor::pipeline::{PartitionRuntime, WordCountPipeline, WordCountPipelineBuilder};
use processor::tokenizer::tokenize;
use processor::window::{TumblingWindowAssigner, WindowAssigner};
use std::sync::Arc;
use std::time::Duration;

const WINDOW_MS: u64 = 30_000;

fn pipeline_with_grace(grace_ms: u64) -> (WordCountPipeline, CollectingSink) {
    let sink = CollectingSink::new();
    let pipeline = WordCountPipelineBuilder::new()
        .with_name("wordcount-test")
        .with_tumbling_window(WINDOW_MS)
        .with_grace_period_ms(grace_ms)
        .with_expire_every_records(0)
        .with_expiry_interval_ms(0)
        .with_sink(Arc::new(sink.clone()))
        .build()
        .unwrap();
    (pipeline, sink)
}

/// Wait until the store holds `expected` for `key`, failing after about two seconds
async fn wait_for_count(pipeline: &WordCountPipeline, key: &CounterKey, expected: Option<u64>) {
    for _ in 0..400 {
        let current = pipeline.store().snapshot(key).await.unwrap().map(|e| e.count);
        if current == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("counter {} never reached {:?}", key, expected);
}

fn emitted(records: &[WindowedCount]) -> Vec<(String, u64)> {
    records
        .iter()
        .map(|r| (r.word.clone(), r.count))
        .collect()
}

// ============================================================================
// Tokenization and window assignment
// ============================================================================

mod assignment_tests {
    use super::*;

    #[test]
    fn test_tokenization_ignores_case_and_delimiters() {
        let tokens = tokenize(Some("The Fox. the FOX!")).unwrap();
        let words: Vec<&str> = tokens.iter().collect();
        assert_eq!(words, vec!["the", "fox", "the", "fox"]);
    }

    #[test]
    fn test_window_boundaries() {
        let assigner = TumblingWindowAssigner::new(WINDOW_MS).unwrap();

        let first = assigner.assign(5_000).unwrap();
        assert_eq!(first.start_millis(), 0);
        assert_eq!(first.end_millis(), 30_000);

        assert_eq!(assigner.assign(29_999).unwrap(), first);

        let second = assigner.assign(30_000).unwrap();
        assert_eq!(second.start_millis(), 30_000);
        assert_eq!(second.end_millis(), 60_000);
    }

    #[test]
    fn test_negative_timestamp_rejected() {
        let assigner = TumblingWindowAssigner::new(WINDOW_MS).unwrap();
        assert!(assigner.assign(-1).is_err());
    }
}

// ============================================================================
// Incremental counting
// ============================================================================

mod counting_tests {
    use super::*;

    #[tokio::test]
    async fn test_incremental_emission_per_occurrence() {
        let (pipeline, sink) = pipeline_with_grace(0);

        pipeline.process(&InboundRecord::new("a b a", 1_000)).await.unwrap();
        pipeline.process(&InboundRecord::new("a", 2_000)).await.unwrap();
        pipeline.emitter().shutdown().await;

        assert_eq!(
            emitted(&sink.records()),
            vec![
                ("a".to_string(), 1),
                ("b".to_string(), 1),
                ("a".to_string(), 2),
                ("a".to_string(), 3),
            ]
        );

        let last = sink.records().pop().unwrap();
        assert_eq!(last.window_start.timestamp_millis(), 0);
        assert_eq!(last.window_end.timestamp_millis(), 30_000);
    }

    #[tokio::test]
    async fn test_repeated_delivery_counts_again() {
        let (pipeline, sink) = pipeline_with_grace(0);
        let record = InboundRecord::new("hello", 1_000).with_key("same-key");

        pipeline.process(&record).await.unwrap();
        pipeline.process(&record).await.unwrap();
        pipeline.emitter().shutdown().await;

        // at-least-once input: a redelivered record is counted twice
        assert_eq!(
            emitted(&sink.records()),
            vec![("hello".to_string(), 1), ("hello".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn test_case_variants_share_a_counter() {
        let (pipeline, sink) = pipeline_with_grace(0);

        pipeline.process(&InboundRecord::new("Fox", 1_000)).await.unwrap();
        pipeline.process(&InboundRecord::new("fox", 1_500)).await.unwrap();
        pipeline.emitter().shutdown().await;

        assert_eq!(
            emitted(&sink.records()),
            vec![("fox".to_string(), 1), ("fox".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn test_windows_count_independently() {
        let (pipeline, sink) = pipeline_with_grace(WINDOW_MS);

        pipeline.process(&InboundRecord::new("a", 29_999)).await.unwrap();
        pipeline.process(&InboundRecord::new("a", 30_000)).await.unwrap();
        pipeline.emitter().shutdown().await;

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].count, 1);
        assert_eq!(records[1].count, 1);
        assert_ne!(records[0].window_start, records[1].window_start);
    }

    #[tokio::test]
    async fn test_invalid_records_are_skipped() {
        let (pipeline, sink) = pipeline_with_grace(0);

        let err = pipeline
            .process(&InboundRecord::without_value(1_000))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Input(_)));
        assert!(!err.is_fatal());

        let err = pipeline
            .process(&InboundRecord::new("a", -5))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Window(_)));
        assert!(!err.is_fatal());

        pipeline.process(&InboundRecord::new("a", 1_000)).await.unwrap();
        pipeline.emitter().shutdown().await;

        assert_eq!(pipeline.stats().records_rejected, 2);
        assert_eq!(pipeline.stats().records_processed, 1);
        assert_eq!(emitted(&sink.records()), vec![("a".to_string(), 1)]);
    }
}

// ============================================================================
// Late records and the grace boundary
// ============================================================================

mod late_record_tests {
    use super::*;

    #[tokio::test]
    async fn test_record_for_expired_window_is_dropped() {
        let (pipeline, sink) = pipeline_with_grace(0);

        pipeline.process(&InboundRecord::new("a", 1_000)).await.unwrap();
        pipeline.process(&InboundRecord::new("b", 30_000)).await.unwrap();

        let outcome = pipeline
            .process(&InboundRecord::new("a", 5_000))
            .await
            .unwrap();
        assert_eq!(outcome.late, 1);
        assert_eq!(outcome.counted, 0);

        pipeline.emitter().shutdown().await;
        assert_eq!(
            emitted(&sink.records()),
            vec![("a".to_string(), 1), ("b".to_string(), 1)]
        );
        assert_eq!(pipeline.stats().late_tokens_dropped, 1);
    }

    #[tokio::test]
    async fn test_grace_boundary_last_accepted_instant() {
        let grace = 1_000;
        let (pipeline, sink) = pipeline_with_grace(grace);

        // stream time one millisecond before window [0, 30000) closes
        pipeline
            .process(&InboundRecord::new("x", 30_000 + grace as i64 - 1))
            .await
            .unwrap();
        let outcome = pipeline
            .process(&InboundRecord::new("y", 100))
            .await
            .unwrap();
        assert_eq!(outcome.counted, 1);
        assert_eq!(outcome.late, 0);

        pipeline.emitter().shutdown().await;
        assert!(sink.records().iter().any(|r| r.word == "y"));
    }

    #[tokio::test]
    async fn test_grace_boundary_first_rejected_instant() {
        let grace = 1_000;
        let (pipeline, sink) = pipeline_with_grace(grace);

        pipeline
            .process(&InboundRecord::new("x", 30_000 + grace as i64))
            .await
            .unwrap();
        let outcome = pipeline
            .process(&InboundRecord::new("y", 100))
            .await
            .unwrap();
        assert_eq!(outcome.counted, 0);
        assert_eq!(outcome.late, 1);

        pipeline.emitter().shutdown().await;
        assert!(sink.records().iter().all(|r| r.word != "y"));
    }

    #[tokio::test]
    async fn test_stream_time_is_per_partition() {
        let (pipeline, sink) = pipeline_with_grace(0);

        pipeline
            .process(&InboundRecord::new("a", 60_000).with_partition(0))
            .await
            .unwrap();

        // partition 1 has not seen time advance, so its window is still open
        let outcome = pipeline
            .process(&InboundRecord::new("a", 1_000).with_partition(1))
            .await
            .unwrap();
        assert_eq!(outcome.counted, 1);

        pipeline.emitter().shutdown().await;
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn test_lagging_partition_cannot_revive_swept_window() {
        let sink = CollectingSink::new();
        let pipeline = WordCountPipelineBuilder::new()
            .with_tumbling_window(WINDOW_MS)
            .with_grace_period_ms(0)
            .with_expire_every_records(1)
            .with_expiry_interval_ms(0)
            .with_sink(Arc::new(sink.clone()))
            .build()
            .unwrap();
        let pipeline = Arc::new(pipeline);
        let mut runtime = PartitionRuntime::new(Arc::clone(&pipeline));
        let window = TumblingWindowAssigner::new(WINDOW_MS)
            .unwrap()
            .assign(1_000)
            .unwrap();
        let a = CounterKey::new("a", window);

        runtime
            .dispatch(InboundRecord::new("a a", 1_000).with_partition(1))
            .await
            .unwrap();
        wait_for_count(&pipeline, &a, Some(2)).await;

        // partition 0 runs ahead and its sweep removes the first window
        runtime
            .dispatch(InboundRecord::new("z", 60_000).with_partition(0))
            .await
            .unwrap();
        wait_for_count(&pipeline, &a, None).await;

        // partition 1 is still at 1000 but the window stays closed
        runtime
            .dispatch(InboundRecord::new("a", 2_000).with_partition(1))
            .await
            .unwrap();
        runtime.shutdown().await.unwrap();

        let a_counts: Vec<u64> = sink
            .records()
            .iter()
            .filter(|r| r.word == "a")
            .map(|r| r.count)
            .collect();
        assert_eq!(a_counts, vec![1, 2]);
        assert_eq!(pipeline.stats().late_tokens_dropped, 1);
        assert!(pipeline.store().snapshot(&a).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expiry_matches_acceptance() {
        let (pipeline, _sink) = pipeline_with_grace(0);

        pipeline.process(&InboundRecord::new("a", 1_000)).await.unwrap();
        pipeline.process(&InboundRecord::new("b", 29_999)).await.unwrap();

        assert_eq!(pipeline.expire(29_999).await.unwrap(), 0);
        assert_eq!(pipeline.expire(30_000).await.unwrap(), 2);
        assert_eq!(pipeline.store().len().await.unwrap(), 0);

        pipeline.emitter().shutdown().await;
    }
}

// ============================================================================
// Runtime, monitoring and metrics
// ============================================================================

mod runtime_tests {
    use super::*;

    #[tokio::test]
    async fn test_runtime_end_to_end() {
        let registry = MetricsRegistry::new();
        let metrics = WordCountMetrics::registered(&registry);
        let sink = CollectingSink::new();

        let pipeline = WordCountPipelineBuilder::new()
            .with_expiry_interval_ms(0)
            .with_metrics(metrics.clone())
            .with_sink(Arc::new(sink.clone()))
            .build()
            .unwrap();
        let pipeline = Arc::new(pipeline);
        let monitor = ProcessorMonitor::new(
            pipeline.topology("memory"),
            Arc::clone(pipeline.store()),
            Arc::clone(pipeline.stream_time()),
        );

        let mut runtime = PartitionRuntime::new(Arc::clone(&pipeline));
        for (i, text) in ["the quick fox", "The lazy dog", "FOX"].iter().enumerate() {
            runtime
                .dispatch(InboundRecord::new(*text, 1_000 * i as i64).with_partition(i as i32 % 2))
                .await
                .unwrap();
        }
        runtime.dispatch(InboundRecord::without_value(5_000)).await.unwrap();
        runtime.shutdown().await.unwrap();

        assert_eq!(sink.len(), 7);

        let view = monitor.counters(Some("Fox")).await.unwrap();
        assert_eq!(view.counters.len(), 1);
        assert_eq!(view.counters[0].count, 2);
        assert_eq!(view.stream_time.len(), 2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.records_processed, 3);
        assert_eq!(snapshot.records_rejected, 1);
        assert_eq!(snapshot.tokens_counted, 7);
        assert_eq!(snapshot.emissions_delivered, 7);

        let text = registry.encode().unwrap();
        assert!(text.contains("tokens_counted_total 7"));
    }

    #[tokio::test]
    async fn test_store_exhaustion_is_fatal() {
        let sink = CollectingSink::new();
        let pipeline = WordCountPipelineBuilder::new()
            .with_max_entries(2)
            .with_expiry_interval_ms(0)
            .with_sink(Arc::new(sink.clone()))
            .build()
            .unwrap();

        let err = pipeline
            .process(&InboundRecord::new("a b c", 1_000))
            .await
            .unwrap_err();
        assert!(err.is_fatal());

        // existing keys still count; only new keys are refused
        pipeline.process(&InboundRecord::new("a", 1_000)).await.unwrap();
        pipeline.emitter().shutdown().await;

        assert_eq!(
            emitted(&sink.records()),
            vec![
                ("a".to_string(), 1),
                ("b".to_string(), 1),
                ("a".to_string(), 2),
            ]
        );
    }
}
