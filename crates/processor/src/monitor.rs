//! Read-only introspection of a running processor
//!
//! A [`ProcessorMonitor`] gives pull-style access to the topology shape and
//! the live counters. It is built by the bootstrap from the same handles the
//! pipeline uses and passed to whatever exposes it (the HTTP server here).

use crate::core::WindowedCount;
use crate::error::Result;
use crate::state::{CounterStore, CounterStoreStats};
use crate::watermark::{PartitionStreamTime, StreamTimeTracker};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Static description of the processing topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    /// Pipeline name
    pub name: String,
    /// Where records come from
    pub source: String,
    /// Ordered processing stages
    pub stages: Vec<String>,
    /// Where updates go
    pub sink: String,
    pub window_size_ms: u64,
    pub grace_period_ms: u64,
    /// Capacity bound of the counter store, if any
    pub max_entries: Option<usize>,
}

/// Live counters and stream time, as served to monitoring clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountersView {
    pub stats: CounterStoreStats,
    pub stream_time: Vec<PartitionStreamTime>,
    pub counters: Vec<WindowedCount>,
}

/// Handle for inspecting a running processor
#[derive(Clone)]
pub struct ProcessorMonitor {
    topology: Topology,
    store: Arc<dyn CounterStore>,
    stream_time: Arc<StreamTimeTracker>,
    ready: Arc<AtomicBool>,
}

impl ProcessorMonitor {
    pub fn new(
        topology: Topology,
        store: Arc<dyn CounterStore>,
        stream_time: Arc<StreamTimeTracker>,
    ) -> Self {
        Self {
            topology,
            store,
            stream_time,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Mark the processor as ready (or not) to serve traffic
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Current counters, optionally restricted to one word
    ///
    /// Counters are ordered by window start, then word.
    pub async fn counters(&self, word: Option<&str>) -> Result<CountersView> {
        let mut entries = self.store.entries().await?;
        if let Some(word) = word {
            let word = word.to_lowercase();
            entries.retain(|entry| entry.key.word == word);
        }
        entries.sort_by(|a, b| {
            a.key
                .window
                .cmp(&b.key.window)
                .then_with(|| a.key.word.cmp(&b.key.word))
        });

        Ok(CountersView {
            stats: self.store.stats(),
            stream_time: self.stream_time.partitions(),
            counters: entries.iter().map(WindowedCount::from).collect(),
        })
    }
}

impl std::fmt::Debug for ProcessorMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorMonitor")
            .field("topology", &self.topology)
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CounterKey;
    use crate::state::MemoryCounterStore;
    use crate::window::{TumblingWindowAssigner, WindowAssigner};

    fn topology() -> Topology {
        Topology {
            name: "wordcount".to_string(),
            source: "test".to_string(),
            stages: vec!["tokenize".to_string()],
            sink: "collect".to_string(),
            window_size_ms: 30_000,
            grace_period_ms: 0,
            max_entries: None,
        }
    }

    #[tokio::test]
    async fn test_counters_view() {
        let store = Arc::new(MemoryCounterStore::new());
        let tracker = Arc::new(StreamTimeTracker::new());
        let assigner = TumblingWindowAssigner::new(30_000).unwrap();

        for (word, ts) in [("b", 1_000), ("a", 1_000), ("a", 31_000)] {
            let window = assigner.assign(ts).unwrap();
            store
                .increment(CounterKey::new(word, window), ts, 60_000)
                .await
                .unwrap();
            tracker.advance(0, ts);
        }

        let monitor = ProcessorMonitor::new(topology(), store, tracker);
        let view = monitor.counters(None).await.unwrap();
        let words: Vec<_> = view.counters.iter().map(|c| c.word.as_str()).collect();
        assert_eq!(words, vec!["a", "b", "a"]);
        assert_eq!(view.stats.live_entries, 3);
        assert_eq!(view.stream_time[0].stream_time, 31_000);

        let only_a = monitor.counters(Some("A")).await.unwrap();
        assert_eq!(only_a.counters.len(), 2);
    }

    #[test]
    fn test_ready_flag_is_shared() {
        let monitor = ProcessorMonitor::new(
            topology(),
            Arc::new(MemoryCounterStore::new()),
            Arc::new(StreamTimeTracker::new()),
        );
        let clone = monitor.clone();
        assert!(!monitor.is_ready());
        clone.set_ready(true);
        assert!(monitor.is_ready());
    }
}
