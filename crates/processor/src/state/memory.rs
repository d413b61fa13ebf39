//! In-memory counter store implementation
//!
//! This module provides the production counter store: a sharded concurrent
//! map (DashMap) from `(word, window)` to count with an optional bound on the
//! number of live entries.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::backend::{CounterStore, CounterStoreStats};
use crate::core::{CounterEntry, CounterKey};
use crate::error::{StateError, StateResult};

#[derive(Debug, Default)]
struct StoreCounters {
    live: AtomicUsize,
    increments: AtomicU64,
    created: AtomicU64,
    rejected_late: AtomicU64,
    rejected_capacity: AtomicU64,
    expired: AtomicU64,
}

/// In-memory counter store using DashMap
///
/// Increments on one key are serialized by the key's shard lock; increments
/// on keys in other shards proceed in parallel. Expiry walks the map one shard
/// at a time.
///
/// The store remembers the largest stream time any sweep has expired at.
/// Increments are checked against that horizon as well as the caller's own
/// stream time, so a partition that lags behind cannot recreate a counter
/// another partition's sweep already removed.
///
/// ## Example
///
/// ```rust
/// use processor::core::CounterKey;
/// use processor::state::{CounterStore, MemoryCounterStore};
/// use processor::window::{TumblingWindowAssigner, WindowAssigner};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let store = MemoryCounterStore::new();
/// let window = TumblingWindowAssigner::new(30_000)?.assign(5_000)?;
///
/// let entry = store.increment(CounterKey::new("fox", window), 5_000, 60_000).await?;
/// assert_eq!(entry.count, 1);
/// # Ok(())
/// # }
/// ```
pub struct MemoryCounterStore {
    data: Arc<DashMap<CounterKey, u64>>,
    max_entries: Option<usize>,
    closed_horizon: Arc<AtomicI64>,
    counters: Arc<StoreCounters>,
}

impl MemoryCounterStore {
    /// Create an unbounded store
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            max_entries: None,
            closed_horizon: Arc::new(AtomicI64::new(i64::MIN)),
            counters: Arc::new(StoreCounters::default()),
        }
    }

    /// Create a store that holds at most `max_entries` live counters
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries),
            ..Self::new()
        }
    }

    /// Create a store from configuration
    pub fn from_config(config: &crate::config::StoreConfig) -> Self {
        match config.max_entries {
            Some(max) => Self::with_max_entries(max),
            None => Self::new(),
        }
    }

    /// Capacity bound, if any
    pub fn max_entries(&self) -> Option<usize> {
        self.max_entries
    }

    /// Largest stream time passed to a sweep, if any sweep has run
    pub fn closed_horizon(&self) -> Option<i64> {
        let horizon = self.closed_horizon.load(Ordering::Acquire);
        (horizon != i64::MIN).then_some(horizon)
    }

    fn late(&self, key: CounterKey, stream_time: i64, grace_ms: u64) -> StateError {
        self.counters.rejected_late.fetch_add(1, Ordering::Relaxed);
        StateError::LateRecordDropped {
            window_end: key.window.end_millis(),
            word: key.word,
            stream_time,
            grace_ms,
        }
    }

    fn reserve_slot(&self) -> bool {
        match self.max_entries {
            None => {
                self.counters.live.fetch_add(1, Ordering::AcqRel);
                true
            }
            Some(max) => self
                .counters
                .live
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                    (live < max).then_some(live + 1)
                })
                .is_ok(),
        }
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryCounterStore {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            max_entries: self.max_entries,
            closed_horizon: Arc::clone(&self.closed_horizon),
            counters: Arc::clone(&self.counters),
        }
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(
        &self,
        key: CounterKey,
        stream_time: i64,
        grace_ms: u64,
    ) -> StateResult<CounterEntry> {
        if key.window.is_closed(stream_time, grace_ms) {
            return Err(self.late(key, stream_time, grace_ms));
        }

        let entry = self.data.entry(key);

        // read under the shard lock: a sweep raises the horizon before it
        // visits any shard
        let horizon = self.closed_horizon.load(Ordering::Acquire);
        if horizon > stream_time && entry.key().window.is_closed(horizon, grace_ms) {
            let key = entry.key().clone();
            drop(entry);
            return Err(self.late(key, horizon, grace_ms));
        }

        let entry = match entry {
            Entry::Occupied(mut occupied) => {
                *occupied.get_mut() += 1;
                CounterEntry {
                    key: occupied.key().clone(),
                    count: *occupied.get(),
                }
            }
            Entry::Vacant(vacant) => {
                if !self.reserve_slot() {
                    self.counters.rejected_capacity.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        word = %vacant.key().word,
                        max_entries = ?self.max_entries,
                        "Counter store at capacity"
                    );
                    return Err(StateError::StoreUnavailable {
                        backend_type: "memory".to_string(),
                        details: format!(
                            "capacity of {} entries exhausted",
                            self.max_entries.unwrap_or_default()
                        ),
                    });
                }
                let key = vacant.key().clone();
                vacant.insert(1);
                self.counters.created.fetch_add(1, Ordering::Relaxed);
                CounterEntry { key, count: 1 }
            }
        };

        self.counters.increments.fetch_add(1, Ordering::Relaxed);
        trace!(key = %entry.key, count = entry.count, "Counter incremented");
        Ok(entry)
    }

    async fn expire(&self, now: i64, grace_ms: u64) -> StateResult<usize> {
        // raise the horizon first so no increment slips in behind the sweep
        self.closed_horizon.fetch_max(now, Ordering::AcqRel);

        let mut removed = 0usize;
        self.data.retain(|key, _| {
            let closed = key.window.is_closed(now, grace_ms);
            if closed {
                removed += 1;
            }
            !closed
        });

        if removed > 0 {
            self.counters.live.fetch_sub(removed, Ordering::AcqRel);
            self.counters
                .expired
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, stream_time = now, grace_ms, "Expired closed counters");
        }

        Ok(removed)
    }

    async fn snapshot(&self, key: &CounterKey) -> StateResult<Option<CounterEntry>> {
        Ok(self.data.get(key).map(|count| CounterEntry {
            key: key.clone(),
            count: *count,
        }))
    }

    async fn entries(&self) -> StateResult<Vec<CounterEntry>> {
        Ok(self
            .data
            .iter()
            .map(|entry| CounterEntry {
                key: entry.key().clone(),
                count: *entry.value(),
            })
            .collect())
    }

    async fn len(&self) -> StateResult<usize> {
        Ok(self.data.len())
    }

    fn stats(&self) -> CounterStoreStats {
        CounterStoreStats {
            live_entries: self.counters.live.load(Ordering::Acquire),
            increments: self.counters.increments.load(Ordering::Relaxed),
            created: self.counters.created.load(Ordering::Relaxed),
            rejected_late: self.counters.rejected_late.load(Ordering::Relaxed),
            rejected_capacity: self.counters.rejected_capacity.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::backend::tests::{key, test_store_closure, test_store_counting};

    #[tokio::test]
    async fn test_memory_store_counting() {
        let store = MemoryCounterStore::new();
        test_store_counting(&store).await;
    }

    #[tokio::test]
    async fn test_memory_store_closure() {
        let store = MemoryCounterStore::new();
        test_store_closure(&store).await;
    }

    #[tokio::test]
    async fn test_expire_is_one_way() {
        let store = MemoryCounterStore::new();
        let k = key("fox", 0, 30_000);

        store.increment(k.clone(), 0, 0).await.unwrap();
        store.increment(k.clone(), 0, 0).await.unwrap();
        assert_eq!(store.expire(30_000, 0).await.unwrap(), 1);
        assert_eq!(store.closed_horizon(), Some(30_000));

        // a caller still at an earlier stream time cannot recreate the key
        let err = store.increment(k.clone(), 10, 0).await.unwrap_err();
        assert!(matches!(
            err,
            StateError::LateRecordDropped { stream_time: 30_000, .. }
        ));
        assert!(store.snapshot(&k).await.unwrap().is_none());
        assert_eq!(store.stats().rejected_late, 1);
    }

    #[tokio::test]
    async fn test_horizon_never_moves_back() {
        let store = MemoryCounterStore::new();
        assert_eq!(store.closed_horizon(), None);

        store.expire(60_000, 0).await.unwrap();
        store.expire(10_000, 0).await.unwrap();
        assert_eq!(store.closed_horizon(), Some(60_000));

        // windows still open at the horizon keep counting
        let open = key("a", 60_000, 90_000);
        assert_eq!(store.increment(open.clone(), 0, 0).await.unwrap().count, 1);
        assert!(store.increment(key("a", 30_000, 60_000), 0, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_expire_keeps_open_windows() {
        let store = MemoryCounterStore::new();
        store.increment(key("a", 0, 30_000), 0, 0).await.unwrap();
        store.increment(key("a", 30_000, 60_000), 0, 0).await.unwrap();
        store.increment(key("b", 60_000, 90_000), 0, 0).await.unwrap();

        assert_eq!(store.expire(60_000, 0).await.unwrap(), 2);
        let entries = store.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key.word, "b");
    }

    #[tokio::test]
    async fn test_capacity_bound() {
        let store = MemoryCounterStore::with_max_entries(2);
        store.increment(key("a", 0, 30_000), 0, 0).await.unwrap();
        store.increment(key("b", 0, 30_000), 0, 0).await.unwrap();

        // existing keys keep counting at capacity
        assert_eq!(store.increment(key("a", 0, 30_000), 0, 0).await.unwrap().count, 2);

        let err = store.increment(key("c", 0, 30_000), 0, 0).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(store.snapshot(&key("c", 0, 30_000)).await.unwrap().is_none());

        // expiry frees capacity
        store.expire(30_000, 0).await.unwrap();
        assert!(store.increment(key("c", 30_000, 60_000), 30_000, 0).await.is_ok());
    }

    #[tokio::test]
    async fn test_stats() {
        let store = MemoryCounterStore::new();
        let k = key("a", 0, 30_000);
        store.increment(k.clone(), 0, 0).await.unwrap();
        store.increment(k.clone(), 0, 0).await.unwrap();
        let _ = store.increment(k.clone(), 30_000, 0).await;
        store.expire(30_000, 0).await.unwrap();

        let stats = store.stats();
        assert_eq!(stats.increments, 2);
        assert_eq!(stats.created, 1);
        assert_eq!(stats.rejected_late, 1);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.live_entries, 0);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_linearizable() {
        let store = Arc::new(MemoryCounterStore::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..100 {
                    let entry = store.increment(key("hot", 0, 30_000), 0, 0).await.unwrap();
                    seen.push(entry.count);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }

        // every post-increment value is observed exactly once
        all.sort_unstable();
        assert_eq!(all, (1..=1000).collect::<Vec<u64>>());
        assert_eq!(
            store.snapshot(&key("hot", 0, 30_000)).await.unwrap().unwrap().count,
            1000
        );
    }
}
