//! Counter store trait definition
//!
//! This module defines the `CounterStore` trait that every counter storage
//! implementation must implement. The store owns all mutable counting state:
//! workers only ever touch counts through it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{CounterEntry, CounterKey};
use crate::error::StateResult;

/// Core trait for keyed, windowed counters
///
/// A store holds at most one [`CounterEntry`] per [`CounterKey`]. Entries are
/// created by the first increment, grow by one per increment and disappear
/// when their window closes.
///
/// ## Closure
///
/// A window is closed at stream time `t` when `t >= window.end + grace`.
/// Both [`increment`](CounterStore::increment) and
/// [`expire`](CounterStore::expire) use this predicate, so an entry is never
/// visible after its window stopped accepting records.
///
/// Expiry is terminal. Once a sweep at `now` has removed a key, increments of
/// that key must keep failing even when the caller's own stream time is
/// smaller than `now`, as it is for a partition lagging behind the one that
/// triggered the sweep.
///
/// ## Implementation Requirements
///
/// - **Thread safety**: called concurrently from every partition worker
/// - **Per-key atomicity**: concurrent increments of one key are linearizable
/// - **Non-blocking sweeps**: expiry must not stall increments on unrelated keys
///
/// ## Example Implementation
///
/// ```rust,no_run
/// use async_trait::async_trait;
/// use processor::core::{CounterEntry, CounterKey};
/// use processor::error::{StateError, StateResult};
/// use processor::state::CounterStore;
/// use std::collections::HashMap;
/// use tokio::sync::Mutex;
///
/// struct SimpleStore {
///     data: Mutex<HashMap<CounterKey, u64>>,
///     swept: Mutex<i64>,
/// }
///
/// #[async_trait]
/// impl CounterStore for SimpleStore {
///     async fn increment(
///         &self,
///         key: CounterKey,
///         stream_time: i64,
///         grace_ms: u64,
///     ) -> StateResult<CounterEntry> {
///         let mut data = self.data.lock().await;
///         let stream_time = stream_time.max(*self.swept.lock().await);
///         if key.window.is_closed(stream_time, grace_ms) {
///             return Err(StateError::LateRecordDropped {
///                 word: key.word,
///                 window_end: 0,
///                 stream_time,
///                 grace_ms,
///             });
///         }
///         let count = data.entry(key.clone()).or_insert(0);
///         *count += 1;
///         Ok(CounterEntry { key, count: *count })
///     }
///
///     async fn expire(&self, now: i64, grace_ms: u64) -> StateResult<usize> {
///         let mut data = self.data.lock().await;
///         let mut swept = self.swept.lock().await;
///         *swept = (*swept).max(now);
///         let before = data.len();
///         data.retain(|key, _| !key.window.is_closed(now, grace_ms));
///         Ok(before - data.len())
///     }
///
///     async fn snapshot(&self, key: &CounterKey) -> StateResult<Option<CounterEntry>> {
///         let data = self.data.lock().await;
///         Ok(data.get(key).map(|count| CounterEntry { key: key.clone(), count: *count }))
///     }
///
///     async fn entries(&self) -> StateResult<Vec<CounterEntry>> {
///         let data = self.data.lock().await;
///         Ok(data
///             .iter()
///             .map(|(key, count)| CounterEntry { key: key.clone(), count: *count })
///             .collect())
///     }
///
///     async fn len(&self) -> StateResult<usize> {
///         Ok(self.data.lock().await.len())
///     }
/// }
/// ```
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Add one to the counter for `key` and return the post-increment entry
    ///
    /// Creates the entry with count 1 when absent.
    ///
    /// # Errors
    ///
    /// - `StateError::LateRecordDropped` if the key's window is closed at
    ///   `stream_time` or at the largest stream time already swept
    /// - `StateError::StoreUnavailable` if a new entry cannot be created
    async fn increment(
        &self,
        key: CounterKey,
        stream_time: i64,
        grace_ms: u64,
    ) -> StateResult<CounterEntry>;

    /// Remove every entry whose window is closed at `now`
    ///
    /// # Returns
    ///
    /// Number of entries removed
    async fn expire(&self, now: i64, grace_ms: u64) -> StateResult<usize>;

    /// Read the current entry for `key` without modifying it
    async fn snapshot(&self, key: &CounterKey) -> StateResult<Option<CounterEntry>>;

    /// Dump every live entry
    async fn entries(&self) -> StateResult<Vec<CounterEntry>>;

    /// Number of live entries
    async fn len(&self) -> StateResult<usize>;

    /// Check if the store holds no entries
    async fn is_empty(&self) -> StateResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Counting statistics
    fn stats(&self) -> CounterStoreStats {
        CounterStoreStats::default()
    }
}

/// Statistics about a counter store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterStoreStats {
    /// Live entries
    pub live_entries: usize,
    /// Successful increments
    pub increments: u64,
    /// Entries created by a first increment
    pub created: u64,
    /// Increments rejected because the window was closed
    pub rejected_late: u64,
    /// Entries created beyond the capacity bound (refused)
    pub rejected_capacity: u64,
    /// Entries removed by expiry
    pub expired: u64,
}
