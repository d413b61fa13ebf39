//! Processed-offset tracking
//!
//! Executors record the offset of every record they have finished with. The
//! source commits only those offsets, never its read position, so a record
//! still waiting in a worker channel is redelivered after a crash.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Offset of the last record processed on a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionOffset {
    pub partition: i32,
    pub offset: i64,
}

/// Offset tracking statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetStats {
    /// Offsets recorded by executors
    pub updates: u64,
    /// Partition offsets marked committed
    pub offsets_committed: u64,
}

/// Per-partition processed and committed offsets
#[derive(Debug, Default)]
pub struct OffsetTracker {
    /// Last processed offset per partition
    processed: DashMap<i32, i64>,
    /// Last committed offset per partition
    committed: DashMap<i32, i64>,
    updates: AtomicU64,
    offsets_committed: AtomicU64,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `offset` on `partition` has been processed
    ///
    /// Offsets on one partition arrive in order, but the tracker keeps the
    /// maximum anyway so a stale update never moves progress back.
    pub fn update_offset(&self, partition: i32, offset: i64) {
        self.processed
            .entry(partition)
            .and_modify(|current| *current = (*current).max(offset))
            .or_insert(offset);
        self.updates.fetch_add(1, Ordering::Relaxed);
        trace!(partition, offset, "Updated processed offset");
    }

    /// Processed offsets that are ahead of the last commit, ordered by partition
    pub fn pending(&self) -> Vec<PartitionOffset> {
        let mut pending: Vec<_> = self
            .processed
            .iter()
            .filter(|entry| {
                self.committed
                    .get(entry.key())
                    .map_or(true, |committed| *committed < *entry.value())
            })
            .map(|entry| PartitionOffset {
                partition: *entry.key(),
                offset: *entry.value(),
            })
            .collect();
        pending.sort_unstable();
        pending
    }

    /// Remember that `offsets` have been committed
    pub fn mark_committed(&self, offsets: &[PartitionOffset]) {
        for po in offsets {
            self.committed
                .entry(po.partition)
                .and_modify(|current| *current = (*current).max(po.offset))
                .or_insert(po.offset);
        }
        self.offsets_committed
            .fetch_add(offsets.len() as u64, Ordering::Relaxed);
        debug!(count = offsets.len(), "Marked offsets committed");
    }

    /// Last processed offset of a partition
    pub fn processed(&self, partition: i32) -> Option<i64> {
        self.processed.get(&partition).map(|offset| *offset)
    }

    /// Last committed offset of a partition
    pub fn committed(&self, partition: i32) -> Option<i64> {
        self.committed.get(&partition).map(|offset| *offset)
    }

    pub fn stats(&self) -> OffsetStats {
        OffsetStats {
            updates: self.updates.load(Ordering::Relaxed),
            offsets_committed: self.offsets_committed.load(Ordering::Relaxed),
        }
    }
}
