//! Stream-time tracking for closing windows
//!
//! Stream time is the largest event timestamp observed so far. It only moves
//! forward, so it works as a watermark with no out-of-orderness delay: records
//! older than stream time are still accepted, and the grace period alone
//! decides how far behind they may fall.
//!
//! Stream time is tracked per input partition, since each partition is
//! processed in order by its own worker.
//!
//! # Example
//!
//! ```rust
//! use processor::watermark::StreamTimeTracker;
//!
//! let tracker = StreamTimeTracker::new();
//! assert_eq!(tracker.advance(0, 5_000), 5_000);
//! // out-of-order records never move stream time backwards
//! assert_eq!(tracker.advance(0, 1_000), 5_000);
//! assert_eq!(tracker.advance(1, 9_000), 9_000);
//! assert_eq!(tracker.max_stream_time(), Some(9_000));
//! ```

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::cmp::max;
use tracing::trace;

/// Stream time of one partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionStreamTime {
    pub partition: i32,
    /// Largest event timestamp seen on the partition, in milliseconds
    pub stream_time: i64,
}

/// Per-partition maximum observed event time
#[derive(Debug, Default)]
pub struct StreamTimeTracker {
    partitions: DashMap<i32, i64>,
}

impl StreamTimeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe an event timestamp and return the partition's stream time
    pub fn advance(&self, partition: i32, timestamp: i64) -> i64 {
        let stream_time = *self
            .partitions
            .entry(partition)
            .and_modify(|current| *current = max(*current, timestamp))
            .or_insert(timestamp);

        trace!(
            partition = partition,
            timestamp = timestamp,
            stream_time = stream_time,
            "Observed event time"
        );

        stream_time
    }

    /// Current stream time of a partition, if it has seen any record
    pub fn stream_time(&self, partition: i32) -> Option<i64> {
        self.partitions.get(&partition).map(|ts| *ts)
    }

    /// Largest stream time across all partitions
    pub fn max_stream_time(&self) -> Option<i64> {
        self.partitions.iter().map(|entry| *entry.value()).max()
    }

    /// Stream time of every known partition, ordered by partition
    pub fn partitions(&self) -> Vec<PartitionStreamTime> {
        let mut all: Vec<_> = self
            .partitions
            .iter()
            .map(|entry| PartitionStreamTime {
                partition: *entry.key(),
                stream_time: *entry.value(),
            })
            .collect();
        all.sort_unstable();
        all
    }
}
