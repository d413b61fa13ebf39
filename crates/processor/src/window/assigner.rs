//! Window assigners
//!
//! Maps event timestamps to the window they belong to.

use super::types::WindowBounds;
use crate::error::{WindowError, WindowResult};
use chrono::{Duration, TimeZone, Utc};
use std::fmt;

/// Trait for assigning events to windows
pub trait WindowAssigner: Send + Sync + fmt::Debug {
    /// Assign an event timestamp (milliseconds since epoch) to its window
    fn assign(&self, timestamp: i64) -> WindowResult<WindowBounds>;

    /// Size of the windows this assigner produces
    fn window_size(&self) -> Duration;
}

/// Tumbling window assigner
///
/// Creates fixed-size, non-overlapping windows aligned to the epoch. Each
/// non-negative timestamp is assigned to exactly one window.
///
/// # Example
/// ```text
/// Window size: 30 seconds
/// Event at 5000    -> Window [0, 30000)
/// Event at 29999   -> Window [0, 30000)
/// Event at 30000   -> Window [30000, 60000)
/// ```
#[derive(Debug, Clone)]
pub struct TumblingWindowAssigner {
    size_ms: i64,
}

impl TumblingWindowAssigner {
    /// Create a new tumbling window assigner
    pub fn new(size_ms: u64) -> WindowResult<Self> {
        match i64::try_from(size_ms) {
            Ok(size_ms) if size_ms > 0 => Ok(Self { size_ms }),
            _ => Err(WindowError::InvalidWindowSize { size: size_ms }),
        }
    }

    fn window_start(&self, timestamp: i64) -> i64 {
        (timestamp / self.size_ms) * self.size_ms
    }
}

impl WindowAssigner for TumblingWindowAssigner {
    fn assign(&self, timestamp: i64) -> WindowResult<WindowBounds> {
        if timestamp < 0 {
            return Err(WindowError::InvalidTimestamp {
                timestamp,
                reason: "timestamp is negative".to_string(),
            });
        }

        let start = self.window_start(timestamp);
        let end = start
            .checked_add(self.size_ms)
            .ok_or_else(|| WindowError::InvalidTimestamp {
                timestamp,
                reason: "window end overflows".to_string(),
            })?;

        match (
            Utc.timestamp_millis_opt(start).single(),
            Utc.timestamp_millis_opt(end).single(),
        ) {
            (Some(start), Some(end)) => Ok(WindowBounds::new(start, end)),
            _ => Err(WindowError::InvalidTimestamp {
                timestamp,
                reason: "timestamp is out of the representable range".to_string(),
            }),
        }
    }

    fn window_size(&self) -> Duration {
        Duration::milliseconds(self.size_ms)
    }
}
