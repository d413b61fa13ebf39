//! Window types and bounds
//!
//! Tumbling windows are half-open intervals `[start, end)` of event time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the time bounds of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowBounds {
    /// Start time of the window (inclusive)
    pub start: DateTime<Utc>,
    /// End time of the window (exclusive)
    pub end: DateTime<Utc>,
}

impl WindowBounds {
    /// Create a new window bounds
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        assert!(start < end, "Window start must be before end");
        Self { start, end }
    }

    /// Get the duration of the window
    pub fn duration(&self) -> Duration {
        self.end.signed_duration_since(self.start)
    }

    /// Check if a timestamp falls within this window
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Check if this window overlaps with another window
    pub fn overlaps(&self, other: &WindowBounds) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn start_millis(&self) -> i64 {
        self.start.timestamp_millis()
    }

    pub fn end_millis(&self) -> i64 {
        self.end.timestamp_millis()
    }

    /// Whether the window no longer accepts records at `stream_time`.
    ///
    /// A window is closed once stream time reaches `end + grace`.
    pub fn is_closed(&self, stream_time: i64, grace_ms: u64) -> bool {
        let grace = i64::try_from(grace_ms).unwrap_or(i64::MAX);
        stream_time >= self.end_millis().saturating_add(grace)
    }
}

impl fmt::Display for WindowBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} - {})",
            self.start.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.end.format("%Y-%m-%d %H:%M:%S%.3f")
        )
    }
}

impl PartialOrd for WindowBounds {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WindowBounds {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.end.cmp(&other.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn create_timestamp(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    fn bounds(start: i64, end: i64) -> WindowBounds {
        WindowBounds::new(create_timestamp(start), create_timestamp(end))
    }

    #[test]
    fn test_window_bounds_creation() {
        let b = bounds(0, 30_000);
        assert_eq!(b.start_millis(), 0);
        assert_eq!(b.end_millis(), 30_000);
        assert_eq!(b.duration(), Duration::milliseconds(30_000));
    }

    #[test]
    #[should_panic(expected = "Window start must be before end")]
    fn test_window_bounds_invalid() {
        bounds(2000, 1000);
    }

    #[test]
    fn test_window_bounds_contains() {
        let b = bounds(1000, 2000);

        assert!(!b.contains(create_timestamp(999)));
        assert!(b.contains(create_timestamp(1000)));
        assert!(b.contains(create_timestamp(1999)));
        assert!(!b.contains(create_timestamp(2000)));
    }

    #[test]
    fn test_adjacent_windows_do_not_overlap() {
        assert!(!bounds(0, 30_000).overlaps(&bounds(30_000, 60_000)));
        assert!(bounds(0, 30_000).overlaps(&bounds(15_000, 45_000)));
    }

    #[test]
    fn test_is_closed_boundary() {
        let b = bounds(0, 30_000);
        let grace = 60_000;

        assert!(!b.is_closed(30_000, grace));
        assert!(!b.is_closed(89_999, grace));
        assert!(b.is_closed(90_000, grace));
        assert!(b.is_closed(i64::MAX, grace));
    }

    #[test]
    fn test_is_closed_zero_grace() {
        let b = bounds(0, 30_000);
        assert!(!b.is_closed(29_999, 0));
        assert!(b.is_closed(30_000, 0));
    }

    #[test]
    fn test_is_closed_huge_grace_saturates() {
        let b = bounds(0, 30_000);
        assert!(!b.is_closed(i64::MAX - 1, u64::MAX));
    }

    #[test]
    fn test_window_ordering() {
        assert!(bounds(0, 1000) < bounds(1000, 2000));
        assert!(bounds(1000, 2000) < bounds(3000, 4000));
    }
}
