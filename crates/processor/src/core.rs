//! Core record types for word counting
//!
//! This module provides the data model shared by every stage:
//! - InboundRecord: a text message as delivered by the transport
//! - CounterKey: a word within one window
//! - CounterEntry: the live count owned by the store
//! - WindowedCount: the update record handed to the outbound transport

use crate::window::WindowBounds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A text message consumed from the input stream
///
/// The key is carried for completeness but never used for counting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRecord {
    /// Opaque record key
    pub key: Option<Vec<u8>>,
    /// Text payload, absent for null or undecodable payloads
    pub value: Option<String>,
    /// Event timestamp in milliseconds since epoch
    pub timestamp: i64,
    /// Source partition
    pub partition: i32,
    /// Position within the partition, when the transport has one
    pub offset: Option<i64>,
}

impl InboundRecord {
    /// Create a record with no key on partition 0
    pub fn new(value: impl Into<String>, timestamp: i64) -> Self {
        Self {
            key: None,
            value: Some(value.into()),
            timestamp,
            partition: 0,
            offset: None,
        }
    }

    /// Create a record whose payload is absent
    pub fn without_value(timestamp: i64) -> Self {
        Self {
            key: None,
            value: None,
            timestamp,
            partition: 0,
            offset: None,
        }
    }

    /// Set the record key
    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the source partition
    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = partition;
        self
    }

    /// Set the position within the partition
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Identity of one counter: a word inside one window
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CounterKey {
    pub word: String,
    pub window: WindowBounds,
}

impl CounterKey {
    pub fn new(word: impl Into<String>, window: WindowBounds) -> Self {
        Self {
            word: word.into(),
            window,
        }
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.word, self.window)
    }
}

/// A live counter as stored, always with `count >= 1`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterEntry {
    pub key: CounterKey,
    pub count: u64,
}

impl CounterEntry {
    /// Build the outbound update for this entry
    pub fn to_windowed_count(&self) -> WindowedCount {
        WindowedCount::from(self)
    }
}

/// Output record, serialized as
/// `{"word", "count", "windowStart", "windowEnd"}` with epoch-millisecond bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowedCount {
    pub word: String,
    pub count: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub window_start: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub window_end: DateTime<Utc>,
}

impl From<&CounterEntry> for WindowedCount {
    fn from(entry: &CounterEntry) -> Self {
        Self {
            word: entry.key.word.clone(),
            count: entry.count,
            window_start: entry.key.window.start,
            window_end: entry.key.window.end,
        }
    }
}

impl fmt::Display for WindowedCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={} [{} - {})",
            self.word,
            self.count,
            self.window_start.timestamp_millis(),
            self.window_end.timestamp_millis()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn create_timestamp(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn test_windowed_count_json_shape() {
        let entry = CounterEntry {
            key: CounterKey::new(
                "fox",
                WindowBounds::new(create_timestamp(30_000), create_timestamp(60_000)),
            ),
            count: 2,
        };

        let json = serde_json::to_value(entry.to_windowed_count()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "word": "fox",
                "count": 2,
                "windowStart": 30_000,
                "windowEnd": 60_000,
            })
        );
    }

    #[test]
    fn test_inbound_record_builders() {
        let record = InboundRecord::new("hello", 5)
            .with_key(b"k".to_vec())
            .with_partition(3);
        assert_eq!(record.value.as_deref(), Some("hello"));
        assert_eq!(record.key.as_deref(), Some(&b"k"[..]));
        assert_eq!(record.partition, 3);

        let empty = InboundRecord::without_value(5);
        assert!(empty.value.is_none());
    }

    #[test]
    fn test_counter_key_display() {
        let key = CounterKey::new(
            "a",
            WindowBounds::new(create_timestamp(0), create_timestamp(1000)),
        );
        assert!(key.to_string().starts_with("a@["));
    }
}
