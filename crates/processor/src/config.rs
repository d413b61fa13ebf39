//! Configuration types for the word-count processor
//!
//! This module provides configuration structures for the windowing, counter
//! store, emission and worker layers. Transport settings live in
//! [`crate::kafka::KafkaConfig`] and the HTTP endpoint in
//! [`crate::metrics::MetricsServerConfig`].

use crate::error::{ProcessorError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default tumbling window size (30 seconds)
pub const DEFAULT_WINDOW_SIZE_MS: u64 = 30_000;

/// Default grace period (24 hours)
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 86_400_000;

/// Main processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Window configuration
    #[serde(default)]
    pub window: WindowConfig,

    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Emitter configuration
    #[serde(default)]
    pub emitter: EmitterConfig,

    /// Capacity of each partition worker's inbound channel
    #[serde(default = "default_worker_buffer_size")]
    pub worker_buffer_size: usize,

    /// Run an expiry sweep after this many records per worker (0 disables)
    #[serde(default = "default_expire_every_records")]
    pub expire_every_records: u64,

    /// Interval of the background expiry task in milliseconds (0 disables)
    #[serde(default = "default_expiry_interval_ms")]
    pub expiry_interval_ms: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            store: StoreConfig::default(),
            emitter: EmitterConfig::default(),
            worker_buffer_size: default_worker_buffer_size(),
            expire_every_records: default_expire_every_records(),
            expiry_interval_ms: default_expiry_interval_ms(),
        }
    }
}

impl ProcessorConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.window.validate()?;
        self.store.validate()?;
        self.emitter.validate()?;

        if self.worker_buffer_size == 0 {
            return Err(ProcessorError::Configuration {
                source: "worker_buffer_size must be greater than 0".into(),
            });
        }

        Ok(())
    }

    /// Background expiry interval, if enabled
    pub fn expiry_interval(&self) -> Option<Duration> {
        (self.expiry_interval_ms > 0).then(|| Duration::from_millis(self.expiry_interval_ms))
    }
}

/// Window configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Tumbling window size in milliseconds
    #[serde(default = "default_window_size_ms")]
    pub size_ms: u64,

    /// How long after a window's end late records are still counted
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            size_ms: DEFAULT_WINDOW_SIZE_MS,
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
        }
    }
}

impl WindowConfig {
    /// Create a tumbling window configuration with the default grace period
    pub fn tumbling(size_ms: u64) -> Self {
        Self {
            size_ms,
            ..Default::default()
        }
    }

    /// Set the grace period
    pub fn with_grace_period_ms(mut self, grace_period_ms: u64) -> Self {
        self.grace_period_ms = grace_period_ms;
        self
    }

    /// Validate the window configuration
    pub fn validate(&self) -> Result<()> {
        if self.size_ms == 0 {
            return Err(crate::error::WindowError::InvalidWindowSize { size: 0 }.into());
        }
        if i64::try_from(self.size_ms).is_err() || i64::try_from(self.grace_period_ms).is_err() {
            return Err(ProcessorError::Configuration {
                source: "window size and grace period must fit in a signed 64-bit millisecond value"
                    .into(),
            });
        }
        Ok(())
    }
}

/// Counter store configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum number of live counters (unbounded when absent)
    #[serde(default)]
    pub max_entries: Option<usize>,
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == Some(0) {
            return Err(ProcessorError::Configuration {
                source: "store.max_entries must be greater than 0 when set".into(),
            });
        }
        Ok(())
    }
}

/// Emitter configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitterConfig {
    /// Capacity of the emission queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum time to wait for room in a full queue
    #[serde(default = "default_enqueue_timeout_ms")]
    pub enqueue_timeout_ms: u64,

    /// Maximum delivery retries per record
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff between delivery retries
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Upper bound on a single backoff
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            enqueue_timeout_ms: default_enqueue_timeout_ms(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl EmitterConfig {
    /// Validate the emitter configuration
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(ProcessorError::Configuration {
                source: "emitter.queue_capacity must be greater than 0".into(),
            });
        }
        if self.base_backoff_ms > self.max_backoff_ms {
            return Err(ProcessorError::Configuration {
                source: "emitter.base_backoff_ms must not exceed emitter.max_backoff_ms".into(),
            });
        }
        Ok(())
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }
}

fn default_window_size_ms() -> u64 {
    DEFAULT_WINDOW_SIZE_MS
}

fn default_grace_period_ms() -> u64 {
    DEFAULT_GRACE_PERIOD_MS
}

fn default_worker_buffer_size() -> usize {
    1024
}

fn default_expire_every_records() -> u64 {
    1000
}

fn default_expiry_interval_ms() -> u64 {
    10_000
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_enqueue_timeout_ms() -> u64 {
    1_000
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    10_000
}
