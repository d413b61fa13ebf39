//! Prometheus metrics for the word-count processor
//!
//! Metrics are registered in an explicitly constructed [`MetricsRegistry`]
//! and served, together with the processor monitor, by [`MetricsServer`].

mod labels;
mod prometheus;
mod registry;
mod server;

pub use labels::{DropReason, RejectReason};
pub use prometheus::{MetricsSnapshot, WordCountMetrics};
pub use registry::MetricsRegistry;
pub use server::{HealthStatus, MetricsServer, MetricsServerConfig, ReadinessStatus};

use thiserror::Error;

/// Errors that can occur in the metrics subsystem
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Failed to start metrics server: {0}")]
    ServerStartError(String),

    #[error("Failed to bind to address {address}: {source}")]
    BindError {
        address: String,
        source: std::io::Error,
    },

    #[error("Metric encoding error: {0}")]
    EncodingError(String),
}

pub type Result<T> = std::result::Result<T, MetricsError>;
