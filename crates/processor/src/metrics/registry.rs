//! Metrics registry for Prometheus metrics
//!
//! The registry is created by the bootstrap and handed to whoever needs it;
//! there is no process-wide instance.

use parking_lot::RwLock;
use prometheus_client::registry::Registry;
use std::sync::Arc;

/// Thread-safe registry for Prometheus metrics
pub struct MetricsRegistry {
    registry: Arc<RwLock<Registry>>,
}

impl MetricsRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::default())),
        }
    }

    /// Get a reference to the internal registry
    pub fn registry(&self) -> Arc<RwLock<Registry>> {
        self.registry.clone()
    }

    /// Encode metrics in Prometheus text format
    pub fn encode(&self) -> Result<String, crate::metrics::MetricsError> {
        let registry = self.registry.read();
        let mut buffer = String::new();

        prometheus_client::encoding::text::encode(&mut buffer, &registry)
            .map_err(|e| crate::metrics::MetricsError::EncodingError(e.to_string()))?;

        Ok(buffer)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MetricsRegistry {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}
