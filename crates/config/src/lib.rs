//! Configuration management for the windowed word-count service

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use processor::kafka::KafkaConfig;
use processor::metrics::MetricsServerConfig;
use processor::pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Prefix for environment overrides, e.g. `WORDCOUNT_KAFKA__BROKERS`
pub const ENV_PREFIX: &str = "WORDCOUNT_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Pipeline name and counting settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Kafka connection and topics
    #[serde(default)]
    pub kafka: KafkaConfig,

    /// Metrics and monitoring HTTP server
    #[serde(default)]
    pub metrics: MetricsServerConfig,

    /// Logging settings
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(config_path))
    }

    /// Layered sources: optional YAML file, then `WORDCOUNT_` variables
    pub fn figment(config_path: Option<&Path>) -> Figment {
        let mut figment = Figment::new();

        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Extract and validate a configuration
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment
            .extract()
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.pipeline
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        self.kafka
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if self.metrics.port == 0 {
            return Err(ConfigError::ValidationError(
                "Invalid metrics port".to_string(),
            ));
        }

        Ok(())
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default log filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable structured JSON logging
    #[serde(default)]
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
