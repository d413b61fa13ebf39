//! Kafka transport configuration

use super::error::{KafkaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Default input topic
pub const DEFAULT_INPUT_TOPIC: &str = "input";

/// Default output topic
pub const DEFAULT_OUTPUT_TOPIC: &str = "output";

/// Connection and topic settings for the Kafka source and sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Comma-separated list of bootstrap brokers
    #[serde(default = "default_brokers")]
    pub brokers: String,

    /// Consumer group id
    #[serde(default = "default_group_id")]
    pub group_id: String,

    /// Topic with the text messages
    #[serde(default = "default_input_topic")]
    pub input_topic: String,

    /// Topic receiving count updates
    #[serde(default = "default_output_topic")]
    pub output_topic: String,

    /// Where to start when the group has no committed offset
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,

    /// How often consumed offsets are committed
    #[serde(default = "default_commit_interval_ms")]
    pub commit_interval_ms: u64,

    /// Producer delivery timeout per attempt
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Extra librdkafka settings applied to the consumer
    #[serde(default)]
    pub consumer_config: HashMap<String, String>,

    /// Extra librdkafka settings applied to the producer
    #[serde(default)]
    pub producer_config: HashMap<String, String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            group_id: default_group_id(),
            input_topic: default_input_topic(),
            output_topic: default_output_topic(),
            auto_offset_reset: default_auto_offset_reset(),
            commit_interval_ms: default_commit_interval_ms(),
            send_timeout_ms: default_send_timeout_ms(),
            consumer_config: HashMap::new(),
            producer_config: HashMap::new(),
        }
    }
}

impl KafkaConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.brokers.trim().is_empty() {
            return Err(KafkaError::invalid_config(
                "brokers cannot be empty",
                Some("brokers"),
            ));
        }
        if self.group_id.is_empty() {
            return Err(KafkaError::invalid_config(
                "group_id cannot be empty",
                Some("group_id"),
            ));
        }
        if self.input_topic.is_empty() {
            return Err(KafkaError::invalid_config(
                "input_topic cannot be empty",
                Some("input_topic"),
            ));
        }
        if self.output_topic.is_empty() {
            return Err(KafkaError::invalid_config(
                "output_topic cannot be empty",
                Some("output_topic"),
            ));
        }
        if !matches!(
            self.auto_offset_reset.as_str(),
            "earliest" | "latest" | "error"
        ) {
            return Err(KafkaError::invalid_config(
                format!(
                    "auto_offset_reset must be earliest, latest or error, got '{}'",
                    self.auto_offset_reset
                ),
                Some("auto_offset_reset"),
            ));
        }
        if self.commit_interval_ms == 0 {
            return Err(KafkaError::invalid_config(
                "commit_interval_ms must be greater than 0",
                Some("commit_interval_ms"),
            ));
        }
        Ok(())
    }

    pub fn commit_interval(&self) -> Duration {
        Duration::from_millis(self.commit_interval_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

fn default_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_group_id() -> String {
    "wordcount".to_string()
}

fn default_input_topic() -> String {
    DEFAULT_INPUT_TOPIC.to_string()
}

fn default_output_topic() -> String {
    DEFAULT_OUTPUT_TOPIC.to_string()
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

fn default_commit_interval_ms() -> u64 {
    5_000
}

fn default_send_timeout_ms() -> u64 {
    5_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KafkaConfig::default();
        assert_eq!(config.input_topic, "input");
        assert_eq!(config.output_topic, "output");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let config = KafkaConfig {
            brokers: " ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = KafkaConfig {
            auto_offset_reset: "smallest-ish".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("auto_offset_reset"));
    }

    #[test]
    fn test_partial_deserialize() {
        let config: KafkaConfig =
            serde_json::from_str(r#"{"brokers": "kafka:29092", "input_topic": "lines"}"#).unwrap();
        assert_eq!(config.brokers, "kafka:29092");
        assert_eq!(config.input_topic, "lines");
        assert_eq!(config.output_topic, "output");
    }
}
