//! Kafka output sink
//!
//! Publishes each [`WindowedCount`] as a JSON message with no key to the
//! output topic. Retries are driven by the emitter; this sink only reports
//! whether a failed send is worth retrying.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::config::KafkaConfig;
use super::error::{KafkaError, Result};
use crate::core::WindowedCount;
use crate::emitter::OutputSink;
use crate::error::{EmitError, EmitResult};

/// Upper bound on the shutdown flush
const FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Output sink backed by a Kafka producer
pub struct KafkaSink {
    producer: FutureProducer,
    topic: String,
    send_timeout: Duration,
    sent: AtomicU64,
    failed: AtomicU64,
}

impl KafkaSink {
    /// Create a producer for the configured output topic
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        config.validate()?;

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.brokers)
            .set("acks", "all")
            .set("message.timeout.ms", config.send_timeout_ms.to_string());

        for (key, value) in &config.producer_config {
            client_config.set(key, value);
        }

        let producer: FutureProducer = client_config.create()?;

        info!(
            brokers = %config.brokers,
            topic = %config.output_topic,
            "Kafka sink created"
        );

        Ok(Self {
            producer,
            topic: config.output_topic.clone(),
            send_timeout: config.send_timeout(),
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Messages acknowledged by the broker
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Sends that failed
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// JSON payload for one count update
pub fn encode_payload(count: &WindowedCount) -> EmitResult<Vec<u8>> {
    serde_json::to_vec(count).map_err(|e| EmitError::permanent(format!("serialize: {}", e)))
}

/// Map a producer error onto the emitter's retry classification
pub fn classify_send_error(error: &KafkaError) -> EmitError {
    if error.is_retryable() {
        EmitError::retryable(error.to_string())
    } else {
        EmitError::permanent(error.to_string())
    }
}

#[async_trait]
impl OutputSink for KafkaSink {
    async fn deliver(&self, count: &WindowedCount) -> EmitResult<()> {
        let payload = encode_payload(count)?;
        let record = FutureRecord::<(), [u8]>::to(&self.topic).payload(&payload);

        match self
            .producer
            .send(record, Timeout::After(self.send_timeout))
            .await
        {
            Ok((partition, offset)) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                debug!(word = %count.word, count = count.count, partition, offset, "Count delivered");
                Ok(())
            }
            Err((e, _message)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                let err = KafkaError::production(&e, self.topic.as_str());
                warn!(word = %count.word, error = %err, "Failed to deliver count");
                Err(classify_send_error(&err))
            }
        }
    }

    async fn flush(&self) -> EmitResult<()> {
        let producer = self.producer.clone();
        let flushed = tokio::task::spawn_blocking(move || producer.flush(Timeout::After(FLUSH_TIMEOUT)))
            .await
            .map_err(|e| EmitError::permanent(format!("flush task failed: {}", e)))?;

        flushed.map_err(|e| {
            let err = KafkaError::production(&e, self.topic.as_str());
            EmitError::DeliveryFailure {
                attempts: 1,
                reason: err.to_string(),
            }
        })?;

        info!(topic = %self.topic, sent = self.sent(), "Kafka sink flushed");
        Ok(())
    }

    fn name(&self) -> &str {
        "kafka"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rdkafka::types::RDKafkaErrorCode;

    fn count() -> WindowedCount {
        WindowedCount {
            word: "fox".to_string(),
            count: 2,
            window_start: Utc.timestamp_millis_opt(0).unwrap(),
            window_end: Utc.timestamp_millis_opt(30_000).unwrap(),
        }
    }

    #[test]
    fn test_payload_shape() {
        let payload = encode_payload(&count()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();

        assert_eq!(json["word"], "fox");
        assert_eq!(json["count"], 2);
        assert_eq!(json["windowStart"], 0);
        assert_eq!(json["windowEnd"], 30_000);
    }

    #[test]
    fn test_send_error_classification() {
        let transient = KafkaError::Production {
            message: "timed out".to_string(),
            topic: "output".to_string(),
            code: Some(RDKafkaErrorCode::MessageTimedOut),
        };
        assert!(classify_send_error(&transient).is_retryable());

        let permanent = KafkaError::Production {
            message: "unknown topic".to_string(),
            topic: "output".to_string(),
            code: Some(RDKafkaErrorCode::UnknownTopicOrPartition),
        };
        assert!(!classify_send_error(&permanent).is_retryable());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = KafkaConfig {
            output_topic: String::new(),
            ..Default::default()
        };
        assert!(KafkaSink::new(&config).is_err());
    }
}
