//! Kafka-specific error types.

use rdkafka::error::KafkaError as RdKafkaError;
use rdkafka::types::RDKafkaErrorCode;
use thiserror::Error;

/// Result type alias for Kafka operations.
pub type Result<T> = std::result::Result<T, KafkaError>;

/// Error type for the Kafka source and sink.
///
/// # Examples
///
/// ```rust
/// use processor::kafka::KafkaError;
/// use rdkafka::error::KafkaError as RdKafkaError;
/// use rdkafka::types::RDKafkaErrorCode;
///
/// let err = KafkaError::consumption(
///     &RdKafkaError::MessageConsumption(RDKafkaErrorCode::BrokerTransportFailure),
///     "input",
/// );
/// assert!(err.is_retryable());
/// assert!(!err.is_fatal());
/// ```
#[derive(Error, Debug)]
pub enum KafkaError {
    /// Error during message consumption.
    #[error("Failed to consume message from topic {topic}: {message}")]
    Consumption {
        message: String,
        topic: String,
        /// rdkafka error code, when the client reported one
        code: Option<RDKafkaErrorCode>,
    },

    /// Error during message production.
    #[error("Failed to produce message to topic {topic}: {message}")]
    Production {
        message: String,
        topic: String,
        /// rdkafka error code, when the client reported one
        code: Option<RDKafkaErrorCode>,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
        field: Option<String>,
    },

    /// Error committing offsets.
    #[error("Failed to commit offsets for group {group_id}: {message}")]
    OffsetCommit { message: String, group_id: String },

    /// Error from the underlying rdkafka library.
    #[error("Kafka client error: {0}")]
    Client(#[from] RdKafkaError),
}

impl KafkaError {
    /// Create a consumption error from an rdkafka error.
    pub fn consumption(error: &RdKafkaError, topic: impl Into<String>) -> Self {
        Self::Consumption {
            message: error.to_string(),
            topic: topic.into(),
            code: error.rdkafka_error_code(),
        }
    }

    /// Create a production error from an rdkafka error.
    pub fn production(error: &RdKafkaError, topic: impl Into<String>) -> Self {
        Self::Production {
            message: error.to_string(),
            topic: topic.into(),
            code: error.rdkafka_error_code(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    /// Check if the error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            KafkaError::Consumption { code, .. } | KafkaError::Production { code, .. } => {
                code.map(is_retryable_code).unwrap_or(false)
            }
            KafkaError::Client(e) => e.rdkafka_error_code().map(is_retryable_code).unwrap_or(false),
            _ => false,
        }
    }

    /// Check if the error prevents the source or sink from continuing.
    pub fn is_fatal(&self) -> bool {
        match self {
            KafkaError::InvalidConfiguration { .. } => true,
            KafkaError::Consumption { code, .. } => code.map(is_fatal_code).unwrap_or(false),
            _ => false,
        }
    }
}

/// Client conditions that no amount of retrying will clear
pub fn is_fatal_code(code: RDKafkaErrorCode) -> bool {
    matches!(
        code,
        RDKafkaErrorCode::Fatal
            | RDKafkaErrorCode::Authentication
            | RDKafkaErrorCode::SaslAuthenticationFailed
            | RDKafkaErrorCode::TopicAuthorizationFailed
            | RDKafkaErrorCode::GroupAuthorizationFailed
    )
}

/// Broker-side conditions that are worth another attempt
pub fn is_retryable_code(code: RDKafkaErrorCode) -> bool {
    matches!(
        code,
        RDKafkaErrorCode::QueueFull
            | RDKafkaErrorCode::MessageTimedOut
            | RDKafkaErrorCode::NetworkException
            | RDKafkaErrorCode::RequestTimedOut
            | RDKafkaErrorCode::NotLeaderForPartition
            | RDKafkaErrorCode::LeaderNotAvailable
            | RDKafkaErrorCode::BrokerTransportFailure
    )
}
