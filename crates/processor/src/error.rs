//! Error types for the word-count processor
//!
//! Each concern (tokenization, windowing, counting state, emission, transport)
//! has its own error enum. They fold into [`ProcessorError`], whose
//! [`ProcessorError::is_fatal`] decides whether a worker keeps going or stops.

use thiserror::Error;

/// Main processor error type
#[derive(Error, Debug)]
pub enum ProcessorError {
    /// Tokenization errors
    #[error("input error: {0}")]
    Input(#[from] TokenizeError),

    /// Window-related errors
    #[error("window error: {0}")]
    Window(#[from] WindowError),

    /// Counter store errors
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Configuration errors
    #[error("configuration error: {source}")]
    Configuration {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Execution errors
    #[error("execution error: {source}")]
    Execution {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Kafka client errors that stop the source
    #[error("kafka error: {0}")]
    Kafka(#[from] crate::kafka::KafkaError),

    /// Generic error for unexpected conditions
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl ProcessorError {
    /// Whether this error must stop the worker that hit it.
    ///
    /// Store-level resource failures and unrecoverable Kafka client errors
    /// are fatal. Every per-record condition is recovered locally by
    /// skipping the record.
    pub fn is_fatal(&self) -> bool {
        match self {
            ProcessorError::State(err) => err.is_fatal(),
            ProcessorError::Kafka(err) => err.is_fatal(),
            _ => false,
        }
    }
}

/// Errors produced while turning a record value into tokens
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenizeError {
    /// The record carried no text value
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },
}

impl TokenizeError {
    pub fn missing_value() -> Self {
        TokenizeError::InvalidInput {
            reason: "record value is absent".to_string(),
        }
    }
}

/// Window assignment errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    /// Event timestamp is negative or cannot be represented as an instant
    #[error("invalid event timestamp: {timestamp}, reason: {reason}")]
    InvalidTimestamp { timestamp: i64, reason: String },

    /// Window size is invalid
    #[error("invalid window size: {size}ms, must be greater than 0")]
    InvalidWindowSize { size: u64 },
}

/// Counter store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The target window closed before this increment arrived
    #[error(
        "late record dropped: word '{word}' in window ending {window_end}, stream time {stream_time}, grace {grace_ms}ms"
    )]
    LateRecordDropped {
        word: String,
        window_end: i64,
        stream_time: i64,
        grace_ms: u64,
    },

    /// The store refuses writes (capacity exhausted or backing failure)
    #[error("store unavailable in {backend_type}: {details}")]
    StoreUnavailable {
        backend_type: String,
        details: String,
    },
}

impl StateError {
    /// Store failures stop the worker; late records do not.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StateError::StoreUnavailable { .. })
    }
}

/// Errors on the path from counter update to outbound transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmitError {
    /// A single delivery attempt failed
    #[error("sink rejected record: {reason}")]
    Rejected { reason: String, retryable: bool },

    /// The outbound transport rejected or failed to acknowledge a record
    #[error("delivery failure after {attempts} attempt(s): {reason}")]
    DeliveryFailure { attempts: u32, reason: String },

    /// The bounded emission queue stayed full for longer than the enqueue timeout
    #[error("emission queue full, update for '{word}' dropped after {timeout_ms}ms")]
    QueueTimeout { word: String, timeout_ms: u64 },

    /// The emitter was shut down
    #[error("emitter is shut down")]
    Closed,
}

impl EmitError {
    pub fn retryable(reason: impl Into<String>) -> Self {
        EmitError::Rejected {
            reason: reason.into(),
            retryable: true,
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        EmitError::Rejected {
            reason: reason.into(),
            retryable: false,
        }
    }

    /// Whether another delivery attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, EmitError::Rejected { retryable: true, .. })
    }
}

/// Result type alias for processor operations
pub type Result<T> = std::result::Result<T, ProcessorError>;

/// Result type alias for tokenization
pub type TokenizeResult<T> = std::result::Result<T, TokenizeError>;

/// Result type alias for window operations
pub type WindowResult<T> = std::result::Result<T, WindowError>;

/// Result type alias for state operations
pub type StateResult<T> = std::result::Result<T, StateError>;

/// Result type alias for emission
pub type EmitResult<T> = std::result::Result<T, EmitError>;
