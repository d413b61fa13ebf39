//! Kafka transport for the word-count pipeline
//!
//! - [`KafkaSource`] consumes text messages from the input topic and
//!   dispatches them, partition by partition, into a
//!   [`PartitionRuntime`](crate::pipeline::PartitionRuntime)
//! - [`KafkaSink`] publishes every count update to the output topic as
//!   a JSON message with no key
//!
//! # Example
//!
//! ```rust,no_run
//! use processor::kafka::{KafkaConfig, KafkaSink, KafkaSource};
//! use processor::pipeline::{PartitionRuntime, WordCountPipelineBuilder};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = KafkaConfig {
//!     brokers: "localhost:9092".to_string(),
//!     ..Default::default()
//! };
//!
//! let sink = Arc::new(KafkaSink::new(&config)?);
//! let pipeline = WordCountPipelineBuilder::new().with_sink(sink).build()?;
//! let runtime = PartitionRuntime::new(Arc::new(pipeline));
//!
//! let source = KafkaSource::new(config)?;
//! let stats = source
//!     .run(runtime, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//! println!("drained {} partitions", stats.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod sink;
pub mod source;

pub use config::{KafkaConfig, DEFAULT_INPUT_TOPIC, DEFAULT_OUTPUT_TOPIC};
pub use error::{is_fatal_code, is_retryable_code, KafkaError};
pub use sink::KafkaSink;
pub use source::{commit_list, record_from_message, KafkaSource, SourceStats, MISSING_TIMESTAMP};
