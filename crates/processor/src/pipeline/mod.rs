//! Word-count pipeline module
//!
//! This module wires the counting stages together:
//! - [`WordCountPipeline`]: the per-record pass (tokenize, assign, count, emit)
//! - [`WordCountPipelineBuilder`]: fluent construction with explicit collaborators
//! - [`PartitionExecutor`]: in-order processing of one partition
//! - [`PartitionRuntime`]: routing records to executors and orderly shutdown
//! - [`OffsetTracker`]: offsets of records the executors have finished with
//!
//! # Example
//!
//! ```rust
//! use processor::core::InboundRecord;
//! use processor::emitter::CollectingSink;
//! use processor::pipeline::{PartitionRuntime, WordCountPipelineBuilder};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let sink = CollectingSink::new();
//! let pipeline = WordCountPipelineBuilder::new()
//!     .with_name("wordcount")
//!     .with_tumbling_window(30_000)
//!     .with_sink(Arc::new(sink.clone()))
//!     .build()?;
//!
//! let mut runtime = PartitionRuntime::new(Arc::new(pipeline));
//! runtime.dispatch(InboundRecord::new("a b a", 1_000)).await?;
//! runtime.shutdown().await?;
//!
//! let counts: Vec<_> = sink.records().iter().map(|r| r.count).collect();
//! assert_eq!(counts, vec![1, 1, 2]);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod executor;
pub mod offsets;
pub mod runtime;
pub mod word_count;

pub use builder::{PipelineConfig, WordCountPipelineBuilder};
pub use executor::{ExecutorStats, PartitionExecutor};
pub use offsets::{OffsetStats, OffsetTracker, PartitionOffset};
pub use runtime::PartitionRuntime;
pub use word_count::{PipelineStats, RecordOutcome, WordCountPipeline};
