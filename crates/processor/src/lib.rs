//! Windowed word-count stream processor
//!
//! This crate turns a stream of text records into running per-word counts
//! inside fixed, epoch-aligned tumbling windows, emitting an updated count
//! for every word occurrence.

pub mod config;
pub mod core;
pub mod emitter;
pub mod error;
pub mod kafka;
pub mod metrics;
pub mod monitor;
pub mod pipeline;
pub mod state;
pub mod tokenizer;
pub mod watermark;
pub mod window;

// Re-export commonly used types
pub use core::{CounterEntry, CounterKey, InboundRecord, WindowedCount};

pub use window::{TumblingWindowAssigner, WindowAssigner, WindowBounds};

pub use tokenizer::{tokenize, TokenStream};

pub use error::{
    EmitError, ProcessorError, Result as ProcessorResult, StateError, TokenizeError, WindowError,
};

pub use config::{EmitterConfig, ProcessorConfig, StoreConfig, WindowConfig};

pub use state::{CounterStore, CounterStoreStats, MemoryCounterStore};

pub use emitter::{CollectingSink, Emitter, EmitterStats, OutputSink};

pub use watermark::{PartitionStreamTime, StreamTimeTracker};

pub use monitor::{CountersView, ProcessorMonitor, Topology};

pub use pipeline::{
    ExecutorStats, PartitionExecutor, PartitionRuntime, PipelineConfig, PipelineStats,
    RecordOutcome, WordCountPipeline, WordCountPipelineBuilder,
};

pub use metrics::{MetricsRegistry, MetricsServer, MetricsServerConfig, WordCountMetrics};

pub use kafka::{KafkaConfig, KafkaError, KafkaSink, KafkaSource};
