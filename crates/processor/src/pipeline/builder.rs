//! Word-count pipeline builder
//!
//! Every collaborator (store, sink, metrics, stream-time tracker) can be
//! supplied explicitly; anything left out gets an in-process default.

use crate::config::{EmitterConfig, ProcessorConfig, WindowConfig};
use crate::emitter::{CollectingSink, Emitter, OutputSink};
use crate::error::{ProcessorError, Result};
use crate::metrics::WordCountMetrics;
use crate::pipeline::offsets::OffsetTracker;
use crate::pipeline::word_count::WordCountPipeline;
use crate::state::{CounterStore, MemoryCounterStore};
use crate::watermark::StreamTimeTracker;
use crate::window::TumblingWindowAssigner;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Configuration for a word-count pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name for identification
    #[serde(default = "default_pipeline_name")]
    pub name: String,

    /// Processor configuration
    #[serde(default)]
    pub processor: ProcessorConfig,
}

fn default_pipeline_name() -> String {
    "wordcount".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
            processor: ProcessorConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ProcessorError::Configuration {
                source: "pipeline name cannot be empty".into(),
            });
        }

        self.processor.validate()?;
        Ok(())
    }
}

/// Builder for [`WordCountPipeline`]
///
/// # Example
///
/// ```rust
/// use processor::emitter::CollectingSink;
/// use processor::pipeline::WordCountPipelineBuilder;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let sink = CollectingSink::new();
/// let pipeline = WordCountPipelineBuilder::new()
///     .with_name("wordcount")
///     .with_tumbling_window(30_000)
///     .with_grace_period_ms(60_000)
///     .with_sink(Arc::new(sink.clone()))
///     .build()?;
/// # pipeline.emitter().shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct WordCountPipelineBuilder {
    config: PipelineConfig,
    store: Option<Arc<dyn CounterStore>>,
    sink: Option<Arc<dyn OutputSink>>,
    metrics: Option<WordCountMetrics>,
    stream_time: Option<Arc<StreamTimeTracker>>,
}

impl Default for WordCountPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WordCountPipelineBuilder {
    /// Create a new pipeline builder with default configuration
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            store: None,
            sink: None,
            metrics: None,
            stream_time: None,
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: PipelineConfig) -> Self {
        Self {
            config,
            ..Self::new()
        }
    }

    /// Set the pipeline name
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.name = name.into();
        self
    }

    /// Replace the whole processor configuration
    pub fn with_processor_config(mut self, processor: ProcessorConfig) -> Self {
        self.config.processor = processor;
        self
    }

    /// Set window configuration
    pub fn with_window(mut self, window: WindowConfig) -> Self {
        self.config.processor.window = window;
        self
    }

    /// Use tumbling windows of `size_ms` milliseconds
    pub fn with_tumbling_window(mut self, size_ms: u64) -> Self {
        self.config.processor.window.size_ms = size_ms;
        self
    }

    pub fn with_grace_period_ms(mut self, grace_period_ms: u64) -> Self {
        self.config.processor.window.grace_period_ms = grace_period_ms;
        self
    }

    /// Bound the number of live counters of the default store
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.config.processor.store.max_entries = Some(max_entries);
        self
    }

    pub fn with_emitter_config(mut self, emitter: EmitterConfig) -> Self {
        self.config.processor.emitter = emitter;
        self
    }

    pub fn with_worker_buffer_size(mut self, size: usize) -> Self {
        self.config.processor.worker_buffer_size = size;
        self
    }

    /// Run an expiry sweep every `records` records per worker (0 disables)
    pub fn with_expire_every_records(mut self, records: u64) -> Self {
        self.config.processor.expire_every_records = records;
        self
    }

    /// Interval of the background expiry task (0 disables)
    pub fn with_expiry_interval_ms(mut self, interval_ms: u64) -> Self {
        self.config.processor.expiry_interval_ms = interval_ms;
        self
    }

    /// Use an explicit counter store
    pub fn with_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Deliver updates to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_metrics(mut self, metrics: WordCountMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Share a stream-time tracker with other components
    pub fn with_stream_time(mut self, stream_time: Arc<StreamTimeTracker>) -> Self {
        self.stream_time = Some(stream_time);
        self
    }

    /// Get the configuration built so far
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Build the pipeline with the configured settings
    ///
    /// Spawns the emitter's delivery task, so it must be called from within a
    /// tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> Result<WordCountPipeline> {
        self.config.validate()?;
        let processor = self.config.processor;

        let assigner = TumblingWindowAssigner::new(processor.window.size_ms)?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryCounterStore::from_config(&processor.store)));
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(CollectingSink::new()));
        let metrics = self.metrics.unwrap_or_default();
        let stream_time = self.stream_time.unwrap_or_default();
        let emitter = Arc::new(Emitter::new(sink, processor.emitter, metrics.clone()));

        Ok(WordCountPipeline::new(
            self.config.name,
            processor,
            Arc::new(assigner),
            store,
            emitter,
            stream_time,
            Arc::new(OffsetTracker::new()),
            metrics,
        ))
    }
}
