//! Windowed word-count service
//!
//! Reads text messages from Kafka, keeps running per-word counts inside
//! tumbling windows and publishes every count update back to Kafka.

use anyhow::Context;
use clap::Parser;
use processor::kafka::{KafkaSink, KafkaSource};
use processor::metrics::{MetricsRegistry, MetricsServer, WordCountMetrics};
use processor::monitor::ProcessorMonitor;
use processor::pipeline::{PartitionRuntime, WordCountPipelineBuilder};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wordcount_config::AppConfig;

#[derive(Parser)]
#[command(
    name = "wordcount",
    version,
    about = "Windowed word count over a Kafka topic"
)]
struct Cli {
    /// Configuration file
    #[arg(
        short,
        long,
        env = "WORDCOUNT_CONFIG",
        value_name = "FILE",
        help = "Path to a YAML configuration file"
    )]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, help = "Emit logs as JSON regardless of configuration")]
    json_logs: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Load and validate configuration, then exit")]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(
        &config.observability.log_level,
        cli.json_logs || config.observability.json_logging,
    );

    if cli.check {
        info!("Configuration is valid");
        return Ok(());
    }

    run(config).await
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    info!(
        pipeline = %config.pipeline.name,
        input = %config.kafka.input_topic,
        output = %config.kafka.output_topic,
        window_ms = config.pipeline.processor.window.size_ms,
        grace_ms = config.pipeline.processor.window.grace_period_ms,
        "Starting word-count service"
    );

    let registry = MetricsRegistry::new();
    let metrics = WordCountMetrics::registered(&registry);

    let sink = Arc::new(KafkaSink::new(&config.kafka).context("creating Kafka sink")?);
    let pipeline = WordCountPipelineBuilder::from_config(config.pipeline.clone())
        .with_sink(sink)
        .with_metrics(metrics)
        .build()
        .context("building pipeline")?;
    let pipeline = Arc::new(pipeline);

    let monitor = ProcessorMonitor::new(
        pipeline.topology(format!("kafka:{}", config.kafka.input_topic)),
        Arc::clone(pipeline.store()),
        Arc::clone(pipeline.stream_time()),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let server = MetricsServer::new(config.metrics.clone(), registry).with_monitor(monitor.clone());
    let server_task = tokio::spawn(server.start_with_shutdown(wait_for(shutdown_rx.clone())));

    let source = KafkaSource::new(config.kafka.clone()).context("creating Kafka source")?;
    let runtime = PartitionRuntime::new(Arc::clone(&pipeline));

    let signal_tx = Arc::clone(&shutdown_tx);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
        let _ = signal_tx.send(true);
    });

    monitor.set_ready(true);
    let result = source.run(runtime, wait_for(shutdown_rx)).await;
    monitor.set_ready(false);

    // the source may also stop on its own after a fatal error
    let _ = shutdown_tx.send(true);
    match server_task.await {
        Ok(Err(e)) => warn!(error = %e, "Metrics server failed"),
        Ok(Ok(())) => {}
        Err(e) => warn!(error = %e, "Metrics server task failed"),
    }

    let stats = result.context("word-count pipeline failed")?;
    let pipeline_stats = pipeline.stats();
    let emitter_stats = pipeline.emitter().stats();
    info!(
        partitions = stats.len(),
        records = pipeline_stats.records_processed,
        rejected = pipeline_stats.records_rejected,
        late = pipeline_stats.late_tokens_dropped,
        delivered = emitter_stats.delivered,
        dropped = emitter_stats.dropped_queue_full + emitter_stats.dropped_delivery,
        "Word-count service stopped"
    );

    Ok(())
}

async fn wait_for(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}

/// Initialize tracing/logging
fn init_tracing(default_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}
