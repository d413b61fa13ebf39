//! HTTP server for metrics and processor introspection
//!
//! Exposes `/metrics` (Prometheus text), `/health`, `/ready`, and, when a
//! [`ProcessorMonitor`] is attached, `/topology` and `/counters`.

use super::registry::MetricsRegistry;
use super::MetricsError;
use crate::monitor::ProcessorMonitor;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Configuration for the metrics server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsServerConfig {
    /// Bind address for the metrics server
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port for the metrics server
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9090
}

impl MetricsServerConfig {
    /// Create a new metrics server config
    pub fn new(bind_address: impl Into<String>, port: u16) -> Self {
        Self {
            bind_address: bind_address.into(),
            port,
        }
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> Result<SocketAddr, MetricsError> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| MetricsError::BindError {
                address: format!("{}:{}", self.bind_address, self.port),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
            })
    }
}

/// Health status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

impl HealthStatus {
    /// Create a healthy status with uptime
    pub fn healthy_with_uptime(uptime: Duration) -> Self {
        Self {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime.as_secs(),
        }
    }
}

/// Readiness status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessStatus {
    pub ready: bool,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CountersQuery {
    word: Option<String>,
}

#[derive(Clone)]
struct ServerState {
    registry: MetricsRegistry,
    monitor: Option<ProcessorMonitor>,
    start_time: Instant,
}

/// HTTP server for exposing metrics and the processor monitor
pub struct MetricsServer {
    config: MetricsServerConfig,
    registry: MetricsRegistry,
    monitor: Option<ProcessorMonitor>,
}

impl MetricsServer {
    /// Create a metrics server for `registry`
    pub fn new(config: MetricsServerConfig, registry: MetricsRegistry) -> Self {
        Self {
            config,
            registry,
            monitor: None,
        }
    }

    /// Attach a processor monitor
    pub fn with_monitor(mut self, monitor: ProcessorMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Build the router without binding a socket
    pub fn router(&self) -> Router {
        let state = ServerState {
            registry: self.registry.clone(),
            monitor: self.monitor.clone(),
            start_time: Instant::now(),
        };

        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .route("/topology", get(topology_handler))
            .route("/counters", get(counters_handler))
            .with_state(state)
    }

    /// Serve until `shutdown` resolves
    pub async fn start_with_shutdown<F>(self, shutdown: F) -> Result<(), MetricsError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.socket_addr()?;
        let app = self.router();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| MetricsError::BindError {
                address: addr.to_string(),
                source: e,
            })?;

        info!(address = %addr, "Metrics server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| MetricsError::ServerStartError(e.to_string()))?;

        info!("Metrics server stopped");
        Ok(())
    }

    /// Get the metrics server configuration
    pub fn config(&self) -> &MetricsServerConfig {
        &self.config
    }
}

async fn metrics_handler(State(state): State<ServerState>) -> Response {
    debug!("Metrics endpoint called");

    match state.registry.encode() {
        Ok(metrics) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            metrics,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}

async fn health_handler(State(state): State<ServerState>) -> Json<HealthStatus> {
    Json(HealthStatus::healthy_with_uptime(state.start_time.elapsed()))
}

async fn ready_handler(State(state): State<ServerState>) -> Response {
    let status = match &state.monitor {
        Some(monitor) if monitor.is_ready() => ReadinessStatus {
            ready: true,
            message: None,
        },
        Some(_) => ReadinessStatus {
            ready: false,
            message: Some("processor is not running".to_string()),
        },
        None => ReadinessStatus {
            ready: true,
            message: Some("no processor attached".to_string()),
        },
    };

    if status.ready {
        (StatusCode::OK, Json(status)).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(status)).into_response()
    }
}

async fn topology_handler(State(state): State<ServerState>) -> Response {
    match &state.monitor {
        Some(monitor) => Json(monitor.topology().clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "no processor attached").into_response(),
    }
}

async fn counters_handler(
    State(state): State<ServerState>,
    Query(query): Query<CountersQuery>,
) -> Response {
    let Some(monitor) = &state.monitor else {
        return (StatusCode::NOT_FOUND, "no processor attached").into_response();
    };

    match monitor.counters(query.word.as_deref()).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to read counters");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
    }
}
