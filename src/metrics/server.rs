//! HTTP exporter for the camera's metrics, status report and health.

use crate::metrics::{MetricsRegistry, MetricsSnapshot, StatusReport};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

/// Errors that can occur during metrics server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    #[error("server error: {0}")]
    Server(String),
}

/// Configuration for the metrics server.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    /// Address to bind the server to.
    pub bind_addr: SocketAddr,
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self::with_port(crate::config::MetricsConfig::default().port)
    }
}

impl MetricsServerConfig {
    /// Creates a config with a custom port.
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], port).into(),
        }
    }
}

/// Latest device readings shared with the request handlers.
pub struct MetricsState {
    registry: MetricsRegistry,
    report: StatusReport,
}

impl MetricsState {
    /// Publishes one tick's worth of readings.
    pub fn update(&mut self, snapshot: &MetricsSnapshot, report: StatusReport) {
        self.registry.update(snapshot);
        self.report = report;
    }

    pub fn report(&self) -> &StatusReport {
        &self.report
    }

    fn health(&self) -> (StatusCode, &'static str) {
        if self.report.camera_ok {
            (StatusCode::OK, "OK")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "camera restart requested")
        }
    }
}

/// HTTP server for the camera exporter.
pub struct MetricsServer {
    config: MetricsServerConfig,
    state: Arc<RwLock<MetricsState>>,
}

impl MetricsServer {
    pub fn new(config: MetricsServerConfig, registry: MetricsRegistry) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(MetricsState {
                registry,
                report: StatusReport::default(),
            })),
        }
    }

    /// Handle for publishing readings from the scheduler loop.
    pub fn state(&self) -> Arc<RwLock<MetricsState>> {
        Arc::clone(&self.state)
    }

    fn router(state: Arc<RwLock<MetricsState>>) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/status", get(status_handler))
            .route("/health", get(health_handler))
            // The status page polls from the browser.
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Serves until the listener fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let app = Self::router(self.state);
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Camera exporter listening");

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Server(e.to_string()))
    }
}

async fn metrics_handler(State(state): State<Arc<RwLock<MetricsState>>>) -> Response {
    let state = state.read().await;
    match state.registry.encode() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to encode metrics: {}", e)).into_response()
        }
    }
}

async fn status_handler(State(state): State<Arc<RwLock<MetricsState>>>) -> Json<StatusReport> {
    Json(state.read().await.report().clone())
}

/// Unhealthy once the camera has given up and asked for a restart.
async fn health_handler(State(state): State<Arc<RwLock<MetricsState>>>) -> impl IntoResponse {
    state.read().await.health()
}
