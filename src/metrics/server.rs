//! HTTP server for Prometheus metrics endpoint.

use crate::capture::CaptureEvent;
use crate::metrics::{MetricsRegistry, MetricsSnapshot};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
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
        Self {
            bind_addr: ([0, 0, 0, 0], 9090).into(),
        }
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

/// Capture status reported by `/health`.
#[derive(Debug, Clone, Default)]
struct CaptureHealth {
    capture_started: bool,
    binds: u64,
    bind_failures: u64,
    last_event: Option<CaptureEvent>,
}

impl CaptureHealth {
    /// 200 while a camera is bound, 503 otherwise, with a plain-text body.
    fn render(&self) -> (StatusCode, String) {
        let (status, label) = if self.capture_started {
            (StatusCode::OK, "CAPTURING")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT CAPTURING")
        };
        let last_event = match &self.last_event {
            None => "none".to_string(),
            Some(CaptureEvent::Bound { lens }) => format!("bound {}", lens),
            Some(CaptureEvent::Unbound { lens }) => format!("unbound {}", lens),
            Some(CaptureEvent::BindFailed { lens, reason }) => {
                format!("bind failed {}: {}", lens, reason)
            }
        };
        let body = format!(
            "{}\nbinds: {}\nbind_failures: {}\nlast_event: {}\n",
            label, self.binds, self.bind_failures, last_event
        );
        (status, body)
    }
}

/// Shared state for the metrics server.
pub struct MetricsState {
    registry: MetricsRegistry,
    health: CaptureHealth,
}

impl MetricsState {
    /// Updates the metrics from a snapshot.
    pub fn update(&mut self, snapshot: &MetricsSnapshot) {
        self.registry.update(snapshot);
        self.health.capture_started = snapshot.capture_started;
        self.health.binds = snapshot.binds;
        self.health.bind_failures = snapshot.bind_failures;
    }

    /// Remembers the latest bind notification for `/health`.
    pub fn record_event(&mut self, event: &CaptureEvent) {
        if let CaptureEvent::BindFailed { lens, reason } = event {
            tracing::debug!(%lens, %reason, "Health reports bind failure");
        }
        self.health.last_event = Some(event.clone());
    }
}

/// HTTP server for exposing Prometheus metrics.
pub struct MetricsServer {
    config: MetricsServerConfig,
    state: Arc<RwLock<MetricsState>>,
}

impl MetricsServer {
    /// Creates a new metrics server.
    pub fn new(config: MetricsServerConfig, registry: MetricsRegistry) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(MetricsState {
                registry,
                health: CaptureHealth::default(),
            })),
        }
    }

    /// Returns a reference to the shared state for updating metrics.
    pub fn state(&self) -> Arc<RwLock<MetricsState>> {
        Arc::clone(&self.state)
    }

    /// Starts the HTTP server.
    ///
    /// This method runs the server until it is shut down.
    pub async fn run(self) -> Result<(), ServerError> {
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .layer(CorsLayer::permissive())
            .with_state(self.state);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!(
            addr = %self.config.bind_addr,
            "Metrics server listening"
        );

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Server(e.to_string()))?;

        Ok(())
    }
}

/// Handler for the /metrics endpoint.
async fn metrics_handler(State(state): State<Arc<RwLock<MetricsState>>>) -> impl IntoResponse {
    let state = state.read().await;

    match state.registry.encode() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {}", e),
        ),
    }
}

/// Handler for the /health endpoint.
async fn health_handler(State(state): State<Arc<RwLock<MetricsState>>>) -> impl IntoResponse {
    state.read().await.health.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Lens;

    #[test]
    fn test_config_default() {
        let config = MetricsServerConfig::default();
        assert_eq!(config.bind_addr.port(), 9090);
    }

    #[test]
    fn test_config_with_port() {
        let config = MetricsServerConfig::with_port(8080);
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[test]
    fn test_health_unavailable_before_bind() {
        let (status, body) = CaptureHealth::default().render();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.starts_with("NOT CAPTURING"));
        assert!(body.contains("last_event: none"));
    }

    #[test]
    fn test_health_reports_bind_failure() {
        let health = CaptureHealth {
            bind_failures: 2,
            last_event: Some(CaptureEvent::BindFailed {
                lens: Lens::Back,
                reason: "camera in use".into(),
            }),
            ..Default::default()
        };
        let (status, body) = health.render();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("bind_failures: 2"));
        assert!(body.contains("bind failed back: camera in use"));
    }

    #[tokio::test]
    async fn test_state_tracks_capture_status() {
        let server = MetricsServer::new(
            MetricsServerConfig::default(),
            MetricsRegistry::new().unwrap(),
        );
        let state = server.state();
        {
            let mut state = state.write().await;
            state.update(&MetricsSnapshot {
                capture_started: true,
                binds: 1,
                ..Default::default()
            });
            state.record_event(&CaptureEvent::Bound { lens: Lens::Front });
        }

        let (status, body) = state.read().await.health.render();
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("binds: 1"));
        assert!(body.contains("last_event: bound front"));
    }
}
