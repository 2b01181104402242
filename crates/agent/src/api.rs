//! HTTP API for health checks and Prometheus metrics

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};
use usage_lib::health::{ComponentStatus, HealthRegistry};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry) -> Self {
        Self { health_registry }
    }
}

/// Liveness: 200 while the loop is running, 503 once it has stopped
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still running
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            e.to_string().into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Run the API server in the background, logging a failure to bind or serve
pub fn spawn(port: u16, state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = serve(port, state).await {
            error!(port, error = %format!("{e:#}"), "API server failed");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;
    use usage_lib::health::components;
    use usage_lib::observability::UsageMetrics;

    async fn registry() -> HealthRegistry {
        let registry = HealthRegistry::new();
        registry.register(components::CATALOG).await;
        registry.register(components::CLUSTER_READER).await;
        registry.register(components::WRITER).await;
        registry
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_healthz_healthy() {
        let app = create_router(Arc::new(AppState::new(registry().await)));

        let (status, json) = get_json(app, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert!(json["components"]["writer"].is_object());
    }

    #[tokio::test]
    async fn test_healthz_degraded_writer_still_ok() {
        let health = registry().await;
        health
            .set_degraded(components::WRITER, "failed to write snapshot file")
            .await;
        let app = create_router(Arc::new(AppState::new(health)));

        let (status, json) = get_json(app, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "degraded");
    }

    #[tokio::test]
    async fn test_healthz_stopped_loop_unavailable() {
        let health = registry().await;
        health
            .set_unhealthy(components::CATALOG, "catalog loop stopped")
            .await;
        let app = create_router(Arc::new(AppState::new(health)));

        let (status, json) = get_json(app, "/healthz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["components"]["catalog"]["message"], "catalog loop stopped");
    }

    #[tokio::test]
    async fn test_readyz_before_and_after_start() {
        let health = registry().await;
        let app = create_router(Arc::new(AppState::new(health.clone())));

        let (status, json) = get_json(app.clone(), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["ready"], false);

        health.set_ready(true).await;
        let (status, json) = get_json(app, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ready"], true);
    }

    #[tokio::test]
    async fn test_spawned_server_exits_when_port_taken() {
        let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        assert!(serve(port, Arc::new(AppState::new(registry().await)))
            .await
            .is_err());

        let handle = spawn(port, Arc::new(AppState::new(registry().await)));
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("server task should end after a bind failure")
            .unwrap();
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let metrics = UsageMetrics::new();
        metrics.inc_snapshots_written();
        let app = create_router(Arc::new(AppState::new(registry().await)));

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("usage_log_snapshots_written_total"));
    }
}
