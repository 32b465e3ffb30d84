//! HTTP API for health checks and Prometheus metrics

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use exporter_lib::{ComponentStatus, ExporterMetrics, HealthRegistry};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{error, info};

/// Paths served next to the metrics path
pub const HEALTH_PATH: &str = "/healthz";
pub const READY_PATH: &str = "/readyz";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: Arc<ExporterMetrics>,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, metrics: Arc<ExporterMetrics>) -> Self {
        Self {
            health_registry,
            metrics,
        }
    }
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still exporting
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once the first scrape cycle finished
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
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.encode_text() {
        Ok(buffer) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        )
            .into_response(),
        Err(e) => encode_failure(&e),
    }
}

fn encode_failure(error: &dyn Display) -> Response {
    error!(error = %error, "Failed to encode metrics");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("Failed to encode metrics: {error}"),
    )
        .into_response()
}

/// Create the API router with metrics served on `metrics_path`, which must
/// not be one of the health paths
pub fn create_router(state: Arc<AppState>, metrics_path: &str) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(healthz))
        .route(READY_PATH, get(readyz))
        .route(metrics_path, get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(
    listen_address: String,
    metrics_path: String,
    state: Arc<AppState>,
) -> anyhow::Result<()> {
    let app = create_router(state, &metrics_path);

    info!(addr = %listen_address, metrics_path = %metrics_path, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&listen_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use exporter_lib::health::components;
    use exporter_lib::StatusTally;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn setup_test_app(metrics_path: &str) -> (Router, Arc<AppState>) {
        let health_registry = HealthRegistry::new();
        health_registry.register(components::SCRAPER).await;
        health_registry.register(components::PUPPETDB).await;

        let metrics = Arc::new(ExporterMetrics::new(&["resources".to_string()]).unwrap());
        let state = Arc::new(AppState::new(health_registry, metrics));
        let router = create_router(state.clone(), metrics_path);

        (router, state)
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    fn json(body: &[u8]) -> serde_json::Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_healthz_returns_ok_when_healthy() {
        let (app, _state) = setup_test_app("/metrics").await;

        let (status, body) = get_body(app, HEALTH_PATH).await;

        assert_eq!(status, StatusCode::OK);
        let health = json(&body);
        assert_eq!(health["status"], "healthy");
        assert!(health["components"]["scraper"].is_object());
        assert!(health["components"]["puppetdb"].is_object());
    }

    #[tokio::test]
    async fn test_healthz_returns_ok_when_puppetdb_degraded() {
        let (app, state) = setup_test_app("/metrics").await;

        state
            .health_registry
            .set_degraded(components::PUPPETDB, "failed endpoints: services")
            .await;

        let (status, body) = get_body(app, HEALTH_PATH).await;

        // Degraded still returns 200 (still exporting)
        assert_eq!(status, StatusCode::OK);
        let health = json(&body);
        assert_eq!(health["status"], "degraded");
        assert_eq!(
            health["components"]["puppetdb"]["message"],
            "failed endpoints: services"
        );
    }

    #[tokio::test]
    async fn test_healthz_returns_503_when_puppetdb_unreachable() {
        let (app, state) = setup_test_app("/metrics").await;

        state
            .health_registry
            .set_unhealthy(components::PUPPETDB, "unreachable: connection refused")
            .await;

        let (status, body) = get_body(app, HEALTH_PATH).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json(&body)["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_readyz_waits_for_first_cycle() {
        let (app, state) = setup_test_app("/metrics").await;

        let (status, body) = get_body(app.clone(), READY_PATH).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json(&body)["ready"], false);

        state.health_registry.set_ready(true).await;

        let (status, body) = get_body(app, READY_PATH).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["ready"], true);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_returns_prometheus_format() {
        let (app, state) = setup_test_app("/metrics").await;

        let mut tally = StatusTally::new();
        tally.record("changed");
        tally.record("failed");
        state.metrics.publish(|metrics| {
            metrics.node.update_status_count(&tally);
            metrics.system.update(&tally);
        });
        state
            .metrics
            .performance
            .record_scrape_duration("nodes", Duration::from_millis(12));

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
        assert!(content_type.to_str().unwrap().contains("text/plain"));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let metrics_text = String::from_utf8(body.to_vec()).unwrap();

        assert!(metrics_text.contains("puppetdb_node_report_status_count{status=\"failed\"} 1"));
        assert!(metrics_text.contains("puppetdb_system_health_score 50"));
        assert!(metrics_text.contains("puppetdb_exporter_scrape_duration_seconds_bucket"));
        assert!(metrics_text
            .contains("puppetdb_exporter_scrape_duration_seconds_count{endpoint=\"nodes\"} 1"));
    }

    #[tokio::test]
    async fn test_metrics_omit_health_without_nodes() {
        let (app, state) = setup_test_app("/metrics").await;

        state.metrics.system.update(&StatusTally::new());

        let (_, body) = get_body(app, "/metrics").await;
        let metrics_text = String::from_utf8(body).unwrap();

        assert!(!metrics_text.contains("puppetdb_system_health_score"));
        assert!(!metrics_text.contains("puppetdb_node_failure_rate"));
    }

    #[tokio::test]
    async fn test_custom_metrics_path() {
        let (app, _state) = setup_test_app("/probe/metrics").await;

        let (status, _) = get_body(app.clone(), "/probe/metrics").await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = get_body(app.clone(), "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get_body(app, HEALTH_PATH).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_encode_failure_is_a_server_error() {
        let response = encode_failure(&"duplicate metric family");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8(body.to_vec()).unwrap(),
            "Failed to encode metrics: duplicate metric family"
        );
    }
}
