//! HTTP API for health checks, Prometheus metrics and JVM queries

use agent_lib::{
    collector::{JvmRegistry, SharedPressure},
    health::{ComponentStatus, HealthRegistry},
    observability::AgentMetrics,
    oom::OomContextCollector,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: AgentMetrics,
    pub registry: Arc<JvmRegistry>,
    pub pressure: SharedPressure,
    pub oom: Arc<OomContextCollector>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: AgentMetrics,
        registry: Arc<JvmRegistry>,
        pressure: SharedPressure,
        oom: Arc<OomContextCollector>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            registry,
            pressure,
            oom,
        }
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once the first cycle finished
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
        warn!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            e.to_string().into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

async fn list_jvms(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.list())
}

async fn get_jvm(State(state): State<Arc<AppState>>, Path(pid): Path<u32>) -> impl IntoResponse {
    match state.registry.get(pid) {
        Some(snapshot) => (StatusCode::OK, Json(json!(snapshot))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("JVM {} is not monitored", pid) })),
        ),
    }
}

async fn pressure(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.pressure.read().await.clone() {
        Some(report) => (StatusCode::OK, Json(json!(report))),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Node pressure not sampled yet" })),
        ),
    }
}

async fn ooms(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.oom.recent().await)
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/v1/jvms", get(list_jvms))
        .route("/v1/jvms/:pid", get(get_jvm))
        .route("/v1/pressure", get(pressure))
        .route("/v1/ooms", get(ooms))
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
