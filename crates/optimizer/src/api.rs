//! HTTP API for health checks, Prometheus metrics, and reporting snapshots

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use optimizer_lib::{
    engine::OptimizationEngine,
    exec::{CostOptimizer, ResourceRightsizer, ZeroPodScaler},
    health::{ComponentStatus, HealthRegistry},
    observability::OptimizerMetrics,
    safety::SafetyManager,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: OptimizerMetrics,
    pub engine: Arc<OptimizationEngine>,
    pub safety: Arc<SafetyManager>,
    pub zero_pod: Arc<ZeroPodScaler>,
    pub rightsizer: Arc<ResourceRightsizer>,
    pub cost_optimizer: Arc<CostOptimizer>,
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

/// Readiness check response - returns 200 if ready, 503 if not ready
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

    encoder.encode(&metric_families, &mut buffer).unwrap();

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Engine-level aggregate counters
async fn optimization_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.get_optimization_metrics().await)
}

/// Zero-pod scaler aggregate counters
async fn scaling_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.zero_pod.get_scaling_metrics().await)
}

/// Rightsizer aggregate counters
async fn rightsizing_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.rightsizer.get_rightsizing_metrics().await)
}

/// Cost optimizer aggregate counters
async fn cost_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.cost_optimizer.get_cost_optimization_metrics().await)
}

/// Safety manager aggregate counters
async fn safety_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.safety.get_safety_metrics().await)
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/metrics/optimization", get(optimization_metrics))
        .route("/api/v1/metrics/scaling", get(scaling_metrics))
        .route("/api/v1/metrics/rightsizing", get(rightsizing_metrics))
        .route("/api/v1/metrics/cost", get(cost_metrics))
        .route("/api/v1/metrics/safety", get(safety_metrics))
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
