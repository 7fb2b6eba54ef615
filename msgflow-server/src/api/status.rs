//! Monitoring endpoints.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use msgflow_core::pipeline::{PipelineHealth, PipelineStats};
use serde::Serialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats))
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    #[serde(flatten)]
    pipeline: PipelineHealth,
}

/// `GET /health`: 200 while every flow runs, 503 otherwise.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let pipeline = state.pipeline.health();
    let (code, status) = if pipeline.is_healthy() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            pipeline,
        }),
    )
}

/// `GET /stats`: delivery counters.
async fn stats(State(state): State<AppState>) -> Json<PipelineStats> {
    Json(state.pipeline.stats())
}
