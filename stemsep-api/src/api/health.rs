//! Liveness and health endpoints

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// GET / response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub message: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("stemsep-api")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Commit the binary was built from
    pub build: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Jobs between upload and response
    pub active_jobs: usize,
    /// Engine concurrency bound, if configured
    pub max_concurrent_jobs: Option<usize>,
    /// Engine slots free right now, if bounded
    pub available_slots: Option<usize>,
    /// Last job failure, if any (for diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /
///
/// Static readiness message.
pub async fn root() -> Json<ReadinessResponse> {
    Json(ReadinessResponse {
        message: "stemsep backend is ready".to_string(),
    })
}

/// GET /health
///
/// Uptime, job load and the last job failure.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let last_error = state.last_error.read().await.clone();

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "stemsep-api".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: env!("GIT_HASH").to_string(),
        uptime_seconds,
        active_jobs: state.service.active_jobs(),
        max_concurrent_jobs: state.service.max_concurrent_jobs(),
        available_slots: state.service.available_slots(),
        last_error,
    })
}

/// Build liveness routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
}
