//! Health check handlers

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::routes::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// GET /health/ready
pub async fn readiness(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, StatusCode> {
    match state.db_pool.health_check().await {
        Ok(()) => Ok(Json(HealthResponse { status: "ready" })),
        Err(_) => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}
