//! Health check handlers

use crate::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use querybridge_common::VERSION;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub service: String,
    pub connections: usize,
    pub cached_responses: usize,
}

/// Liveness probe - always healthy while the server runs
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: VERSION.to_string(),
    })
}

/// Readiness probe with basic engine statistics. Data sources are
/// per-request, so there is no upstream dependency to check here.
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    Json(ReadyResponse {
        status: "ready".to_string(),
        service: state.config.observability.service_name.clone(),
        connections: state.registry.connection_count().await,
        cached_responses: state.cache.len().await,
    })
}
