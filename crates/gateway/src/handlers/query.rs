//! Query and history handlers

use crate::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use querybridge_common::{
    errors::{AppError, Result},
    types::{ConnectionId, QueryHistoryRecord, QueryResponse},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, max = 4096))]
    pub connection_string: String,

    #[validate(length(min = 1, max = 2000))]
    pub query: String,

    /// Result-size hint for the document path
    pub top_k: Option<usize>,
}

/// Process a natural-language query against a connection's database and
/// document corpus
pub async fn process_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let connection = ConnectionId::from_connection_string(&request.connection_string)?;
    let engine = state.registry.get_or_connect(&connection).await?;
    let response = engine.process_query(&request.query, request.top_k).await?;

    tracing::info!(
        connection = %connection,
        query_type = response.query_type.as_str(),
        rows = response.rows.len(),
        sources = response.sources.len(),
        cache_hit = response.metrics.cache_hit,
        latency_ms = response.metrics.total_ms,
        "Query processed"
    );

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub connection_string: String,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub history: Vec<QueryHistoryRecord>,
}

/// A connection's query history, most recent first
pub async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>> {
    let connection = ConnectionId::from_connection_string(&params.connection_string)?;
    let engine = state.registry.get_or_connect(&connection).await?;

    Ok(Json(HistoryResponse {
        history: engine.history().await,
    }))
}
