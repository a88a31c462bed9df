//! Connect/discover and schema refresh handlers

use crate::AppState;
use axum::{extract::State, Json};
use querybridge_common::{
    errors::{AppError, Result},
    types::ConnectionId,
};
use querybridge_discovery::SchemaModel;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ConnectRequest {
    #[validate(length(min = 1, max = 4096))]
    pub connection_string: String,
}

#[derive(Serialize)]
pub struct ConnectResponse {
    pub message: String,
    pub connection: ConnectionId,
    pub schema: SchemaModel,
}

/// Connect to a data source and discover its schema. Connectivity
/// failures surface verbatim; per-table failures arrive as warnings on
/// a partial schema.
pub async fn connect_database(
    State(state): State<AppState>,
    Json(request): Json<ConnectRequest>,
) -> Result<Json<ConnectResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("connection_string".to_string()),
    })?;

    let connection = ConnectionId::from_connection_string(&request.connection_string)?;
    let engine = state.registry.get_or_connect(&connection).await?;
    let schema = engine.schema().await;

    tracing::info!(
        connection = %connection,
        tables = schema.tables.len(),
        warnings = schema.warnings.len(),
        "Database connected"
    );

    Ok(Json(ConnectResponse {
        message: "Database connected and schema discovered".to_string(),
        connection,
        schema: (*schema).clone(),
    }))
}

/// Force re-discovery, bypassing the cached model
pub async fn refresh_schema(
    State(state): State<AppState>,
    Json(request): Json<ConnectRequest>,
) -> Result<Json<ConnectResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("connection_string".to_string()),
    })?;

    let connection = ConnectionId::from_connection_string(&request.connection_string)?;
    let schema = state.registry.refresh(&connection).await?;

    Ok(Json(ConnectResponse {
        message: "Schema refreshed".to_string(),
        connection,
        schema: (*schema).clone(),
    }))
}
