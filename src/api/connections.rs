//! Connection management.

use super::{AdminAppState, AppError};
use crate::connection::{ConnectionConfig, ConnectionSummary};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::info;

/// GET /connections
pub(super) async fn list_connections(
    State(state): State<Arc<AdminAppState>>,
) -> Json<Vec<ConnectionSummary>> {
    Json(state.registry.list())
}

/// PUT /connections/:id
///
/// Saves or re-saves a connection. The path id wins over any id in the body.
pub(super) async fn save_connection(
    State(state): State<Arc<AdminAppState>>,
    Path(id): Path<String>,
    Json(mut config): Json<ConnectionConfig>,
) -> Result<Json<ConnectionSummary>, AppError> {
    config.id = id;
    let connection = state.registry.save(config)?;
    Ok(Json(connection.config().summary()))
}

/// DELETE /connections/:id
///
/// Removes the connection and its persisted token state.
pub(super) async fn delete_connection(
    State(state): State<Arc<AdminAppState>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    if state.registry.remove(&id)? {
        info!(connection = %id, "Connection deleted via admin API");
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(AppError::message(
            AppError::NotFound,
            format!("Connection '{}' not found", id),
        ))
    }
}
