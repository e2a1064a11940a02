//! Discovery lookups for the editor.

use super::{AdminAppState, AppError};
use crate::catalog::{ApiIdentifier, OperationCatalog};
use axum::{
    extract::{Path, State},
    response::Json,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// GET /apis
///
/// Encoded `name:version` identifiers, sorted.
pub(super) async fn list_apis(
    State(state): State<Arc<AdminAppState>>,
) -> Result<Json<Vec<String>>, AppError> {
    let apis = state.resolver.list_apis().await.map_err(|e| {
        warn!(error = %e, "API listing failed");
        AppError::from(e)
    })?;

    debug!(count = apis.len(), "Listed APIs");
    Ok(Json(apis))
}

/// GET /apis/:api/info
///
/// Operations and scopes of one API. Discovery failures return 500 with the
/// remote error body.
pub(super) async fn api_info(
    State(state): State<Arc<AdminAppState>>,
    Path(api): Path<String>,
) -> Result<Json<OperationCatalog>, AppError> {
    let api = ApiIdentifier::decode(&api)?;
    let catalog = state.resolver.describe_api(&api).await.map_err(|e| {
        warn!(api = %api, error = %e, "API description failed");
        AppError::from(e)
    })?;

    debug!(
        api = %api,
        operations = catalog.operations.len(),
        scopes = catalog.scopes.len(),
        "Described API"
    );
    Ok(Json(catalog))
}
