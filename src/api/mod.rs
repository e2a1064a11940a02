//! Administrative HTTP endpoints consumed by the editor UI.
//!
//! Every route is nested under the configured admin prefix (`/google` by
//! default). All routes except the OAuth2 callback, which is a browser
//! redirect target, sit behind the optional admin bearer token.

mod catalog;
mod connections;
mod oauth;

use crate::auth::require_admin_token;
use crate::catalog::CatalogResolver;
use crate::connection::ConnectionRegistry;
use crate::error::BridgeError;
use crate::oauth::OAuthFlowController;
use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, put},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Shared state for the admin router.
#[derive(Clone)]
pub struct AdminAppState {
    pub resolver: Arc<dyn CatalogResolver>,
    pub registry: Arc<ConnectionRegistry>,
    pub oauth: OAuthFlowController,
    /// Required bearer token. `None` leaves the admin routes open.
    pub admin_token: Option<Arc<str>>,
    /// OAuth2 callback route, relative to the prefix
    pub callback_path: String,
}

/// Application error types for admin endpoints.
///
/// Each variant carries the JSON body returned to the caller.
pub(crate) enum AppError {
    BadRequest(Value),
    NotFound(Value),
    ServerError(Value),
    BadGateway(Value),
}

impl AppError {
    pub(crate) fn message(status: fn(Value) -> AppError, message: impl Into<String>) -> Self {
        status(json!({ "error": message.into() }))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(body) => (StatusCode::BAD_REQUEST, body),
            AppError::NotFound(body) => (StatusCode::NOT_FOUND, body),
            AppError::ServerError(body) => (StatusCode::INTERNAL_SERVER_ERROR, body),
            AppError::BadGateway(body) => (StatusCode::BAD_GATEWAY, body),
        };

        (status, Json(body)).into_response()
    }
}

impl From<BridgeError> for AppError {
    fn from(error: BridgeError) -> Self {
        let body = error.to_body();
        match error {
            BridgeError::UnknownConnection(_) => AppError::NotFound(body),
            BridgeError::InvalidApiIdentifier(_) | BridgeError::Configuration(_) => {
                AppError::BadRequest(body)
            }
            BridgeError::AuthorizationFailure(_) => AppError::BadGateway(body),
            BridgeError::DiscoveryUnavailable(_)
            | BridgeError::UnknownApi { .. }
            | BridgeError::UnresolvedOperation(_)
            | BridgeError::RemoteOperationFailure { .. }
            | BridgeError::Storage(_) => AppError::ServerError(body),
        }
    }
}

/// Create the admin router nested under `prefix`.
pub fn create_admin_router(state: AdminAppState, prefix: &str) -> Router {
    let callback_path = normalize_path(&state.callback_path);
    let admin_token = state.admin_token.clone();
    let state = Arc::new(state);

    let guarded = Router::new()
        .route("/apis", get(catalog::list_apis))
        .route("/apis/:api/info", get(catalog::api_info))
        .route("/authorizeUrl/:connection", get(oauth::authorize_url))
        .route("/connections", get(connections::list_connections))
        .route(
            "/connections/:id",
            put(connections::save_connection).delete(connections::delete_connection),
        )
        .route_layer(middleware::from_fn_with_state(admin_token, require_admin_token))
        .with_state(Arc::clone(&state));

    let open = Router::new()
        .route(&callback_path, get(oauth::callback))
        .with_state(state);

    let admin = guarded.merge(open);
    match normalize_path(prefix).as_str() {
        "/" => admin,
        prefix => Router::new().nest(prefix, admin),
    }
}

/// Leading slash, no trailing slash (except for the root).
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    format!("/{}", trimmed)
}
