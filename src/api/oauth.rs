//! OAuth2 authorize link and callback.

use super::{AdminAppState, AppError};
use crate::error::BridgeError;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Callback query parameters
#[derive(Deserialize)]
pub(super) struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// GET /authorizeUrl/:connection
///
/// HTML link to the consent screen. Unknown connections get an empty 404.
pub(super) async fn authorize_url(
    State(state): State<Arc<AdminAppState>>,
    Path(connection): Path<String>,
) -> Result<Response, AppError> {
    match state.oauth.authorize_url(&connection).await {
        Ok(url) => {
            debug!(connection = %connection, "Serving authorization link");
            Ok(Html(format!(
                "<a href=\"{}\" target=\"_blank\">OAuth2 Authorize Link</a>",
                html_escape(&url)
            ))
            .into_response())
        }
        Err(BridgeError::UnknownConnection(_)) => {
            warn!(connection = %connection, "Authorization link for unknown connection");
            Ok(StatusCode::NOT_FOUND.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// GET {callback_path}?code&state
///
/// `state` names the connection. Unknown states return 404 with a JSON body
/// naming the value.
pub(super) async fn callback(
    State(state): State<Arc<AdminAppState>>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Response, AppError> {
    if let Some(error) = callback.error {
        let description = callback
            .error_description
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(error = %error, description = %description, "OAuth2 authorization denied");
        return Err(AppError::message(
            AppError::BadRequest,
            format!("OAuth2 authorization failed: {} - {}", error, description),
        ));
    }

    let code = callback
        .code
        .ok_or_else(|| AppError::message(AppError::BadRequest, "Missing 'code' parameter"))?;
    let connection_id = callback
        .state
        .ok_or_else(|| AppError::message(AppError::BadRequest, "Missing 'state' parameter"))?;

    match state.oauth.handle_callback(&code, &connection_id).await {
        Ok(connection) => {
            info!(connection = %connection.id(), "OAuth2 callback processed");
            Ok(format!(
                "Authorization for '{}' complete. You can close this window.",
                connection.id()
            )
            .into_response())
        }
        Err(BridgeError::UnknownConnection(_)) => Err(AppError::NotFound(json!({
            "error": "Unknown connection",
            "state": connection_id,
        }))),
        Err(e) => Err(e.into()),
    }
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_deserialization() {
        let callback: OAuthCallback =
            serde_urlencoded::from_str("code=4%2Fabc&state=drive").unwrap();
        assert_eq!(callback.code.as_deref(), Some("4/abc"));
        assert_eq!(callback.state.as_deref(), Some("drive"));
        assert!(callback.error.is_none());

        let callback: OAuthCallback =
            serde_urlencoded::from_str("error=access_denied&error_description=User+cancelled")
                .unwrap();
        assert_eq!(callback.error.as_deref(), Some("access_denied"));
        assert_eq!(callback.error_description.as_deref(), Some("User cancelled"));
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(
            html_escape("https://a.example/auth?x=1&y=\"2\""),
            "https://a.example/auth?x=1&amp;y=&quot;2&quot;"
        );
    }
}
