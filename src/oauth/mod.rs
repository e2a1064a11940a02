//! OAuth2 authorization-code flow.
//!
//! 1. Admin UI requests the authorize URL for a connection
//! 2. User consents on the provider's site
//! 3. Provider redirects to the callback with `code` and `state`
//! 4. `state` is the connection id; the code is exchanged on that
//!    connection's credential and any refresh token is persisted
//!
//! No session store is kept: the `state` value alone routes the callback.

mod exchange;

pub use exchange::{TokenEndpoint, TokenSet, JWT_BEARER_GRANT};

use crate::connection::{Connection, ConnectionRegistry};
use crate::error::{BridgeError, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives authorization for OAuth2 connections.
#[derive(Clone)]
pub struct OAuthFlowController {
    registry: Arc<ConnectionRegistry>,
}

impl OAuthFlowController {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Consent URL for a connection, carrying its id as `state`.
    pub async fn authorize_url(&self, connection_id: &str) -> Result<String> {
        let connection = self.registry.resolve(connection_id)?;
        let credential = connection.credentials().oauth2_client().await?;

        debug!(connection = %connection_id, "Generated authorization URL");
        Ok(credential.generate_auth_url(connection.id()))
    }

    /// Complete an authorization redirect.
    ///
    /// Fails with [`BridgeError::UnknownConnection`] when `state` names no
    /// connection.
    pub async fn handle_callback(&self, code: &str, state: &str) -> Result<Arc<Connection>> {
        let connection = self.registry.resolve(state).map_err(|e| {
            warn!(state = %state, "OAuth2 callback for unknown connection");
            e
        })?;

        self.process_auth_code(&connection, code).await?;
        Ok(connection)
    }

    /// Exchange `code` and install the issued tokens on the live credential.
    ///
    /// A returned refresh token is persisted before the credential is
    /// updated. Without one, the persisted and in-memory refresh tokens are
    /// kept.
    pub async fn process_auth_code(&self, connection: &Connection, code: &str) -> Result<()> {
        let credential = connection.credentials().oauth2_client().await?;
        let issued = credential.get_token(code).await?;

        if let Some(refresh_token) = &issued.refresh_token {
            self.registry
                .token_store()
                .persist_refresh_token(connection.id(), refresh_token)
                .map_err(BridgeError::Storage)?;
        }

        let current = credential.credentials();
        credential.set_credentials(current.merged_with(&issued));

        info!(
            connection = %connection.id(),
            has_refresh_token = issued.refresh_token.is_some(),
            "OAuth2 authorization completed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionConfig;
    use crate::credentials::TokenStore;
    use crate::provider::{Credential, ProviderContext};
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use mockito::{Matcher, Server};

    fn controller(token_url: String) -> OAuthFlowController {
        let store = TokenStore::new(":memory:", &BASE64.encode([3u8; 32])).unwrap();
        let registry = Arc::new(ConnectionRegistry::new(Arc::new(ProviderContext {
            token_endpoint: Arc::new(TokenEndpoint::new(token_url)),
            auth_url: "https://accounts.example.com/o/oauth2/v2/auth".to_string(),
            redirect_path: "/google/oauth2callback".to_string(),
            token_store: Arc::new(store),
        })));
        registry
            .save(ConnectionConfig {
                id: "drive".to_string(),
                auth_type: "oauth2".to_string(),
                scopes: "https://www.googleapis.com/auth/drive".to_string(),
                oauth2_client_id: Some("cid".to_string()),
                oauth2_client_secret: Some("secret".to_string()),
                oauth2_callback_url: Some("http://localhost:1880".to_string()),
                ..Default::default()
            })
            .unwrap();
        OAuthFlowController::new(registry)
    }

    #[tokio::test]
    async fn test_authorize_url_carries_connection_id() {
        let controller = controller("http://127.0.0.1:9/token".to_string());
        let url = controller.authorize_url("drive").await.unwrap();

        assert!(url.contains("state=drive"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(matches!(
            controller.authorize_url("nope").await,
            Err(BridgeError::UnknownConnection(_))
        ));
    }

    #[tokio::test]
    async fn test_callback_with_unknown_state() {
        let controller = controller("http://127.0.0.1:9/token".to_string());
        assert!(matches!(
            controller.handle_callback("4/code", "ghost").await,
            Err(BridgeError::UnknownConnection(state)) if state == "ghost"
        ));
    }

    #[tokio::test]
    async fn test_refresh_token_persisted_and_kept_across_rotation() {
        let mut server = Server::new_async().await;
        let code_mock = server
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"A1","refresh_token":"R1","expires_in":0}"#)
            .create_async()
            .await;
        let refresh_mock = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "R1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"A2","expires_in":3600}"#)
            .expect(1)
            .create_async()
            .await;

        let controller = controller(format!("{}/token", server.url()));
        let connection = controller.handle_callback("4/code", "drive").await.unwrap();
        let store = Arc::clone(controller.registry.token_store());
        assert_eq!(store.refresh_token("drive").unwrap().as_deref(), Some("R1"));

        // A1 is already stale, so this performs a refresh that does not rotate
        let credential = connection.credentials().oauth2_client().await.unwrap();
        credential.authorize().await.unwrap();

        assert_eq!(store.refresh_token("drive").unwrap().as_deref(), Some("R1"));
        assert_eq!(credential.credentials().refresh_token.as_deref(), Some("R1"));
        assert_eq!(credential.credentials().access_token.as_deref(), Some("A2"));
        code_mock.assert_async().await;
        refresh_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_exchange_without_refresh_token_keeps_persisted() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"A1","expires_in":3600}"#)
            .create_async()
            .await;

        let controller = controller(format!("{}/token", server.url()));
        let store = Arc::clone(controller.registry.token_store());
        store.persist_refresh_token("drive", "R-old").unwrap();

        controller.handle_callback("4/code", "drive").await.unwrap();

        assert_eq!(store.refresh_token("drive").unwrap().as_deref(), Some("R-old"));
    }

    #[tokio::test]
    async fn test_failed_exchange_is_authorization_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let controller = controller(format!("{}/token", server.url()));
        assert!(matches!(
            controller.handle_callback("4/bad", "drive").await,
            Err(BridgeError::AuthorizationFailure(_))
        ));
    }
}
