//! Credential provider.
//!
//! Produces the authenticated handle for a connection according to its auth
//! type. Each credential object is constructed at most once per connection;
//! construction goes through a single guarded initialization entry point, so
//! concurrent first use still builds exactly one object.
//!
//! ```text
//!            get_auth()
//!                ↓
//!   ┌──────── AuthType ────────┐
//!   ↓            ↓             ↓
//! service      oauth2         api
//!   ↓            ↓             ↓
//! JWT grant   code/refresh   raw key
//!             + rotation observer → TokenStore
//! ```

mod oauth2;
mod service_account;

pub use oauth2::{OAuth2ClientInfo, OAuth2Credential};
pub use service_account::{ServiceAccountCredential, ServiceAccountKey};

use crate::connection::ConnectionConfig;
use crate::credentials::TokenStore;
use crate::error::{BridgeError, Result};
use crate::oauth::{TokenEndpoint, TokenSet};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

#[cfg(test)]
mod tests;

/// Access tokens closer than this to expiry are refreshed before use.
pub(crate) fn refresh_leeway() -> chrono::Duration {
    chrono::Duration::seconds(90)
}

/// Supported authentication strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    Service,
    OAuth2,
    Api,
}

impl AuthType {
    /// Parse a configured auth type. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "service" => Some(AuthType::Service),
            "oauth2" => Some(AuthType::OAuth2),
            "api" => Some(AuthType::Api),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::Service => "service",
            AuthType::OAuth2 => "oauth2",
            AuthType::Api => "api",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the transport attaches to an outgoing request.
#[derive(Clone, PartialEq)]
pub enum Authorization {
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// `key=<api key>` query parameter
    ApiKey(String),
    /// Nothing attached
    Anonymous,
}

impl fmt::Debug for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authorization::Bearer(_) => f.write_str("Bearer(..)"),
            Authorization::ApiKey(_) => f.write_str("ApiKey(..)"),
            Authorization::Anonymous => f.write_str("Anonymous"),
        }
    }
}

/// A live authenticated identity usable by the remote call layer.
#[async_trait]
pub trait Credential: Send + Sync {
    fn kind(&self) -> AuthType;

    /// Authorize (or refresh) and return what to attach to the next request.
    ///
    /// May perform network I/O against the token endpoint.
    async fn authorize(&self) -> Result<Authorization>;
}

/// Receives every token set an OAuth2 credential is issued after construction.
pub trait TokenObserver: Send + Sync {
    fn on_tokens(&self, tokens: &TokenSet);
}

/// Rotation observer persisting refresh tokens for one connection.
///
/// A token set without a refresh token leaves the stored one untouched.
pub struct RefreshTokenPersister {
    connection_id: String,
    store: Arc<TokenStore>,
}

impl RefreshTokenPersister {
    pub fn new(connection_id: impl Into<String>, store: Arc<TokenStore>) -> Self {
        Self {
            connection_id: connection_id.into(),
            store,
        }
    }
}

impl TokenObserver for RefreshTokenPersister {
    fn on_tokens(&self, tokens: &TokenSet) {
        let Some(refresh_token) = &tokens.refresh_token else {
            return;
        };

        match self.store.persist_refresh_token(&self.connection_id, refresh_token) {
            Ok(()) => info!(connection = %self.connection_id, "Persisted rotated refresh token"),
            Err(e) => error!(
                connection = %self.connection_id,
                error = %e,
                "Failed to persist rotated refresh token"
            ),
        }
    }
}

/// Raw API key credential.
///
/// The key is not exchanged for anything; the transport appends it as the
/// `key` query parameter.
pub struct ApiKeyCredential {
    key: String,
}

impl ApiKeyCredential {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

#[async_trait]
impl Credential for ApiKeyCredential {
    fn kind(&self) -> AuthType {
        AuthType::Api
    }

    async fn authorize(&self) -> Result<Authorization> {
        if self.key.is_empty() {
            Ok(Authorization::Anonymous)
        } else {
            Ok(Authorization::ApiKey(self.key.clone()))
        }
    }
}

/// Shared settings every connection's provider is built with.
pub struct ProviderContext {
    pub token_endpoint: Arc<TokenEndpoint>,
    /// Provider authorization endpoint (consent screen)
    pub auth_url: String,
    /// Path of the OAuth2 callback route, appended to each connection's callback root
    pub redirect_path: String,
    pub token_store: Arc<TokenStore>,
}

/// Construction state of a provider's credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderState {
    Uninitialized,
    Ready,
}

/// Per-connection credential cache.
pub struct CredentialProvider {
    config: Arc<ConnectionConfig>,
    context: Arc<ProviderContext>,
    service: OnceCell<Arc<ServiceAccountCredential>>,
    oauth2: OnceCell<Arc<OAuth2Credential>>,
    api: OnceCell<Arc<ApiKeyCredential>>,
}

impl CredentialProvider {
    pub fn new(config: Arc<ConnectionConfig>, context: Arc<ProviderContext>) -> Self {
        Self {
            config,
            context,
            service: OnceCell::new(),
            oauth2: OnceCell::new(),
            api: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// `Ready` once the credential for the configured auth type exists.
    pub fn state(&self) -> ProviderState {
        let ready = match AuthType::parse(&self.config.auth_type) {
            Some(AuthType::Service) => self.service.initialized(),
            Some(AuthType::OAuth2) => self.oauth2.initialized(),
            Some(AuthType::Api) => self.api.initialized(),
            None => false,
        };
        if ready {
            ProviderState::Ready
        } else {
            ProviderState::Uninitialized
        }
    }

    /// Credential for the configured auth type.
    ///
    /// An unrecognized auth type is reported here, at call time.
    pub async fn get_auth(&self) -> Result<Arc<dyn Credential>> {
        match AuthType::parse(&self.config.auth_type) {
            Some(AuthType::Service) => Ok(self.service_account().await?),
            Some(AuthType::OAuth2) => Ok(self.oauth2_client().await?),
            Some(AuthType::Api) => Ok(self.api_key().await?),
            None => Err(BridgeError::Configuration(format!(
                "unsupported auth type '{}' on connection '{}'",
                self.config.auth_type, self.config.id
            ))),
        }
    }

    /// Service-account credential. Offline; no token request until first use.
    pub async fn service_account(&self) -> Result<Arc<ServiceAccountCredential>> {
        self.service
            .get_or_try_init(|| async {
                let json = self.config.service_key.as_deref().ok_or_else(|| {
                    BridgeError::Configuration(format!(
                        "connection '{}' has no service account key",
                        self.config.id
                    ))
                })?;
                let key = ServiceAccountKey::from_json(json)?;
                let credential = ServiceAccountCredential::new(
                    key,
                    self.config.scope_list(),
                    Arc::clone(&self.context.token_endpoint),
                );

                debug!(
                    connection = %self.config.id,
                    client_email = %credential.client_email(),
                    scopes = credential.scopes().len(),
                    "Constructed service account credential"
                );
                Ok::<_, BridgeError>(Arc::new(credential))
            })
            .await
            .cloned()
    }

    /// OAuth2 credential, seeded with the persisted refresh token (if any)
    /// and observed for token rotation.
    pub async fn oauth2_client(&self) -> Result<Arc<OAuth2Credential>> {
        self.oauth2
            .get_or_try_init(|| async {
                let config = &self.config;
                let (client_id, client_secret) = match (
                    config.oauth2_client_id.as_deref(),
                    config.oauth2_client_secret.as_deref(),
                ) {
                    (Some(id), Some(secret)) => (id.to_string(), secret.to_string()),
                    _ => {
                        return Err(BridgeError::Configuration(format!(
                            "connection '{}' has no OAuth2 client id/secret",
                            config.id
                        )))
                    }
                };
                let callback_root = config.oauth2_callback_url.as_deref().unwrap_or_default();

                let credential = OAuth2Credential::new(
                    OAuth2ClientInfo {
                        client_id,
                        client_secret,
                        redirect_uri: format!(
                            "{}{}",
                            callback_root.trim_end_matches('/'),
                            self.context.redirect_path
                        ),
                        auth_url: self.context.auth_url.clone(),
                        scopes: config.scope_list(),
                    },
                    Arc::clone(&self.context.token_endpoint),
                );

                let persisted = self
                    .context
                    .token_store
                    .refresh_token(&config.id)
                    .map_err(BridgeError::Storage)?;
                debug!(
                    connection = %config.id,
                    redirect_uri = %credential.client().redirect_uri,
                    has_refresh_token = persisted.is_some(),
                    "Constructed OAuth2 credential"
                );
                credential.set_credentials(TokenSet::from_refresh_token(persisted));
                credential.on_tokens(Arc::new(RefreshTokenPersister::new(
                    config.id.clone(),
                    Arc::clone(&self.context.token_store),
                )));

                Ok::<_, BridgeError>(Arc::new(credential))
            })
            .await
            .cloned()
    }

    /// API key credential.
    pub async fn api_key(&self) -> Result<Arc<ApiKeyCredential>> {
        let credential = self
            .api
            .get_or_init(|| async {
                Arc::new(ApiKeyCredential::new(
                    self.config.api_key.clone().unwrap_or_default(),
                ))
            })
            .await;
        Ok(Arc::clone(credential))
    }
}
