//! OAuth2 authorization-code credential with refresh.

use super::{Authorization, Credential, TokenObserver, refresh_leeway};
use crate::error::{BridgeError, Result};
use crate::oauth::{TokenEndpoint, TokenSet};
use crate::provider::AuthType;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Client registration for one OAuth2 connection.
#[derive(Clone, Debug)]
pub struct OAuth2ClientInfo {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Provider authorization endpoint
    pub auth_url: String,
    pub scopes: Vec<String>,
}

/// Live OAuth2 credential.
///
/// Holds the current token set in memory. Access tokens are refreshed on
/// demand with the held refresh token; every issued token set is announced to
/// the registered [`TokenObserver`]s exactly as the token endpoint returned it.
pub struct OAuth2Credential {
    client: OAuth2ClientInfo,
    endpoint: Arc<TokenEndpoint>,
    tokens: RwLock<TokenSet>,
    /// Serializes refreshes so concurrent callers share one token request
    refresh_lock: Mutex<()>,
    observers: RwLock<Vec<Arc<dyn TokenObserver>>>,
}

impl OAuth2Credential {
    pub fn new(client: OAuth2ClientInfo, endpoint: Arc<TokenEndpoint>) -> Self {
        Self {
            client,
            endpoint,
            tokens: RwLock::new(TokenSet::default()),
            refresh_lock: Mutex::new(()),
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn client(&self) -> &OAuth2ClientInfo {
        &self.client
    }

    /// Replace the in-memory token set.
    pub fn set_credentials(&self, tokens: TokenSet) {
        *self.tokens.write().unwrap() = tokens;
    }

    /// Snapshot of the in-memory token set.
    pub fn credentials(&self) -> TokenSet {
        self.tokens.read().unwrap().clone()
    }

    /// Register an observer for newly issued token sets.
    pub fn on_tokens(&self, observer: Arc<dyn TokenObserver>) {
        self.observers.write().unwrap().push(observer);
    }

    /// Authorization URL for the consent screen.
    ///
    /// Requests offline access and forces the consent prompt so a refresh
    /// token is issued on every authorization. `state` is echoed back to the
    /// callback unchanged.
    pub fn generate_auth_url(&self, state: &str) -> String {
        let scopes = self.client.scopes.join(" ");
        format!(
            "{}?access_type=offline&prompt=consent&response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            self.client.auth_url,
            urlencoding::encode(&self.client.client_id),
            urlencoding::encode(&self.client.redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        )
    }

    /// Exchange an authorization code. Does not touch the in-memory token set.
    pub async fn get_token(&self, code: &str) -> Result<TokenSet> {
        self.endpoint
            .exchange_code(
                code,
                &self.client.redirect_uri,
                &self.client.client_id,
                &self.client.client_secret,
            )
            .await
            .map_err(|e| {
                error!(error = %e, "Authorization code exchange failed");
                BridgeError::AuthorizationFailure(format!("{:#}", e))
            })
    }

    fn fresh_access_token(&self) -> Option<String> {
        self.tokens
            .read()
            .unwrap()
            .fresh_access_token(refresh_leeway())
            .map(str::to_string)
    }

    /// Refresh the access token and announce the issued set.
    async fn refresh(&self) -> Result<String> {
        let refresh_token = self.credentials().refresh_token.ok_or_else(|| {
            BridgeError::AuthorizationFailure("connection has not been authorized yet".to_string())
        })?;

        let issued = self
            .endpoint
            .refresh(
                &refresh_token,
                &self.client.client_id,
                &self.client.client_secret,
            )
            .await
            .map_err(|e| {
                error!(error = %e, "Token refresh failed");
                BridgeError::AuthorizationFailure(format!("{:#}", e))
            })?;

        let merged = {
            let mut tokens = self.tokens.write().unwrap();
            *tokens = tokens.merged_with(&issued);
            tokens.clone()
        };

        info!(
            rotated = issued.refresh_token.is_some(),
            "OAuth2 access token refreshed"
        );
        self.notify(&issued);

        merged
            .access_token
            .ok_or_else(|| BridgeError::AuthorizationFailure("token endpoint returned no access token".to_string()))
    }

    /// Announce a newly issued token set to every observer.
    pub(crate) fn notify(&self, issued: &TokenSet) {
        let observers = self.observers.read().unwrap().clone();
        for observer in observers {
            observer.on_tokens(issued);
        }
    }
}

#[async_trait]
impl Credential for OAuth2Credential {
    fn kind(&self) -> AuthType {
        AuthType::OAuth2
    }

    async fn authorize(&self) -> Result<Authorization> {
        if let Some(token) = self.fresh_access_token() {
            return Ok(Authorization::Bearer(token));
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited
        if let Some(token) = self.fresh_access_token() {
            debug!("Using access token refreshed by a concurrent caller");
            return Ok(Authorization::Bearer(token));
        }

        self.refresh().await.map(Authorization::Bearer)
    }
}
