//! Service-account credential (signed JWT assertion grant).

use super::{Authorization, Credential, refresh_leeway};
use crate::error::{BridgeError, Result};
use crate::oauth::{TokenEndpoint, TokenSet};
use crate::provider::AuthType;
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Lifetime requested for each assertion, in seconds
const ASSERTION_TTL_SECS: i64 = 3600;

/// The fields of a service-account JSON key the bridge uses.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl ServiceAccountKey {
    /// Parse the JSON key file contents.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| BridgeError::Configuration(format!("invalid service account key: {}", e)))
    }
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .finish_non_exhaustive()
    }
}

/// JWT claims for the assertion grant
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signing credential for a service account.
///
/// Construction is offline; the first [`Credential::authorize`] call signs
/// an assertion and exchanges it. The access token is reused until it nears
/// expiry.
pub struct ServiceAccountCredential {
    key: ServiceAccountKey,
    scopes: Vec<String>,
    endpoint: Arc<TokenEndpoint>,
    cached: Mutex<Option<TokenSet>>,
}

impl ServiceAccountCredential {
    /// `endpoint` is used unless the key names its own `token_uri`.
    pub fn new(key: ServiceAccountKey, scopes: Vec<String>, endpoint: Arc<TokenEndpoint>) -> Self {
        let endpoint = match &key.token_uri {
            Some(uri) if uri != endpoint.token_url() => Arc::new(TokenEndpoint::new(uri.clone())),
            _ => endpoint,
        };

        Self {
            key,
            scopes,
            endpoint,
            cached: Mutex::new(None),
        }
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Sign an RS256 assertion for the configured scopes.
    pub(crate) fn sign_assertion(&self) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: self.key.client_email.clone(),
            scope: self.scopes.join(" "),
            aud: self.endpoint.token_url().to_string(),
            iat: now,
            exp: now + ASSERTION_TTL_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes()).map_err(|e| {
            BridgeError::AuthorizationFailure(format!("invalid service account private key: {}", e))
        })?;

        jsonwebtoken::encode(&header, &claims, &signing_key)
            .map_err(|e| BridgeError::AuthorizationFailure(format!("failed to sign assertion: {}", e)))
    }
}

#[async_trait]
impl Credential for ServiceAccountCredential {
    fn kind(&self) -> AuthType {
        AuthType::Service
    }

    async fn authorize(&self) -> Result<Authorization> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached
            .as_ref()
            .and_then(|tokens| tokens.fresh_access_token(refresh_leeway()))
        {
            return Ok(Authorization::Bearer(token.to_string()));
        }

        debug!(client_email = %self.key.client_email, "Requesting service account access token");
        let assertion = self.sign_assertion()?;
        let issued = self.endpoint.jwt_bearer(&assertion).await.map_err(|e| {
            error!(client_email = %self.key.client_email, error = %e, "Service account token request failed");
            BridgeError::AuthorizationFailure(format!("{:#}", e))
        })?;

        let token = issued.access_token.clone().ok_or_else(|| {
            BridgeError::AuthorizationFailure("token endpoint returned no access token".to_string())
        })?;
        *cached = Some(issued);

        Ok(Authorization::Bearer(token))
    }
}
