//! Connection configurations and the in-process connection registry.
//!
//! A connection is one authentication strategy plus its secrets. The registry
//! owns the live [`CredentialProvider`] for each saved connection; re-saving a
//! connection replaces its provider.

use crate::credentials::TokenStore;
use crate::error::{BridgeError, Result};
use crate::provider::{AuthType, CredentialProvider, ProviderContext, ServiceAccountKey};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};


/// Durable configuration for one connection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connection identity; also the OAuth2 `state` value
    #[serde(default)]
    pub id: String,
    /// `service`, `oauth2` or `api`. Kept as configured; unknown values
    /// surface when the connection is used.
    pub auth_type: String,
    /// Newline-delimited scope URIs
    #[serde(default)]
    pub scopes: String,
    /// Service-account JSON key
    #[serde(default)]
    pub service_key: Option<String>,
    #[serde(default)]
    pub oauth2_client_id: Option<String>,
    #[serde(default)]
    pub oauth2_client_secret: Option<String>,
    /// Public root URL the OAuth2 callback route is reachable under
    #[serde(default)]
    pub oauth2_callback_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ConnectionConfig {
    /// Scopes as a list, one per non-blank line.
    pub fn scope_list(&self) -> Vec<String> {
        self.scopes
            .lines()
            .map(str::trim)
            .filter(|scope| !scope.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Save-time checks.
    ///
    /// The auth type itself is not checked here.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(BridgeError::Configuration(
                "connection id must not be empty".to_string(),
            ));
        }

        if AuthType::parse(&self.auth_type) == Some(AuthType::Service) {
            if let Some(json) = &self.service_key {
                ServiceAccountKey::from_json(json)?;
            }
        }

        Ok(())
    }

    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            id: self.id.clone(),
            auth_type: self.auth_type.clone(),
            scopes: self.scope_list(),
        }
    }
}

/// Secret-free view of a connection for listings.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConnectionSummary {
    pub id: String,
    pub auth_type: String,
    pub scopes: Vec<String>,
}

/// A saved connection and its live credential provider.
pub struct Connection {
    config: Arc<ConnectionConfig>,
    credentials: CredentialProvider,
}

impl Connection {
    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialProvider {
        &self.credentials
    }
}

/// Registry of saved connections keyed by id.
pub struct ConnectionRegistry {
    connections: DashMap<String, Arc<Connection>>,
    context: Arc<ProviderContext>,
}

impl ConnectionRegistry {
    pub fn new(context: Arc<ProviderContext>) -> Self {
        Self {
            connections: DashMap::new(),
            context,
        }
    }

    /// Save (or re-save) a connection, replacing any live provider.
    pub fn save(&self, config: ConnectionConfig) -> Result<Arc<Connection>> {
        config.validate()?;

        let config = Arc::new(config);
        let connection = Arc::new(Connection {
            credentials: CredentialProvider::new(Arc::clone(&config), Arc::clone(&self.context)),
            config,
        });

        let replaced = self
            .connections
            .insert(connection.id().to_string(), Arc::clone(&connection))
            .is_some();
        info!(
            connection = %connection.id(),
            auth_type = %connection.config().auth_type,
            replaced,
            "Connection saved"
        );

        Ok(connection)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|c| Arc::clone(c.value()))
    }

    /// Like [`get`](Self::get) but unknown ids are an error.
    pub fn resolve(&self, id: &str) -> Result<Arc<Connection>> {
        self.get(id).ok_or_else(|| {
            debug!(connection = %id, "Connection lookup failed");
            BridgeError::UnknownConnection(id.to_string())
        })
    }

    /// Remove a connection and its durable token state.
    ///
    /// Returns whether anything was removed. An id with stored tokens but no
    /// registered connection counts, so orphaned token state can be purged.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let removed = self.connections.remove(id).is_some();
        let had_tokens = self
            .context
            .token_store
            .delete(id)
            .map_err(BridgeError::Storage)?;

        if removed || had_tokens {
            info!(connection = %id, had_tokens, "Connection removed");
        }
        Ok(removed || had_tokens)
    }

    /// Ids holding stored token state without a registered connection.
    pub fn orphaned_tokens(&self) -> Result<Vec<String>> {
        let stored = self
            .context
            .token_store
            .list_connections()
            .map_err(BridgeError::Storage)?;
        Ok(stored
            .into_iter()
            .filter(|id| !self.connections.contains_key(id))
            .collect())
    }

    /// Summaries of all connections, ordered by id.
    pub fn list(&self) -> Vec<ConnectionSummary> {
        let mut summaries: Vec<ConnectionSummary> = self
            .connections
            .iter()
            .map(|entry| entry.value().config().summary())
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.context.token_store
    }
}
