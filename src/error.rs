//! Bridge error types.
//!
//! [`BridgeError`] is returned by every component boundary (catalog
//! resolution, credential construction, OAuth2 flow, dispatch). Internal
//! plumbing uses `anyhow` and is converted here.

use serde_json::Value;

/// Error type for all bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The remote discovery service could not be reached. Retryable.
    #[error("discovery service unavailable: {0}")]
    DiscoveryUnavailable(String),

    /// The discovery service rejected the API identifier. Carries the remote error body.
    #[error("unknown API '{api}'")]
    UnknownApi { api: String, body: Value },

    /// An `name:version` string that does not contain exactly one pair.
    #[error("invalid API identifier '{0}'")]
    InvalidApiIdentifier(String),

    /// No connection is registered under the given identifier (or OAuth2 state value).
    #[error("unknown connection '{0}'")]
    UnknownConnection(String),

    /// A dotted operation path does not name a method on the target API.
    #[error("unresolved operation '{0}'")]
    UnresolvedOperation(String),

    /// Credential construction, token exchange or refresh failed.
    #[error("authorization failed: {0}")]
    AuthorizationFailure(String),

    /// The remote API call itself failed. Carries the remote error body.
    #[error("remote operation failed: {body}")]
    RemoteOperationFailure { body: Value },

    /// A connection or bridge configuration is unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Durable token state could not be read or written.
    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
}

impl BridgeError {
    /// Remote operation failure with a plain message body.
    pub fn remote(message: impl Into<String>) -> Self {
        BridgeError::RemoteOperationFailure {
            body: Value::String(message.into()),
        }
    }

    /// JSON body suitable for returning to an HTTP caller.
    ///
    /// Remote failures return the remote body verbatim, everything else an
    /// `{ "error": message }` object.
    pub fn to_body(&self) -> Value {
        match self {
            BridgeError::UnknownApi { body, .. } | BridgeError::RemoteOperationFailure { body } => {
                body.clone()
            }
            other => serde_json::json!({ "error": other.to_string() }),
        }
    }
}

/// Result alias used across the crate's public API.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
