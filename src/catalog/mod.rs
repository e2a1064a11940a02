//! API catalog resolution.
//!
//! Lists the API+version pairs published by the remote discovery service and
//! flattens one API's nested resource/method tree into dotted operation paths.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       CatalogResolver (trait)            │
//! │  - list_apis()                           │
//! │  - fetch_description(api)                │
//! │  - describe_api(api)                     │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!     (GET /apis)        (RestDescription)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       DiscoveryClient                    │
//! │  - reqwest against discovery base URL    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The resolver is constructed explicitly by whoever bootstraps the bridge and
//! injected where it is needed; nothing here is process-global.

use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

mod discovery;

pub use discovery::{DiscoveryClient, DEFAULT_DISCOVERY_URL};


/// Name + version pair identifying one remote API surface.
///
/// Encoded as `"name:version"` (e.g. `"drive:v3"`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ApiIdentifier {
    pub name: String,
    pub version: String,
}

impl ApiIdentifier {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Encode as `name:version`. Round-trips through [`decode`](Self::decode)
    /// whenever `name` contains no colon.
    pub fn encode(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }

    /// Decode a `name:version` string.
    ///
    /// Splits at the first colon; either half may be empty. A string
    /// without a colon is invalid.
    pub fn decode(encoded: &str) -> Result<Self> {
        encoded
            .split_once(':')
            .map(|(name, version)| Self::new(name, version))
            .ok_or_else(|| BridgeError::InvalidApiIdentifier(encoded.to_string()))
    }
}

impl fmt::Display for ApiIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

impl FromStr for ApiIdentifier {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

impl Serialize for ApiIdentifier {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for ApiIdentifier {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::decode(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Flattened callable surface of one API.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationCatalog {
    /// Dotted operation paths, sorted lexicographically.
    pub operations: Vec<String>,
    /// OAuth2 scope URIs in the order the description declares them.
    pub scopes: Vec<String>,
}

impl OperationCatalog {
    /// Flatten a discovery document.
    pub fn from_description(description: &RestDescription) -> Self {
        let mut operations = Vec::new();
        collect_operations(&description.root, "", &mut operations);
        operations.sort();

        let scopes = description
            .auth
            .as_ref()
            .and_then(|auth| auth.oauth2.as_ref())
            .map(|oauth2| oauth2.scopes.keys().cloned().collect())
            .unwrap_or_default();

        Self { operations, scopes }
    }
}

/// Depth-first walk emitting `prefix + method` for every leaf.
fn collect_operations(node: &ResourceDescription, prefix: &str, out: &mut Vec<String>) {
    for method in node.methods.keys() {
        out.push(format!("{}{}", prefix, method));
    }
    for (name, child) in &node.resources {
        collect_operations(child, &format!("{}{}.", prefix, name), out);
    }
}

/// Discovery document for one API (the subset the bridge uses).
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestDescription {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Root URL of the service, e.g. `https://www.googleapis.com/`
    #[serde(default)]
    pub root_url: String,
    /// Path appended to `root_url`, e.g. `drive/v3/`
    #[serde(default)]
    pub service_path: String,
    #[serde(default)]
    pub auth: Option<AuthDescription>,
    /// Top-level `methods` and `resources`
    #[serde(flatten)]
    pub root: ResourceDescription,
}

impl RestDescription {
    /// Base URL that method paths are relative to.
    pub fn base_url(&self) -> String {
        format!("{}{}", self.root_url, self.service_path)
    }
}

/// `auth` section of a discovery document.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AuthDescription {
    #[serde(default)]
    pub oauth2: Option<OAuth2Description>,
}

/// `auth.oauth2` section; scope keys keep their declared order.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct OAuth2Description {
    #[serde(default)]
    pub scopes: serde_json::Map<String, serde_json::Value>,
}

/// A node of the resource tree.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ResourceDescription {
    #[serde(default)]
    pub methods: BTreeMap<String, MethodDescription>,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceDescription>,
}

/// A leaf operation.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDescription {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_http_method")]
    pub http_method: String,
    /// Path template relative to the service base URL, e.g. `files/{fileId}`
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterDescription>,
}

fn default_http_method() -> String {
    "GET".to_string()
}

/// One declared method parameter.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ParameterDescription {
    /// `path` or `query`
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub repeated: bool,
}

/// Source of API listings and descriptions.
///
/// Queried at configuration time (editor lookups, node setup), never on the
/// per-invocation path.
#[async_trait]
pub trait CatalogResolver: Send + Sync {
    /// Every available API as an encoded `name:version`, sorted.
    async fn list_apis(&self) -> Result<Vec<String>>;

    /// Full discovery document for one API.
    async fn fetch_description(&self, api: &ApiIdentifier) -> Result<RestDescription>;

    /// Flattened operations and scopes for one API.
    async fn describe_api(&self, api: &ApiIdentifier) -> Result<OperationCatalog> {
        let description = self.fetch_description(api).await?;
        Ok(OperationCatalog::from_description(&description))
    }
}
