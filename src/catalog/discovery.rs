//! HTTP client for the remote discovery service.

use super::{ApiIdentifier, CatalogResolver, RestDescription};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

/// Default public discovery endpoint.
pub const DEFAULT_DISCOVERY_URL: &str = "https://www.googleapis.com/discovery/v1";

/// `GET /apis` response
#[derive(Deserialize, Debug)]
struct DirectoryList {
    #[serde(default)]
    items: Vec<DirectoryItem>,
}

#[derive(Deserialize, Debug)]
struct DirectoryItem {
    name: String,
    version: String,
}

/// Catalog resolver backed by a discovery service.
#[derive(Clone)]
pub struct DiscoveryClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl DiscoveryClient {
    /// Create a client using the default discovery base URL.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_DISCOVERY_URL.to_string())
    }

    /// Create a client with a custom base URL (for testing with a mock server).
    pub fn with_base_url(base_url: String) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for DiscoveryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogResolver for DiscoveryClient {
    async fn list_apis(&self) -> Result<Vec<String>> {
        let url = format!("{}/apis", self.base_url);
        debug!(url = %url, "Listing APIs");

        let response = self
            .http_client
            .get(&url)
            .query(&[("fields", "items(name,version)")])
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Discovery service unreachable");
                BridgeError::DiscoveryUnavailable(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(BridgeError::DiscoveryUnavailable(format!(
                "directory listing returned {}",
                response.status()
            )));
        }

        let list: DirectoryList = response
            .json()
            .await
            .map_err(|e| BridgeError::DiscoveryUnavailable(format!("invalid directory listing: {}", e)))?;

        let mut apis: Vec<String> = list
            .items
            .into_iter()
            .map(|item| ApiIdentifier::new(item.name, item.version).encode())
            .collect();
        apis.sort();

        Ok(apis)
    }

    async fn fetch_description(&self, api: &ApiIdentifier) -> Result<RestDescription> {
        let url = format!(
            "{}/apis/{}/{}/rest",
            self.base_url,
            urlencoding::encode(&api.name),
            urlencoding::encode(&api.version)
        );
        debug!(api = %api, url = %url, "Fetching discovery document");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| BridgeError::DiscoveryUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body = serde_json::from_str(&text)
                .unwrap_or_else(|_| serde_json::json!({ "code": status.as_u16(), "message": text }));
            warn!(api = %api, status = %status, "Discovery document lookup failed");
            return Err(BridgeError::UnknownApi {
                api: api.encode(),
                body,
            });
        }

        response
            .json::<RestDescription>()
            .await
            .map_err(|e| BridgeError::DiscoveryUnavailable(format!("invalid discovery document: {}", e)))
    }
}
