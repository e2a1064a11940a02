use crate::catalog::DEFAULT_DISCOVERY_URL;
use crate::connection::ConnectionConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Environment variable holding the base64 token-store key
pub const ENCRYPTION_KEY_VAR: &str = "BRIDGE_ENCRYPTION_KEY";

/// Complete bridge configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Connections registered at start-up
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Prefix every admin route is nested under
    #[serde(default = "default_admin_prefix")]
    pub admin_prefix: String,
    /// Bearer token for the admin routes. None = open (dev mode)
    #[serde(default)]
    pub admin_token: Option<String>,
}

fn default_bind() -> String {
    "0.0.0.0:1880".to_string()
}

fn default_admin_prefix() -> String {
    "/google".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            admin_prefix: default_admin_prefix(),
            admin_token: None,
        }
    }
}

/// Discovery service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_discovery_url")]
    pub base_url: String,
}

fn default_discovery_url() -> String {
    DEFAULT_DISCOVERY_URL.to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            base_url: default_discovery_url(),
        }
    }
}

/// OAuth2 provider endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Callback route, relative to the admin prefix
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
}

fn default_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_callback_path() -> String {
    "/oauth2callback".to_string()
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            callback_path: default_callback_path(),
        }
    }
}

/// Token store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_database() -> String {
    "tokens.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
        }
    }
}

impl BridgeConfig {
    /// Apply `BRIDGE_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("BRIDGE_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = var("BRIDGE_ADMIN_PREFIX") {
            self.server.admin_prefix = v;
        }
        if let Some(v) = var("BRIDGE_ADMIN_TOKEN") {
            self.server.admin_token = Some(v).filter(|token| !token.is_empty());
        }
        if let Some(v) = var("BRIDGE_DISCOVERY_URL") {
            self.discovery.base_url = v;
        }
        if let Some(v) = var("BRIDGE_TOKEN_DB") {
            self.storage.database = v;
        }
    }

    /// Path the provider redirects back to, relative to a connection's
    /// callback root.
    pub fn redirect_path(&self) -> String {
        format!(
            "/{}/{}",
            self.server.admin_prefix.trim_matches('/'),
            self.oauth.callback_path.trim_matches('/')
        )
        .replace("//", "/")
    }
}

/// Load configuration from a TOML file. A missing file yields defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<BridgeConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(BridgeConfig::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: BridgeConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}
