use anyhow::{Context, Result};
use catalog_bridge::api::{create_admin_router, AdminAppState};
use catalog_bridge::catalog::{CatalogResolver, DiscoveryClient};
use catalog_bridge::config::{load_config, ENCRYPTION_KEY_VAR};
use catalog_bridge::connection::ConnectionRegistry;
use catalog_bridge::credentials::TokenStore;
use catalog_bridge::oauth::{OAuthFlowController, TokenEndpoint};
use catalog_bridge::provider::ProviderContext;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catalog_bridge=info".into()),
        )
        .init();

    info!("Catalog bridge starting...");

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("BRIDGE_CONFIG").ok())
        .unwrap_or_else(|| "bridge.toml".to_string());
    let mut config = load_config(&config_path)?;
    config.apply_env();

    let encryption_key = std::env::var(ENCRYPTION_KEY_VAR).with_context(|| {
        format!("{} is required (base64-encoded 32-byte key)", ENCRYPTION_KEY_VAR)
    })?;

    info!(
        config = %config_path,
        bind = %config.server.bind,
        admin_prefix = %config.server.admin_prefix,
        discovery_url = %config.discovery.base_url,
        token_db = %config.storage.database,
        admin_auth = config.server.admin_token.is_some(),
        "Configuration loaded"
    );

    let token_store = Arc::new(
        TokenStore::new(&config.storage.database, &encryption_key)
            .context("Failed to initialize token store")?,
    );
    info!("Token store initialized");

    let context = Arc::new(ProviderContext {
        token_endpoint: Arc::new(TokenEndpoint::new(config.oauth.token_url.clone())),
        auth_url: config.oauth.auth_url.clone(),
        redirect_path: config.redirect_path(),
        token_store,
    });
    let registry = Arc::new(ConnectionRegistry::new(context));

    for connection in config.connections.drain(..) {
        let id = connection.id.clone();
        if let Err(e) = registry.save(connection) {
            warn!(connection = %id, error = %e, "Skipping invalid connection");
        }
    }
    info!(connections = registry.len(), "Connections registered");

    for id in registry
        .orphaned_tokens()
        .context("Failed to list stored token state")?
    {
        warn!(
            connection = %id,
            "Stored token state has no configured connection; DELETE it via the admin API to purge"
        );
    }

    let resolver: Arc<dyn CatalogResolver> =
        Arc::new(DiscoveryClient::with_base_url(config.discovery.base_url.clone()));

    let state = AdminAppState {
        resolver,
        registry: Arc::clone(&registry),
        oauth: OAuthFlowController::new(Arc::clone(&registry)),
        admin_token: config.server.admin_token.as_deref().map(Arc::from),
        callback_path: config.oauth.callback_path.clone(),
    };
    let router = create_admin_router(state, &config.server.admin_prefix);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(bind = %config.server.bind, "Admin API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "Admin API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    info!("Catalog bridge stopped");

    Ok(())
}
