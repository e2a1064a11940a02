use super::*;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

const PRIVATE_KEY: &str = include_str!("../../tests/fixtures/service_account_key.pem");

fn context(token_url: &str) -> Arc<ProviderContext> {
    let store = TokenStore::new(":memory:", &BASE64.encode([1u8; 32])).unwrap();
    Arc::new(ProviderContext {
        token_endpoint: Arc::new(TokenEndpoint::new(token_url)),
        auth_url: "https://accounts.example.com/o/oauth2/v2/auth".to_string(),
        redirect_path: "/google/oauth2callback".to_string(),
        token_store: Arc::new(store),
    })
}

fn service_config() -> ConnectionConfig {
    ConnectionConfig {
        id: "svc".to_string(),
        auth_type: "service".to_string(),
        scopes: "https://www.googleapis.com/auth/drive\nhttps://www.googleapis.com/auth/calendar"
            .to_string(),
        service_key: Some(
            serde_json::json!({
                "client_email": "robot@project.iam.gserviceaccount.com",
                "private_key": PRIVATE_KEY,
            })
            .to_string(),
        ),
        ..Default::default()
    }
}

fn oauth2_config() -> ConnectionConfig {
    ConnectionConfig {
        id: "drive".to_string(),
        auth_type: "oauth2".to_string(),
        scopes: "https://www.googleapis.com/auth/drive".to_string(),
        oauth2_client_id: Some("cid".to_string()),
        oauth2_client_secret: Some("secret".to_string()),
        oauth2_callback_url: Some("http://localhost:1880/".to_string()),
        ..Default::default()
    }
}

fn provider(config: ConnectionConfig, context: Arc<ProviderContext>) -> CredentialProvider {
    CredentialProvider::new(Arc::new(config), context)
}

#[test]
fn test_auth_type_parse() {
    assert_eq!(AuthType::parse("service"), Some(AuthType::Service));
    assert_eq!(AuthType::parse("oauth2"), Some(AuthType::OAuth2));
    assert_eq!(AuthType::parse("api"), Some(AuthType::Api));
    assert_eq!(AuthType::parse("OAuth2"), None);
    assert_eq!(AuthType::OAuth2.to_string(), "oauth2");
}

#[test]
fn test_authorization_debug_hides_secrets() {
    let debug = format!("{:?}", Authorization::Bearer("ya29.secret".to_string()));
    assert!(!debug.contains("ya29"));
}

#[tokio::test]
async fn test_service_credential_is_cached() {
    let provider = provider(service_config(), context("http://127.0.0.1:9/token"));
    assert_eq!(provider.state(), ProviderState::Uninitialized);

    let first = provider.service_account().await.unwrap();
    let second = provider.service_account().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(provider.state(), ProviderState::Ready);

    let via_get_auth = provider.get_auth().await.unwrap();
    assert_eq!(via_get_auth.kind(), AuthType::Service);
    assert_eq!(first.scopes().len(), 2);
}

#[tokio::test]
async fn test_get_auth_returns_same_instance() {
    let provider = provider(service_config(), context("http://127.0.0.1:9/token"));

    let first = provider.get_auth().await.unwrap();
    let second = provider.get_auth().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_concurrent_first_use_constructs_once() {
    let provider = Arc::new(provider(oauth2_config(), context("http://127.0.0.1:9/token")));

    let calls = (0..8).map(|_| {
        let provider = Arc::clone(&provider);
        async move { provider.oauth2_client().await.unwrap() }
    });
    let credentials = futures::future::join_all(calls).await;

    assert!(credentials
        .windows(2)
        .all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}

#[tokio::test]
async fn test_unknown_auth_type_is_configuration_error() {
    let config = ConnectionConfig {
        auth_type: "kerberos".to_string(),
        ..service_config()
    };
    let provider = provider(config, context("http://127.0.0.1:9/token"));

    assert!(matches!(
        provider.get_auth().await,
        Err(BridgeError::Configuration(_))
    ));
    assert_eq!(provider.state(), ProviderState::Uninitialized);
}

#[tokio::test]
async fn test_service_without_key_is_configuration_error() {
    let config = ConnectionConfig {
        service_key: None,
        ..service_config()
    };
    let provider = provider(config, context("http://127.0.0.1:9/token"));

    assert!(matches!(
        provider.get_auth().await,
        Err(BridgeError::Configuration(_))
    ));
}

#[tokio::test]
async fn test_oauth2_seeded_from_store() {
    let context = context("http://127.0.0.1:9/token");
    context
        .token_store
        .persist_refresh_token("drive", "R-persisted")
        .unwrap();

    let provider = provider(oauth2_config(), Arc::clone(&context));
    let credential = provider.oauth2_client().await.unwrap();

    assert_eq!(
        credential.credentials().refresh_token.as_deref(),
        Some("R-persisted")
    );
    assert_eq!(
        credential.client().redirect_uri,
        "http://localhost:1880/google/oauth2callback"
    );
}

#[tokio::test]
async fn test_oauth2_unseeded_is_valid() {
    let provider = provider(oauth2_config(), context("http://127.0.0.1:9/token"));
    let credential = provider.oauth2_client().await.unwrap();

    assert_eq!(credential.credentials(), TokenSet::default());
    assert!(matches!(
        credential.authorize().await,
        Err(BridgeError::AuthorizationFailure(_))
    ));
}

#[tokio::test]
async fn test_rotation_observer_persists_refresh_token() {
    let context = context("http://127.0.0.1:9/token");
    let provider = provider(oauth2_config(), Arc::clone(&context));
    let credential = provider.oauth2_client().await.unwrap();

    credential.notify(&TokenSet {
        access_token: Some("A1".to_string()),
        refresh_token: Some("R2".to_string()),
        expires_at: None,
    });
    assert_eq!(
        context.token_store.refresh_token("drive").unwrap().as_deref(),
        Some("R2")
    );

    // A token set without a refresh token leaves the stored one in place
    credential.notify(&TokenSet {
        access_token: Some("A2".to_string()),
        refresh_token: None,
        expires_at: None,
    });
    assert_eq!(
        context.token_store.refresh_token("drive").unwrap().as_deref(),
        Some("R2")
    );
}

#[tokio::test]
async fn test_api_key_credential() {
    let config = ConnectionConfig {
        id: "maps".to_string(),
        auth_type: "api".to_string(),
        api_key: Some("AIza-key".to_string()),
        ..Default::default()
    };
    let provider = provider(config, context("http://127.0.0.1:9/token"));

    let credential = provider.get_auth().await.unwrap();
    assert_eq!(credential.kind(), AuthType::Api);
    assert_eq!(
        credential.authorize().await.unwrap(),
        Authorization::ApiKey("AIza-key".to_string())
    );

    let keyless = ApiKeyCredential::new("");
    assert_eq!(keyless.authorize().await.unwrap(), Authorization::Anonymous);
}
