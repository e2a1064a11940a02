//! OAuth token endpoint calls.
//!
//! Handles the three grants the bridge uses: authorization code, refresh
//! token and JWT bearer (service accounts).

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Grant type for service account assertions (RFC 7523)
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Token set issued by the token endpoint, or held by a live credential.
///
/// A credential seeded from persisted state only has a refresh token.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TokenSet {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenSet {
    /// Seed state holding only a (possibly absent) refresh token.
    pub fn from_refresh_token(refresh_token: Option<String>) -> Self {
        Self {
            refresh_token,
            ..Self::default()
        }
    }

    /// Returns the access token if present and not within `leeway` of expiry.
    ///
    /// Tokens without an expiry never go stale.
    pub fn fresh_access_token(&self, leeway: Duration) -> Option<&str> {
        let token = self.access_token.as_deref()?;
        match self.expires_at {
            Some(expires_at) if expires_at <= Utc::now() + leeway => None,
            _ => Some(token),
        }
    }

    /// Overlay a newly issued set, keeping the current refresh token when the
    /// issuer did not rotate it.
    pub fn merged_with(&self, issued: &TokenSet) -> TokenSet {
        TokenSet {
            access_token: issued.access_token.clone(),
            refresh_token: issued
                .refresh_token
                .clone()
                .or_else(|| self.refresh_token.clone()),
            expires_at: issued.expires_at,
        }
    }
}

/// OAuth token response (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    #[allow(dead_code)]
    token_type: Option<String>,
}

impl From<TokenResponse> for TokenSet {
    fn from(response: TokenResponse) -> Self {
        TokenSet {
            access_token: Some(response.access_token),
            refresh_token: response.refresh_token,
            expires_at: response
                .expires_in
                .map(|seconds| Utc::now() + Duration::seconds(seconds)),
        }
    }
}

/// Client for one OAuth token endpoint.
#[derive(Clone, Debug)]
pub struct TokenEndpoint {
    http_client: reqwest::Client,
    token_url: String,
}

impl TokenEndpoint {
    pub fn new(token_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            token_url: token_url.into(),
        }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Exchange an authorization code for a token set.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenSet> {
        tracing::debug!("Exchanging authorization code for token at {}", self.token_url);
        self.request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ])
        .await
    }

    /// Obtain a new access token with a refresh token.
    ///
    /// The returned set carries a refresh token only if the provider rotated it.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenSet> {
        tracing::debug!("Refreshing access token at {}", self.token_url);
        self.request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ])
        .await
    }

    /// Exchange a signed JWT assertion for an access token.
    pub async fn jwt_bearer(&self, assertion: &str) -> Result<TokenSet> {
        tracing::debug!("Exchanging JWT assertion at {}", self.token_url);
        self.request(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion)])
            .await
    }

    async fn request(&self, form: &[(&str, &str)]) -> Result<TokenSet> {
        let response = self
            .http_client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .context("Failed to send token request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!("Token request failed with status {}: {}", status, body));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;

        tracing::debug!(
            has_refresh_token = token_response.refresh_token.is_some(),
            expires_in = ?token_response.expires_in,
            "Token request successful"
        );

        Ok(token_response.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[test]
    fn test_token_response_deserialization() {
        let json = r#"{
            "access_token": "ya29.access",
            "refresh_token": "1//refresh",
            "expires_in": 3599,
            "token_type": "Bearer"
        }"#;

        let response: TokenResponse = serde_json::from_str(json).unwrap();
        let tokens = TokenSet::from(response);
        assert_eq!(tokens.access_token.as_deref(), Some("ya29.access"));
        assert_eq!(tokens.refresh_token.as_deref(), Some("1//refresh"));
        assert!(tokens.expires_at.unwrap() > Utc::now());
    }

    #[test]
    fn test_token_response_minimal() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token": "token_12345"}"#).unwrap();
        let tokens = TokenSet::from(response);
        assert_eq!(tokens.refresh_token, None);
        assert_eq!(tokens.expires_at, None);
    }

    #[test]
    fn test_fresh_access_token() {
        let leeway = Duration::seconds(90);
        let mut tokens = TokenSet {
            access_token: Some("a".to_string()),
            refresh_token: None,
            expires_at: Some(Utc::now() + Duration::hours(1)),
        };
        assert_eq!(tokens.fresh_access_token(leeway), Some("a"));

        tokens.expires_at = Some(Utc::now() + Duration::seconds(30));
        assert_eq!(tokens.fresh_access_token(leeway), None);

        tokens.expires_at = None;
        assert_eq!(tokens.fresh_access_token(leeway), Some("a"));

        assert_eq!(TokenSet::from_refresh_token(Some("r".into())).fresh_access_token(leeway), None);
    }

    #[test]
    fn test_merge_keeps_unrotated_refresh_token() {
        let current = TokenSet::from_refresh_token(Some("R1".to_string()));
        let issued = TokenSet {
            access_token: Some("A2".to_string()),
            refresh_token: None,
            expires_at: None,
        };
        let merged = current.merged_with(&issued);
        assert_eq!(merged.access_token.as_deref(), Some("A2"));
        assert_eq!(merged.refresh_token.as_deref(), Some("R1"));

        let rotated = TokenSet {
            refresh_token: Some("R2".to_string()),
            ..issued
        };
        assert_eq!(current.merged_with(&rotated).refresh_token.as_deref(), Some("R2"));
    }

    #[tokio::test]
    async fn test_exchange_code_posts_form() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "4/abc".into()),
                Matcher::UrlEncoded("client_id".into(), "cid".into()),
                Matcher::UrlEncoded("redirect_uri".into(), "http://localhost/cb".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"A1","refresh_token":"R1","expires_in":3600}"#)
            .create_async()
            .await;

        let endpoint = TokenEndpoint::new(format!("{}/token", server.url()));
        let tokens = endpoint
            .exchange_code("4/abc", "http://localhost/cb", "cid", "secret")
            .await
            .unwrap();

        assert_eq!(tokens.access_token.as_deref(), Some("A1"));
        assert_eq!(tokens.refresh_token.as_deref(), Some("R1"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_request_reports_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let endpoint = TokenEndpoint::new(format!("{}/token", server.url()));
        let err = endpoint.refresh("expired", "cid", "secret").await.unwrap_err();
        assert!(err.to_string().contains("400"));
        assert!(err.to_string().contains("invalid_grant"));
    }
}
