//! Remote call transport.

use crate::error::{BridgeError, Result};
use crate::provider::Authorization;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// One fully built remote API request.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteRequest {
    pub method: String,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub authorization: Authorization,
}

/// Executes remote API requests.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Perform the request and return the decoded response body.
    ///
    /// Non-success responses are [`BridgeError::RemoteOperationFailure`].
    async fn execute(&self, request: RemoteRequest) -> Result<Value>;
}

/// [`RemoteTransport`] over HTTP.
#[derive(Clone, Default)]
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn execute(&self, request: RemoteRequest) -> Result<Value> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|_| {
            BridgeError::remote(format!("invalid HTTP method '{}'", request.method))
        })?;

        let mut query = request.query;
        let mut builder = self.http_client.request(method, &request.url);
        match request.authorization {
            Authorization::Bearer(token) => builder = builder.bearer_auth(token),
            Authorization::ApiKey(key) => query.push(("key".to_string(), key)),
            Authorization::Anonymous => {}
        }
        builder = builder.query(&query).header("Accept", "application/json");
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(url = %request.url, error = %e, "Remote request failed to send");
            BridgeError::remote(e.to_string())
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BridgeError::remote(format!("failed to read response: {}", e)))?;
        debug!(url = %request.url, status = %status, "Remote request completed");

        if !status.is_success() {
            return Err(BridgeError::RemoteOperationFailure {
                body: error_body(status.as_u16(), &text),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

/// Error body for a failed call.
///
/// The usual `{"error": {...}}` envelope is unwrapped; anything unparsable
/// becomes `{"code": status}`.
fn error_body(status: u16, text: &str) -> Value {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(mut map)) => match map.remove("error") {
            Some(inner @ Value::Object(_)) => inner,
            Some(other) => {
                map.insert("error".to_string(), other);
                Value::Object(map)
            }
            None => Value::Object(map),
        },
        _ => json!({ "code": status }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn request(url: String, authorization: Authorization) -> RemoteRequest {
        RemoteRequest {
            method: "GET".to_string(),
            url,
            query: vec![("q".to_string(), "test".to_string())],
            body: None,
            authorization,
        }
    }

    #[test]
    fn test_error_body() {
        assert_eq!(
            error_body(403, r#"{"error": {"code": 403, "message": "forbidden"}}"#),
            json!({"code": 403, "message": "forbidden"})
        );
        assert_eq!(
            error_body(400, r#"{"error": "invalid_request"}"#),
            json!({"error": "invalid_request"})
        );
        assert_eq!(error_body(502, "<html>bad gateway</html>"), json!({"code": 502}));
    }

    #[tokio::test]
    async fn test_bearer_request() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/drive/v3/files")
            .match_header("authorization", "Bearer ya29.token")
            .match_query(Matcher::UrlEncoded("q".into(), "test".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"items": []}"#)
            .create_async()
            .await;

        let transport = HttpTransport::new();
        let result = transport
            .execute(request(
                format!("{}/drive/v3/files", server.url()),
                Authorization::Bearer("ya29.token".to_string()),
            ))
            .await
            .unwrap();

        assert_eq!(result, json!({"items": []}));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_key_goes_in_query() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/files")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "test".into()),
                Matcher::UrlEncoded("key".into(), "AIza-key".into()),
            ]))
            .with_status(204)
            .create_async()
            .await;

        let result = HttpTransport::new()
            .execute(request(
                format!("{}/files", server.url()),
                Authorization::ApiKey("AIza-key".to_string()),
            ))
            .await
            .unwrap();

        assert_eq!(result, Value::Null);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failure_carries_remote_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/files")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body(r#"{"error": {"code": 403, "message": "insufficient scopes"}}"#)
            .create_async()
            .await;

        let err = HttpTransport::new()
            .execute(request(format!("{}/files", server.url()), Authorization::Anonymous))
            .await
            .unwrap_err();

        match err {
            BridgeError::RemoteOperationFailure { body } => assert_eq!(body["code"], 403),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
