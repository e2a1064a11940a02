//! Versioned service client built from a discovery document.

use super::transport::{RemoteRequest, RemoteTransport};
use crate::catalog::{ApiIdentifier, ParameterDescription, ResourceDescription, RestDescription};
use crate::error::{BridgeError, Result};
use crate::provider::{Authorization, Credential};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Payload field carrying the request body
const REQUEST_BODY_FIELD: &str = "requestBody";

/// Legacy body field, used only when no parameter of that name is declared
const RESOURCE_FIELD: &str = "resource";

/// A resolved, invokable operation.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationDescriptor {
    /// Dotted path the operation was resolved from
    pub path: String,
    /// Discovery method id, e.g. `drive.files.list`
    pub id: Option<String>,
    pub http_method: String,
    /// Path template relative to the service base URL
    pub path_template: String,
    pub parameters: BTreeMap<String, ParameterDescription>,
}

impl OperationDescriptor {
    /// Build the unauthenticated request for `payload`.
    ///
    /// Path parameters fill the template, declared query parameters and any
    /// other scalar fields become the query string, and `requestBody`
    /// becomes the JSON body. `resource` is the body only when the method
    /// has no parameter of that name.
    pub fn build_request(&self, base_url: &str, payload: &Value) -> Result<RemoteRequest> {
        let empty = Map::new();
        let params = match payload {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => {
                return Err(BridgeError::remote(format!(
                    "parameters for '{}' must be a JSON object",
                    self.path
                )))
            }
        };

        for (name, param) in &self.parameters {
            if param.required && params.get(name).map_or(true, Value::is_null) {
                return Err(BridgeError::remote(format!(
                    "missing required parameter '{}' for '{}'",
                    name, self.path
                )));
            }
        }

        let (path, used) = expand_template(&self.path_template, params)?;
        let resource_is_body = !self.parameters.contains_key(RESOURCE_FIELD)
            && !used.iter().any(|name| name == RESOURCE_FIELD);

        let mut query = Vec::new();
        for (name, value) in params {
            if used.contains(name)
                || name == REQUEST_BODY_FIELD
                || (resource_is_body && name == RESOURCE_FIELD)
            {
                continue;
            }
            match value {
                Value::Array(items) => {
                    query.extend(items.iter().filter_map(scalar).map(|v| (name.clone(), v)))
                }
                other => {
                    if let Some(v) = scalar(other) {
                        query.push((name.clone(), v));
                    }
                }
            }
        }

        let body = params
            .get(REQUEST_BODY_FIELD)
            .or_else(|| params.get(RESOURCE_FIELD).filter(|_| resource_is_body))
            .cloned();

        Ok(RemoteRequest {
            method: self.http_method.to_uppercase(),
            url: format!("{}{}", base_url, path),
            query,
            body,
            authorization: Authorization::Anonymous,
        })
    }
}

/// Render a scalar as a URL parameter value. Objects and nulls have none.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Expand `{name}` and `{+name}` placeholders (RFC 6570 simple and reserved
/// expansion). Returns the expanded path and the parameter names consumed.
fn expand_template(template: &str, params: &Map<String, Value>) -> Result<(String, Vec<String>)> {
    let mut out = String::with_capacity(template.len());
    let mut used = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let end = rest[start..]
            .find('}')
            .map(|offset| start + offset)
            .ok_or_else(|| BridgeError::remote(format!("malformed path template '{}'", template)))?;

        let expression = &rest[start + 1..end];
        let (reserved, name) = match expression.strip_prefix('+') {
            Some(name) => (true, name),
            None => (false, expression),
        };

        let value = params.get(name).and_then(scalar).ok_or_else(|| {
            BridgeError::remote(format!("missing required path parameter '{}'", name))
        })?;

        if reserved {
            let segments: Vec<String> = value
                .split('/')
                .map(|segment| urlencoding::encode(segment).into_owned())
                .collect();
            out.push_str(&segments.join("/"));
        } else {
            out.push_str(&urlencoding::encode(&value));
        }
        used.push(name.to_string());
        rest = &rest[end + 1..];
    }
    out.push_str(rest);

    Ok((out, used))
}

/// Client for one API version bound to one credential.
pub struct ServiceClient {
    api: ApiIdentifier,
    description: Arc<RestDescription>,
    credential: Arc<dyn Credential>,
    transport: Arc<dyn RemoteTransport>,
}

impl ServiceClient {
    pub fn new(
        api: ApiIdentifier,
        description: Arc<RestDescription>,
        credential: Arc<dyn Credential>,
        transport: Arc<dyn RemoteTransport>,
    ) -> Self {
        Self {
            api,
            description,
            credential,
            transport,
        }
    }

    /// Resolve a dotted operation path.
    ///
    /// Every segment but the last names a resource, the last a method. No
    /// network I/O happens here.
    pub fn resolve(&self, path: &str) -> Result<OperationDescriptor> {
        let unresolved = || BridgeError::UnresolvedOperation(path.to_string());

        let segments: Vec<&str> = path.split('.').collect();
        let (method_name, resource_path) = segments.split_last().ok_or_else(unresolved)?;
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(unresolved());
        }

        let mut node: &ResourceDescription = &self.description.root;
        for segment in resource_path {
            node = node.resources.get(*segment).ok_or_else(unresolved)?;
        }
        let method = node.methods.get(*method_name).ok_or_else(unresolved)?;

        Ok(OperationDescriptor {
            path: path.to_string(),
            id: method.id.clone(),
            http_method: method.http_method.clone(),
            path_template: method.path.clone(),
            parameters: method.parameters.clone(),
        })
    }

    /// Invoke a resolved operation.
    ///
    /// The request is built before authorizing, so malformed parameters fail
    /// without any network I/O.
    pub async fn call(&self, operation: &OperationDescriptor, payload: &Value) -> Result<Value> {
        let mut request = operation.build_request(&self.description.base_url(), payload)?;
        request.authorization = self.credential.authorize().await?;

        debug!(
            api = %self.api,
            operation = %operation.path,
            method = %request.method,
            "Invoking remote operation"
        );
        self.transport.execute(request).await
    }
}
