//! Operation dispatch.
//!
//! An [`OperationNode`] is one configured flow stage: a connection, an API
//! and a dotted operation path. For every inbound message it
//!
//! 1. publishes `pending` (synchronously, before any I/O)
//! 2. obtains the connection's credential
//! 3. builds a [`ServiceClient`] for the API
//! 4. resolves the operation path
//! 5. invokes it with the message payload
//! 6. publishes `success` and forwards the result, or publishes `error` and
//!    reports the failure against the inbound message
//!
//! Failures never escape the invocation task.

mod client;
mod message;
mod transport;

pub use client::{OperationDescriptor, ServiceClient};
pub use message::{FlowMessage, NodeContext, Status, MESSAGE_ID_FIELD};
pub use transport::{HttpTransport, RemoteRequest, RemoteTransport};

use crate::catalog::{ApiIdentifier, CatalogResolver, RestDescription};
use crate::connection::ConnectionRegistry;
use crate::error::Result;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};


/// Discovery documents fetched at configuration time, keyed by API.
pub struct ApiSurfaces {
    resolver: Arc<dyn CatalogResolver>,
    descriptions: DashMap<ApiIdentifier, Arc<RestDescription>>,
}

impl ApiSurfaces {
    pub fn new(resolver: Arc<dyn CatalogResolver>) -> Self {
        Self {
            resolver,
            descriptions: DashMap::new(),
        }
    }

    /// Description for `api`, fetched on first request.
    pub async fn load(&self, api: &ApiIdentifier) -> Result<Arc<RestDescription>> {
        if let Some(description) = self.descriptions.get(api) {
            return Ok(Arc::clone(description.value()));
        }

        let description = Arc::new(self.resolver.fetch_description(api).await?);
        debug!(api = %api, "Cached discovery document");
        Ok(Arc::clone(
            self.descriptions
                .entry(api.clone())
                .or_insert(description)
                .value(),
        ))
    }
}

/// Configuration of one dispatching node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Connection id
    pub connection: String,
    pub api: ApiIdentifier,
    /// Dotted operation path, e.g. `files.list`
    pub operation: String,
}

/// A configured dispatching flow stage.
pub struct OperationNode {
    config: NodeConfig,
    description: Arc<RestDescription>,
    registry: Arc<ConnectionRegistry>,
    transport: Arc<dyn RemoteTransport>,
    context: Arc<dyn NodeContext>,
}

impl OperationNode {
    /// Set up a node, fetching its API description once.
    pub async fn configure(
        config: NodeConfig,
        surfaces: &ApiSurfaces,
        registry: Arc<ConnectionRegistry>,
        transport: Arc<dyn RemoteTransport>,
        context: Arc<dyn NodeContext>,
    ) -> Result<Self> {
        let description = surfaces.load(&config.api).await?;
        Ok(Self::new(config, description, registry, transport, context))
    }

    pub fn new(
        config: NodeConfig,
        description: Arc<RestDescription>,
        registry: Arc<ConnectionRegistry>,
        transport: Arc<dyn RemoteTransport>,
        context: Arc<dyn NodeContext>,
    ) -> Self {
        Self {
            config,
            description,
            registry,
            transport,
            context,
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Handle an inbound message on its own task.
    ///
    /// `pending` is published before this returns.
    pub fn on_input(self: &Arc<Self>, msg: FlowMessage) -> JoinHandle<()> {
        self.context.status(Status::Pending);
        let node = Arc::clone(self);
        tokio::spawn(async move { node.complete(msg).await })
    }

    /// Handle an inbound message on the current task.
    pub async fn dispatch(&self, msg: FlowMessage) {
        self.context.status(Status::Pending);
        self.complete(msg).await;
    }

    async fn complete(&self, msg: FlowMessage) {
        match self.invoke(&msg.payload).await {
            Ok(result) => {
                self.context.status(Status::Success);
                self.context.send(msg.with_payload(result));
            }
            Err(e) => {
                warn!(
                    connection = %self.config.connection,
                    api = %self.config.api,
                    operation = %self.config.operation,
                    msg_id = msg.id().unwrap_or_default(),
                    error = %e,
                    "Operation failed"
                );
                self.context.status(Status::Error);
                self.context.error(&e, &msg);
            }
        }
    }

    async fn invoke(&self, payload: &Value) -> Result<Value> {
        let connection = self.registry.resolve(&self.config.connection)?;
        let credential = connection.credentials().get_auth().await?;

        let client = ServiceClient::new(
            self.config.api.clone(),
            Arc::clone(&self.description),
            credential,
            Arc::clone(&self.transport),
        );
        let operation = client.resolve(&self.config.operation)?;
        client.call(&operation, payload).await
    }
}
