//! Bridge between a flow engine and discovery-described REST APIs.
//!
//! The `catalog-bridge` binary serves only the admin routes
//! ([`api::create_admin_router`]). The flow host embeds dispatch itself:
//! build one [`dispatch::ApiSurfaces`] over a [`catalog::CatalogResolver`],
//! share the [`connection::ConnectionRegistry`] with the admin router, then
//! per node call [`dispatch::OperationNode::configure`] with an
//! [`dispatch::HttpTransport`] and the host's [`dispatch::NodeContext`], and
//! feed inbound messages to [`dispatch::OperationNode::on_input`].

// Error types
pub mod error;

// API discovery and operation catalogs
pub mod catalog;

// Encrypted refresh-token storage
pub mod credentials;

// Credential provider (service account, OAuth2, API key)
pub mod provider;

// OAuth2 authorization-code flow and token endpoint
pub mod oauth;

// Connection configurations and registry
pub mod connection;

// Operation dispatch
pub mod dispatch;

// Admin bearer-token guard
pub mod auth;

// Administrative HTTP endpoints
pub mod api;

// Configuration
pub mod config;

pub use error::{BridgeError, Result};
