//! Durable OAuth2 token state.
//!
//! Persists the refresh token of every OAuth2 connection, encrypted at rest
//! with AES-256-GCM in SQLite.
//!
//! # Usage
//!
//! ```no_run
//! use catalog_bridge::credentials::TokenStore;
//!
//! # fn main() -> anyhow::Result<()> {
//! let encryption_key = std::env::var("BRIDGE_ENCRYPTION_KEY")?;
//! let store = TokenStore::new("tokens.db", &encryption_key)?;
//!
//! store.persist_refresh_token("my-connection", "1//refresh")?;
//! if let Some(token) = store.refresh_token("my-connection")? {
//!     println!("authorized ({} chars)", token.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Writers
//!
//! Only the OAuth2 flow controller (authorization-code exchange) and the
//! credential provider's token-rotation observer write to this store.

mod encryption;
mod storage;

pub use encryption::{Sealed, TokenCipher};
pub use storage::TokenStore;
