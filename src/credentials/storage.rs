//! Encrypted refresh-token storage using SQLite.
//!
//! One row per connection. Survives process restarts when backed by a file.

use super::encryption::{Sealed, TokenCipher};
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Durable OAuth2 token state keyed by connection id.
///
/// # Schema
/// ```sql
/// CREATE TABLE token_state (
///     connection_id TEXT PRIMARY KEY,
///     refresh_token TEXT NOT NULL,        -- Encrypted
///     refresh_token_nonce TEXT NOT NULL,  -- Nonce for refresh_token
///     updated_at TEXT NOT NULL            -- ISO 8601 timestamp
/// );
/// ```
///
/// Absent rows mean "not yet authorized". A stored token is only ever
/// replaced by another token, never cleared by a refresh that omitted one.
pub struct TokenStore {
    conn: Mutex<Connection>,
    cipher: TokenCipher,
}

impl TokenStore {
    /// Creates or opens a token store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`:memory:` for tests)
    /// * `encryption_key` - Base64-encoded 32-byte master key
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let cipher =
            TokenCipher::from_base64_key(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS token_state (
                connection_id TEXT PRIMARY KEY,
                refresh_token TEXT NOT NULL,
                refresh_token_nonce TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create token_state table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            cipher,
        })
    }

    /// Returns the persisted refresh token for a connection, if any.
    pub fn refresh_token(&self, connection_id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT refresh_token, refresh_token_nonce FROM token_state WHERE connection_id = ?1",
                params![connection_id],
                |row| {
                    Ok(Sealed {
                        ciphertext: row.get(0)?,
                        nonce: row.get(1)?,
                    })
                },
            )
            .optional()
            .context("Failed to read token state")?;

        row.map(|sealed| {
            self.cipher
                .open(&sealed)
                .context("Failed to decrypt refresh token")
        })
        .transpose()
    }

    /// Overwrites the persisted refresh token for a connection (upsert).
    pub fn persist_refresh_token(&self, connection_id: &str, refresh_token: &str) -> Result<()> {
        let sealed = self
            .cipher
            .seal(refresh_token)
            .context("Failed to encrypt refresh token")?;
        let now = Utc::now().to_rfc3339();

        self.conn
            .lock()
            .unwrap()
            .execute(
                r#"
                INSERT INTO token_state (connection_id, refresh_token, refresh_token_nonce, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(connection_id) DO UPDATE SET
                    refresh_token = excluded.refresh_token,
                    refresh_token_nonce = excluded.refresh_token_nonce,
                    updated_at = excluded.updated_at
                "#,
                params![connection_id, sealed.ciphertext, sealed.nonce, now],
            )
            .context("Failed to store refresh token")?;

        Ok(())
    }

    /// Removes token state for a deleted connection.
    ///
    /// Returns `true` if a row was removed.
    pub fn delete(&self, connection_id: &str) -> Result<bool> {
        let rows_affected = self
            .conn
            .lock()
            .unwrap()
            .execute(
                "DELETE FROM token_state WHERE connection_id = ?1",
                params![connection_id],
            )
            .context("Failed to delete token state")?;

        Ok(rows_affected > 0)
    }

    /// Lists connection ids that hold a refresh token.
    pub fn list_connections(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT connection_id FROM token_state ORDER BY connection_id")
            .context("Failed to prepare query")?;

        let ids = stmt
            .query_map([], |row| row.get(0))
            .context("Failed to execute query")?
            .collect::<Result<Vec<String>, _>>()
            .context("Failed to read results")?;

        Ok(ids)
    }
}
