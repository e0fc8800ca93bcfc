//! Access-grant session tokens.
//!
//! A successful verification issues a random token shown once; only its
//! SHA-256 digest is stored. Tokens are scoped to one `(type, slug)`.

use chrono::{DateTime, Utc};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::Result;

/// Session token operations over one database connection
pub struct SessionManager<'a> {
    conn: &'a Connection,
}

impl<'a> SessionManager<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Issue a token for one item; the raw value is returned exactly once
    pub fn issue_token(&self, content_type: &str, slug: &str, ttl_hours: i64) -> Result<String> {
        let raw = generate_token();
        let expires_at = Utc::now() + chrono::Duration::hours(ttl_hours);

        self.conn.execute(
            "INSERT INTO sessions (id, content_type, slug, token_hash, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                Uuid::new_v4().to_string(),
                content_type,
                slug,
                hash_token(&raw),
                Utc::now().to_rfc3339(),
                expires_at.to_rfc3339(),
            ],
        )?;

        Ok(raw)
    }

    /// Validate a raw token for one item, honoring expiry
    pub fn validate_token(&self, raw: &str, content_type: &str, slug: &str) -> Result<bool> {
        let expires: Option<String> = self
            .conn
            .query_row(
                "SELECT expires_at FROM sessions
                 WHERE token_hash = ?1 AND content_type = ?2 AND slug = ?3",
                params![hash_token(raw), content_type, slug],
                |row| row.get(0),
            )
            .optional()?;

        match expires {
            Some(s) => {
                let expires_at = DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now());
                Ok(Utc::now() < expires_at)
            }
            None => Ok(false),
        }
    }

    /// Drop expired sessions; returns how many were removed
    pub fn purge_expired(&self) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM sessions WHERE expires_at < ?1",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(removed)
    }
}

/// `prs_` prefix + 64 hex chars
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
    format!("prs_{}", hex::encode(bytes))
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
