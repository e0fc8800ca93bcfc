//! Access rule CRUD and credential checks.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{PressroomError, Result};
use crate::types::{normalize_email, AccessMode, AccessRule, RuleId};

/// Rule operations over one database connection
pub struct RuleStore<'a> {
    conn: &'a Connection,
}

/// Input for creating or updating a rule
#[derive(Debug, Clone, Default)]
pub struct UpsertRule {
    pub access_mode: AccessMode,
    pub description: Option<String>,
    /// Plaintext password; hashed before storage. Required for password mode.
    pub password: Option<String>,
    /// Replaces the allowlist. Required non-empty for email-list mode.
    pub allowed_emails: Vec<String>,
}

/// Partial update applied by the admin surface
#[derive(Debug, Clone, Default)]
pub struct RulePatch {
    pub access_mode: Option<AccessMode>,
    pub description: Option<String>,
    pub password: Option<String>,
    pub allowed_emails: Option<Vec<String>>,
}

impl<'a> RuleStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Fetch one rule with its allowlist
    pub fn get_rule(&self, content_type: &str, slug: &str) -> Result<Option<AccessRule>> {
        let rule = self
            .conn
            .query_row(
                "SELECT id, content_type, slug, access_mode, description, password_hash, created_at, updated_at
                 FROM access_rules WHERE content_type = ?1 AND slug = ?2",
                params![content_type, slug],
                Self::row_to_rule,
            )
            .optional()?;

        match rule {
            Some(mut rule) => {
                rule.allowed_emails = self.list_emails(rule.id)?;
                Ok(Some(rule))
            }
            None => Ok(None),
        }
    }

    /// Bulk-read every rule into a `(type, slug)` keyed map. One consistent
    /// snapshot per sync run; classification never re-reads mid-run.
    pub fn snapshot_rules(&self) -> Result<HashMap<(String, String), AccessRule>> {
        let rules = self.list_rules(None, None)?;
        Ok(rules
            .into_iter()
            .map(|r| ((r.content_type.clone(), r.slug.clone()), r))
            .collect())
    }

    /// List rules, optionally filtered by content type and/or mode
    pub fn list_rules(
        &self,
        content_type: Option<&str>,
        mode: Option<AccessMode>,
    ) -> Result<Vec<AccessRule>> {
        let mut sql = String::from(
            "SELECT id, content_type, slug, access_mode, description, password_hash, created_at, updated_at
             FROM access_rules WHERE 1=1",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ct) = content_type {
            sql.push_str(" AND content_type = ?");
            params_vec.push(Box::new(ct.to_string()));
        }
        if let Some(mode) = mode {
            sql.push_str(" AND access_mode = ?");
            params_vec.push(Box::new(mode.to_string()));
        }
        sql.push_str(" ORDER BY content_type, slug");

        let params_ref: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|b| b.as_ref()).collect();
        let mut stmt = self.conn.prepare(&sql)?;

        let mut rules = stmt
            .query_map(params_ref.as_slice(), Self::row_to_rule)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for rule in &mut rules {
            if rule.access_mode == AccessMode::EmailList {
                rule.allowed_emails = self.list_emails(rule.id)?;
            }
        }
        Ok(rules)
    }

    /// Create or update the rule for `(type, slug)`.
    ///
    /// Sets `password_hash` iff the mode is password and replaces the
    /// allowlist iff the mode is email-list; artifacts of a previous mode
    /// are cleared.
    pub fn upsert_rule(
        &self,
        content_type: &str,
        slug: &str,
        input: &UpsertRule,
    ) -> Result<AccessRule> {
        if content_type.is_empty() || slug.is_empty() {
            return Err(PressroomError::InvalidInput(
                "type and slug are required".to_string(),
            ));
        }

        let password_hash = match input.access_mode {
            AccessMode::Password => {
                let password = input.password.as_deref().ok_or_else(|| {
                    PressroomError::InvalidInput(
                        "password mode requires a password".to_string(),
                    )
                })?;
                Some(hash_password(password))
            }
            _ => None,
        };

        if input.access_mode == AccessMode::EmailList && input.allowed_emails.is_empty() {
            return Err(PressroomError::InvalidInput(
                "email-list mode requires at least one email".to_string(),
            ));
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO access_rules (content_type, slug, access_mode, description, password_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(content_type, slug) DO UPDATE SET
                access_mode = excluded.access_mode,
                description = excluded.description,
                password_hash = excluded.password_hash,
                updated_at = excluded.updated_at",
            params![
                content_type,
                slug,
                input.access_mode.to_string(),
                input.description,
                password_hash,
                now,
            ],
        )?;

        let rule_id: RuleId = self.conn.query_row(
            "SELECT id FROM access_rules WHERE content_type = ?1 AND slug = ?2",
            params![content_type, slug],
            |row| row.get(0),
        )?;

        self.conn.execute(
            "DELETE FROM email_allowlist WHERE rule_id = ?1",
            params![rule_id],
        )?;
        if input.access_mode == AccessMode::EmailList {
            for email in &input.allowed_emails {
                self.add_email(rule_id, email)?;
            }
        }

        self.get_rule(content_type, slug)?
            .ok_or_else(|| PressroomError::Internal("rule vanished after upsert".to_string()))
    }

    /// Apply a partial update to an existing rule. `None` means the rule
    /// does not exist. Unset patch fields keep their current values; a
    /// password-mode rule keeps its stored hash unless a new password is
    /// supplied.
    pub fn update_rule(
        &self,
        content_type: &str,
        slug: &str,
        patch: &RulePatch,
    ) -> Result<Option<AccessRule>> {
        let Some(existing) = self.get_rule(content_type, slug)? else {
            return Ok(None);
        };

        let access_mode = patch.access_mode.unwrap_or(existing.access_mode);

        let password_hash = match access_mode {
            AccessMode::Password => match (&patch.password, &existing.password_hash) {
                (Some(password), _) => Some(hash_password(password)),
                (None, Some(hash)) => Some(hash.clone()),
                (None, None) => {
                    return Err(PressroomError::InvalidInput(
                        "password mode requires a password".to_string(),
                    ))
                }
            },
            _ => None,
        };

        let description = patch
            .description
            .clone()
            .or_else(|| existing.description.clone());

        self.conn.execute(
            "UPDATE access_rules
             SET access_mode = ?3, description = ?4, password_hash = ?5, updated_at = ?6
             WHERE content_type = ?1 AND slug = ?2",
            params![
                content_type,
                slug,
                access_mode.to_string(),
                description,
                password_hash,
                Utc::now().to_rfc3339(),
            ],
        )?;

        match access_mode {
            AccessMode::EmailList => {
                if let Some(emails) = &patch.allowed_emails {
                    if emails.is_empty() {
                        return Err(PressroomError::InvalidInput(
                            "email-list mode requires at least one email".to_string(),
                        ));
                    }
                    self.conn.execute(
                        "DELETE FROM email_allowlist WHERE rule_id = ?1",
                        params![existing.id],
                    )?;
                    for email in emails {
                        self.add_email(existing.id, email)?;
                    }
                }
            }
            _ => {
                self.conn.execute(
                    "DELETE FROM email_allowlist WHERE rule_id = ?1",
                    params![existing.id],
                )?;
            }
        }

        self.get_rule(content_type, slug)
    }

    /// Delete a rule; allowlist rows cascade. Returns whether a row existed.
    pub fn delete_rule(&self, content_type: &str, slug: &str) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM access_rules WHERE content_type = ?1 AND slug = ?2",
            params![content_type, slug],
        )?;
        Ok(deleted > 0)
    }

    /// Add one email to a rule's allowlist (normalized)
    pub fn add_email(&self, rule_id: RuleId, email: &str) -> Result<()> {
        let normalized = normalize_email(email);
        if normalized.is_empty() || !normalized.contains('@') {
            return Err(PressroomError::InvalidInput(format!(
                "invalid email: {}",
                email
            )));
        }
        self.conn.execute(
            "INSERT OR IGNORE INTO email_allowlist (rule_id, email) VALUES (?1, ?2)",
            params![rule_id, normalized],
        )?;
        Ok(())
    }

    /// Remove one email from a rule's allowlist. Returns whether it existed.
    pub fn remove_email(&self, rule_id: RuleId, email: &str) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM email_allowlist WHERE rule_id = ?1 AND email = ?2",
            params![rule_id, normalize_email(email)],
        )?;
        Ok(deleted > 0)
    }

    /// List a rule's allowlist
    pub fn list_emails(&self, rule_id: RuleId) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT email FROM email_allowlist WHERE rule_id = ?1 ORDER BY email")?;
        let emails = stmt
            .query_map(params![rule_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(emails)
    }

    /// Case-insensitive, trimmed allowlist membership check
    pub fn is_email_allowed(&self, rule_id: RuleId, email: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM email_allowlist WHERE rule_id = ?1 AND email = ?2",
            params![rule_id, normalize_email(email)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn row_to_rule(row: &rusqlite::Row<'_>) -> rusqlite::Result<AccessRule> {
        let mode_str: String = row.get("access_mode")?;
        let created_str: String = row.get("created_at")?;
        let updated_str: String = row.get("updated_at")?;

        Ok(AccessRule {
            id: row.get("id")?,
            content_type: row.get("content_type")?,
            slug: row.get("slug")?,
            access_mode: mode_str.parse().unwrap_or(AccessMode::Open),
            description: row.get("description")?,
            password_hash: row.get("password_hash")?,
            allowed_emails: Vec::new(),
            created_at: parse_ts(&created_str),
            updated_at: parse_ts(&updated_str),
        })
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// SHA-256 digest of a password, hex encoded
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare a plaintext password against a stored digest in constant time
pub fn verify_password(plain: &str, stored_hash: &str) -> bool {
    let computed = hash_password(plain);
    computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}
