//! Core types for Pressroom

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for an access rule
pub type RuleId = i64;

/// Content types served by the site, in catalog order
pub const CONTENT_TYPES: &[&str] = &["notes", "ideas", "publications", "pages"];

/// Directory in the source repository holding all content
pub const CONTENT_ROOT: &str = "content";

/// Source file extension for content
pub const CONTENT_EXTENSION: &str = ".md";

/// Reserved public-bucket key holding the aggregate catalog.
/// Never deleted by stale reconciliation.
pub const CATALOG_KEY: &str = "content-metadata.json";

/// Who may read a content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AccessMode {
    /// Publicly readable, no credential required
    #[default]
    Open,
    /// Requires the item's password
    Password,
    /// Requires an email on the item's allowlist
    EmailList,
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessMode::Open => write!(f, "open"),
            AccessMode::Password => write!(f, "password"),
            AccessMode::EmailList => write!(f, "email-list"),
        }
    }
}

impl std::str::FromStr for AccessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(AccessMode::Open),
            "password" => Ok(AccessMode::Password),
            "email-list" => Ok(AccessMode::EmailList),
            _ => Err(format!("Unknown access mode: {}", s)),
        }
    }
}

/// A persisted access rule for one `(type, slug)`.
///
/// Absence of a rule means the item follows the configured default mode.
/// `password_hash` is set iff the mode is `password`; `allowed_emails` is
/// populated iff the mode is `email-list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRule {
    pub id: RuleId,
    #[serde(rename = "type")]
    pub content_type: String,
    pub slug: String,
    pub access_mode: AccessMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Digest of the item password; never serialized to API responses
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub allowed_emails: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Transformer output for one source file, before classification
#[derive(Debug, Clone)]
pub struct Transformed {
    pub content_type: String,
    pub slug: String,
    pub title: String,
    pub date: DateTime<Utc>,
    pub read_time: String,
    pub excerpt: String,
    pub html: String,
    pub raw_body: String,
    pub frontmatter: HashMap<String, serde_json::Value>,
    /// Non-fatal problems hit while parsing (malformed frontmatter etc.)
    pub warnings: Vec<String>,
}

/// One renderable unit of content. Derived fresh on every sync run from
/// source + access rule; identity is `(content_type, slug)`.
#[derive(Debug, Clone)]
pub struct ContentItem {
    pub content_type: String,
    pub slug: String,
    pub title: String,
    pub date: DateTime<Utc>,
    pub read_time: String,
    pub excerpt: String,
    pub html: String,
    pub raw_body: String,
    pub frontmatter: HashMap<String, serde_json::Value>,
    pub is_protected: bool,
    pub access_mode: AccessMode,
}

impl ContentItem {
    /// Combine transformer output with a routing decision
    pub fn classified(t: Transformed, routing: crate::routing::Routing) -> Self {
        Self {
            content_type: t.content_type,
            slug: t.slug,
            title: t.title,
            date: t.date,
            read_time: t.read_time,
            excerpt: t.excerpt,
            html: t.html,
            raw_body: t.raw_body,
            frontmatter: t.frontmatter,
            is_protected: routing.is_protected,
            access_mode: routing.access_mode,
        }
    }

    /// Object key for this item: `{type}/{slug}.html`
    pub fn object_key(&self) -> String {
        format!("{}/{}.html", self.content_type, self.slug)
    }
}

/// One entry of the aggregate public catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub slug: String,
    pub title: String,
    pub date: DateTime<Utc>,
    pub read_time: String,
    pub excerpt: String,
    pub html: String,
}

impl From<&ContentItem> for CatalogEntry {
    fn from(item: &ContentItem) -> Self {
        Self {
            slug: item.slug.clone(),
            title: item.title.clone(),
            date: item.date,
            read_time: item.read_time.clone(),
            excerpt: item.excerpt.clone(),
            html: item.html.clone(),
        }
    }
}

/// Per-item error recorded in a sync report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncError {
    pub path: String,
    pub message: String,
}

/// Detail of one uploaded object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDetail {
    pub key: String,
    pub bucket: String,
    pub size: usize,
}

/// Detail of one deleted object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDetail {
    pub key: String,
    pub bucket: String,
}

/// Ephemeral per-run sync outcome. Created at sync start, filled during the
/// run, returned at the end; persisted only through the build log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub uploaded: Vec<String>,
    pub deleted: Vec<String>,
    pub errors: Vec<SyncError>,
    pub total_processed: usize,
    pub success: bool,
    pub upload_details: Vec<UploadDetail>,
    pub delete_details: Vec<DeleteDetail>,
}

impl SyncReport {
    /// Seal the report: success iff no item-level errors were recorded
    pub fn finish(mut self) -> Self {
        self.success = self.errors.is_empty();
        self
    }
}

/// Engine configuration.
///
/// `default_access` makes the "no rule" policy an explicit, overridable
/// value instead of a constant buried in classification code.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Content types enumerated by a full sync
    pub content_types: Vec<String>,
    /// Mode applied when no access rule exists for an item
    pub default_access: AccessMode,
    /// Delete bucket objects with no corresponding item after a full sync
    pub reconcile_stale: bool,
    /// Bounded fan-out for uploads and stale deletes
    pub sync_concurrency: usize,
    /// Branch whose pushes trigger webhook syncs
    pub main_branch: String,
    /// Lifetime of access-grant session tokens
    pub session_ttl_hours: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            content_types: CONTENT_TYPES.iter().map(|s| s.to_string()).collect(),
            default_access: AccessMode::Open,
            reconcile_stale: true,
            sync_concurrency: 8,
            main_branch: "main".to_string(),
            session_ttl_hours: 24,
        }
    }
}

/// Lowercase and trim an email for allowlist storage and matching
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Split a content path (`content/notes/a.md`) into `(type, slug)`.
/// Returns `None` for paths outside the content root or without the
/// source extension.
pub fn parse_content_path(path: &str) -> Option<(String, String)> {
    let rest = path.strip_prefix(CONTENT_ROOT)?.strip_prefix('/')?;
    let (content_type, file) = rest.split_once('/')?;
    let slug = file.strip_suffix(CONTENT_EXTENSION)?;
    if content_type.is_empty() || slug.is_empty() {
        return None;
    }
    Some((content_type.to_string(), slug.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_mode_roundtrip() {
        for mode in [AccessMode::Open, AccessMode::Password, AccessMode::EmailList] {
            let s = mode.to_string();
            let parsed: AccessMode = s.parse().unwrap();
            assert_eq!(mode, parsed);
        }
    }

    #[test]
    fn test_access_mode_serde_kebab() {
        let json = serde_json::to_string(&AccessMode::EmailList).unwrap();
        assert_eq!(json, "\"email-list\"");
        let back: AccessMode = serde_json::from_str("\"email-list\"").unwrap();
        assert_eq!(back, AccessMode::EmailList);
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Admin@Example.COM "), "admin@example.com");
    }

    #[test]
    fn test_parse_content_path() {
        assert_eq!(
            parse_content_path("content/notes/my-note.md"),
            Some(("notes".to_string(), "my-note".to_string()))
        );
        assert_eq!(parse_content_path("content/notes/readme.txt"), None);
        assert_eq!(parse_content_path("docs/notes/a.md"), None);
        assert_eq!(parse_content_path("content/a.md"), None);
    }

    #[test]
    fn test_report_finish_sets_success() {
        let ok = SyncReport::default().finish();
        assert!(ok.success);

        let mut failed = SyncReport::default();
        failed.errors.push(SyncError {
            path: "content/notes/a.md".into(),
            message: "boom".into(),
        });
        assert!(!failed.finish().success);
    }
}
