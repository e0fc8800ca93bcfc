//! Append-only log of access attempts.
//!
//! Records who tried to read gated content and with what kind of
//! credential. The raw credential value is never stored for passwords;
//! emails are kept so allowlist denials can be reviewed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Kind of credential presented with an access attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialType {
    /// No credential; open content or a bare access check
    Open,
    Password,
    Email,
    /// Bearer session token on the protected-content endpoint
    Token,
}

impl std::fmt::Display for CredentialType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialType::Open => write!(f, "open"),
            CredentialType::Password => write!(f, "password"),
            CredentialType::Email => write!(f, "email"),
            CredentialType::Token => write!(f, "token"),
        }
    }
}

impl std::str::FromStr for CredentialType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "open" => Ok(CredentialType::Open),
            "password" => Ok(CredentialType::Password),
            "email" => Ok(CredentialType::Email),
            "token" => Ok(CredentialType::Token),
            _ => Err(format!("Unknown credential type: {}", s)),
        }
    }
}

/// One access-log row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub content_type: String,
    pub slug: String,
    pub credential_type: CredentialType,
    pub granted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

/// Filter for querying the access log
#[derive(Debug, Clone, Default)]
pub struct AccessLogFilter {
    pub content_type: Option<String>,
    pub slug: Option<String>,
    /// Only denied attempts
    pub failed_only: bool,
    pub limit: Option<i64>,
}

/// Aggregate counts over a time range
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessStats {
    pub total_attempts: i64,
    pub granted: i64,
    pub denied: i64,
    pub by_credential_type: HashMap<String, i64>,
}

/// Record one attempt
pub fn log_access(
    conn: &Connection,
    content_type: &str,
    slug: &str,
    credential_type: CredentialType,
    granted: bool,
    email: Option<&str>,
    ip_address: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO access_log (timestamp, content_type, slug, credential_type, granted, email, ip_address)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            Utc::now().to_rfc3339(),
            content_type,
            slug,
            credential_type.to_string(),
            granted,
            email,
            ip_address,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Query attempts, newest first
pub fn query_access_log(conn: &Connection, filter: &AccessLogFilter) -> Result<Vec<AccessLogEntry>> {
    let mut sql = String::from(
        "SELECT id, timestamp, content_type, slug, credential_type, granted, email, ip_address
         FROM access_log WHERE 1=1",
    );
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(ref ct) = filter.content_type {
        sql.push_str(" AND content_type = ?");
        params_vec.push(Box::new(ct.clone()));
    }
    if let Some(ref slug) = filter.slug {
        sql.push_str(" AND slug = ?");
        params_vec.push(Box::new(slug.clone()));
    }
    if filter.failed_only {
        sql.push_str(" AND granted = 0");
    }
    sql.push_str(" ORDER BY id DESC");
    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    let params_ref: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;

    let entries = stmt
        .query_map(params_ref.as_slice(), |row| {
            let ts_str: String = row.get("timestamp")?;
            let cred_str: String = row.get("credential_type")?;
            Ok(AccessLogEntry {
                id: row.get("id")?,
                timestamp: DateTime::parse_from_rfc3339(&ts_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                content_type: row.get("content_type")?,
                slug: row.get("slug")?,
                credential_type: cred_str.parse().unwrap_or(CredentialType::Open),
                granted: row.get("granted")?,
                email: row.get("email")?,
                ip_address: row.get("ip_address")?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(entries)
}

/// Aggregate attempt counts, optionally bounded to `[start, end]`
pub fn access_stats(
    conn: &Connection,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<AccessStats> {
    let mut sql = String::from(
        "SELECT credential_type, granted, COUNT(*) FROM access_log WHERE 1=1",
    );
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(start) = start {
        sql.push_str(" AND timestamp >= ?");
        params_vec.push(Box::new(start.to_rfc3339()));
    }
    if let Some(end) = end {
        sql.push_str(" AND timestamp <= ?");
        params_vec.push(Box::new(end.to_rfc3339()));
    }
    sql.push_str(" GROUP BY credential_type, granted");

    let params_ref: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;

    let mut stats = AccessStats {
        total_attempts: 0,
        granted: 0,
        denied: 0,
        by_credential_type: HashMap::new(),
    };

    let rows = stmt.query_map(params_ref.as_slice(), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, bool>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;

    for row in rows {
        let (cred, granted, count) = row?;
        stats.total_attempts += count;
        if granted {
            stats.granted += count;
        } else {
            stats.denied += count;
        }
        *stats.by_credential_type.entry(cred).or_insert(0) += count;
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::run_migrations;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn test_log_and_query() {
        let conn = setup_db();

        log_access(&conn, "ideas", "b", CredentialType::Password, true, None, None).unwrap();
        log_access(
            &conn,
            "ideas",
            "b",
            CredentialType::Email,
            false,
            Some("x@y.com"),
            None,
        )
        .unwrap();

        let all = query_access_log(&conn, &AccessLogFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
        // Newest first
        assert_eq!(all[0].credential_type, CredentialType::Email);

        let failed = query_access_log(
            &conn,
            &AccessLogFilter {
                failed_only: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(failed.len(), 1);
        assert!(!failed[0].granted);
    }

    #[test]
    fn test_filter_by_item() {
        let conn = setup_db();
        log_access(&conn, "ideas", "b", CredentialType::Password, true, None, None).unwrap();
        log_access(&conn, "notes", "a", CredentialType::Open, true, None, None).unwrap();

        let ideas = query_access_log(
            &conn,
            &AccessLogFilter {
                content_type: Some("ideas".into()),
                slug: Some("b".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(ideas.len(), 1);
        assert_eq!(ideas[0].slug, "b");
    }

    #[test]
    fn test_stats_counts() {
        let conn = setup_db();
        log_access(&conn, "ideas", "b", CredentialType::Password, true, None, None).unwrap();
        log_access(&conn, "ideas", "b", CredentialType::Password, false, None, None).unwrap();
        log_access(&conn, "ideas", "b", CredentialType::Email, false, None, None).unwrap();

        let stats = access_stats(&conn, None, None).unwrap();
        assert_eq!(stats.total_attempts, 3);
        assert_eq!(stats.granted, 1);
        assert_eq!(stats.denied, 2);
        assert_eq!(stats.by_credential_type.get("password"), Some(&2));
    }
}
