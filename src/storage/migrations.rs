//! Database migrations for Pressroom

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Run all migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    if current_version < SCHEMA_VERSION {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Initial schema (v1): access rules, email allowlist, access log
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Access rules, unique per (type, slug). Absence of a row means the
        -- item follows the configured default mode.
        CREATE TABLE IF NOT EXISTS access_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content_type TEXT NOT NULL,
            slug TEXT NOT NULL,
            access_mode TEXT NOT NULL DEFAULT 'open',
            description TEXT,
            password_hash TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(content_type, slug)
        );

        -- Allowlist for email-list rules
        CREATE TABLE IF NOT EXISTS email_allowlist (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            rule_id INTEGER NOT NULL REFERENCES access_rules(id) ON DELETE CASCADE,
            email TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(rule_id, email)
        );

        -- Append-only record of access attempts. Never stores a password.
        CREATE TABLE IF NOT EXISTS access_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL DEFAULT (datetime('now')),
            content_type TEXT NOT NULL,
            slug TEXT NOT NULL,
            credential_type TEXT NOT NULL,
            granted INTEGER NOT NULL,
            email TEXT,
            ip_address TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_access_rules_lookup ON access_rules(content_type, slug);
        CREATE INDEX IF NOT EXISTS idx_allowlist_rule ON email_allowlist(rule_id);
        CREATE INDEX IF NOT EXISTS idx_access_log_item ON access_log(content_type, slug);
        CREATE INDEX IF NOT EXISTS idx_access_log_time ON access_log(timestamp);
        "#,
    )?;

    conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
    Ok(())
}

/// v2: grant session tokens and build history
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Access-grant sessions; only the token digest is stored
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            content_type TEXT NOT NULL,
            slug TEXT NOT NULL,
            token_hash TEXT UNIQUE NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            expires_at TEXT NOT NULL
        );

        -- Sync/build history
        CREATE TABLE IF NOT EXISTS build_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            build_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'running',
            started_at TEXT NOT NULL DEFAULT (datetime('now')),
            completed_at TEXT,
            duration_seconds REAL,
            triggered_by TEXT,
            error_message TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_item ON sessions(content_type, slug);
        CREATE INDEX IF NOT EXISTS idx_build_logs_started ON build_logs(started_at);
        "#,
    )?;

    conn.execute("INSERT INTO schema_version (version) VALUES (2)", [])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_create_tables() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for expected in [
            "access_rules",
            "email_allowlist",
            "access_log",
            "sessions",
            "build_logs",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {}", expected);
        }
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
