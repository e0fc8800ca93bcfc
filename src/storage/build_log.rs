//! Build history: one row per sync/build run.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Outcome of a recorded build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStatus::Running => write!(f, "running"),
            BuildStatus::Completed => write!(f, "completed"),
            BuildStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for BuildStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(BuildStatus::Running),
            "completed" => Ok(BuildStatus::Completed),
            "failed" => Ok(BuildStatus::Failed),
            _ => Err(format!("Unknown build status: {}", s)),
        }
    }
}

/// One build-log row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
    pub id: i64,
    pub build_type: String,
    pub status: BuildStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub triggered_by: Option<String>,
    pub error_message: Option<String>,
}

/// Open a build-log row in `running` state; returns its id
pub fn start_build(conn: &Connection, build_type: &str, triggered_by: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO build_logs (build_type, status, started_at, triggered_by)
         VALUES (?1, 'running', ?2, ?3)",
        params![build_type, Utc::now().to_rfc3339(), triggered_by],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Close a build-log row with its final status
pub fn finish_build(
    conn: &Connection,
    id: i64,
    status: BuildStatus,
    error_message: Option<&str>,
) -> Result<()> {
    let started: Option<String> = conn
        .query_row(
            "SELECT started_at FROM build_logs WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;

    let now = Utc::now();
    let duration = started
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| (now - t.with_timezone(&Utc)).num_milliseconds() as f64 / 1000.0);

    conn.execute(
        "UPDATE build_logs
         SET status = ?2, completed_at = ?3, duration_seconds = ?4, error_message = ?5
         WHERE id = ?1",
        params![
            id,
            status.to_string(),
            now.to_rfc3339(),
            duration,
            error_message
        ],
    )?;
    Ok(())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<BuildRecord> {
    let status_str: String = row.get("status")?;
    let started_str: String = row.get("started_at")?;
    let completed_str: Option<String> = row.get("completed_at")?;

    Ok(BuildRecord {
        id: row.get("id")?,
        build_type: row.get("build_type")?,
        status: status_str.parse().unwrap_or(BuildStatus::Failed),
        started_at: DateTime::parse_from_rfc3339(&started_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        completed_at: completed_str
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        duration_seconds: row.get("duration_seconds")?,
        triggered_by: row.get("triggered_by")?,
        error_message: row.get("error_message")?,
    })
}

/// Most recent build, if any
pub fn latest_build(conn: &Connection) -> Result<Option<BuildRecord>> {
    conn.query_row(
        "SELECT id, build_type, status, started_at, completed_at, duration_seconds, triggered_by, error_message
         FROM build_logs ORDER BY id DESC LIMIT 1",
        [],
        row_to_record,
    )
    .optional()
    .map_err(Into::into)
}

/// Recent builds, newest first
pub fn recent_builds(conn: &Connection, limit: i64) -> Result<Vec<BuildRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, build_type, status, started_at, completed_at, duration_seconds, triggered_by, error_message
         FROM build_logs ORDER BY id DESC LIMIT ?1",
    )?;

    let records = stmt
        .query_map(params![limit], row_to_record)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
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
    fn test_build_lifecycle() {
        let conn = setup_db();

        let id = start_build(&conn, "full_sync", "manual").unwrap();
        let running = latest_build(&conn).unwrap().unwrap();
        assert_eq!(running.status, BuildStatus::Running);
        assert_eq!(running.build_type, "full_sync");

        finish_build(&conn, id, BuildStatus::Completed, None).unwrap();
        let done = latest_build(&conn).unwrap().unwrap();
        assert_eq!(done.status, BuildStatus::Completed);
        assert!(done.completed_at.is_some());
        assert!(done.duration_seconds.is_some());
    }

    #[test]
    fn test_failed_build_records_error() {
        let conn = setup_db();

        let id = start_build(&conn, "partial_sync", "webhook").unwrap();
        finish_build(&conn, id, BuildStatus::Failed, Some("upstream unreachable")).unwrap();

        let last = latest_build(&conn).unwrap().unwrap();
        assert_eq!(last.status, BuildStatus::Failed);
        assert_eq!(last.error_message.as_deref(), Some("upstream unreachable"));
    }

    #[test]
    fn test_recent_builds_order() {
        let conn = setup_db();
        for _ in 0..3 {
            let id = start_build(&conn, "full_sync", "cli").unwrap();
            finish_build(&conn, id, BuildStatus::Completed, None).unwrap();
        }

        let recent = recent_builds(&conn, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].id > recent[1].id);
    }
}
