//! SQLite-backed persistence: access-control store and build history.

mod build_log;
mod connection;
mod migrations;

pub use build_log::{BuildRecord, BuildStatus, finish_build, latest_build, recent_builds, start_build};
pub use connection::Storage;
pub use migrations::{run_migrations, SCHEMA_VERSION};
