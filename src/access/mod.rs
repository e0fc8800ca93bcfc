//! Access-control store: rules, allowlists, grant sessions, attempt log.
//!
//! Classification itself lives in [`crate::routing`]; this module only
//! reads and writes the persisted state it consumes.

mod log;
mod rules;
mod sessions;

pub use log::{
    access_stats, log_access, query_access_log, AccessLogEntry, AccessLogFilter, AccessStats,
    CredentialType,
};
pub use rules::{hash_password, verify_password, RulePatch, RuleStore, UpsertRule};
pub use sessions::SessionManager;
