//! Routing decision: the single authority for protection status.
//!
//! Combines an item's access rule (or its absence) with the configured
//! default mode into a per-item protected/public flag. No other component
//! may decide which bucket an item lands in.

use crate::types::{AccessMode, AccessRule};

/// Outcome of classifying one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Routing {
    pub is_protected: bool,
    pub access_mode: AccessMode,
}

/// Classify an item. A missing rule falls back to `default_mode`
/// (the default-open policy, made explicit configuration).
pub fn decide(rule: Option<&AccessRule>, default_mode: AccessMode) -> Routing {
    let access_mode = rule.map(|r| r.access_mode).unwrap_or(default_mode);
    Routing {
        is_protected: access_mode != AccessMode::Open,
        access_mode,
    }
}
