//! Sync orchestration: drive source, rules and buckets into a consistent
//! state and report what happened.

mod catalog;
mod engine;

pub use catalog::{build_catalog, merge_catalog, Catalog};
pub use engine::{SyncEngine, SyncPhase, SyncRequest};
