//! Pressroom - Content Synchronization & Access-Routing Engine
//!
//! Takes git-hosted markdown, an access-control database and two object
//! storage buckets (public, protected) and drives them into a mutually
//! consistent state: render each item, decide whether it is gated, write
//! it to the right bucket, and remove objects no source file backs.

pub mod access;
pub mod bucket;
pub mod content;
pub mod error;
pub mod routing;
pub mod server;
pub mod source;
pub mod storage;
pub mod sync;
pub mod types;

pub use error::{PressroomError, Result};
pub use storage::Storage;
pub use sync::SyncEngine;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
