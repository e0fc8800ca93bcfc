//! Object store gateway over the two logical buckets.

#[cfg(feature = "cloud")]
mod s3;

mod memory;

#[cfg(feature = "cloud")]
pub use s3::S3Gateway;

pub use memory::MemoryGateway;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// HTML content type for rendered items
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// JSON content type for the aggregate catalog
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// The two logical buckets content is routed into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketKind {
    Protected,
    Public,
}

impl BucketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketKind::Protected => "protected",
            BucketKind::Public => "public",
        }
    }
}

impl std::fmt::Display for BucketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata of one stored object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    pub key: String,
    pub size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// Put/get/list/delete against the bucket pair.
///
/// Individual call failures are reported per item by callers; nothing in
/// this trait aborts a batch.
#[async_trait]
pub trait ObjectGateway: Send + Sync {
    async fn put(
        &self,
        bucket: BucketKind,
        key: &str,
        content: &[u8],
        content_type: &str,
    ) -> Result<()>;

    /// `None` when the key does not exist
    async fn get(&self, bucket: BucketKind, key: &str) -> Result<Option<Vec<u8>>>;

    async fn list(&self, bucket: BucketKind, prefix: Option<&str>) -> Result<Vec<ObjectInfo>>;

    async fn delete(&self, bucket: BucketKind, key: &str) -> Result<()>;
}
