//! In-memory object gateway for tests and dry runs.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use super::{BucketKind, ObjectGateway, ObjectInfo};
use crate::error::{PressroomError, Result};

#[derive(Clone)]
struct StoredObject {
    content: Vec<u8>,
    content_type: String,
    etag: String,
    uploaded_at: chrono::DateTime<Utc>,
}

/// Gateway over per-bucket in-memory maps
#[derive(Default)]
pub struct MemoryGateway {
    buckets: RwLock<HashMap<BucketKind, BTreeMap<String, StoredObject>>>,
    /// Keys whose puts/deletes fail, for partial-failure tests
    failing_keys: RwLock<Vec<String>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make operations on this key fail with an object-store error
    pub fn fail_key(&self, key: &str) {
        self.failing_keys.write().push(key.to_string());
    }

    fn check_key(&self, key: &str) -> Result<()> {
        if self.failing_keys.read().iter().any(|k| k == key) {
            return Err(PressroomError::ObjectStore(format!(
                "injected failure for {}",
                key
            )));
        }
        Ok(())
    }

    /// Decoded text content of one object, for assertions
    pub fn get_text(&self, bucket: BucketKind, key: &str) -> Option<String> {
        self.buckets
            .read()
            .get(&bucket)
            .and_then(|b| b.get(key))
            .map(|o| String::from_utf8_lossy(&o.content).into_owned())
    }

    /// Stored content type of one object
    pub fn content_type_of(&self, bucket: BucketKind, key: &str) -> Option<String> {
        self.buckets
            .read()
            .get(&bucket)
            .and_then(|b| b.get(key))
            .map(|o| o.content_type.clone())
    }

    /// All keys currently in a bucket, sorted
    pub fn keys(&self, bucket: BucketKind) -> Vec<String> {
        self.buckets
            .read()
            .get(&bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ObjectGateway for MemoryGateway {
    async fn put(
        &self,
        bucket: BucketKind,
        key: &str,
        content: &[u8],
        content_type: &str,
    ) -> Result<()> {
        self.check_key(key)?;
        let etag = hex::encode(Sha256::digest(content));
        self.buckets.write().entry(bucket).or_default().insert(
            key.to_string(),
            StoredObject {
                content: content.to_vec(),
                content_type: content_type.to_string(),
                etag,
                uploaded_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, bucket: BucketKind, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_key(key)?;
        Ok(self
            .buckets
            .read()
            .get(&bucket)
            .and_then(|b| b.get(key))
            .map(|o| o.content.clone()))
    }

    async fn list(&self, bucket: BucketKind, prefix: Option<&str>) -> Result<Vec<ObjectInfo>> {
        Ok(self
            .buckets
            .read()
            .get(&bucket)
            .map(|b| {
                b.iter()
                    .filter(|(key, _)| prefix.map_or(true, |p| key.starts_with(p)))
                    .map(|(key, obj)| ObjectInfo {
                        key: key.clone(),
                        size: obj.content.len() as i64,
                        etag: Some(obj.etag.clone()),
                        uploaded_at: Some(obj.uploaded_at),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, bucket: BucketKind, key: &str) -> Result<()> {
        self.check_key(key)?;
        if let Some(b) = self.buckets.write().get_mut(&bucket) {
            b.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let gw = MemoryGateway::new();
        gw.put(BucketKind::Public, "notes/a.html", b"<p>hi</p>", "text/html")
            .await
            .unwrap();

        let got = gw.get(BucketKind::Public, "notes/a.html").await.unwrap();
        assert_eq!(got.as_deref(), Some(b"<p>hi</p>".as_ref()));
        assert!(gw
            .get(BucketKind::Protected, "notes/a.html")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let gw = MemoryGateway::new();
        gw.put(BucketKind::Public, "notes/a.html", b"a", "text/html")
            .await
            .unwrap();
        gw.put(BucketKind::Public, "pages/c.html", b"c", "text/html")
            .await
            .unwrap();

        let notes = gw.list(BucketKind::Public, Some("notes/")).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].key, "notes/a.html");

        let all = gw.list(BucketKind::Public, None).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let gw = MemoryGateway::new();
        gw.put(BucketKind::Protected, "ideas/b.html", b"b", "text/html")
            .await
            .unwrap();
        gw.delete(BucketKind::Protected, "ideas/b.html").await.unwrap();
        gw.delete(BucketKind::Protected, "ideas/b.html").await.unwrap();
        assert!(gw.keys(BucketKind::Protected).is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let gw = MemoryGateway::new();
        gw.fail_key("notes/bad.html");
        let err = gw
            .put(BucketKind::Public, "notes/bad.html", b"x", "text/html")
            .await
            .unwrap_err();
        assert!(matches!(err, PressroomError::ObjectStore(_)));
    }
}
