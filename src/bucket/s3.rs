//! S3-compatible gateway (AWS S3, Cloudflare R2).

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};

use super::{BucketKind, ObjectGateway, ObjectInfo};
use crate::error::{PressroomError, Result};

/// Gateway over one S3 client and the two bucket names
pub struct S3Gateway {
    client: S3Client,
    protected_bucket: String,
    public_bucket: String,
}

impl S3Gateway {
    /// Build from environment credentials (AWS_* / R2 endpoint vars)
    pub async fn from_env(protected_bucket: &str, public_bucket: &str) -> Result<Self> {
        if protected_bucket.is_empty() || public_bucket.is_empty() {
            return Err(PressroomError::Config(
                "both bucket names are required".to_string(),
            ));
        }

        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Ok(Self {
            client: S3Client::new(&config),
            protected_bucket: protected_bucket.to_string(),
            public_bucket: public_bucket.to_string(),
        })
    }

    fn bucket_name(&self, bucket: BucketKind) -> &str {
        match bucket {
            BucketKind::Protected => &self.protected_bucket,
            BucketKind::Public => &self.public_bucket,
        }
    }
}

#[async_trait]
impl ObjectGateway for S3Gateway {
    async fn put(
        &self,
        bucket: BucketKind,
        key: &str,
        content: &[u8],
        content_type: &str,
    ) -> Result<()> {
        self.client
            .put_object()
            .bucket(self.bucket_name(bucket))
            .key(key)
            .body(ByteStream::from(content.to_vec()))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| PressroomError::ObjectStore(e.to_string()))?;

        tracing::debug!("put {} bytes to {}/{}", content.len(), bucket, key);
        Ok(())
    }

    async fn get(&self, bucket: BucketKind, key: &str) -> Result<Option<Vec<u8>>> {
        let response = self
            .client
            .get_object()
            .bucket(self.bucket_name(bucket))
            .key(key)
            .send()
            .await;

        match response {
            Ok(output) => {
                let data = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| PressroomError::ObjectStore(e.to_string()))?;
                Ok(Some(data.into_bytes().to_vec()))
            }
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(PressroomError::ObjectStore(service_error.to_string()))
                }
            }
        }
    }

    async fn list(&self, bucket: BucketKind, prefix: Option<&str>) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(self.bucket_name(bucket));
            if let Some(prefix) = prefix {
                request = request.prefix(prefix);
            }
            if let Some(token) = continuation.take() {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| PressroomError::ObjectStore(e.to_string()))?;

            for object in response.contents() {
                let Some(key) = object.key() else { continue };
                objects.push(ObjectInfo {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0),
                    etag: object.e_tag().map(String::from),
                    uploaded_at: object.last_modified().and_then(|dt| {
                        DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos())
                    }),
                });
            }

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        Ok(objects)
    }

    async fn delete(&self, bucket: BucketKind, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(self.bucket_name(bucket))
            .key(key)
            .send()
            .await
            .map_err(|e| PressroomError::ObjectStore(e.to_string()))?;

        tracing::debug!("deleted {}/{}", bucket, key);
        Ok(())
    }
}
