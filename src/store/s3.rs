use super::{ObjectMetadata, ObjectStore};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_smithy_types::byte_stream::ByteStream;
use std::time::SystemTime;

/// Object store backed by an S3-compatible service.
///
/// Works against AWS S3 as well as MinIO, Cloudflare R2, Backblaze B2 and
/// Wasabi via the custom endpoint (path-style addressing is forced there).
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub async fn new(
        bucket: String,
        region: Option<String>,
        endpoint: Option<String>,
    ) -> Result<Self> {
        let config = if let Some(r) = region {
            aws_config::from_env()
                .region(aws_sdk_s3::config::Region::new(r))
                .load()
                .await
        } else {
            aws_config::load_from_env().await
        };

        let builder = aws_sdk_s3::config::Builder::from(&config);
        let s3_config = if let Some(ep) = endpoint {
            builder.endpoint_url(ep).force_path_style(true).build()
        } else {
            builder.build()
        };

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn smithy_time(dt: &aws_smithy_types::DateTime) -> SystemTime {
        SystemTime::UNIX_EPOCH
            + std::time::Duration::new(dt.secs().max(0) as u64, dt.subsec_nanos())
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list(&self, prefix: &str, recursive: bool) -> Result<Vec<ObjectMetadata>> {
        let mut continuation_token: Option<String> = None;
        let mut entries = Vec::new();

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if !recursive {
                request = request.delimiter("/");
            }
            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| {
                let service = e.into_service_error();
                if service.is_no_such_bucket() {
                    SyncError::StoreNotFound(format!("bucket does not exist: {}", self.bucket))
                } else {
                    SyncError::Store(format!("failed to list objects: {}", service))
                }
            })?;

            for obj in response.contents() {
                let key = obj
                    .key()
                    .ok_or_else(|| SyncError::Store("object missing key".to_string()))?;

                let modified = obj
                    .last_modified()
                    .map(Self::smithy_time)
                    .unwrap_or(SystemTime::UNIX_EPOCH);

                entries.push(ObjectMetadata {
                    key: key.to_string(),
                    size: obj.size().unwrap_or(0) as u64,
                    modified,
                    is_dir: key.ends_with('/'),
                });
            }

            if response.is_truncated().unwrap_or(false) {
                continuation_token = response.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(entries)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_no_such_key() {
                    SyncError::StoreNotFound(format!("object not found: {}", key))
                } else {
                    SyncError::Store(format!("failed to download {}: {}", key, service))
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| SyncError::Store(format!("failed to read body of {}: {}", key, e)))?;

        Ok(data.into_bytes().to_vec())
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| SyncError::Store(format!("failed to upload {}: {}", key, e)))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| SyncError::Store(format!("failed to delete {}: {}", key, e)))?;

        Ok(())
    }

    async fn stat(&self, key: &str) -> Result<ObjectMetadata> {
        let response = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_not_found() {
                    SyncError::StoreNotFound(format!("object not found: {}", key))
                } else {
                    SyncError::Store(format!("failed to stat {}: {}", key, service))
                }
            })?;

        let modified = response
            .last_modified()
            .map(Self::smithy_time)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        Ok(ObjectMetadata {
            key: key.to_string(),
            size: response.content_length().unwrap_or(0) as u64,
            modified,
            is_dir: key.ends_with('/'),
        })
    }

    async fn bucket_exists(&self) -> Result<bool> {
        let result = self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await;
        Ok(result.is_ok())
    }

    async fn create_bucket(&self) -> Result<()> {
        self.client
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                SyncError::Store(format!("failed to create bucket {}: {}", self.bucket, e))
            })?;

        Ok(())
    }

    async fn create_folder(&self, prefix: &str) -> Result<()> {
        let marker = format!("{}/", prefix.trim_end_matches('/'));
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&marker)
            .body(ByteStream::from_static(b""))
            .send()
            .await
            .map_err(|e| SyncError::Store(format!("failed to create folder {}: {}", marker, e)))?;

        Ok(())
    }
}
