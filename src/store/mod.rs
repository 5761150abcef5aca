pub mod memory;
pub mod s3;

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use std::future::Future;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Metadata for one object, as produced by listings and stat calls.
/// Keys ending in '/' are directory markers.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
    pub modified: SystemTime,
    pub is_dir: bool,
}

/// Narrow contract over a key-addressed object store (MinIO, S3, R2, ...).
///
/// The engine only ever consumes this trait; it never talks to a concrete
/// client directly, which keeps the reconciliation logic testable against
/// the in-memory implementation.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list(&self, prefix: &str, recursive: bool) -> Result<Vec<ObjectMetadata>>;
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn stat(&self, key: &str) -> Result<ObjectMetadata>;
    async fn bucket_exists(&self) -> Result<bool>;
    async fn create_bucket(&self) -> Result<()>;

    /// Create a directory-marker object so the prefix shows up in listings.
    async fn create_folder(&self, prefix: &str) -> Result<()>;
}

/// Join a key prefix and a relative local path into an object key,
/// normalizing the separators Windows paths carry.
pub fn join_key(prefix: &str, relative: &Path) -> String {
    let rel: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let rel = rel.join("/");

    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        rel
    } else {
        format!("{}/{}", prefix, rel)
    }
}

/// Strip a prefix from an object key, yielding the relative path used for
/// comparison against local snapshots. Returns None for the prefix's own
/// directory marker.
pub fn relative_key<'a>(prefix: &str, key: &'a str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    let rel = if prefix.is_empty() {
        key
    } else {
        key.strip_prefix(prefix)?.trim_start_matches('/')
    };
    if rel.is_empty() {
        None
    } else {
        Some(rel)
    }
}

/// Apply the per-call deadline to a store operation. A hung network call
/// fails that file instead of blocking the scheduler loop indefinitely.
pub async fn with_deadline<T, F>(deadline: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Deadline {
            operation: operation.to_string(),
            seconds: deadline.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn join_key_normalizes() {
        assert_eq!(join_key("docs", &PathBuf::from("a/b.txt")), "docs/a/b.txt");
        assert_eq!(join_key("docs/", &PathBuf::from("a.txt")), "docs/a.txt");
        assert_eq!(join_key("", &PathBuf::from("a.txt")), "a.txt");
    }

    #[test]
    fn relative_key_strips_prefix() {
        assert_eq!(relative_key("docs", "docs/a/b.txt"), Some("a/b.txt"));
        assert_eq!(relative_key("docs/", "docs/a.txt"), Some("a.txt"));
        assert_eq!(relative_key("docs", "docs/"), None);
        assert_eq!(relative_key("docs", "other/a.txt"), None);
        assert_eq!(relative_key("", "a.txt"), Some("a.txt"));
    }

    #[tokio::test]
    async fn deadline_expires() {
        let result: Result<()> = with_deadline(Duration::from_millis(10), "get", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(SyncError::Deadline { .. })));
    }
}
