// In-process object store used by the test suite. Behaves like a flat
// key/value bucket with directory markers, mirroring what the S3 client
// reports, plus hooks to control object mtimes and simulate latency.

use super::{ObjectMetadata, ObjectStore};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
struct Object {
    data: Vec<u8>,
    modified: SystemTime,
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Object>>,
    latency: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object with an explicit modification time.
    pub fn insert_with_mtime(&self, key: &str, data: &[u8], modified: SystemTime) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            Object {
                data: data.to_vec(),
                modified,
            },
        );
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn object_data(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).map(|o| o.data.clone())
    }

    pub fn object_mtime(&self, key: &str) -> Option<SystemTime> {
        self.objects.lock().unwrap().get(key).map(|o| o.modified)
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    /// Delay every store call by the given duration. Used to hold a pass
    /// in flight while testing mutual exclusion.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn in_prefix(prefix: &str, key: &str) -> bool {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        key.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list(&self, prefix: &str, recursive: bool) -> Result<Vec<ObjectMetadata>> {
        self.simulate_latency().await;
        let objects = self.objects.lock().unwrap();
        let stripped = prefix.trim_end_matches('/');

        let mut entries = Vec::new();
        for (key, object) in objects.iter() {
            if !Self::in_prefix(prefix, key) {
                continue;
            }
            if !recursive {
                let rest = key
                    .strip_prefix(stripped)
                    .unwrap_or(key)
                    .trim_start_matches('/');
                // One level only: no further '/' except a trailing marker.
                if rest.trim_end_matches('/').contains('/') {
                    continue;
                }
            }
            entries.push(ObjectMetadata {
                key: key.clone(),
                size: object.data.len() as u64,
                modified: object.modified,
                is_dir: key.ends_with('/'),
            });
        }
        Ok(entries)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.simulate_latency().await;
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| SyncError::StoreNotFound(format!("object not found: {}", key)))
    }

    async fn put(&self, key: &str, data: Vec<u8>, _content_type: &str) -> Result<()> {
        self.simulate_latency().await;
        self.objects.lock().unwrap().insert(
            key.to_string(),
            Object {
                data,
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.simulate_latency().await;
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn stat(&self, key: &str) -> Result<ObjectMetadata> {
        self.simulate_latency().await;
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|o| ObjectMetadata {
                key: key.to_string(),
                size: o.data.len() as u64,
                modified: o.modified,
                is_dir: key.ends_with('/'),
            })
            .ok_or_else(|| SyncError::StoreNotFound(format!("object not found: {}", key)))
    }

    async fn bucket_exists(&self) -> Result<bool> {
        Ok(true)
    }

    async fn create_bucket(&self) -> Result<()> {
        Ok(())
    }

    async fn create_folder(&self, prefix: &str) -> Result<()> {
        let marker = format!("{}/", prefix.trim_end_matches('/'));
        self.objects.lock().unwrap().insert(
            marker,
            Object {
                data: Vec::new(),
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = MemoryStore::new();
        store
            .put("docs/a.txt", b"hello".to_vec(), "text/plain")
            .await
            .unwrap();
        assert_eq!(store.get("docs/a.txt").await.unwrap(), b"hello");
        assert!(store.get("docs/missing.txt").await.is_err());
    }

    #[tokio::test]
    async fn list_honors_prefix_boundaries() {
        let store = MemoryStore::new();
        let now = SystemTime::now();
        store.insert_with_mtime("docs/a.txt", b"a", now);
        store.insert_with_mtime("docs/sub/b.txt", b"b", now);
        store.insert_with_mtime("docsother/c.txt", b"c", now);

        let keys: Vec<String> = store
            .list("docs", true)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.key)
            .collect();
        assert_eq!(keys, vec!["docs/a.txt", "docs/sub/b.txt"]);
    }

    #[tokio::test]
    async fn non_recursive_list_is_one_level() {
        let store = MemoryStore::new();
        let now = SystemTime::now();
        store.insert_with_mtime("docs/a.txt", b"a", now);
        store.insert_with_mtime("docs/sub/b.txt", b"b", now);

        let keys: Vec<String> = store
            .list("docs", false)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.key)
            .collect();
        assert_eq!(keys, vec!["docs/a.txt"]);
    }

    #[tokio::test]
    async fn folder_markers_are_directories() {
        let store = MemoryStore::new();
        store.create_folder("backups/run1").await.unwrap();

        let entries = store.list("backups", true).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_dir);
        assert_eq!(entries[0].key, "backups/run1/");
    }

    #[tokio::test]
    async fn stat_reports_size_and_mtime() {
        let store = MemoryStore::new();
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        store.insert_with_mtime("k", b"abc", mtime);

        let meta = store.stat("k").await.unwrap();
        assert_eq!(meta.size, 3);
        assert_eq!(meta.modified, mtime);
        assert!(!meta.is_dir);
    }
}
