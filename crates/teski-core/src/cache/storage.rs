//! Named cache buckets holding captured responses.
//!
//! `CacheStorage` mirrors the browser cache API surface the controller needs:
//! open a bucket, match and put by request key, list bucket names, delete a
//! bucket. Each operation is atomic on its own; callers add no locking.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::models::HttpResponse;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache bucket file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Cache bucket not found: {0}")]
    BucketNotFound(String),
}

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the bucket if it does not exist yet.
    async fn open(&self, bucket: &str) -> Result<(), StorageError>;

    async fn match_request(&self, bucket: &str, key: &str) -> Result<Option<HttpResponse>, StorageError>;

    /// Overwrite the entry for `key`. Fails if the bucket was never opened.
    async fn put(&self, bucket: &str, key: &str, response: HttpResponse) -> Result<(), StorageError>;

    /// Names of every existing bucket.
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Remove a bucket and all its entries. Returns whether it existed.
    async fn delete(&self, bucket: &str) -> Result<bool, StorageError>;

    async fn entry_count(&self, bucket: &str) -> Result<usize, StorageError>;

    /// When the most recently written entry was stored, `None` if empty.
    async fn last_cached_at(&self, bucket: &str) -> Result<Option<DateTime<Utc>>, StorageError>;
}

/// A response plus the time it was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub response: HttpResponse,
    pub cached_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn new(response: HttpResponse) -> Self {
        Self {
            response,
            cached_at: Utc::now(),
        }
    }
}

type Bucket = BTreeMap<String, CachedResponse>;

fn newest_entry(entries: &Bucket) -> Option<DateTime<Utc>> {
    entries.values().map(|cached| cached.cached_at).max()
}

/// Render an age in minutes the way the status output shows it.
pub fn age_display(minutes: i64) -> String {
    if minutes < 1 {
        // Negative ages come from clock skew
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        if minutes % 60 >= 30 {
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        if (minutes % 1440) / 60 >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}

// ============================================================================
// In-memory storage
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    buckets: RwLock<HashMap<String, Bucket>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, bucket: &str) -> Result<(), StorageError> {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default();
        Ok(())
    }

    async fn match_request(&self, bucket: &str, key: &str) -> Result<Option<HttpResponse>, StorageError> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|cached| cached.response.clone()))
    }

    async fn put(&self, bucket: &str, key: &str, response: HttpResponse) -> Result<(), StorageError> {
        let mut buckets = self.buckets.write().await;
        let entries = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
        entries.insert(key.to_string(), CachedResponse::new(response));
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self.buckets.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, bucket: &str) -> Result<bool, StorageError> {
        Ok(self.buckets.write().await.remove(bucket).is_some())
    }

    async fn entry_count(&self, bucket: &str) -> Result<usize, StorageError> {
        let buckets = self.buckets.read().await;
        buckets
            .get(bucket)
            .map(|b| b.len())
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))
    }

    async fn last_cached_at(&self, bucket: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
        let buckets = self.buckets.read().await;
        buckets
            .get(bucket)
            .map(newest_entry)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))
    }
}

// ============================================================================
// On-disk storage
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct BucketFile {
    name: String,
    entries: Bucket,
}

const BUCKET_FILE_PREFIX: &str = "bucket-";
const BUCKET_FILE_SUFFIX: &str = ".json";

/// One JSON file per bucket inside the cache directory.
///
/// File names carry the hex-encoded bucket name, so any name maps to exactly
/// one file and the name can be recovered without reading the file.
pub struct DiskCacheStorage {
    cache_dir: PathBuf,
    /// Serializes read-modify-write cycles on bucket files.
    lock: Mutex<()>,
}

impl DiskCacheStorage {
    pub fn new(cache_dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            cache_dir,
            lock: Mutex::new(()),
        })
    }

    fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.cache_dir.join(format!(
            "{}{}{}",
            BUCKET_FILE_PREFIX,
            hex::encode(bucket.as_bytes()),
            BUCKET_FILE_SUFFIX
        ))
    }

    /// Inverse of `bucket_path`; `None` for files this storage did not write.
    fn bucket_name(path: &Path) -> Option<String> {
        let encoded = path
            .file_name()?
            .to_str()?
            .strip_prefix(BUCKET_FILE_PREFIX)?
            .strip_suffix(BUCKET_FILE_SUFFIX)?;
        String::from_utf8(hex::decode(encoded).ok()?).ok()
    }

    fn load(&self, bucket: &str) -> Result<Option<BucketFile>, StorageError> {
        let path = self.bucket_path(bucket);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Write to a sibling temp file, then rename over the bucket file so a
    /// crash never leaves a truncated bucket behind.
    fn save(&self, file: &BucketFile) -> Result<(), StorageError> {
        let path = self.bucket_path(&file.name);
        let temp_path = path.with_extension("json.tmp");
        let contents = serde_json::to_string(file)?;
        std::fs::write(&temp_path, contents)?;
        std::fs::rename(&temp_path, &path)?;
        debug!(bucket = %file.name, entries = file.entries.len(), "Saved cache bucket");
        Ok(())
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, bucket: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        match self.load(bucket) {
            Ok(Some(_)) => return Ok(()),
            Ok(None) => {}
            Err(StorageError::Corrupt(e)) => {
                warn!(bucket = %bucket, error = %e, "Cache bucket corrupt, recreating it empty");
            }
            Err(e) => return Err(e),
        }
        self.save(&BucketFile {
            name: bucket.to_string(),
            entries: Bucket::new(),
        })
    }

    async fn match_request(&self, bucket: &str, key: &str) -> Result<Option<HttpResponse>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self
            .load(bucket)?
            .and_then(|mut file| file.entries.remove(key))
            .map(|cached| cached.response))
    }

    async fn put(&self, bucket: &str, key: &str, response: HttpResponse) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut file = self
            .load(bucket)?
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
        file.entries
            .insert(key.to_string(), CachedResponse::new(response));
        self.save(&file)
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let _guard = self.lock.lock().await;
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            match Self::bucket_name(&path) {
                Some(name) => names.push(name),
                None => debug!(path = %path.display(), "Skipping non-bucket file in cache dir"),
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, bucket: &str) -> Result<bool, StorageError> {
        let _guard = self.lock.lock().await;
        let path = self.bucket_path(bucket);
        if path.exists() {
            std::fs::remove_file(path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn entry_count(&self, bucket: &str) -> Result<usize, StorageError> {
        let _guard = self.lock.lock().await;
        self.load(bucket)?
            .map(|file| file.entries.len())
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))
    }

    async fn last_cached_at(&self, bucket: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
        let _guard = self.lock.lock().await;
        self.load(bucket)?
            .map(|file| newest_entry(&file.entries))
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_put_requires_open_bucket() {
        let storage = MemoryCacheStorage::new();
        let result = storage
            .put("v1", "GET https://a.test/", HttpResponse::basic(200, "x"))
            .await;
        assert!(matches!(result, Err(StorageError::BucketNotFound(_))));

        storage.open("v1").await.unwrap();
        storage
            .put("v1", "GET https://a.test/", HttpResponse::basic(200, "x"))
            .await
            .unwrap();
        assert_eq!(storage.entry_count("v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_open_keeps_existing_entries() {
        let storage = MemoryCacheStorage::new();
        storage.open("v1").await.unwrap();
        storage
            .put("v1", "k", HttpResponse::basic(200, "body"))
            .await
            .unwrap();
        storage.open("v1").await.unwrap();

        let hit = storage.match_request("v1", "k").await.unwrap().unwrap();
        assert_eq!(hit.body_text(), "body");
    }

    #[tokio::test]
    async fn test_disk_buckets_persist_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();

        storage.open("teski-shell/v1").await.unwrap();
        storage.open("teski-shell-v2").await.unwrap();
        storage
            .put("teski-shell/v1", "GET https://a.test/", HttpResponse::basic(200, "old"))
            .await
            .unwrap();

        let reopened = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(
            reopened.keys().await.unwrap(),
            vec!["teski-shell-v2".to_string(), "teski-shell/v1".to_string()]
        );
        let hit = reopened
            .match_request("teski-shell/v1", "GET https://a.test/")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.body_text(), "old");

        assert!(reopened.delete("teski-shell/v1").await.unwrap());
        assert!(!reopened.delete("teski-shell/v1").await.unwrap());
        assert_eq!(reopened.keys().await.unwrap(), vec!["teski-shell-v2".to_string()]);
    }

    #[tokio::test]
    async fn test_disk_match_missing_bucket_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
        assert!(storage.match_request("nope", "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disk_similar_names_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();

        storage.open("teski/v1").await.unwrap();
        storage.open("teski_v1").await.unwrap();
        storage
            .put("teski/v1", "k", HttpResponse::basic(200, "slash"))
            .await
            .unwrap();

        assert_ne!(storage.bucket_path("teski/v1"), storage.bucket_path("teski_v1"));
        assert_eq!(
            storage.keys().await.unwrap(),
            vec!["teski/v1".to_string(), "teski_v1".to_string()]
        );

        assert!(storage.delete("teski_v1").await.unwrap());
        let hit = storage.match_request("teski/v1", "k").await.unwrap().unwrap();
        assert_eq!(hit.body_text(), "slash");
    }

    #[tokio::test]
    async fn test_disk_corrupt_bucket_still_listed_and_deletable() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
        storage.open("teski-shell-v1").await.unwrap();
        std::fs::write(storage.bucket_path("teski-shell-v0"), "{truncated").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "unrelated").unwrap();

        assert_eq!(
            storage.keys().await.unwrap(),
            vec!["teski-shell-v0".to_string(), "teski-shell-v1".to_string()]
        );
        assert!(matches!(
            storage.entry_count("teski-shell-v0").await,
            Err(StorageError::Corrupt(_))
        ));

        assert!(storage.delete("teski-shell-v0").await.unwrap());
        assert_eq!(storage.keys().await.unwrap(), vec!["teski-shell-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_disk_open_recreates_corrupt_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
        std::fs::write(storage.bucket_path("v1"), "{truncated").unwrap();

        storage.open("v1").await.unwrap();

        assert_eq!(storage.entry_count("v1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disk_save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskCacheStorage::new(dir.path().to_path_buf()).unwrap();
        storage.open("v1").await.unwrap();
        storage
            .put("v1", "k", HttpResponse::basic(200, "x"))
            .await
            .unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(files, vec![format!("bucket-{}.json", hex::encode("v1"))]);
    }

    #[tokio::test]
    async fn test_last_cached_at_tracks_newest_entry() {
        let storage = MemoryCacheStorage::new();
        storage.open("v1").await.unwrap();
        assert_eq!(storage.last_cached_at("v1").await.unwrap(), None);

        let before = Utc::now();
        storage
            .put("v1", "k", HttpResponse::basic(200, "x"))
            .await
            .unwrap();

        let stamp = storage.last_cached_at("v1").await.unwrap().unwrap();
        assert!(stamp >= before);
        assert!(matches!(
            storage.last_cached_at("missing").await,
            Err(StorageError::BucketNotFound(_))
        ));
    }

    #[test]
    fn test_age_display() {
        assert_eq!(age_display(-5), "just now");
        assert_eq!(age_display(0), "just now");
        assert_eq!(age_display(45), "45m ago");
        assert_eq!(age_display(89), "1h ago");
        assert_eq!(age_display(90), "2h ago");
        assert_eq!(age_display(1440 + 11 * 60), "1d ago");
        assert_eq!(age_display(1440 + 12 * 60), "2d ago");
    }
}
