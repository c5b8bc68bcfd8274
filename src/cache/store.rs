//! Durable cache tier.
//!
//! [`DurableStore`] is the contract the tiered cache writes through to.
//! Values are opaque strings; expiry is both passed to the store (so it can
//! reclaim space) and recorded by the cache inside the value itself (so a
//! store with coarse or missing TTL support never serves stale data).
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryStore`]: moka-backed, bounded per namespace, per-entry TTL.
//!   Useful as a shared second tier inside one process and in tests.
//! - [`FileStore`]: one JSON file per key under a directory; survives
//!   restarts. Expired files are removed on read and by [`FileStore::sweep`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::unix_millis;
use crate::{HuginnError, Result};

/// A persistent key-value store backing the durable tier.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Store name for logging.
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every key starting with `prefix`, or everything when `None`.
    async fn clear(&self, prefix: Option<&str>) -> Result<()>;
}

// ============================================================================
// MemoryStore
// ============================================================================

/// Default maximum number of records per [`MemoryStore`] partition.
pub const DEFAULT_MEMORY_STORE_MAX: u64 = 50_000;

#[derive(Debug, Clone)]
struct StoredValue {
    data: String,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, StoredValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process durable tier backed by moka.
///
/// Keys are partitioned on the text before the first `:` (the cache writes
/// `namespace:hash`), and every partition is its own bounded moka cache.
/// Filling one partition never evicts another's records.
pub struct MemoryStore {
    max_per_partition: u64,
    partitions: RwLock<HashMap<String, Cache<String, StoredValue>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MEMORY_STORE_MAX)
    }

    /// Bound every partition to `max` records.
    pub fn with_max_entries(max: u64) -> Self {
        Self {
            max_per_partition: max,
            partitions: RwLock::new(HashMap::new()),
        }
    }

    fn partition_of(key: &str) -> &str {
        key.split_once(':').map_or("", |(partition, _)| partition)
    }

    fn existing(&self, key: &str) -> Option<Cache<String, StoredValue>> {
        self.partitions.read().get(Self::partition_of(key)).cloned()
    }

    fn partition(&self, key: &str) -> Cache<String, StoredValue> {
        let name = Self::partition_of(key);
        if let Some(cache) = self.partitions.read().get(name) {
            return cache.clone();
        }
        self.partitions
            .write()
            .entry(name.to_owned())
            .or_insert_with(|| {
                Cache::builder()
                    .max_capacity(self.max_per_partition)
                    .expire_after(PerEntryTtl)
                    .build()
            })
            .clone()
    }

    fn all_partitions(&self) -> Vec<Cache<String, StoredValue>> {
        self.partitions.read().values().cloned().collect()
    }

    /// Approximate number of records across all partitions.
    pub fn entry_count(&self) -> u64 {
        self.partitions.read().values().map(|c| c.entry_count()).sum()
    }

    /// Apply pending evictions and expirations now.
    pub async fn run_pending_tasks(&self) {
        for cache in self.all_partitions() {
            cache.run_pending_tasks().await;
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let Some(cache) = self.existing(key) else {
            return Ok(None);
        };
        Ok(cache.get(key).await.map(|v| v.data))
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.partition(key)
            .insert(key.to_owned(), StoredValue { data: value, ttl })
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if let Some(cache) = self.existing(key) {
            cache.invalidate(key).await;
        }
        Ok(())
    }

    async fn clear(&self, prefix: Option<&str>) -> Result<()> {
        for cache in self.all_partitions() {
            match prefix {
                None => cache.invalidate_all(),
                Some(prefix) => {
                    let keys: Vec<String> = cache
                        .iter()
                        .filter(|(k, _)| k.starts_with(prefix))
                        .map(|(k, _)| k.as_ref().clone())
                        .collect();
                    for key in keys {
                        cache.invalidate(&key).await;
                    }
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// FileStore
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct FileRecord {
    expires_at_ms: u64,
    value: String,
}

/// Directory-backed durable tier; one JSON file per key.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| HuginnError::Storage(format!("create {dir:?}: {e}")))?;
        Ok(Self { dir })
    }

    /// Default location: `~/.huginn/cache`.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".huginn").join("cache"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }

    async fn read_record(path: &Path) -> Result<Option<FileRecord>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HuginnError::Storage(format!("read {path:?}: {e}"))),
        }
    }

    async fn remove_file(path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HuginnError::Storage(format!("remove {path:?}: {e}"))),
        }
    }

    /// Delete every expired record; returns how many were removed.
    pub async fn sweep(&self) -> Result<usize> {
        let now = unix_millis(SystemTime::now());
        let mut removed = 0;
        for path in self.list_files(None).await? {
            match Self::read_record(&path).await? {
                Some(record) if record.expires_at_ms > now => {}
                _ => {
                    Self::remove_file(&path).await?;
                    removed += 1;
                }
            }
        }
        debug!(store = "file", removed, "swept expired records");
        Ok(removed)
    }

    async fn list_files(&self, prefix: Option<&str>) -> Result<Vec<PathBuf>> {
        let stem_prefix = prefix.map(file_stem);
        let mut dir = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| HuginnError::Storage(format!("list {:?}: {e}", self.dir)))?;
        let mut files = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| HuginnError::Storage(format!("list {:?}: {e}", self.dir)))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let matches = match (&stem_prefix, path.file_stem().and_then(|s| s.to_str())) {
                (None, _) => true,
                (Some(p), Some(stem)) => stem.starts_with(p.as_str()),
                (Some(_), None) => false,
            };
            if matches {
                files.push(path);
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl DurableStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match Self::read_record(&path).await? {
            Some(record) if record.expires_at_ms > unix_millis(SystemTime::now()) => {
                Ok(Some(record.value))
            }
            Some(_) => {
                Self::remove_file(&path).await?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let record = FileRecord {
            expires_at_ms: unix_millis(SystemTime::now() + ttl),
            value,
        };
        let bytes = serde_json::to_vec(&record)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| HuginnError::Storage(format!("write {tmp:?}: {e}")))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| HuginnError::Storage(format!("rename {tmp:?}: {e}")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        Self::remove_file(&self.path_for(key)).await
    }

    async fn clear(&self, prefix: Option<&str>) -> Result<()> {
        for path in self.list_files(prefix).await? {
            Self::remove_file(&path).await?;
        }
        Ok(())
    }
}

/// Map a key onto a safe file stem.
fn file_stem(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
