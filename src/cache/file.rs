//! Filesystem-backed cache store
//!
//! One JSON file per entry, named by the SHA-256 digest of the key so
//! arbitrary key text never reaches the filesystem. Timestamps are unix
//! millis because entries must survive process restarts; the store is
//! best-effort, not a durability guarantee.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::CacheStore;
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    value: String,
    created_at_ms: u64,
    ttl_ms: Option<u64>,
    hits: u64,
}

impl FileEntry {
    fn is_expired(&self, now_ms: u64) -> bool {
        match self.ttl_ms {
            Some(ttl_ms) => now_ms.saturating_sub(self.created_at_ms) > ttl_ms,
            None => false,
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Filesystem store rooted at a cache directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create the store, making the cache directory if needed
    pub fn new(dir: impl AsRef<Path>) -> AppResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| {
            AppError::Storage(format!("failed to create cache dir {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{:x}.json", digest))
    }

    async fn read_entry(&self, path: &Path) -> AppResult<Option<FileEntry>> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => {
                let entry: FileEntry = serde_json::from_str(&raw).map_err(|e| {
                    AppError::Storage(format!("corrupt cache file {}: {}", path.display(), e))
                })?;
                Ok(Some(entry))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Storage(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let path = self.entry_path(key);
        match self.read_entry(&path).await? {
            Some(entry) if entry.is_expired(now_ms()) => {
                let _ = tokio::fs::remove_file(&path).await;
                Ok(None)
            }
            Some(mut entry) => {
                entry.hits += 1;
                // Hit accounting is best-effort; a failed write-back must
                // not turn a readable entry into a miss
                if let Ok(raw) = serde_json::to_string(&entry) {
                    let _ = tokio::fs::write(&path, raw).await;
                }
                Ok(Some(entry.value))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> AppResult<()> {
        let path = self.entry_path(key);
        let entry = FileEntry {
            value,
            created_at_ms: now_ms(),
            ttl_ms: ttl.map(|t| t.as_millis() as u64),
            hits: 0,
        };
        let raw = serde_json::to_string(&entry)
            .map_err(|e| AppError::Storage(format!("serialize cache entry: {}", e)))?;
        tokio::fs::write(&path, raw)
            .await
            .map_err(|e| AppError::Storage(format!("failed to write {}: {}", path.display(), e)))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let path = self.entry_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!(
                "failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn clear(&self) -> AppResult<()> {
        let mut dir = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| AppError::Storage(format!("failed to list cache dir: {}", e)))?;
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| AppError::Storage(format!("failed to list cache dir: {}", e)))?
        {
            if item.path().extension().is_some_and(|ext| ext == "json") {
                let _ = tokio::fs::remove_file(item.path()).await;
            }
        }
        Ok(())
    }

    async fn has(&self, key: &str) -> AppResult<bool> {
        let path = self.entry_path(key);
        Ok(self
            .read_entry(&path)
            .await?
            .is_some_and(|e| !e.is_expired(now_ms())))
    }

    async fn len(&self) -> AppResult<usize> {
        let mut dir = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| AppError::Storage(format!("failed to list cache dir: {}", e)))?;
        let mut count = 0;
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| AppError::Storage(format!("failed to list cache dir: {}", e)))?
        {
            if item.path().extension().is_some_and(|ext| ext == "json") {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn purge_expired(&self) -> AppResult<usize> {
        let now = now_ms();
        let mut dir = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| AppError::Storage(format!("failed to list cache dir: {}", e)))?;
        let mut removed = 0;
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| AppError::Storage(format!("failed to list cache dir: {}", e)))?
        {
            let path = item.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            // Unreadable files are skipped, not treated as fatal: a partial
            // write from a crashed process must not break the sweep
            let expired = match self.read_entry(&path).await {
                Ok(Some(entry)) => entry.is_expired(now),
                Ok(None) => false,
                Err(_) => true,
            };
            if expired && tokio::fs::remove_file(&path).await.is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
