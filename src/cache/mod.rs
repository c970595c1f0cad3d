//! Response cache with pluggable backing stores
//!
//! Stores prior (user, message) → response mappings under TTL expiry, plus
//! opaque JSON snapshots (learned keywords, feedback history) at well-known
//! keys. The cache policy lives in [`ResponseCache`]; storage medium is
//! behind the [`CacheStore`] trait so memory and filesystem backends share
//! one contract.
//!
//! Storage failures are recovered by treating the operation as a miss or
//! no-op: routing must proceed without cached state.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::{CacheBackend, CacheConfig};
use crate::error::AppResult;
use crate::text::normalize;

/// Key prefix for cached conversational responses
const RESPONSE_PREFIX: &str = "msg";

/// Backing-store contract shared by all cache backends
///
/// Values are opaque string blobs. `ttl: None` means the entry never expires
/// (used for persistence snapshots); `Some(ttl)` entries must never be
/// returned once `now - created_at > ttl` and must be physically reclaimed,
/// lazily on access and by `purge_expired`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> AppResult<()>;
    async fn delete(&self, key: &str) -> AppResult<()>;
    async fn clear(&self) -> AppResult<()>;
    async fn has(&self, key: &str) -> AppResult<bool>;
    async fn len(&self) -> AppResult<usize>;
    /// Reclaim expired entries; returns how many were removed
    async fn purge_expired(&self) -> AppResult<usize>;
}

/// Hit/miss accounting exposed for observability
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub total_entries: usize,
}

/// Cache facade owning key derivation, default TTL, and counters
///
/// Response keys are `msg:{user}:{normalized message}` - identity depends
/// only on the user and the normalized text, never on timing or the route
/// decision, so a hit bypasses classification and dispatch entirely.
pub struct ResponseCache {
    store: Box<dyn CacheStore>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    /// Create a cache over an explicit store (used by tests and wiring)
    pub fn new(store: Box<dyn CacheStore>, default_ttl: Duration) -> Self {
        Self {
            store,
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Create a cache from configuration, selecting the backend
    pub fn from_config(config: &CacheConfig) -> AppResult<Self> {
        let store: Box<dyn CacheStore> = match config.backend {
            CacheBackend::Memory => Box::new(MemoryStore::new()),
            CacheBackend::File => Box::new(FileStore::new(&config.dir)?),
        };
        tracing::info!(backend = ?config.backend, ttl_seconds = config.ttl_seconds, "Response cache initialized");
        Ok(Self::new(store, config.ttl()))
    }

    fn response_key(user_id: &str, message: &str) -> String {
        format!("{}:{}:{}", RESPONSE_PREFIX, user_id, normalize(message))
    }

    /// Look up a cached response for a (user, message) pair
    ///
    /// Storage errors are logged and counted as misses.
    pub async fn get_response(&self, user_id: &str, message: &str) -> Option<String> {
        let key = Self::response_key(user_id, message);
        match self.store.get(&key).await {
            Ok(Some(value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cache read failed, treating as miss");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Cache a response under the default TTL
    ///
    /// Storage errors are logged and ignored; the pipeline already has the
    /// response in hand.
    pub async fn set_response(&self, user_id: &str, message: &str, response: &str) {
        let key = Self::response_key(user_id, message);
        if let Err(e) = self
            .store
            .set(&key, response.to_string(), Some(self.default_ttl))
            .await
        {
            tracing::warn!(error = %e, "Cache write failed, response not cached");
        }
    }

    /// Remove a single cached response
    pub async fn invalidate_response(&self, user_id: &str, message: &str) {
        let key = Self::response_key(user_id, message);
        if let Err(e) = self.store.delete(&key).await {
            tracing::warn!(error = %e, "Cache delete failed");
        }
    }

    /// Whether a fresh response exists for this (user, message) pair
    ///
    /// Does not touch hit/miss counters.
    pub async fn has_response(&self, user_id: &str, message: &str) -> bool {
        let key = Self::response_key(user_id, message);
        self.store.has(&key).await.unwrap_or(false)
    }

    /// Drop every entry and reset counters
    pub async fn clear(&self) {
        if let Err(e) = self.store.clear().await {
            tracing::warn!(error = %e, "Cache clear failed");
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Load a JSON snapshot stored at `key`
    ///
    /// Absence and deserialization failures both yield `None` - a missing or
    /// unreadable snapshot means cold start, never an error.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(key, error = %e, "Snapshot unreadable, starting cold");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "Snapshot read failed, starting cold");
                None
            }
        }
    }

    /// Persist a JSON snapshot at `key` without expiry
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key, error = %e, "Snapshot serialization failed");
                return;
            }
        };
        if let Err(e) = self.store.set(key, raw, None).await {
            tracing::warn!(key, error = %e, "Snapshot write failed");
        }
    }

    /// Current hit/miss statistics
    pub async fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            total_entries: self.store.len().await.unwrap_or(0),
        }
    }

    /// Spawn the periodic expiry sweep
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately, skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match cache.store.purge_expired().await {
                    Ok(0) => {}
                    Ok(removed) => {
                        tracing::debug!(removed, "Cache sweep reclaimed expired entries");
                    }
                    Err(e) => tracing::warn!(error = %e, "Cache sweep failed"),
                }
            }
        })
    }
}
