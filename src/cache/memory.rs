//! In-memory cache store
//!
//! Default backend. Entries carry their own TTL; expiry is checked lazily on
//! access and reclaimed in bulk by `purge_expired`. Uses `tokio::time::Instant`
//! so paused-clock tests can exercise expiry deterministically.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::CacheStore;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    created_at: Instant,
    ttl: Option<Duration>,
    hits: u64,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.duration_since(self.created_at) > ttl,
            None => false,
        }
    }
}

/// Thread-safe in-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| AppError::Storage("memory store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        match entries.get_mut(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => {
                entry.hits += 1;
                Ok(Some(entry.value.clone()))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> AppResult<()> {
        let mut entries = self.lock()?;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                created_at: Instant::now(),
                ttl,
                hits: 0,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        self.lock()?.clear();
        Ok(())
    }

    async fn has(&self, key: &str) -> AppResult<bool> {
        let now = Instant::now();
        let entries = self.lock()?;
        Ok(entries.get(key).is_some_and(|e| !e.is_expired(now)))
    }

    async fn len(&self) -> AppResult<usize> {
        let now = Instant::now();
        let entries = self.lock()?;
        Ok(entries.values().filter(|e| !e.is_expired(now)).count())
    }

    async fn purge_expired(&self) -> AppResult<usize> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        Ok(before - entries.len())
    }
}
