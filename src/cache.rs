// Copyright (c) 2025 - Cowboy AI, Inc.
//! Key-value cache with per-entry expiration
//!
//! The cache knows nothing about aggregates: it stores type-erased values
//! under string keys. Which aggregate types are cached, and with which
//! policy, is decided by [`AggregateService`](crate::service::AggregateService).
//!
//! ```text
//! entry ── absolute expiration: dropped `absolute` after insertion
//!       └─ sliding expiration:  dropped `sliding` after the last read or write
//! ```
//!
//! Entries written through [`Cache::set_if_newer`] carry a version. A live
//! entry is never replaced by a value with a lower version, so a slow reader
//! cannot overwrite what a concurrent writer stored after it.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Type-erased cached value
pub type CacheValue = Arc<dyn Any + Send + Sync>;

/// Default sliding expiration for cached entries
pub const DEFAULT_SLIDING_EXPIRATION: Duration = Duration::from_secs(5 * 60);

/// Expiration policy of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntryOptions {
    /// Lifetime measured from insertion
    pub absolute_expiration: Option<Duration>,

    /// Lifetime measured from the last access
    pub sliding_expiration: Option<Duration>,
}

impl Default for CacheEntryOptions {
    fn default() -> Self {
        Self {
            absolute_expiration: None,
            sliding_expiration: Some(DEFAULT_SLIDING_EXPIRATION),
        }
    }
}

impl CacheEntryOptions {
    /// Entries that live until removed
    pub fn never_expire() -> Self {
        Self {
            absolute_expiration: None,
            sliding_expiration: None,
        }
    }

    pub fn with_absolute_expiration(mut self, expiration: Duration) -> Self {
        self.absolute_expiration = Some(expiration);
        self
    }

    pub fn with_sliding_expiration(mut self, expiration: Duration) -> Self {
        self.sliding_expiration = Some(expiration);
        self
    }
}

/// Shared, concurrently accessible cache
#[async_trait]
pub trait Cache: Send + Sync {
    /// Read a live entry (refreshes sliding expiration)
    async fn get(&self, key: &str) -> Option<CacheValue>;

    /// Insert or overwrite an entry
    async fn set(&self, key: &str, value: CacheValue, options: CacheEntryOptions);

    /// Insert unless a live entry holds a higher version
    ///
    /// Returns whether the value was stored.
    async fn set_if_newer(&self, key: &str, value: CacheValue, version: i64, options: CacheEntryOptions) -> bool;

    async fn remove(&self, key: &str);
}

#[derive(Debug)]
struct Entry {
    value: CacheValue,
    version: Option<i64>,
    options: CacheEntryOptions,
    inserted: Instant,
    last_access: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        let absolute = self
            .options
            .absolute_expiration
            .is_some_and(|ttl| now.duration_since(self.inserted) >= ttl);
        let sliding = self
            .options
            .sliding_expiration
            .is_some_and(|ttl| now.duration_since(self.last_access) >= ttl);
        absolute || sliding
    }
}

/// In-process [`Cache`] guarded by a tokio `RwLock`
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until purged
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every expired entry
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<CacheValue> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        match entries.get_mut(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => {
                entry.last_access = now;
                Some(entry.value.clone())
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, value: CacheValue, options: CacheEntryOptions) {
        let now = Instant::now();
        self.entries.write().await.insert(
            key.to_string(),
            Entry {
                value,
                version: None,
                options,
                inserted: now,
                last_access: now,
            },
        );
    }

    async fn set_if_newer(&self, key: &str, value: CacheValue, version: i64, options: CacheEntryOptions) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        let newer_stored = entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.version)
            .is_some_and(|stored| stored > version);
        if newer_stored {
            return false;
        }

        entries.insert(
            key.to_string(),
            Entry {
                value,
                version: Some(version),
                options,
                inserted: now,
                last_access: now,
            },
        );
        true
    }

    async fn remove(&self, key: &str) {
        self.entries.write().await.remove(key);
    }
}
