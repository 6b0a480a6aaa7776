// In-process row cache
//
// LRU store with per-entry TTL that serves the cache strategy when no
// external key/value store is wired in. Keys follow the table's key
// pattern, values are single rows keyed by column API name.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::models::Row;
use crate::services::providers::CacheProvider;

#[derive(Debug, Clone)]
struct CachedRow {
    row: Row,
    stored_at: Instant,
    ttl: Duration,
}

impl CachedRow {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() > self.ttl
    }
}

/// Access-order bookkeeping for eviction
#[derive(Debug, Clone)]
struct LruEntry {
    key: String,
    last_accessed: Instant,
}

#[derive(Debug, Default)]
struct Store {
    rows: HashMap<String, CachedRow>,
    lru: Vec<LruEntry>,
    stats: CacheStats,
}

impl Store {
    fn forget(&mut self, key: &str) {
        self.rows.remove(key);
        self.lru.retain(|entry| entry.key != key);
    }

    fn touch(&mut self, key: &str) {
        match self.lru.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.last_accessed = Instant::now(),
            None => self.lru.push(LruEntry {
                key: key.to_string(),
                last_accessed: Instant::now(),
            }),
        }
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .lru
            .iter()
            .enumerate()
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(idx, _)| idx);

        if let Some(idx) = oldest {
            let entry = self.lru.remove(idx);
            self.rows.remove(&entry.key);
            self.stats.evictions += 1;
            tracing::debug!("Evicted cached row: {}", entry.key);
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    /// Hit ratio in `0.0..=1.0`
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Row cache with LRU eviction and TTL expiry
pub struct MemoryCacheProvider {
    store: Mutex<Store>,
    max_entries: usize,
    default_ttl: Duration,
}

impl MemoryCacheProvider {
    /// # Arguments
    /// * `max_entries` - Capacity before the least recently used row is evicted
    /// * `default_ttl_secs` - Lifetime of rows stored without an explicit TTL
    pub fn new(max_entries: usize, default_ttl_secs: u64) -> Self {
        Self {
            store: Mutex::new(Store::default()),
            max_entries: max_entries.max(1),
            default_ttl: Duration::from_secs(default_ttl_secs),
        }
    }

    // A poisoned lock only means another caller panicked mid-update; the
    // map itself is still usable.
    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up one row, counting the hit or miss
    pub fn get(&self, key: &str) -> Option<Row> {
        let mut store = self.lock();

        match store.rows.get(key).map(CachedRow::is_expired) {
            None => {
                store.stats.misses += 1;
                tracing::debug!("Cache miss for key: {}", key);
                None
            }
            Some(true) => {
                store.forget(key);
                store.stats.misses += 1;
                store.stats.expirations += 1;
                tracing::debug!("Cache expired for key: {}", key);
                None
            }
            Some(false) => {
                store.stats.hits += 1;
                store.touch(key);
                store.rows.get(key).map(|cached| cached.row.clone())
            }
        }
    }

    /// Store a row, replacing any previous value under `key`
    pub fn put(&self, key: impl Into<String>, row: Row, ttl: Option<Duration>) {
        let key = key.into();
        let mut store = self.lock();

        if store.rows.len() >= self.max_entries && !store.rows.contains_key(&key) {
            store.evict_lru();
        }

        store.rows.insert(
            key.clone(),
            CachedRow {
                row,
                stored_at: Instant::now(),
                ttl: ttl.unwrap_or(self.default_ttl),
            },
        );
        store.touch(&key);

        tracing::debug!("Cached row for key: {} (cache size: {})", key, store.rows.len());
    }

    pub fn clear(&self) {
        let mut store = self.lock();
        let count = store.rows.len();
        store.rows.clear();
        store.lru.clear();
        tracing::info!("Cleared {} cached rows", count);
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats.clone()
    }

    pub fn size(&self) -> usize {
        self.lock().rows.len()
    }

    /// Drop every expired row; returns how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let mut store = self.lock();
        let expired: Vec<String> = store
            .rows
            .iter()
            .filter(|(_, cached)| cached.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            store.forget(key);
            store.stats.expirations += 1;
        }

        if !expired.is_empty() {
            tracing::info!("Cleaned up {} expired cached rows", expired.len());
        }
        expired.len()
    }
}

impl Default for MemoryCacheProvider {
    fn default() -> Self {
        Self::new(1000, 300)
    }
}

#[async_trait]
impl CacheProvider for MemoryCacheProvider {
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Option<Row>>> {
        Ok(keys.iter().map(|key| (key.clone(), self.get(key))).collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.clear();
        Ok(())
    }
}
