//! In-process cache with per-entry expiry and bounded capacity

use async_trait::async_trait;
use moka::sync::Cache;
use moka::Expiry;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use voicelink_core::error::AppError;
use voicelink_core::traits::CacheService;

/// Entries kept before the least useful ones are evicted
pub const DEFAULT_CAPACITY: u64 = 10_000;

#[derive(Clone)]
struct Entry {
    value: String,
    ttl: Option<Duration>,
}

/// Expires each entry after the TTL it was written with
struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        entry.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        entry.ttl
    }
}

/// `CacheService` backed by a bounded `moka` cache
///
/// A TTL of 0 stores the entry without expiry; it still counts against the
/// capacity and is evicted like any other entry. Counters created by `incr`
/// live outside the bounded cache and are never evicted.
pub struct MemoryCache {
    entries: Cache<String, Entry>,
    counters: Mutex<HashMap<String, i64>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(max_entries: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_entries)
                .expire_after(EntryTtl)
                .build(),
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live entries, after pending evictions have run
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize + self.counters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheService for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        if let Some(counter) = self.counters.lock().get(key) {
            return Ok(Some(counter.to_string()));
        }
        Ok(self.entries.get(key).map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), AppError> {
        self.counters.lock().remove(key);
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                ttl: (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let counter = self.counters.lock().remove(key).is_some();
        let entry = self.entries.remove(key).is_some();
        Ok(counter || entry)
    }

    async fn incr(&self, key: &str) -> Result<i64, AppError> {
        let mut counters = self.counters.lock();
        if let Some(counter) = counters.get_mut(key) {
            *counter += 1;
            return Ok(*counter);
        }

        let current = match self.entries.get(key) {
            Some(entry) => entry.value.parse::<i64>().map_err(|_| {
                AppError::Cache(format!("value at {} is not an integer", key))
            })?,
            None => 0,
        };
        self.entries.invalidate(key);
        counters.insert(key.to_string(), current + 1);
        Ok(current + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCache::new();
        cache.set("k", "v", 60).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_incr_creates_counter() {
        let cache = MemoryCache::new();
        assert_eq!(cache.incr("gen").await.unwrap(), 1);
        assert_eq!(cache.incr("gen").await.unwrap(), 2);

        cache.set("text", "abc", 0).await.unwrap();
        assert!(cache.incr("text").await.is_err());
    }

    #[tokio::test]
    async fn test_superseded_generations_are_evicted_after_ttl() {
        let cache = MemoryCache::new();
        for generation in 0..50 {
            for n in 0..100 {
                let key = keys::rate_key(generation, &format!("+880{}", n));
                cache.set(&key, "{}", 1).await.unwrap();
            }
        }
        assert_eq!(cache.len(), 5000);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        cache.set(&keys::rate_key(50, "+880"), "{}", 1).await.unwrap();

        assert_eq!(cache.get(&keys::rate_key(0, "+8800")).await.unwrap(), None);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_bounds_entries_without_ttl() {
        let cache = MemoryCache::with_capacity(100);
        for n in 0..1000 {
            cache.set(&format!("k{}", n), "v", 0).await.unwrap();
        }
        assert!(cache.len() <= 100);
    }

    #[tokio::test]
    async fn test_counter_survives_capacity_pressure() {
        let cache = MemoryCache::with_capacity(10);
        let generation_key = keys::rate_generation_key();
        assert_eq!(cache.incr(&generation_key).await.unwrap(), 1);
        for n in 0..500 {
            cache.set(&keys::rate_key(1, &format!("+{}", n)), "{}", 60).await.unwrap();
        }
        assert_eq!(cache.get(&generation_key).await.unwrap(), Some("1".to_string()));
        assert_eq!(cache.incr(&generation_key).await.unwrap(), 2);
    }
}
