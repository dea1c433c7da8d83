//! Redis caching layer for VoiceLink billing
//!
//! Implements the `CacheService` trait from voicelink-core on top of a Redis
//! `ConnectionManager`, plus an in-process [`MemoryCache`] used when Redis
//! is unavailable and in tests.
//!
//! # Example
//!
//! ```no_run
//! use voicelink_cache::{get_json, set_json, RedisCache};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = RedisCache::new("redis://127.0.0.1:6379").await?;
//!
//!     set_json(&cache, "my_key", &"my_value", 60).await?;
//!     let value: Option<String> = get_json(&cache, "my_key").await?;
//!     assert_eq!(value, Some("my_value".to_string()));
//!
//!     Ok(())
//! }
//! ```

pub mod keys;
pub mod memory;

pub use memory::MemoryCache;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, warn};
use voicelink_core::error::AppError;
use voicelink_core::traits::CacheService;

/// Redis cache implementation with connection pooling
///
/// Wraps a Redis ConnectionManager to provide efficient, multiplexed access
/// to Redis.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    /// Create a new Redis cache instance
    ///
    /// # Errors
    ///
    /// Returns `AppError::CacheConnection` if the connection fails
    pub async fn new(url: &str) -> Result<Self, AppError> {
        debug!("Connecting to Redis at {}", url);

        let client = Client::open(url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            AppError::CacheConnection(format!("Invalid Redis URL: {}", e))
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to establish Redis connection: {}", e);
            AppError::CacheConnection(format!("Connection failed: {}", e))
        })?;

        debug!("Redis connection established successfully");
        Ok(Self { manager })
    }

    /// Ping the Redis server to check connectivity
    pub async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Redis ping failed: {}", e);
                AppError::Cache(format!("Ping failed: {}", e))
            })?;
        Ok(())
    }

    /// Convert RedisError to AppError
    fn map_redis_error(err: RedisError) -> AppError {
        match err.kind() {
            redis::ErrorKind::IoError => {
                error!("Redis I/O error: {}", err);
                AppError::CacheConnection(format!("I/O error: {}", err))
            }
            redis::ErrorKind::TypeError => {
                warn!("Redis type error: {}", err);
                AppError::Cache(format!("Type mismatch: {}", err))
            }
            _ => {
                error!("Redis error: {}", err);
                AppError::Cache(err.to_string())
            }
        }
    }
}

#[async_trait]
impl CacheService for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        debug!("GET {}", key);
        let mut conn = self.manager.clone();

        let result: Option<String> = conn.get(key).await.map_err(Self::map_redis_error)?;
        if result.is_some() {
            debug!("Cache HIT: {}", key);
        } else {
            debug!("Cache MISS: {}", key);
        }

        Ok(result)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), AppError> {
        debug!("SET {} (TTL: {}s)", key, ttl_secs);
        let mut conn = self.manager.clone();

        let _: () = conn
            .set_ex(key, value, ttl_secs)
            .await
            .map_err(Self::map_redis_error)?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        debug!("DEL {}", key);
        let mut conn = self.manager.clone();

        let deleted: i32 = conn.del(key).await.map_err(Self::map_redis_error)?;

        Ok(deleted > 0)
    }

    async fn incr(&self, key: &str) -> Result<i64, AppError> {
        debug!("INCR {}", key);
        let mut conn = self.manager.clone();

        let value: i64 = conn.incr(key, 1).await.map_err(Self::map_redis_error)?;

        Ok(value)
    }
}

/// Get a value from cache and deserialize it from JSON
pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn CacheService,
    key: &str,
) -> Result<Option<T>, AppError> {
    match cache.get(key).await? {
        Some(json) => {
            let value = serde_json::from_str::<T>(&json).map_err(|e| {
                error!("Failed to deserialize value for key {}: {}", key, e);
                AppError::Serialization(format!("Deserialization failed: {}", e))
            })?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Serialize a value to JSON and store it with TTL
pub async fn set_json<T: Serialize + Sync>(
    cache: &dyn CacheService,
    key: &str,
    value: &T,
    ttl_secs: u64,
) -> Result<(), AppError> {
    let json = serde_json::to_string(value).map_err(|e| {
        error!("Failed to serialize value for key {}: {}", key, e);
        AppError::Serialization(format!("Serialization failed: {}", e))
    })?;

    cache.set(key, &json, ttl_secs).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestData {
        id: i32,
        name: String,
    }

    #[tokio::test]
    async fn test_json_helpers_round_trip_through_memory_cache() {
        let cache = MemoryCache::new();
        let data = TestData {
            id: 7,
            name: "Bangladesh Mobile".to_string(),
        };

        set_json(&cache, "test:json", &data, 60).await.unwrap();
        let loaded: Option<TestData> = get_json(&cache, "test:json").await.unwrap();
        assert_eq!(loaded, Some(data));

        let missing: Option<TestData> = get_json(&cache, "test:missing").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_get_json_rejects_garbage() {
        let cache = MemoryCache::new();
        cache.set("test:bad", "not json", 60).await.unwrap();
        let result: Result<Option<TestData>, _> = get_json(&cache, "test:bad").await;
        assert!(matches!(result, Err(AppError::Serialization(_))));
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_redis_incr_and_expiry() {
        let cache = RedisCache::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");
        cache.ping().await.unwrap();

        let key = "test:voicelink:counter";
        cache.delete(key).await.unwrap();
        assert_eq!(cache.incr(key).await.unwrap(), 1);
        assert_eq!(cache.incr(key).await.unwrap(), 2);
        assert!(cache.delete(key).await.unwrap());

        cache.set("test:voicelink:ttl", "v", 1).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        assert!(cache.get("test:voicelink:ttl").await.unwrap().is_none());
    }
}
