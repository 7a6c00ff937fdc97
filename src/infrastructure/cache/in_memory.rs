//! In-process TTL cache backed by moka

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache as MokaCache;

use crate::domain::cache::Cache;
use crate::domain::DomainError;

/// Configuration for in-memory cache
#[derive(Debug, Clone)]
pub struct InMemoryCacheConfig {
    /// Maximum number of entries
    pub max_capacity: u64,
    /// Upper bound on any entry's lifetime, whatever TTL it was stored with
    pub max_ttl: Duration,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            max_ttl: Duration::from_secs(24 * 3600),
        }
    }
}

impl InMemoryCacheConfig {
    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = capacity;
        self
    }

    pub fn with_max_ttl(mut self, ttl: Duration) -> Self {
        self.max_ttl = ttl;
        self
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    data: String,
    inserted_at: DateTime<Utc>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Thread-safe cache with a per-entry TTL.
///
/// Expired entries are never returned; moka's own time-to-live bounds memory.
#[derive(Debug)]
pub struct InMemoryCache {
    cache: MokaCache<String, CacheEntry>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::with_config(InMemoryCacheConfig::default())
    }

    pub fn with_config(config: InMemoryCacheConfig) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(config.max_ttl)
            .build();

        Self { cache }
    }

    /// When a live entry was stored
    pub async fn inserted_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.cache
            .get(key)
            .await
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.inserted_at)
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError> {
        match self.cache.get(key).await {
            Some(entry) if entry.is_expired() => {
                self.cache.remove(key).await;
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.data)),
            None => Ok(None),
        }
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError> {
        let entry = CacheEntry {
            data: value.to_string(),
            inserted_at: Utc::now(),
            expires_at: Instant::now() + ttl,
        };

        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        Ok(self.cache.remove(key).await.is_some())
    }

    async fn clear(&self) -> Result<(), DomainError> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }

    async fn size(&self) -> Result<usize, DomainError> {
        self.cache.run_pending_tasks().await;
        Ok(self.cache.entry_count() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::CacheExt;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = InMemoryCache::new();

        cache
            .set("search:abc", &vec!["hit".to_string()], Duration::from_secs(60))
            .await
            .unwrap();

        let result: Option<Vec<String>> = cache.get("search:abc").await.unwrap();
        assert_eq!(result, Some(vec!["hit".to_string()]));
        assert!(cache.inserted_at("search:abc").await.is_some());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let cache = InMemoryCache::new();

        let result: Option<String> = cache.get("missing").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = InMemoryCache::new();
        cache.set_raw("key1", "\"v\"", Duration::from_secs(60)).await.unwrap();

        assert!(cache.delete("key1").await.unwrap());
        assert!(!cache.delete("key1").await.unwrap());
        assert!(cache.get_raw("key1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let cache = InMemoryCache::new();

        cache
            .set("key1", &"value1", Duration::from_millis(50))
            .await
            .unwrap();
        assert!(cache.get_raw("key1").await.unwrap().is_some());

        // moka and the entry TTL both run on the wall clock
        std::thread::sleep(Duration::from_millis(100));

        let result: Option<String> = cache.get("key1").await.unwrap();
        assert!(result.is_none());
        assert!(cache.inserted_at("key1").await.is_none());
    }

    #[tokio::test]
    async fn test_clear_and_size() {
        let cache = InMemoryCache::new();
        cache.set_raw("a", "1", Duration::from_secs(60)).await.unwrap();
        cache.set_raw("b", "2", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.size().await.unwrap(), 2);

        cache.clear().await.unwrap();
        assert_eq!(cache.size().await.unwrap(), 0);
    }
}
