use crate::domain::ports::CacheStore;
use crate::infrastructure::cache::memory::MemoryCache;
use crate::infrastructure::cache::redis::RedisCache;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Two-tier cache: Redis primary with an in-process fallback.
///
/// Reads prefer Redis and fall back to memory on transport errors; writes go
/// to both tiers so a Redis outage degrades to process-local caching instead
/// of cold paths everywhere. Counter operations stay on a single tier to keep
/// rate-limit windows consistent.
pub struct TieredCache {
    redis: Option<Arc<RedisCache>>,
    memory: Arc<MemoryCache>,
    fallback_count: AtomicU64,
}

impl TieredCache {
    /// Connect to Redis when a URL is given; degrade to memory-only when the
    /// connection cannot be established.
    pub async fn connect(redis_url: Option<&str>) -> Self {
        let redis = match redis_url {
            Some(url) => match RedisCache::connect(url).await {
                Ok(cache) => Some(Arc::new(cache)),
                Err(e) => {
                    warn!(error = %e, "Redis unavailable, continuing with in-process cache only");
                    None
                }
            },
            None => None,
        };

        info!(redis_enabled = redis.is_some(), "Cache manager initialized");
        TieredCache {
            redis,
            memory: Arc::new(MemoryCache::new()),
            fallback_count: AtomicU64::new(0),
        }
    }

    pub fn memory_only() -> Self {
        TieredCache {
            redis: None,
            memory: Arc::new(MemoryCache::new()),
            fallback_count: AtomicU64::new(0),
        }
    }

    pub fn is_redis_available(&self) -> bool {
        self.redis.is_some()
    }

    pub fn fallback_count(&self) -> u64 {
        self.fallback_count.load(Ordering::Relaxed)
    }

    fn note_fallback(&self, op: &str, error: &anyhow::Error) {
        self.fallback_count.fetch_add(1, Ordering::Relaxed);
        warn!(op, error = %error, "Redis operation failed, using in-process tier");
    }
}

#[async_trait]
impl CacheStore for TieredCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(redis) = &self.redis {
            match redis.get(key).await {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => {}
                Err(e) => self.note_fallback("get", &e),
            }
        }
        self.memory.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        if let Some(redis) = &self.redis
            && let Err(e) = redis.set(key, value, ttl).await
        {
            self.note_fallback("set", &e);
        }
        self.memory.set(key, value, ttl).await
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        if let Some(redis) = &self.redis {
            match redis.incr(key).await {
                Ok(value) => return Ok(value),
                Err(e) => self.note_fallback("incr", &e),
            }
        }
        self.memory.incr(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        if let Some(redis) = &self.redis {
            match redis.expire(key, ttl).await {
                Ok(()) => return Ok(()),
                Err(e) => self.note_fallback("expire", &e),
            }
        }
        self.memory.expire(key, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if let Some(redis) = &self.redis
            && let Err(e) = redis.delete(key).await
        {
            self.note_fallback("delete", &e);
        }
        self.memory.delete(key).await
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        if let Some(redis) = &self.redis {
            match redis.scan_keys(pattern).await {
                Ok(keys) => return Ok(keys),
                Err(e) => self.note_fallback("scan", &e),
            }
        }
        self.memory.scan_keys(pattern).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_only_manager_serves_reads_and_writes() {
        let cache = TieredCache::memory_only();
        assert!(!cache.is_redis_available());

        cache
            .set("k", "v", Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(cache.fallback_count(), 0);
    }
}
