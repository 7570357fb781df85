//! Fast cache backend: in-process (DashMap) or shared (Redis).

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::AsyncCommands;

/// Errors raised when writing to the fast cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Redis rejected the command.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// No Redis connection could be checked out of the pool.
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),
}

/// A cached entry with TTL support.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub value: Arc<str>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    /// Create a new cached entry.
    pub fn new(value: &str, ttl: Duration) -> Self {
        Self {
            value: Arc::from(value),
            cached_at: Instant::now(),
            ttl,
        }
    }

    /// Check if this entry has expired.
    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() >= self.ttl
    }
}

/// Key-value fast cache with per-key TTL.
///
/// ## Cache Modes
///
/// - **Local**: Single-instance mode, entries live in a DashMap
/// - **Redis**: Multi-instance mode, entries live in Redis and expire via `SET EX`
///
/// Reads never fail: backend errors are logged and reported as a miss.
/// Writes are awaited so that a read issued after a write observes it.
#[derive(Clone)]
pub enum CacheBackend {
    /// Single-instance: local DashMap only
    Local(Arc<DashMap<String, CachedEntry>>),

    /// Multi-instance: shared Redis
    Redis(Pool),
}

impl CacheBackend {
    /// Create a new local-only cache backend.
    pub fn new_local() -> Self {
        CacheBackend::Local(Arc::new(DashMap::new()))
    }

    /// Create a new Redis-backed cache backend.
    pub fn new_redis(redis_pool: Pool) -> Self {
        CacheBackend::Redis(redis_pool)
    }

    /// Get a value from the cache.
    pub async fn get(&self, key: &str) -> Option<String> {
        match self {
            CacheBackend::Local(map) => {
                let hit = map
                    .get(key)
                    .map(|entry| (!entry.is_expired()).then(|| entry.value.to_string()));
                match hit {
                    Some(Some(value)) => Some(value),
                    Some(None) => {
                        // A concurrent set may have replaced the entry since the read.
                        map.remove_if(key, |_, entry| entry.is_expired());
                        None
                    }
                    None => None,
                }
            }
            CacheBackend::Redis(redis) => match redis.get().await {
                Ok(mut conn) => match conn.get::<_, Option<String>>(key).await {
                    Ok(value) => {
                        tracing::trace!(key = %key, hit = value.is_some(), "cache lookup");
                        value
                    }
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Redis GET error");
                        None
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to get Redis connection");
                    None
                }
            },
        }
    }

    /// Set a value in the cache with TTL, replacing any previous value and TTL.
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        match self {
            CacheBackend::Local(map) => {
                map.insert(key.to_string(), CachedEntry::new(value, ttl));
                Ok(())
            }
            CacheBackend::Redis(redis) => {
                // Redis expiry has one second resolution.
                let ttl_secs = ttl.as_secs().max(1);
                let mut conn = redis.get().await?;
                conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
                tracing::trace!(key = %key, ttl_secs = %ttl_secs, "cache set");
                Ok(())
            }
        }
    }

    /// Remove expired entries (local mode only; Redis expires keys itself).
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let CacheBackend::Local(map) = self else {
            return 0;
        };

        let before = map.len();
        map.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(map.len())
    }

    /// Spawn a task that periodically evicts expired local entries.
    pub fn spawn_cleanup_task(&self, period: Duration) -> Option<tokio::task::JoinHandle<()>> {
        if !matches!(self, CacheBackend::Local(_)) {
            return None;
        }

        let backend = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let removed = backend.cleanup_expired();
                if removed > 0 {
                    tracing::debug!(removed, "evicted expired cache entries");
                }
            }
        }))
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        match self {
            CacheBackend::Local(map) => CacheStats {
                local_entries: map.len(),
                mode: "local".to_string(),
            },
            CacheBackend::Redis(_) => CacheStats {
                local_entries: 0,
                mode: "redis".to_string(),
            },
        }
    }

    /// Get the local cache reference (for testing/internal use).
    pub fn local_cache(&self) -> Option<&Arc<DashMap<String, CachedEntry>>> {
        match self {
            CacheBackend::Local(map) => Some(map),
            CacheBackend::Redis(_) => None,
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub local_entries: usize,
    pub mode: String,
}
