use anyhow::Result;
use moka::future::Cache;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

const MEMORY_CAPACITY: u64 = 10_000;

/// Response cache: moka in memory, Redis behind it when reachable.
pub struct CacheService {
    redis: Option<redis::aio::ConnectionManager>,
    memory: Cache<String, String>,
    ttl: Duration,
}

impl CacheService {
    pub async fn new(redis_url: Option<&str>, ttl: Duration) -> Self {
        let redis = match redis_url {
            Some(url) => Self::connect_redis(url).await,
            None => {
                tracing::info!("REDIS_URL not set, using memory cache only");
                None
            }
        };

        Self {
            redis,
            memory: Self::memory_cache(ttl),
            ttl,
        }
    }

    pub fn in_memory(ttl: Duration) -> Self {
        Self {
            redis: None,
            memory: Self::memory_cache(ttl),
            ttl,
        }
    }

    fn memory_cache(ttl: Duration) -> Cache<String, String> {
        Cache::builder()
            .max_capacity(MEMORY_CAPACITY)
            .time_to_live(ttl)
            .build()
    }

    async fn connect_redis(url: &str) -> Option<redis::aio::ConnectionManager> {
        match redis::Client::open(url) {
            Ok(client) => match client.get_connection_manager().await {
                Ok(conn) => {
                    tracing::info!("Redis connected successfully");
                    Some(conn)
                }
                Err(e) => {
                    tracing::warn!("Redis connection failed: {}, using memory cache only", e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Redis client creation failed: {}, using memory cache only", e);
                None
            }
        }
    }

    pub fn redis_connected(&self) -> bool {
        self.redis.is_some()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        if let Some(cached) = self.memory.get(key).await {
            if let Ok(value) = serde_json::from_str(&cached) {
                tracing::debug!("Memory cache hit for key: {}", key);
                return Ok(Some(value));
            }
        }

        if let Some(mut redis) = self.redis.clone() {
            match redis.get::<_, Option<String>>(key).await {
                Ok(Some(cached)) => {
                    if let Ok(value) = serde_json::from_str(&cached) {
                        self.memory.insert(key.to_string(), cached).await;
                        tracing::debug!("Redis cache hit for key: {}", key);
                        return Ok(Some(value));
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Redis get error: {}", e),
            }
        }

        tracing::debug!("Cache miss for key: {}", key);
        Ok(None)
    }

    /// Entries are immutable; a second `set` under the same key replaces the
    /// value wholesale.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let serialized = serde_json::to_string(value)?;

        self.memory.insert(key.to_string(), serialized.clone()).await;

        if let Some(mut redis) = self.redis.clone() {
            let ttl_secs = self.ttl.as_secs().max(1);
            if let Err(e) = redis.set_ex::<_, _, ()>(key, serialized, ttl_secs).await {
                tracing::warn!("Redis set error: {}", e);
            } else {
                tracing::debug!("Cached key: {} with TTL: {}s", key, ttl_secs);
            }
        }

        Ok(())
    }

    /// Counter increment. Without Redis, or when Redis fails, the delta is
    /// returned unchanged.
    pub async fn increment(&self, key: &str, delta: i64) -> i64 {
        let Some(mut redis) = self.redis.clone() else {
            return delta;
        };
        match redis.incr(key, delta).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Redis increment error: {}", e);
                delta
            }
        }
    }

    pub async fn ping(&self) -> bool {
        if let Some(mut redis) = self.redis.clone() {
            redis::cmd("PING")
                .query_async::<_, String>(&mut redis)
                .await
                .is_ok()
        } else {
            false
        }
    }
}
