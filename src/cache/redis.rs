//! Redis cache backend
//!
//! Entry expiry is delegated to Redis (`PSETEX`), so TTLs hold across every
//! worker sharing the server.

use crate::cache::{CacheBackend, CacheError, CacheResult};
use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::AsyncCommands;
use std::time::Duration;

/// Cache backend on an external Redis server
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
}

impl RedisBackend {
    /// Builds a connection pool and checks the server answers PING
    pub async fn connect(url: &str, pool_size: usize) -> CacheResult<Self> {
        let pool = PoolConfig::from_url(url)
            .builder()
            .map_err(|e| CacheError::Pool(e.to_string()))?
            .max_size(pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| CacheError::Pool(e.to_string()))?;

        let backend = Self { pool };
        let mut conn = backend.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        tracing::info!(url = %url, "Connected to Redis");
        Ok(backend)
    }

    async fn connection(&self) -> CacheResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::Pool(e.to_string()))
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        match ttl {
            // PSETEX rejects 0, and a zero TTL means the entry is already stale.
            Some(ttl) if ttl.is_zero() => conn.del::<_, ()>(key).await?,
            Some(ttl) => {
                conn.pset_ex::<_, _, ()>(key, value, ttl.as_millis() as u64)
                    .await?
            }
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection().await?;
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
