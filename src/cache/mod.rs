//! Key/value cache with per-entry TTL and pluggable backends
//!
//! Every component that remembers something between requests (fetched
//! responses, robots.txt records) goes through [`Cache`]. The backend is chosen
//! at construction by [`build_cache`]:
//!
//! - `memory` - process memory ([`MemoryBackend`])
//! - `sqlite` - a SQLite file on local disk ([`SqliteBackend`])
//! - `redis` - an external Redis server ([`RedisBackend`])
//!
//! Swapping the backend does not change caller semantics: values are
//! serialized to JSON bytes by the [`Cache`] wrapper, and an entry is either
//! fully present until its expiry instant or absent.

mod memory;
mod redis;
mod schema;
mod sqlite;

pub use self::redis::RedisBackend;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use crate::config::{CacheBackendKind, CacheConfig};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Errors raised by cache backends
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Storage contract every cache backend implements
///
/// Values are opaque bytes. A `ttl` of `None` keeps the entry until it is
/// removed explicitly.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Returns the stored value, or `None` if absent or expired
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Stores a value, replacing any previous entry under the same key
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()>;

    /// Removes an entry; removing an absent key is not an error
    async fn remove(&self, key: &str) -> CacheResult<()>;

    /// Returns true if an unexpired entry exists
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Deletes expired entries, returning how many were removed
    ///
    /// Backends whose store expires keys on its own keep the default.
    async fn purge_expired(&self) -> CacheResult<usize> {
        Ok(0)
    }

    /// Short backend name used in log output
    fn name(&self) -> &'static str;
}

/// Typed, namespaced handle over a shared [`CacheBackend`]
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    prefix: String,
}

impl Cache {
    /// Wraps a backend, prefixing every key with `prefix:`
    pub fn new(backend: Arc<dyn CacheBackend>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
        }
    }

    /// Creates a cache over a fresh in-memory backend
    pub fn in_memory(prefix: impl Into<String>) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), prefix)
    }

    /// Returns the backend name
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    /// Reads and deserializes a value
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.backend.get(&self.key(key)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Serializes and stores a value
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.backend.set(&self.key(key), bytes, ttl).await
    }

    /// Removes a value
    pub async fn remove(&self, key: &str) -> CacheResult<()> {
        self.backend.remove(&self.key(key)).await
    }

    /// Checks whether a value is present
    pub async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.backend.exists(&self.key(key)).await
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("backend", &self.backend.name())
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Builds the cache selected by configuration
///
/// # Returns
///
/// * `Ok(Cache)` - Backend is ready (for Redis, the server answered PING)
/// * `Err(CacheError)` - The backend could not be opened
pub async fn build_cache(config: &CacheConfig) -> CacheResult<Cache> {
    let backend: Arc<dyn CacheBackend> = match config.backend {
        CacheBackendKind::Memory => Arc::new(MemoryBackend::new()),
        CacheBackendKind::Sqlite => {
            Arc::new(SqliteBackend::open(std::path::Path::new(&config.path)).await?)
        }
        CacheBackendKind::Redis => {
            Arc::new(RedisBackend::connect(&config.url, config.pool_size).await?)
        }
    };

    spawn_sweeper(&backend, config.sweep_interval());
    tracing::info!(backend = backend.name(), prefix = %config.key_prefix, "Cache ready");
    Ok(Cache::new(backend, config.key_prefix.clone()))
}

/// Purges expired entries from `backend` every `every`
///
/// Entries that are never read again would otherwise stay stored. The task
/// holds only a weak reference and ends once the backend is dropped.
pub fn spawn_sweeper(backend: &Arc<dyn CacheBackend>, every: Duration) -> JoinHandle<()> {
    let backend: Weak<dyn CacheBackend> = Arc::downgrade(backend);
    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));

    tokio::spawn(async move {
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(backend) = backend.upgrade() else {
                break;
            };
            match backend.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => {
                    tracing::debug!(backend = backend.name(), removed, "Purged expired cache entries")
                }
                Err(e) => tracing::warn!(backend = backend.name(), error = %e, "Cache sweep failed"),
            }
        }
    })
}
