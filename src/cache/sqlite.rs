//! SQLite cache backend
//!
//! Entries survive restarts. rusqlite is blocking, so every statement runs on
//! tokio's blocking pool behind a mutex-guarded connection.

use crate::cache::schema::initialize_schema;
use crate::cache::{CacheBackend, CacheError, CacheResult};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Cache backend stored in a local SQLite file
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Opens (or creates) the cache database at `path`
    pub async fn open(path: &Path) -> CacheResult<Self> {
        let path = path.to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> CacheResult<Connection> {
            let conn = Connection::open(&path)?;
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA temp_store = MEMORY;
            ",
            )?;
            initialize_schema(&conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| CacheError::Task(e.to_string()))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory database (for testing)
    pub fn open_in_memory() -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, op: F) -> CacheResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> CacheResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| CacheError::Task("cache connection lock poisoned".to_string()))?;
            op(&guard)
        })
        .await
        .map_err(|e| CacheError::Task(e.to_string()))?
    }
}

#[async_trait]
impl CacheBackend for SqliteBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let key = key.to_string();
        self.run(move |conn| {
            let row: Option<(Vec<u8>, Option<i64>)> = conn
                .query_row(
                    "SELECT value, expires_at FROM cache_entries WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match row {
                Some((_, Some(expires_at))) if expires_at <= Utc::now().timestamp_millis() => {
                    conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
                    Ok(None)
                }
                Some((value, _)) => Ok(Some(value)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        let key = key.to_string();
        self.run(move |conn| {
            let now = Utc::now();
            let expires_at = ttl.map(|ttl| {
                let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
                now.timestamp_millis().saturating_add(millis)
            });
            conn.execute(
                "INSERT OR REPLACE INTO cache_entries (key, value, expires_at, written_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![key, value, expires_at, now.to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        let key = key.to_string();
        self.run(move |conn| {
            conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn purge_expired(&self) -> CacheResult<usize> {
        self.run(|conn| {
            let removed = conn.execute(
                "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![Utc::now().timestamp_millis()],
            )?;
            Ok(removed)
        })
        .await
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_remove() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.set("k", b"v".to_vec(), None).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some(b"v".to_vec()));

        backend.remove("k").await.unwrap();
        assert!(!backend.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_unbounded_ttl_never_expires() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.set("k", b"v".to_vec(), Some(Duration::MAX)).await.unwrap();
        assert!(backend.exists("k").await.unwrap());
        assert_eq!(backend.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend
            .set("k", b"v".to_vec(), Some(Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend
            .set("old", b"v".to_vec(), Some(Duration::ZERO))
            .await
            .unwrap();
        backend
            .set("fresh", b"v".to_vec(), Some(Duration::from_secs(3600)))
            .await
            .unwrap();

        assert_eq!(backend.purge_expired().await.unwrap(), 1);
        assert!(backend.exists("fresh").await.unwrap());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let backend = SqliteBackend::open(&path).await.unwrap();
            backend.set("k", b"kept".to_vec(), None).await.unwrap();
        }

        let reopened = SqliteBackend::open(&path).await.unwrap();
        assert_eq!(reopened.get("k").await.unwrap(), Some(b"kept".to_vec()));
    }
}
