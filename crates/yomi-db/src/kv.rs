//! Expiring key/value storage.
//!
//! Two implementations share the [`KvStore`] trait: [`SqliteKvStore`] keeps
//! entries in the `kv_entries` table so they survive a restart, and
//! [`MemoryKvStore`] keeps them in process memory.

use crate::DbPool;
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Errors returned by key/value operations.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("failed to get database connection: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("in-memory store lock poisoned")]
    Poisoned,
}

/// Byte-valued store with optional per-entry expiry.
///
/// Expired entries are never returned by `get` or `scan_prefix`, whether or
/// not `purge_expired` has run.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns the live value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    /// Stores `value` under `key`, replacing any previous entry. `None`
    /// means the entry never expires.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), KvError>;

    /// Removes `key`. Returns whether an entry existed.
    async fn delete(&self, key: &str) -> Result<bool, KvError>;

    /// Returns every live entry whose key starts with `prefix`, ordered by key.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, KvError>;

    /// Drops expired entries and returns how many were removed.
    async fn purge_expired(&self) -> Result<usize, KvError>;
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn expiry_ms(ttl: Option<Duration>) -> Option<i64> {
    ttl.map(|ttl| now_ms().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)))
}

/// [`KvStore`] backed by the `kv_entries` table.
#[derive(Clone)]
pub struct SqliteKvStore {
    pool: DbPool,
}

impl SqliteKvStore {
    /// Wraps a pool whose database has been migrated.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, KvError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T, KvError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await?
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM kv_entries
                     WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                    params![key, now_ms()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), KvError> {
        let key = key.to_string();
        let value = value.to_vec();
        let expires_at = expiry_ms(ttl);
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO kv_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     expires_at = excluded.expires_at",
                params![key, value, expires_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM kv_entries WHERE key = ?1", [key])?;
            Ok(removed > 0)
        })
        .await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, KvError> {
        let prefix = prefix.to_string();
        self.with_conn(move |conn| {
            // substr avoids LIKE wildcard escaping for keys containing '%' or '_'.
            let mut stmt = conn.prepare(
                "SELECT key, value FROM kv_entries
                 WHERE substr(key, 1, length(?1)) = ?1
                   AND (expires_at IS NULL OR expires_at > ?2)
                 ORDER BY key",
            )?;
            let rows = stmt
                .query_map(params![prefix, now_ms()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn purge_expired(&self) -> Result<usize, KvError> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM kv_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                [now_ms()],
            )?;
            Ok(removed)
        })
        .await
    }
}

struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-process [`KvStore`]. Expiry follows the tokio clock, so paused-time
/// tests can advance past a TTL.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<BTreeMap<String, MemoryEntry>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, MemoryEntry>>, KvError> {
        self.entries.lock().map_err(|_| KvError::Poisoned)
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let now = Instant::now();
        let entries = self.lock()?;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), KvError> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.lock()?.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        Ok(self.lock()?.remove(key).is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, KvError> {
        let now = Instant::now();
        let entries = self.lock()?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect())
    }

    async fn purge_expired(&self) -> Result<usize, KvError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn memory_entries_expire_with_the_tokio_clock() {
        let store = MemoryKvStore::new();
        store
            .set("lease", b"abc", Some(Duration::from_secs(90)))
            .await
            .unwrap();
        store.set("forever", b"x", None).await.unwrap();

        tokio::time::advance(Duration::from_secs(89)).await;
        assert_eq!(store.get("lease").await.unwrap(), Some(b"abc".to_vec()));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("lease").await.unwrap(), None);
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.get("forever").await.unwrap(), Some(b"x".to_vec()));
    }

    #[tokio::test]
    async fn memory_scan_is_limited_to_prefix() {
        let store = MemoryKvStore::new();
        for key in ["session:a:1", "session:a:2", "session:b:1", "tts:cache:1"] {
            store.set(key, key.as_bytes(), None).await.unwrap();
        }

        let keys: Vec<String> = store
            .scan_prefix("session:a:")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["session:a:1", "session:a:2"]);
    }

    #[tokio::test]
    async fn memory_delete_reports_presence() {
        let store = MemoryKvStore::new();
        store.set("k", b"v", None).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }
}
