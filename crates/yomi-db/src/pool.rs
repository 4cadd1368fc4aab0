//! SQLite pool shared by the preset store, the synthesis cache and the
//! session leases.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use thiserror::Error;

/// Path that opens a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a writer waits on a locked database, in milliseconds.
    /// Cache writes and lease renewals contend here.
    pub busy_timeout_ms: u64,

    /// Upper bound on pooled connections. Ignored for [`MEMORY_PATH`].
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to create database directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Opens the bot database at `db_path`, creating missing parent directories.
///
/// Each connection to `:memory:` is a separate database, so an in-memory
/// pool is capped at one connection; the stores then see the same tables.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let in_memory = db_path == MEMORY_PATH;
    if !in_memory {
        ensure_parent_dir(db_path)?;
    }

    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let busy_timeout_ms = settings.busy_timeout_ms;
    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(flags)
        .with_init(move |conn| configure_connection(conn, busy_timeout_ms));

    let max_size = if in_memory {
        1
    } else {
        settings.pool_max_size.max(1)
    };
    let pool = Pool::builder().max_size(max_size).build(manager)?;

    tracing::debug!(path = db_path, max_size, "database pool ready");
    Ok(pool)
}

fn ensure_parent_dir(db_path: &str) -> Result<(), PoolError> {
    match Path::new(db_path).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            std::fs::create_dir_all(dir).map_err(|source| PoolError::CreateDir {
                path: dir.display().to_string(),
                source,
            })
        }
        _ => Ok(()),
    }
}

fn configure_connection(conn: &mut Connection, busy_timeout_ms: u64) -> rusqlite::Result<()> {
    let journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    if journal_mode != "wal" && journal_mode != "memory" {
        return Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some(format!("failed to set WAL journal mode, got: {journal_mode}")),
        ));
    }
    // Clips and leases can be regenerated, so NORMAL durability is enough.
    conn.execute_batch(&format!(
        "PRAGMA foreign_keys = ON;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = {busy_timeout_ms};"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_pool_applies_pragmas() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pool.db");
        let settings = DbRuntimeSettings {
            busy_timeout_ms: 2_500,
            pool_max_size: 3,
        };

        let pool = create_pool(path.to_str().expect("utf-8 path"), settings)
            .expect("pool creation should succeed");
        let conn = pool.get().expect("should get a connection");

        let mode: String = conn
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .expect("should query journal_mode");
        assert_eq!(mode, "wal");

        let fk: i32 = conn
            .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
            .expect("should query foreign_keys");
        assert_eq!(fk, 1);

        // NORMAL is 1.
        let synchronous: i32 = conn
            .query_row("PRAGMA synchronous;", [], |row| row.get(0))
            .expect("should query synchronous");
        assert_eq!(synchronous, 1);

        let busy_timeout: i32 = conn
            .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
            .expect("should query busy_timeout");
        assert_eq!(busy_timeout, 2_500);

        assert_eq!(pool.max_size(), 3);
    }

    #[test]
    fn missing_data_directory_is_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data").join("nested").join("yomi.db");

        create_pool(path.to_str().expect("utf-8 path"), DbRuntimeSettings::default())
            .expect("pool creation should succeed");
        assert!(path.parent().expect("parent").is_dir());
    }

    #[test]
    fn memory_pool_shares_one_database() {
        let pool = create_pool(MEMORY_PATH, DbRuntimeSettings::default())
            .expect("pool creation should succeed");
        assert_eq!(pool.max_size(), 1);

        pool.get()
            .expect("connection")
            .execute_batch("CREATE TABLE shared_table (id INTEGER);")
            .expect("create table");
        let count: i64 = pool
            .get()
            .expect("connection")
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'shared_table'",
                [],
                |row| row.get(0),
            )
            .expect("query");
        assert_eq!(count, 1);
    }
}
