//! Database layer for yomi.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! embedded SQL migrations, and the expiring key/value store that backs the
//! synthesis cache and the session leases.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: no external database process is required for
//!   a single bot instance, and WAL gives concurrent readers with one writer.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!`, so the schema ships with the code that depends on it.
//! - **`KvStore` trait**: callers only need get/set-with-TTL/delete/scan.
//!   `SqliteKvStore` persists across restarts, `MemoryKvStore` does not.

mod kv;
mod migrations;
mod pool;

pub use kv::{KvError, KvStore, MemoryKvStore, SqliteKvStore};
pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError, MEMORY_PATH};
