//! Durable mapping of (scope, owner) to the preset the owner selected.

use crate::error::StoreError;
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::sync::Mutex;
use yomi_db::DbPool;
use yomi_types::{PresetId, Scope};

/// Storage for scoped preset assignments.
///
/// The stored identifier is not checked against the registry. A reference
/// to a preset that no longer exists is resolved by falling back.
#[async_trait]
pub trait PresetIdStore: Send + Sync {
    /// Returns the preset selected by `owner` in `scope`, or
    /// `StoreError::NotFound`.
    async fn find(&self, scope: Scope, owner: u64) -> Result<PresetId, StoreError>;

    /// Inserts or replaces the assignment for `owner` in `scope`.
    async fn save(&self, scope: Scope, owner: u64, preset_id: &PresetId) -> Result<(), StoreError>;

    /// Removes the assignment. Removing a missing one is not an error.
    async fn delete(&self, scope: Scope, owner: u64) -> Result<(), StoreError>;
}

// Snowflakes are stored bit-for-bit in SQLite's signed INTEGER column.
fn owner_column(owner: u64) -> i64 {
    owner as i64
}

/// [`PresetIdStore`] backed by the `scoped_preset_ids` table.
#[derive(Clone)]
pub struct SqlitePresetIdStore {
    pool: DbPool,
}

impl SqlitePresetIdStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PresetIdStore for SqlitePresetIdStore {
    async fn find(&self, scope: Scope, owner: u64) -> Result<PresetId, StoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            let found: Option<String> = conn
                .query_row(
                    "SELECT preset_id FROM scoped_preset_ids WHERE scope = ?1 AND owner_id = ?2",
                    params![scope.as_str(), owner_column(owner)],
                    |row| row.get(0),
                )
                .optional()?;
            found.map(PresetId).ok_or(StoreError::NotFound)
        })
        .await?
    }

    async fn save(&self, scope: Scope, owner: u64, preset_id: &PresetId) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        let preset_id = preset_id.as_str().to_string();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            conn.execute(
                "INSERT INTO scoped_preset_ids (scope, owner_id, preset_id)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(scope, owner_id) DO UPDATE SET
                     preset_id = excluded.preset_id,
                     updated_at = datetime('now')",
                params![scope.as_str(), owner_column(owner), preset_id],
            )?;
            Ok(())
        })
        .await?
    }

    async fn delete(&self, scope: Scope, owner: u64) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            conn.execute(
                "DELETE FROM scoped_preset_ids WHERE scope = ?1 AND owner_id = ?2",
                params![scope.as_str(), owner_column(owner)],
            )?;
            Ok(())
        })
        .await?
    }
}

/// In-process [`PresetIdStore`].
#[derive(Default)]
pub struct MemoryPresetIdStore {
    entries: Mutex<HashMap<(Scope, u64), PresetId>>,
}

impl MemoryPresetIdStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresetIdStore for MemoryPresetIdStore {
    async fn find(&self, scope: Scope, owner: u64) -> Result<PresetId, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries
            .get(&(scope, owner))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn save(&self, scope: Scope, owner: u64, preset_id: &PresetId) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert((scope, owner), preset_id.clone());
        Ok(())
    }

    async fn delete(&self, scope: Scope, owner: u64) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.remove(&(scope, owner));
        Ok(())
    }
}
