//! SQLite storage backend for LedgerMirror.
//!
//! Persists blocks and entity versions to a single SQLite file.
//!
//! # Usage
//! ```rust,no_run
//! use ledgermirror_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./mirror.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use ledgermirror_core::error::MirrorError;
use ledgermirror_core::store::{MirrorStore, StoreTransaction};
use ledgermirror_core::types::{Block, EntityKind, EntityVersion};

use crate::sql::{db_err, finished, from_sql, to_sql, UNBOUNDED_SQL};

/// SQLite-backed mirror store.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./mirror.db"`) or a full
    /// SQLite URL (`"sqlite:./mirror.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, MirrorError> {
        Self::open_with(path, 5).await
    }

    /// Open with an explicit pool size.
    pub async fn open_with(path: &str, max_connections: u32) -> Result<Self, MirrorError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&url)
            .await
            .map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Uses a single pooled connection that is never recycled, since every
    /// connection to `:memory:` sees its own database. Reads issued while a
    /// transaction is open wait for it to finish.
    pub async fn in_memory() -> Result<Self, MirrorError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and indexes.
    async fn init_schema(&self) -> Result<(), MirrorError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS blocks (
                block_num INTEGER PRIMARY KEY,
                block_id  TEXT    NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        for kind in EntityKind::ALL {
            let (table, key) = (kind.table_name(), kind.key_field());

            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id              INTEGER PRIMARY KEY AUTOINCREMENT,
                    {key}           TEXT    NOT NULL,
                    payload         TEXT    NOT NULL,
                    start_block_num INTEGER NOT NULL,
                    end_block_num   INTEGER NOT NULL,
                    CHECK (start_block_num < end_block_num)
                );"
            ))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            // At most one current version per key.
            sqlx::query(&format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_{table}_current
                 ON {table} ({key}) WHERE end_block_num = {UNBOUNDED_SQL};"
            ))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_range
                 ON {table} ({key}, start_block_num);"
            ))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        }

        Ok(())
    }

    /// Get the underlying connection pool (for custom queries).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn block_from_row(row: &SqliteRow) -> Result<Block, MirrorError> {
    Ok(Block {
        block_num: from_sql(row.try_get("block_num").map_err(db_err)?)?,
        block_id: row.try_get("block_id").map_err(db_err)?,
    })
}

/// Map a row selected with the key column aliased to `entity_key`.
fn version_from_row(kind: EntityKind, row: &SqliteRow) -> Result<EntityVersion, MirrorError> {
    let payload: String = row.try_get("payload").map_err(db_err)?;
    let payload = serde_json::from_str(&payload)
        .map_err(|e| MirrorError::Storage(format!("corrupt payload: {e}")))?;

    Ok(EntityVersion {
        kind,
        key: row.try_get("entity_key").map_err(db_err)?,
        payload,
        start_block_num: from_sql(row.try_get("start_block_num").map_err(db_err)?)?,
        end_block_num: from_sql(row.try_get("end_block_num").map_err(db_err)?)?,
    })
}

fn select_versions(kind: EntityKind) -> String {
    format!(
        "SELECT {key} AS entity_key, payload, start_block_num, end_block_num FROM {table}",
        key = kind.key_field(),
        table = kind.table_name(),
    )
}

// ─── MirrorStore impl ────────────────────────────────────────────────────────

#[async_trait]
impl MirrorStore for SqliteStorage {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, MirrorError> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(SqliteTransaction { tx: Some(tx) }))
    }

    async fn fetch_block(&self, block_num: u64) -> Result<Option<Block>, MirrorError> {
        let row = sqlx::query("SELECT block_num, block_id FROM blocks WHERE block_num = ?")
            .bind(to_sql(block_num)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(block_from_row).transpose()
    }

    async fn latest_block(&self) -> Result<Option<Block>, MirrorError> {
        let row = sqlx::query("SELECT block_num, block_id FROM blocks ORDER BY block_num DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(block_from_row).transpose()
    }

    async fn version_at(
        &self,
        kind: EntityKind,
        key: &str,
        block_num: u64,
    ) -> Result<Option<EntityVersion>, MirrorError> {
        let height = to_sql(block_num)?;
        let row = sqlx::query(&format!(
            "{} WHERE {} = ? AND start_block_num <= ? AND end_block_num > ?",
            select_versions(kind),
            kind.key_field()
        ))
        .bind(key)
        .bind(height)
        .bind(height)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(|r| version_from_row(kind, &r)).transpose()
    }

    async fn history(&self, kind: EntityKind, key: &str) -> Result<Vec<EntityVersion>, MirrorError> {
        let rows = sqlx::query(&format!(
            "{} WHERE {} = ? ORDER BY start_block_num",
            select_versions(kind),
            kind.key_field()
        ))
        .bind(key)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(|r| version_from_row(kind, r)).collect()
    }

    async fn current_versions(&self, kind: EntityKind) -> Result<Vec<EntityVersion>, MirrorError> {
        let rows = sqlx::query(&format!(
            "{} WHERE end_block_num = ? ORDER BY {}",
            select_versions(kind),
            kind.key_field()
        ))
        .bind(UNBOUNDED_SQL)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(|r| version_from_row(kind, r)).collect()
    }
}

// ─── StoreTransaction impl ───────────────────────────────────────────────────

/// One open SQLite transaction. Dropping it without commit rolls back.
pub struct SqliteTransaction {
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteTransaction {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Sqlite>, MirrorError> {
        self.tx.as_mut().ok_or_else(finished)
    }
}

#[async_trait]
impl StoreTransaction for SqliteTransaction {
    async fn fetch_block(&mut self, block_num: u64) -> Result<Option<Block>, MirrorError> {
        let height = to_sql(block_num)?;
        let tx = self.tx()?;
        let row = sqlx::query("SELECT block_num, block_id FROM blocks WHERE block_num = ?")
            .bind(height)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err)?;
        row.as_ref().map(block_from_row).transpose()
    }

    async fn latest_block(&mut self) -> Result<Option<Block>, MirrorError> {
        let tx = self.tx()?;
        let row = sqlx::query("SELECT block_num, block_id FROM blocks ORDER BY block_num DESC LIMIT 1")
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err)?;
        row.as_ref().map(block_from_row).transpose()
    }

    async fn insert_block(&mut self, block: &Block) -> Result<(), MirrorError> {
        let height = to_sql(block.block_num)?;
        let tx = self.tx()?;
        sqlx::query("INSERT INTO blocks (block_num, block_id) VALUES (?, ?)")
            .bind(height)
            .bind(&block.block_id)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn close_version(
        &mut self,
        kind: EntityKind,
        key: &str,
        block_num: u64,
    ) -> Result<u64, MirrorError> {
        let height = to_sql(block_num)?;
        let (table, key_field) = (kind.table_name(), kind.key_field());
        let tx = self.tx()?;

        // Superseded within the block it was created in: never visible.
        let removed = sqlx::query(&format!(
            "DELETE FROM {table}
             WHERE {key_field} = ? AND end_block_num = ? AND start_block_num = ?"
        ))
        .bind(key)
        .bind(UNBOUNDED_SQL)
        .bind(height)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;

        let closed = sqlx::query(&format!(
            "UPDATE {table} SET end_block_num = ?
             WHERE {key_field} = ? AND end_block_num = ?"
        ))
        .bind(height)
        .bind(key)
        .bind(UNBOUNDED_SQL)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;

        Ok(removed.rows_affected() + closed.rows_affected())
    }

    async fn insert_version(&mut self, version: &EntityVersion) -> Result<(), MirrorError> {
        let payload = serde_json::to_string(&version.payload)
            .map_err(|e| MirrorError::Storage(format!("serialize payload: {e}")))?;
        let start = to_sql(version.start_block_num)?;
        let end = to_sql(version.end_block_num)?;
        let tx = self.tx()?;

        sqlx::query(&format!(
            "INSERT INTO {} ({}, payload, start_block_num, end_block_num) VALUES (?, ?, ?, ?)",
            version.kind.table_name(),
            version.kind.key_field()
        ))
        .bind(&version.key)
        .bind(&payload)
        .bind(start)
        .bind(end)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;

        debug!(kind = %version.kind, key = %version.key, start = version.start_block_num, "version stored");
        Ok(())
    }

    async fn drop_fork(&mut self, block_num: u64) -> Result<(), MirrorError> {
        let height = to_sql(block_num)?;
        let tx = self.tx()?;

        sqlx::query("DELETE FROM blocks WHERE block_num >= ?")
            .bind(height)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;

        for kind in EntityKind::ALL {
            let table = kind.table_name();

            sqlx::query(&format!("DELETE FROM {table} WHERE start_block_num >= ?"))
                .bind(height)
                .execute(&mut **tx)
                .await
                .map_err(db_err)?;

            sqlx::query(&format!(
                "UPDATE {table} SET end_block_num = ?
                 WHERE end_block_num >= ? AND end_block_num <> ?"
            ))
            .bind(UNBOUNDED_SQL)
            .bind(height)
            .bind(UNBOUNDED_SQL)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        }

        debug!(block_num, "dropped forked history");
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), MirrorError> {
        let tx = self.tx.take().ok_or_else(finished)?;
        tx.commit().await.map_err(db_err)
    }

    async fn rollback(&mut self) -> Result<(), MirrorError> {
        let tx = self.tx.take().ok_or_else(finished)?;
        tx.rollback().await.map_err(db_err)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use ledgermirror_core::types::UNBOUNDED;
    use serde_json::json;

    fn version(kind: EntityKind, key: &str, start: u64) -> EntityVersion {
        let mut payload = json!({ "start": start });
        payload[kind.key_field()] = json!(key);
        EntityVersion::builder(kind, key).payload(payload).start(start).build()
    }

    // ── Blocks ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn block_insert_and_query() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.insert_block(&Block::new(100, "0xAAA")).await.unwrap();
        tx.insert_block(&Block::new(101, "0xBBB")).await.unwrap();
        assert_eq!(tx.fetch_block(100).await.unwrap(), Some(Block::new(100, "0xAAA")));
        assert_eq!(tx.latest_block().await.unwrap(), Some(Block::new(101, "0xBBB")));
        tx.commit().await.unwrap();

        assert_eq!(store.fetch_block(100).await.unwrap(), Some(Block::new(100, "0xAAA")));
        assert_eq!(store.latest_block().await.unwrap(), Some(Block::new(101, "0xBBB")));
        assert!(store.fetch_block(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_block_is_constraint_violation() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.insert_block(&Block::new(1, "B1")).await.unwrap();
        let err = tx.insert_block(&Block::new(1, "B1")).await.unwrap_err();
        assert!(err.is_storage());
        tx.rollback().await.unwrap();
    }

    // ── Versions ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn payload_json_roundtrip() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.insert_version(&version(EntityKind::Voter, "02aa", 4)).await.unwrap();
        tx.commit().await.unwrap();

        let v = store.current_version(EntityKind::Voter, "02aa").await.unwrap().unwrap();
        assert_eq!(v.key, "02aa");
        assert_eq!(v.payload["public_key"], "02aa");
        assert_eq!(v.payload["start"], 4);
        assert_eq!(v.end_block_num, UNBOUNDED);
    }

    #[tokio::test]
    async fn second_current_version_violates_index() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.insert_version(&version(EntityKind::Election, "e1", 1)).await.unwrap();
        let err = tx
            .insert_version(&version(EntityKind::Election, "e1", 2))
            .await
            .unwrap_err();
        assert!(err.is_storage());
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn close_then_insert_builds_ranges() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        for start in [10, 20, 30] {
            tx.close_version(EntityKind::Election, "K", start).await.unwrap();
            tx.insert_version(&version(EntityKind::Election, "K", start)).await.unwrap();
        }
        tx.commit().await.unwrap();

        let ranges: Vec<_> = store
            .history(EntityKind::Election, "K")
            .await
            .unwrap()
            .iter()
            .map(|v| (v.start_block_num, v.end_block_num))
            .collect();
        assert_eq!(ranges, vec![(10, 20), (20, 30), (30, UNBOUNDED)]);

        let at_25 = store.version_at(EntityKind::Election, "K", 25).await.unwrap().unwrap();
        assert_eq!(at_25.start_block_num, 20);
        assert!(store.version_at(EntityKind::Election, "K", 9).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn close_within_same_block_removes_row() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.insert_version(&version(EntityKind::Vote, "v1", 7)).await.unwrap();
        assert_eq!(tx.close_version(EntityKind::Vote, "v1", 7).await.unwrap(), 1);
        tx.insert_version(&version(EntityKind::Vote, "v1", 7)).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.history(EntityKind::Vote, "v1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn closing_below_current_start_is_rejected() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.insert_version(&version(EntityKind::Vote, "v1", 6)).await.unwrap();
        let err = tx.close_version(EntityKind::Vote, "v1", 4).await.unwrap_err();
        assert!(err.is_storage());
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn closing_missing_key_is_noop() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.close_version(EntityKind::Voter, "nobody", 3).await.unwrap(), 0);
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn kinds_are_isolated() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.insert_version(&version(EntityKind::Election, "x", 1)).await.unwrap();
        tx.insert_version(&version(EntityKind::VotingOption, "x", 1)).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.current_versions(EntityKind::Election).await.unwrap().len(), 1);
        assert_eq!(store.current_versions(EntityKind::VotingOption).await.unwrap().len(), 1);
        assert!(store.current_versions(EntityKind::Vote).await.unwrap().is_empty());
    }

    // ── Fork / rollback ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn drop_fork_removes_future_data_and_reopens() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        for num in 100u64..=105 {
            tx.insert_block(&Block::new(num, format!("0x{num:064x}"))).await.unwrap();
            tx.close_version(EntityKind::Election, "e1", num).await.unwrap();
            tx.insert_version(&version(EntityKind::Election, "e1", num)).await.unwrap();
        }
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.drop_fork(103).await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.fetch_block(103).await.unwrap().is_none());
        assert!(store.fetch_block(102).await.unwrap().is_some());

        let history = store.history(EntityKind::Election, "e1").await.unwrap();
        assert_eq!(history.len(), 3);
        let current = store.current_version(EntityKind::Election, "e1").await.unwrap().unwrap();
        assert_eq!(current.start_block_num, 102);
        assert!(current.is_current());
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.insert_block(&Block::new(1, "B1")).await.unwrap();
        tx.insert_version(&version(EntityKind::Election, "e1", 1)).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(tx.commit().await.is_err());

        assert!(store.latest_block().await.unwrap().is_none());
        assert!(store.history(EntityKind::Election, "e1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("ledgermirror-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("reopen.db");
        let _ = std::fs::remove_file(&path);
        let path = path.to_string_lossy().to_string();

        {
            let store = SqliteStorage::open(&path).await.unwrap();
            let mut tx = store.begin().await.unwrap();
            tx.insert_block(&Block::new(9, "B9")).await.unwrap();
            tx.commit().await.unwrap();
            store.pool().close().await;
        }

        let store = SqliteStorage::open(&path).await.unwrap();
        assert_eq!(store.latest_block().await.unwrap(), Some(Block::new(9, "B9")));
    }
}
