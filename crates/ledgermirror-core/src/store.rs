//! Store interface: the relational view the mirror writes into.
//!
//! Writes go through a [`StoreTransaction`] obtained from
//! [`MirrorStore::begin`]; nothing written in a transaction is visible until
//! `commit`, and `rollback` (or dropping the transaction) discards it all.
//!
//! Implementations include [`MemoryStore`] here and the SQLite and Postgres
//! backends in `ledgermirror-storage`.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::MirrorError;
use crate::types::{Block, EntityKind, EntityVersion, UNBOUNDED};

/// One atomic unit of work against the store.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Look up the recorded block at `block_num`.
    async fn fetch_block(&mut self, block_num: u64) -> Result<Option<Block>, MirrorError>;

    /// The highest block recorded so far, as seen by this transaction.
    async fn latest_block(&mut self) -> Result<Option<Block>, MirrorError>;

    /// Record a block. Fails if a block is already recorded at its height.
    async fn insert_block(&mut self, block: &Block) -> Result<(), MirrorError>;

    /// Close the current version of `key` at `block_num`.
    ///
    /// A current version that started at `block_num` never became visible and
    /// is removed instead. A current version starting above `block_num` is an
    /// error. Returns the number of rows affected.
    async fn close_version(
        &mut self,
        kind: EntityKind,
        key: &str,
        block_num: u64,
    ) -> Result<u64, MirrorError>;

    /// Insert a version. Fails if it would create a second current version.
    async fn insert_version(&mut self, version: &EntityVersion) -> Result<(), MirrorError>;

    /// Discard history at and above `block_num`.
    ///
    /// Blocks and versions starting at or above the fork point are deleted;
    /// versions that were closed at or above it become current again.
    async fn drop_fork(&mut self, block_num: u64) -> Result<(), MirrorError>;

    async fn commit(&mut self) -> Result<(), MirrorError>;

    async fn rollback(&mut self) -> Result<(), MirrorError>;
}

/// A store the mirror can write batches into and query history from.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Open a new unit of work.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, MirrorError>;

    async fn fetch_block(&self, block_num: u64) -> Result<Option<Block>, MirrorError>;

    /// The highest recorded block.
    async fn latest_block(&self) -> Result<Option<Block>, MirrorError>;

    /// The version of `key` visible at `block_num`.
    async fn version_at(
        &self,
        kind: EntityKind,
        key: &str,
        block_num: u64,
    ) -> Result<Option<EntityVersion>, MirrorError>;

    /// Every version of `key`, oldest first.
    async fn history(&self, kind: EntityKind, key: &str) -> Result<Vec<EntityVersion>, MirrorError>;

    /// Current versions of every entity of `kind`, ordered by key.
    async fn current_versions(&self, kind: EntityKind) -> Result<Vec<EntityVersion>, MirrorError>;

    /// The current version of `key`, if any.
    async fn current_version(
        &self,
        kind: EntityKind,
        key: &str,
    ) -> Result<Option<EntityVersion>, MirrorError> {
        Ok(self
            .history(kind, key)
            .await?
            .into_iter()
            .find(EntityVersion::is_current))
    }
}

// ─── In-memory store ─────────────────────────────────────────────────────────

/// Committed contents of a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySnapshot {
    pub blocks: BTreeMap<u64, Block>,
    /// Versions in insertion order.
    pub versions: Vec<EntityVersion>,
}

impl MemorySnapshot {
    fn versions_of<'a>(
        &'a self,
        kind: EntityKind,
        key: &'a str,
    ) -> impl Iterator<Item = &'a EntityVersion> + 'a {
        self.versions
            .iter()
            .filter(move |v| v.kind == kind && v.key == key)
    }
}

#[derive(Default)]
struct Shared {
    committed: MemorySnapshot,
    /// Bumped on every commit; a transaction opened on an older generation
    /// cannot commit.
    generation: u64,
}

/// In-memory store for tests and ephemeral mirrors.
///
/// A transaction works on a private copy of the committed state and
/// publishes it wholesale on commit.
#[derive(Default, Clone)]
pub struct MemoryStore {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the committed state.
    pub fn snapshot(&self) -> Result<MemorySnapshot, MirrorError> {
        Ok(lock(&self.shared)?.committed.clone())
    }
}

fn lock(shared: &Mutex<Shared>) -> Result<MutexGuard<'_, Shared>, MirrorError> {
    shared
        .lock()
        .map_err(|_| MirrorError::Storage("memory store lock poisoned".into()))
}

#[async_trait]
impl MirrorStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, MirrorError> {
        let guard = lock(&self.shared)?;
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            generation: guard.generation,
            work: Some(guard.committed.clone()),
        }))
    }

    async fn fetch_block(&self, block_num: u64) -> Result<Option<Block>, MirrorError> {
        Ok(lock(&self.shared)?.committed.blocks.get(&block_num).cloned())
    }

    async fn latest_block(&self) -> Result<Option<Block>, MirrorError> {
        Ok(lock(&self.shared)?
            .committed
            .blocks
            .values()
            .next_back()
            .cloned())
    }

    async fn version_at(
        &self,
        kind: EntityKind,
        key: &str,
        block_num: u64,
    ) -> Result<Option<EntityVersion>, MirrorError> {
        let guard = lock(&self.shared)?;
        let found = guard
            .committed
            .versions_of(kind, key)
            .find(|v| v.visible_at(block_num))
            .cloned();
        Ok(found)
    }

    async fn history(&self, kind: EntityKind, key: &str) -> Result<Vec<EntityVersion>, MirrorError> {
        let guard = lock(&self.shared)?;
        let mut versions: Vec<_> = guard.committed.versions_of(kind, key).cloned().collect();
        versions.sort_by_key(|v| v.start_block_num);
        Ok(versions)
    }

    async fn current_versions(&self, kind: EntityKind) -> Result<Vec<EntityVersion>, MirrorError> {
        let guard = lock(&self.shared)?;
        let mut versions: Vec<_> = guard
            .committed
            .versions
            .iter()
            .filter(|v| v.kind == kind && v.is_current())
            .cloned()
            .collect();
        versions.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(versions)
    }
}

/// Unit of work over a [`MemoryStore`].
pub struct MemoryTransaction {
    shared: Arc<Mutex<Shared>>,
    generation: u64,
    /// `None` once committed or rolled back.
    work: Option<MemorySnapshot>,
}

impl MemoryTransaction {
    fn work(&mut self) -> Result<&mut MemorySnapshot, MirrorError> {
        self.work
            .as_mut()
            .ok_or_else(|| MirrorError::Storage("transaction already finished".into()))
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn fetch_block(&mut self, block_num: u64) -> Result<Option<Block>, MirrorError> {
        Ok(self.work()?.blocks.get(&block_num).cloned())
    }

    async fn latest_block(&mut self) -> Result<Option<Block>, MirrorError> {
        Ok(self.work()?.blocks.values().next_back().cloned())
    }

    async fn insert_block(&mut self, block: &Block) -> Result<(), MirrorError> {
        let work = self.work()?;
        if work.blocks.contains_key(&block.block_num) {
            return Err(MirrorError::Storage(format!(
                "block {} already recorded",
                block.block_num
            )));
        }
        work.blocks.insert(block.block_num, block.clone());
        Ok(())
    }

    async fn close_version(
        &mut self,
        kind: EntityKind,
        key: &str,
        block_num: u64,
    ) -> Result<u64, MirrorError> {
        let work = self.work()?;
        let is_target = |v: &EntityVersion| v.kind == kind && v.key == key && v.is_current();

        if let Some(v) = work
            .versions
            .iter()
            .find(|v| is_target(v) && v.start_block_num > block_num)
        {
            return Err(MirrorError::Storage(format!(
                "{kind} {key} current version starts at {} after {block_num}",
                v.start_block_num
            )));
        }

        let before = work.versions.len();
        work.versions
            .retain(|v| !(is_target(v) && v.start_block_num == block_num));
        let mut affected = (before - work.versions.len()) as u64;

        for v in work.versions.iter_mut().filter(|v| is_target(v)) {
            v.end_block_num = block_num;
            affected += 1;
        }
        Ok(affected)
    }

    async fn insert_version(&mut self, version: &EntityVersion) -> Result<(), MirrorError> {
        let work = self.work()?;
        if version.is_current()
            && work
                .versions_of(version.kind, &version.key)
                .any(EntityVersion::is_current)
        {
            return Err(MirrorError::Storage(format!(
                "{} {} already has a current version",
                version.kind, version.key
            )));
        }
        work.versions.push(version.clone());
        Ok(())
    }

    async fn drop_fork(&mut self, block_num: u64) -> Result<(), MirrorError> {
        let work = self.work()?;
        work.blocks.retain(|num, _| *num < block_num);
        work.versions.retain(|v| v.start_block_num < block_num);
        for v in work.versions.iter_mut() {
            if v.end_block_num >= block_num {
                v.end_block_num = UNBOUNDED;
            }
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), MirrorError> {
        let work = self
            .work
            .take()
            .ok_or_else(|| MirrorError::Storage("transaction already finished".into()))?;
        let mut shared = lock(&self.shared)?;
        if shared.generation != self.generation {
            return Err(MirrorError::Storage(
                "store changed since transaction began".into(),
            ));
        }
        shared.committed = work;
        shared.generation += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), MirrorError> {
        self.work = None;
        Ok(())
    }
}
