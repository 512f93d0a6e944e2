//! Fork resolution: decide what an incoming block means for stored history.
//!
//! Three outcomes, keyed on the block already recorded at the same height:
//! 1. **New block**: nothing recorded there yet, and nothing above it
//! 2. **Duplicate**: same id, a redelivery; nothing to do
//! 3. **Fork**: different id, or an unseen height below the recorded head;
//!    history at and above the height is dropped before the new block is
//!    applied

use serde::{Deserialize, Serialize};

use crate::error::MirrorError;
use crate::store::StoreTransaction;
use crate::types::Block;

/// Describes a replaced block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkEvent {
    /// Height at which history was replaced.
    pub block_num: u64,
    /// Id of the block that was dropped: the one recorded at `block_num`,
    /// or the head when that height was never recorded.
    pub replaced_id: String,
    /// Id of the block that replaces it.
    pub new_id: String,
}

/// What to do with an incoming block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForkOutcome {
    /// Not seen before; apply it.
    NewBlock,
    /// Already applied; skip it.
    Duplicate,
    /// History from this height was dropped; apply it as new.
    Fork(ForkEvent),
}

impl ForkOutcome {
    /// Returns `true` if the block still has to be applied.
    pub fn should_apply(&self) -> bool {
        !matches!(self, Self::Duplicate)
    }
}

/// Compares incoming blocks against recorded history.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForkResolver;

impl ForkResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve `block` inside `tx`, dropping forked history if needed.
    pub async fn resolve(
        &self,
        tx: &mut dyn StoreTransaction,
        block: &Block,
    ) -> Result<ForkOutcome, MirrorError> {
        let existing = match tx.fetch_block(block.block_num).await? {
            Some(existing) => existing,
            None => match tx.latest_block().await? {
                Some(head) if head.block_num > block.block_num => head,
                _ => return Ok(ForkOutcome::NewBlock),
            },
        };

        if existing.block_num == block.block_num && existing.block_id == block.block_id {
            tracing::debug!(
                block_num = block.block_num,
                block_id = %block.short_id(),
                "duplicate block, skipping"
            );
            return Ok(ForkOutcome::Duplicate);
        }

        tracing::info!(
            block_num = block.block_num,
            replaced_num = existing.block_num,
            replaced = %existing.short_id(),
            replacement = %block.short_id(),
            "Fork detected: replacing block"
        );
        tx.drop_fork(block.block_num).await?;

        Ok(ForkOutcome::Fork(ForkEvent {
            block_num: block.block_num,
            replaced_id: existing.block_id,
            new_id: block.block_id.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, MirrorStore};

    async fn store_with(blocks: &[(u64, &str)]) -> MemoryStore {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        for (num, id) in blocks {
            tx.insert_block(&Block::new(*num, *id)).await.unwrap();
        }
        tx.commit().await.unwrap();
        store
    }

    #[tokio::test]
    async fn unseen_height_is_new() {
        let store = store_with(&[(4, "B4")]).await;
        let mut tx = store.begin().await.unwrap();
        let outcome = ForkResolver.resolve(tx.as_mut(), &Block::new(5, "B5")).await.unwrap();
        assert_eq!(outcome, ForkOutcome::NewBlock);
        assert!(outcome.should_apply());
    }

    #[tokio::test]
    async fn same_id_is_duplicate() {
        let store = store_with(&[(5, "B5")]).await;
        let mut tx = store.begin().await.unwrap();
        let outcome = ForkResolver.resolve(tx.as_mut(), &Block::new(5, "B5")).await.unwrap();
        assert_eq!(outcome, ForkOutcome::Duplicate);
        assert!(!outcome.should_apply());
    }

    #[tokio::test]
    async fn different_id_drops_history_from_height() {
        let store = store_with(&[(4, "B4"), (5, "B5"), (6, "B6")]).await;
        let mut tx = store.begin().await.unwrap();
        let outcome = ForkResolver
            .resolve(tx.as_mut(), &Block::new(5, "B5-prime"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ForkOutcome::Fork(ForkEvent {
                block_num: 5,
                replaced_id: "B5".into(),
                new_id: "B5-prime".into(),
            })
        );
        assert!(tx.fetch_block(5).await.unwrap().is_none());
        assert!(tx.fetch_block(6).await.unwrap().is_none());
        assert!(tx.fetch_block(4).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unseen_height_below_head_is_fork() {
        let store = store_with(&[(5, "B5"), (6, "B6")]).await;
        let mut tx = store.begin().await.unwrap();
        let outcome = ForkResolver.resolve(tx.as_mut(), &Block::new(4, "B4")).await.unwrap();
        assert_eq!(
            outcome,
            ForkOutcome::Fork(ForkEvent {
                block_num: 4,
                replaced_id: "B6".into(),
                new_id: "B4".into(),
            })
        );
        assert!(tx.latest_block().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn gap_above_head_is_new() {
        let store = store_with(&[(5, "B5")]).await;
        let mut tx = store.begin().await.unwrap();
        let outcome = ForkResolver.resolve(tx.as_mut(), &Block::new(9, "B9")).await.unwrap();
        assert_eq!(outcome, ForkOutcome::NewBlock);
        assert!(tx.fetch_block(5).await.unwrap().is_some());
    }
}
