//! State application: decoded records → block-range versions.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::decoder::StateDecoder;
use crate::error::MirrorError;
use crate::store::StoreTransaction;
use crate::types::{Block, EntityKind, EntityVersion, StateChange};

/// Counters for one applied block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySummary {
    /// Namespace changes in the batch.
    pub changes: usize,
    pub versions_inserted: usize,
    /// Prior versions closed (or superseded within the block).
    pub versions_closed: u64,
    /// Changes that failed to decode or had an unsupported kind.
    pub changes_skipped: usize,
}

/// Writes one block's changes as versioned rows.
#[derive(Clone)]
pub struct StateApplier {
    decoder: Arc<dyn StateDecoder>,
}

impl StateApplier {
    pub fn new(decoder: Arc<dyn StateDecoder>) -> Self {
        Self { decoder }
    }

    /// Record `block` and apply `changes` in order.
    ///
    /// Decode failures and unsupported kinds skip the change; store errors
    /// abort and are returned.
    pub async fn apply(
        &self,
        tx: &mut dyn StoreTransaction,
        block: &Block,
        changes: &[StateChange],
    ) -> Result<ApplySummary, MirrorError> {
        tx.insert_block(block).await?;

        let mut summary = ApplySummary {
            changes: changes.len(),
            ..Default::default()
        };

        for change in changes {
            let decoded = match self.decoder.decode(&change.address, &change.value) {
                Ok(decoded) => decoded,
                Err(e) => {
                    tracing::warn!(
                        block_num = block.block_num,
                        address = %change.address,
                        error = %e,
                        "skipping undecodable change"
                    );
                    summary.changes_skipped += 1;
                    continue;
                }
            };

            let kind = match EntityKind::try_from(decoded.space) {
                Ok(kind) => kind,
                Err(space) => {
                    tracing::warn!(%space, address = %change.address, "Unsupported data type");
                    summary.changes_skipped += 1;
                    continue;
                }
            };

            for record in decoded.records {
                summary.versions_closed += tx.close_version(kind, &record.key, block.block_num).await?;

                let version = EntityVersion::builder(kind, record.key)
                    .payload(record.payload)
                    .start(block.block_num)
                    .build();
                tx.insert_version(&version).await?;
                summary.versions_inserted += 1;
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{election_address, voter_address};
    use crate::decoder::JsonStateDecoder;
    use crate::store::{MemoryStore, MirrorStore};
    use serde_json::json;

    fn applier() -> StateApplier {
        StateApplier::new(Arc::new(JsonStateDecoder))
    }

    fn change(address: String, value: serde_json::Value) -> StateChange {
        StateChange {
            address,
            value: value.to_string().into_bytes(),
        }
    }

    #[tokio::test]
    async fn stamps_start_and_unbounded_end() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let changes = vec![change(election_address("e1"), json!({"election_id": "e1"}))];
        let summary = applier()
            .apply(tx.as_mut(), &Block::new(7, "B7"), &changes)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(summary.versions_inserted, 1);
        assert_eq!(summary.versions_closed, 0);
        let v = store.current_version(EntityKind::Election, "e1").await.unwrap().unwrap();
        assert_eq!(v.start_block_num, 7);
        assert!(v.is_current());
        assert_eq!(store.fetch_block(7).await.unwrap(), Some(Block::new(7, "B7")));
    }

    #[tokio::test]
    async fn later_change_in_block_supersedes_earlier() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let addr = election_address("e1");
        let changes = vec![
            change(addr.clone(), json!({"election_id": "e1", "name": "first"})),
            change(addr, json!({"election_id": "e1", "name": "second"})),
        ];
        let summary = applier()
            .apply(tx.as_mut(), &Block::new(3, "B3"), &changes)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(summary.versions_inserted, 2);
        assert_eq!(summary.versions_closed, 1);
        let history = store.history(EntityKind::Election, "e1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].payload["name"], "second");
    }

    #[tokio::test]
    async fn undecodable_change_is_skipped() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let changes = vec![
            StateChange {
                address: election_address("bad"),
                value: b"not json".to_vec(),
            },
            change(voter_address("02aa"), json!({"public_key": "02aa"})),
        ];
        let summary = applier()
            .apply(tx.as_mut(), &Block::new(1, "B1"), &changes)
            .await
            .unwrap();

        assert_eq!(summary.changes, 2);
        assert_eq!(summary.changes_skipped, 1);
        assert_eq!(summary.versions_inserted, 1);
    }

    #[tokio::test]
    async fn unsupported_kind_is_skipped() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let changes = vec![change(format!("bb3cb077{}", "0".repeat(62)), json!({}))];
        let summary = applier()
            .apply(tx.as_mut(), &Block::new(1, "B1"), &changes)
            .await
            .unwrap();
        assert_eq!(summary.changes_skipped, 1);
        assert_eq!(summary.versions_inserted, 0);
    }

    #[tokio::test]
    async fn empty_block_is_still_recorded() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        applier().apply(tx.as_mut(), &Block::new(2, "B2"), &[]).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.latest_block().await.unwrap(), Some(Block::new(2, "B2")));
    }
}
