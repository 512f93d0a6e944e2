//! The reconciler: one batch in, one atomic store update out.
//!
//! ```text
//! events ─► EventIngestor ─► ForkResolver ─► StateApplier ─► commit
//!                │                 │               │
//!                └─ no block: no-op └─ duplicate   └─ any store error: rollback
//! ```
//!
//! Batches must be handed over one at a time, in delivery order.

use std::sync::Arc;

use crate::apply::{ApplySummary, StateApplier};
use crate::config::MirrorConfig;
use crate::decoder::StateDecoder;
use crate::error::MirrorError;
use crate::event::Event;
use crate::fork::{ForkEvent, ForkOutcome, ForkResolver};
use crate::ingest::{EventIngestor, ParsedBatch};
use crate::store::{MirrorStore, StoreTransaction};
use crate::types::Block;

/// Result of handling one batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// The batch carried no block-commit event.
    NoBlock,
    /// The block was already applied.
    Duplicate(Block),
    /// The block was applied, possibly replacing a forked one.
    Applied {
        block: Block,
        fork: Option<ForkEvent>,
        summary: ApplySummary,
    },
}

impl BatchOutcome {
    /// The block this batch committed, if any.
    pub fn block(&self) -> Option<&Block> {
        match self {
            Self::NoBlock => None,
            Self::Duplicate(block) | Self::Applied { block, .. } => Some(block),
        }
    }
}

/// Mirrors ledger event batches into a [`MirrorStore`].
pub struct Reconciler<S> {
    store: S,
    config: MirrorConfig,
    ingestor: EventIngestor,
    resolver: ForkResolver,
    applier: StateApplier,
}

impl<S: MirrorStore> Reconciler<S> {
    /// A reconciler with the default config.
    pub fn new(store: S, decoder: Arc<dyn StateDecoder>) -> Self {
        Self::from_config(store, decoder, MirrorConfig::default())
    }

    pub fn from_config(store: S, decoder: Arc<dyn StateDecoder>, config: MirrorConfig) -> Self {
        Self {
            ingestor: EventIngestor::new(config.namespace.clone()),
            resolver: ForkResolver::new(),
            applier: StateApplier::new(decoder),
            store,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Handle one batch of events.
    ///
    /// Fork resolution and application run in a single store transaction.
    /// On error nothing from the batch is visible and the reconciler can take
    /// the next batch (or the same one again).
    pub async fn handle_events(&self, events: &[Event]) -> Result<BatchOutcome, MirrorError> {
        let Some(batch) = self.ingestor.parse(events)? else {
            tracing::debug!(mirror = %self.config.id, "batch without block-commit, ignoring");
            return Ok(BatchOutcome::NoBlock);
        };

        let mut tx = self.store.begin().await?;
        let result = self.reconcile(tx.as_mut(), &batch).await;

        match result {
            Ok(outcome) => {
                tx.commit().await?;
                if let BatchOutcome::Applied { block, summary, .. } = &outcome {
                    tracing::debug!(
                        mirror = %self.config.id,
                        block_num = block.block_num,
                        inserted = summary.versions_inserted,
                        closed = summary.versions_closed,
                        skipped = summary.changes_skipped,
                        "block applied"
                    );
                }
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(
                    mirror = %self.config.id,
                    block_num = batch.block.block_num,
                    error = %e,
                    "Unable to handle batch, rolling back"
                );
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn reconcile(
        &self,
        tx: &mut dyn StoreTransaction,
        batch: &ParsedBatch,
    ) -> Result<BatchOutcome, MirrorError> {
        let fork = match self.resolver.resolve(tx, &batch.block).await? {
            ForkOutcome::Duplicate => return Ok(BatchOutcome::Duplicate(batch.block.clone())),
            ForkOutcome::NewBlock => None,
            ForkOutcome::Fork(event) => Some(event),
        };

        let summary = self.applier.apply(tx, &batch.block, &batch.changes).await?;

        Ok(BatchOutcome::Applied {
            block: batch.block.clone(),
            fork,
            summary,
        })
    }
}
