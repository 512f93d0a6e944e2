//! Event ingestion: turn one subscription batch into a block and its changes.

use crate::address::{in_namespace, NAMESPACE};
use crate::error::MirrorError;
use crate::event::{decode_state_changes, Event, BLOCK_COMMIT, STATE_DELTA};
use crate::types::{Block, StateChange};

/// A batch reduced to the block it commits and the namespace's changes.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBatch {
    pub block: Block,
    /// Changes under the namespace, in emission order.
    pub changes: Vec<StateChange>,
}

/// Parses event batches. Pure: never touches the store.
#[derive(Debug, Clone)]
pub struct EventIngestor {
    namespace: String,
}

impl EventIngestor {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Parse a batch.
    ///
    /// Returns `Ok(None)` when the batch has no block-commit event.
    pub fn parse(&self, events: &[Event]) -> Result<Option<ParsedBatch>, MirrorError> {
        let Some(block) = parse_block(events)? else {
            return Ok(None);
        };

        let changes = match events.iter().find(|e| e.is(STATE_DELTA)) {
            Some(delta) => decode_state_changes(&delta.data)?
                .into_iter()
                .filter(|c| in_namespace(&c.address, &self.namespace))
                .collect(),
            None => vec![],
        };

        tracing::debug!(
            block_num = block.block_num,
            block_id = %block.short_id(),
            changes = changes.len(),
            "parsed batch"
        );
        Ok(Some(ParsedBatch { block, changes }))
    }
}

impl Default for EventIngestor {
    fn default() -> Self {
        Self::new(NAMESPACE)
    }
}

fn parse_block(events: &[Event]) -> Result<Option<Block>, MirrorError> {
    let Some(commit) = events.iter().find(|e| e.is(BLOCK_COMMIT)) else {
        return Ok(None);
    };

    let block_num = commit
        .attribute("block_num")
        .ok_or_else(|| MirrorError::Ingest("block-commit without block_num".into()))?;
    let block_num = block_num
        .parse::<u64>()
        .map_err(|e| MirrorError::Ingest(format!("invalid block_num {block_num:?}: {e}")))?;
    let block_id = commit
        .attribute("block_id")
        .ok_or_else(|| MirrorError::Ingest("block-commit without block_id".into()))?;

    Ok(Some(Block::new(block_num, block_id)))
}
