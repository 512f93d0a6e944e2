//! Error types for the reconciliation pipeline.

use thiserror::Error;

/// Errors that can occur while mirroring ledger events.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Ingest error: {0}")]
    Ingest(String),

    #[error("Decode error at {address}: {reason}")]
    Decode { address: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl MirrorError {
    /// Returns `true` if the error came from the backing store.
    ///
    /// A storage error aborts the whole batch; the batch can be redriven.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns `true` if a single state change could not be decoded.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }

    pub(crate) fn decode(address: &str, reason: impl Into<String>) -> Self {
        Self::Decode {
            address: address.to_string(),
            reason: reason.into(),
        }
    }
}
