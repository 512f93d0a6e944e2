//! Shared types for the reconciliation pipeline.

use serde::{Deserialize, Serialize};

use crate::address::AddressSpace;
use crate::error::MirrorError;

/// `end_block_num` of the current version of an entity: `2^63 - 1`.
///
/// Chosen to fit a signed 64-bit column in every relational backend.
pub const UNBOUNDED: u64 = i64::MAX as u64;

// ─── Block ────────────────────────────────────────────────────────────────────

/// One committed block, as announced by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block height.
    pub block_num: u64,
    /// Chain-specific block identifier.
    pub block_id: String,
}

impl Block {
    pub fn new(block_num: u64, block_id: impl Into<String>) -> Self {
        Self {
            block_num,
            block_id: block_id.into(),
        }
    }

    /// First eight characters of the id, for log lines.
    pub fn short_id(&self) -> &str {
        self.block_id.get(..8).unwrap_or(&self.block_id)
    }
}

// ─── StateChange ─────────────────────────────────────────────────────────────

/// A single address/value change from a state delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub address: String,
    pub value: Vec<u8>,
}

// ─── EntityKind ──────────────────────────────────────────────────────────────

/// The five kinds of entity mirrored from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Election,
    VotingOption,
    PollRegistration,
    Voter,
    Vote,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        Self::Election,
        Self::VotingOption,
        Self::PollRegistration,
        Self::Voter,
        Self::Vote,
    ];

    /// Name of the natural key field in decoded records and table columns.
    pub fn key_field(self) -> &'static str {
        match self {
            Self::Election => "election_id",
            Self::VotingOption => "voting_option_id",
            Self::PollRegistration => "voter_id",
            Self::Voter => "public_key",
            Self::Vote => "vote_id",
        }
    }

    /// Relational table holding this kind's versions.
    pub fn table_name(self) -> &'static str {
        match self {
            Self::Election => "elections",
            Self::VotingOption => "voting_options",
            Self::PollRegistration => "poll_registrations",
            Self::Voter => "voters",
            Self::Vote => "votes",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Election => "election",
            Self::VotingOption => "voting_option",
            Self::PollRegistration => "poll_registration",
            Self::Voter => "voter",
            Self::Vote => "vote",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s || k.table_name() == s)
            .ok_or_else(|| MirrorError::Other(format!("unknown entity kind: {s}")))
    }
}

impl TryFrom<AddressSpace> for EntityKind {
    type Error = AddressSpace;

    fn try_from(space: AddressSpace) -> Result<Self, Self::Error> {
        match space {
            AddressSpace::Election => Ok(Self::Election),
            AddressSpace::VotingOption => Ok(Self::VotingOption),
            AddressSpace::PollRegistration => Ok(Self::PollRegistration),
            AddressSpace::Voter => Ok(Self::Voter),
            AddressSpace::Vote => Ok(Self::Vote),
            other => Err(other),
        }
    }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// One structured record produced by a [`crate::decoder::StateDecoder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Natural key of the entity.
    pub key: String,
    /// Kind-specific payload.
    pub payload: serde_json::Value,
}

// ─── EntityVersion ───────────────────────────────────────────────────────────

/// One version of an entity, valid over `[start_block_num, end_block_num)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityVersion {
    pub kind: EntityKind,
    pub key: String,
    pub payload: serde_json::Value,
    pub start_block_num: u64,
    pub end_block_num: u64,
}

impl EntityVersion {
    /// Start building a version of `key`.
    pub fn builder(kind: EntityKind, key: impl Into<String>) -> VersionBuilder {
        VersionBuilder {
            kind,
            key: key.into(),
            payload: serde_json::Value::Null,
            start_block_num: 0,
            end_block_num: UNBOUNDED,
        }
    }

    /// Returns `true` if this is the current version of its entity.
    pub fn is_current(&self) -> bool {
        self.end_block_num == UNBOUNDED
    }

    /// Returns `true` if this version was visible at `block_num`.
    pub fn visible_at(&self, block_num: u64) -> bool {
        self.start_block_num <= block_num && block_num < self.end_block_num
    }
}

/// Builder for immutable [`EntityVersion`] values.
#[derive(Debug, Clone)]
pub struct VersionBuilder {
    kind: EntityKind,
    key: String,
    payload: serde_json::Value,
    start_block_num: u64,
    end_block_num: u64,
}

impl VersionBuilder {
    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Height at which the version became visible.
    pub fn start(mut self, block_num: u64) -> Self {
        self.start_block_num = block_num;
        self
    }

    /// Height at which the version stopped being visible.
    pub fn end(mut self, block_num: u64) -> Self {
        self.end_block_num = block_num;
        self
    }

    pub fn build(self) -> EntityVersion {
        EntityVersion {
            kind: self.kind,
            key: self.key,
            payload: self.payload,
            start_block_num: self.start_block_num,
            end_block_num: self.end_block_num,
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
