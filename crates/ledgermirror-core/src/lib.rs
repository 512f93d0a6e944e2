//! ledgermirror-core: reconciles a ledger's event stream into block-range
//! versioned state.
//!
//! # Architecture
//!
//! ```text
//! Reconciler (one store transaction per batch)
//!     ├── EventIngestor  (block-commit + state-delta → block, namespace changes)
//!     ├── ForkResolver   (new / duplicate / fork → drop history ≥ height)
//!     ├── StateApplier   (decode, close current version, insert new version)
//!     └── MirrorStore    (memory / SQLite / Postgres)
//! ```
//!
//! Every entity version is valid over `[start_block_num, end_block_num)`;
//! the current version of an entity ends at [`UNBOUNDED`].

pub mod address;
pub mod apply;
pub mod builder;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod event;
pub mod fork;
pub mod ingest;
pub mod store;
pub mod types;

pub use address::{AddressSpace, NAMESPACE};
pub use apply::{ApplySummary, StateApplier};
pub use builder::MirrorBuilder;
pub use config::MirrorConfig;
pub use decoder::{DecodedState, JsonStateDecoder, StateDecoder};
pub use engine::{BatchOutcome, Reconciler};
pub use error::MirrorError;
pub use event::{Event, EventAttribute};
pub use fork::{ForkEvent, ForkOutcome, ForkResolver};
pub use ingest::{EventIngestor, ParsedBatch};
pub use store::{MemoryStore, MirrorStore, StoreTransaction};
pub use types::{Block, EntityKind, EntityVersion, Record, StateChange, UNBOUNDED};
