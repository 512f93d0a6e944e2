//! ledgermirror-storage: relational backends for LedgerMirror.
//!
//! Backends:
//! - [`sqlite`]: SQLite via `sqlx` (embedded, single-file persistence)
//! - [`postgres`]: PostgreSQL via `sqlx` (feature `postgres`)
//!
//! Both create one table per entity kind plus a `blocks` table, and enforce
//! the one-current-version rule with a partial unique index.
//! `ledgermirror_core::MemoryStore` covers the in-memory case.

#[cfg(any(feature = "sqlite", feature = "postgres"))]
mod sql;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use ledgermirror_core::MemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStorage;
