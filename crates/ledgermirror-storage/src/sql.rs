//! Helpers shared by the `sqlx` backends.

use ledgermirror_core::error::MirrorError;
use ledgermirror_core::types::UNBOUNDED;

/// `UNBOUNDED` as it is stored in a `BIGINT`/`INTEGER` column.
pub(crate) const UNBOUNDED_SQL: i64 = UNBOUNDED as i64;

pub(crate) fn db_err(e: sqlx::Error) -> MirrorError {
    MirrorError::Storage(e.to_string())
}

/// Convert a block height for a signed 64-bit column.
pub(crate) fn to_sql(block_num: u64) -> Result<i64, MirrorError> {
    i64::try_from(block_num)
        .map_err(|_| MirrorError::Storage(format!("block height {block_num} exceeds i64")))
}

pub(crate) fn from_sql(value: i64) -> Result<u64, MirrorError> {
    u64::try_from(value)
        .map_err(|_| MirrorError::Storage(format!("negative block height {value} in store")))
}

pub(crate) fn finished() -> MirrorError {
    MirrorError::Storage("transaction already finished".into())
}
