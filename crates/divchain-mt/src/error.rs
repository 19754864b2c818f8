//! Construction-time errors for [`crate::table_mt::DivChainTableMT`].

use thiserror::Error;

/// Rejected configuration for a [`crate::table_mt::DivChainTableMT`].
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum DivChainMtError {
    /// A `divchain-core` construction precondition was violated.
    #[error(transparent)]
    Core(#[from] divchain_core::DivChainError),

    /// `num_locks == 0`; every slot needs a striped lock to belong to.
    #[error("num_locks must be non-zero")]
    ZeroLockStripes,

    /// `insert` was called with an empty batch.
    #[error("insert batch must be non-empty")]
    EmptyBatch,
}
