//! Construction-time errors for [`crate::table::DivChainTable`].
//!
//! The C original leaves out-of-range parameters undefined; a safe
//! Rust library instead rejects them at construction.

use thiserror::Error;

/// Rejected configuration for a [`crate::table::DivChainTable`].
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum DivChainError {
    /// `key_size == 0`; a chain cannot compare zero-byte keys.
    #[error("key_size must be non-zero")]
    ZeroKeySize,

    /// `alpha_n == 0` or `log_alpha_d` is not a valid shift for the word type.
    #[error("invalid load bound: alpha_n={alpha_n}, log_alpha_d={log_alpha_d}")]
    InvalidLoadBound { alpha_n: u64, log_alpha_d: u32 },

    /// `min_num` exceeds the load bound achievable even at the largest
    /// schedule prime.
    #[error("no schedule entry reaches a load bound of min_num={min_num}")]
    ScheduleUnsatisfiable { min_num: u64 },

    /// `align_elt(0)` was requested.
    #[error("elt alignment must be non-zero")]
    ZeroAlignment,
}
