//! Division-method chaining hash table over fixed-size byte keys.
//!
//! A key is hashed to a slot index by `reduce_key(key) % count`, and
//! collisions within a slot are resolved by a circular doubly linked
//! [`chain::Chain`]. `count` is drawn from a fixed prime schedule
//! ([`prime_schedule`]) and grows, per an integer load-factor bound
//! ([`load_bound`]), as elements accumulate.
//!
//! This crate is single-threaded; see `divchain-mt` for the striped,
//! lock-coordinated concurrent variant built on top of the same
//! [`chain::Arena`]/[`prime_schedule`]/[`load_bound`] primitives.

pub mod alignment;
pub mod callbacks;
pub mod chain;
pub mod error;
pub mod load_bound;
pub mod log;
pub mod prime_schedule;
pub mod table;

pub use callbacks::{ByteKeyCompare, FreeElt, KeyCompare, KeyReduce, NoopFreeElt, SumKeyReduce};
pub use chain::{Arena, Chain, NodeHandle};
pub use error::DivChainError;
pub use load_bound::LoadBound;
pub use log::{LifecycleLog, LifecycleRecord, LogLevel};
pub use prime_schedule::ScheduleIx;
pub use table::{DivChainTable, TableConfig};
