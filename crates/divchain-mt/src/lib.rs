//! Concurrent variant of `divchain-core`'s division-method chaining
//! hash table: sharded storage, a rehash rwlock, striped slot-group
//! mutexes, and batched, atomically-published inserts.

pub mod error;
pub mod log;
pub mod table_mt;

pub use error::DivChainMtError;
pub use log::{LifecycleLog, LifecycleRecord, LogLevel};
pub use table_mt::{DivChainTableMT, TableConfigMt};
