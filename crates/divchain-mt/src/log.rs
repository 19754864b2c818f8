//! Structured lifecycle log for the concurrent table.
//!
//! Same shape as `divchain_core::log`, with events specific to
//! multithreaded coordination (`batch_published`, `rehash_coordinated`)
//! in addition to the core `grow`/`schedule_exhausted` pair.

use parking_lot::Mutex;

/// Severity of a [`LifecycleRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

/// One structured event in a concurrent table's lifecycle log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleRecord {
    pub event_id: u64,
    pub level: LogLevel,
    /// Event tag (`"grow"`, `"schedule_exhausted"`, `"batch_published"`,
    /// `"rehash_coordinated"`, …).
    pub event: &'static str,
    pub old_count: Option<u64>,
    pub new_count: Option<u64>,
    pub num_elts: u64,
    pub max_num_elts: u64,
}

const LOG_CAP: usize = 4096;

#[derive(Debug, Default)]
struct Inner {
    records: Vec<LifecycleRecord>,
    next_id: u64,
}

/// Append-only, drainable lifecycle log, safe to share across writer
/// threads behind a single `Mutex` — the log itself is not on any
/// per-operation hot path that needs striping.
#[derive(Debug, Default)]
pub struct LifecycleLog {
    inner: Mutex<Inner>,
}

impl LifecycleLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &self,
        level: LogLevel,
        event: &'static str,
        old_count: Option<u64>,
        new_count: Option<u64>,
        num_elts: u64,
        max_num_elts: u64,
    ) {
        let mut inner = self.inner.lock();
        if inner.records.len() >= LOG_CAP {
            inner.records.remove(0);
        }
        let event_id = inner.next_id;
        inner.next_id += 1;
        inner.records.push(LifecycleRecord {
            event_id,
            level,
            event,
            old_count,
            new_count,
            num_elts,
            max_num_elts,
        });
    }

    /// Snapshot of current records without clearing the log.
    #[must_use]
    pub fn records(&self) -> Vec<LifecycleRecord> {
        self.inner.lock().records.clone()
    }

    /// Returns and clears all buffered records.
    pub fn drain(&self) -> Vec<LifecycleRecord> {
        std::mem::take(&mut self.inner.lock().records)
    }
}
