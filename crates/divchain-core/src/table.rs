//! Single-threaded division-method chaining hash table.

use crate::callbacks::{ByteKeyCompare, FreeElt, KeyCompare, KeyReduce, NoopFreeElt, SumKeyReduce};
use crate::chain::{Arena, Chain, NodeHandle};
use crate::error::DivChainError;
use crate::load_bound::LoadBound;
use crate::log::{LifecycleLog, LifecycleRecord, LogLevel};
use crate::prime_schedule::ScheduleIx;

/// Validated construction parameters for a [`DivChainTable`].
///
/// Field preconditions (violating any yields `Err(DivChainError)`
/// from [`DivChainTable::try_new`]):
/// - `key_size > 0`
/// - `alpha_n > 0`, `log_alpha_d < 64`
/// - the schedule must contain a prime reaching a load bound of at
///   least `min_num`
#[derive(Debug, Clone, Copy)]
pub struct TableConfig {
    pub key_size: usize,
    pub elt_size: usize,
    pub min_num: u64,
    pub alpha_n: u64,
    pub log_alpha_d: u32,
}

/// Division-method chaining hash table: `slots[hash(key) % count]` is
/// a [`Chain`] over nodes held in a single shared [`Arena`].
pub struct DivChainTable {
    arena: Arena,
    slots: Vec<Chain>,
    schedule_ix: ScheduleIx,
    count: u64,
    num_elts: u64,
    load_bound: LoadBound,
    alignment: usize,
    cmp_key: Box<dyn KeyCompare>,
    rdc_key: Box<dyn KeyReduce>,
    log: LifecycleLog,
}

impl DivChainTable {
    /// Constructs a table with the default byte-wise comparator and
    /// little-endian summing key reducer.
    pub fn try_new(config: TableConfig) -> Result<Self, DivChainError> {
        Self::try_new_with_callbacks(config, Box::new(ByteKeyCompare), Box::new(SumKeyReduce))
    }

    /// Constructs a table with caller-supplied key comparison and
    /// reduction callbacks.
    pub fn try_new_with_callbacks(
        config: TableConfig,
        cmp_key: Box<dyn KeyCompare>,
        rdc_key: Box<dyn KeyReduce>,
    ) -> Result<Self, DivChainError> {
        if config.key_size == 0 {
            return Err(DivChainError::ZeroKeySize);
        }
        let load_bound = LoadBound::new(config.alpha_n, config.log_alpha_d).ok_or(
            DivChainError::InvalidLoadBound {
                alpha_n: config.alpha_n,
                log_alpha_d: config.log_alpha_d,
            },
        )?;

        let mut schedule_ix = ScheduleIx::first();
        loop {
            let Some(count) = schedule_ix.count() else {
                return Err(DivChainError::ScheduleUnsatisfiable {
                    min_num: config.min_num,
                });
            };
            if load_bound.max_num_elts(count) >= config.min_num {
                break;
            }
            schedule_ix = schedule_ix.next();
        }
        let count = schedule_ix.count().expect("checked above");

        Ok(Self {
            arena: Arena::new(config.key_size, config.elt_size, 1),
            slots: vec![Chain::new(); count as usize],
            schedule_ix,
            count,
            num_elts: 0,
            load_bound,
            alignment: 1,
            cmp_key,
            rdc_key,
            log: LifecycleLog::new(),
        })
    }

    #[must_use]
    pub fn key_size(&self) -> usize {
        self.arena.key_size()
    }

    #[must_use]
    pub fn elt_size(&self) -> usize {
        self.arena.elt_size()
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    #[must_use]
    pub fn num_elts(&self) -> u64 {
        self.num_elts
    }

    #[must_use]
    pub fn max_num_elts(&self) -> u64 {
        self.load_bound.max_num_elts(self.count)
    }

    #[must_use]
    pub fn is_schedule_exhausted(&self) -> bool {
        self.schedule_ix.is_exhausted()
    }

    /// Records the value-area alignment used by subsequently
    /// allocated nodes (existing nodes keep their prior layout).
    pub fn align_elt(&mut self, alignment: usize) -> Result<(), DivChainError> {
        if alignment == 0 {
            return Err(DivChainError::ZeroAlignment);
        }
        self.alignment = alignment;
        self.arena.set_alignment(alignment);
        Ok(())
    }

    /// Current lifecycle log, without clearing it.
    #[must_use]
    pub fn lifecycle_logs(&self) -> &[LifecycleRecord] {
        self.log.records()
    }

    /// Returns and clears the lifecycle log.
    pub fn drain_lifecycle_logs(&mut self) -> Vec<LifecycleRecord> {
        self.log.drain()
    }

    fn hash(&self, key: &[u8]) -> usize {
        (self.rdc_key.reduce_key(key) % self.count) as usize
    }

    /// Inserts `key -> value`, or overwrites the value of an existing
    /// key (invoking `free_elt` on the displaced bytes first). Always
    /// succeeds. May trigger a grow if the load bound is exceeded and
    /// the schedule is not exhausted.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) {
        self.insert_with_free(key, value, &NoopFreeElt);
    }

    /// As [`DivChainTable::insert`], but invokes `free_elt` on a
    /// displaced value (update case) instead of silently discarding it.
    pub fn insert_with_free(&mut self, key: &[u8], value: &[u8], free_elt: &dyn FreeElt) {
        assert_eq!(key.len(), self.key_size(), "key length must equal key_size");
        assert_eq!(value.len(), self.elt_size(), "value length must equal elt_size");
        let ix = self.hash(key);
        if let Some(handle) = self.slots[ix].search_key(&self.arena, key, self.cmp_key.as_ref()) {
            let slot = self
                .arena
                .get_value_mut(handle)
                .expect("handle just returned by search_key is live");
            free_elt.free_elt(slot);
            slot.copy_from_slice(value);
            return;
        }
        self.slots[ix].prepend_new(&mut self.arena, key, value);
        self.num_elts += 1;
        if self.num_elts > self.max_num_elts() && !self.schedule_ix.is_exhausted() {
            self.grow();
        }
    }

    /// Returns the value bytes for `key`, or `None` if absent.
    #[must_use]
    pub fn search(&self, key: &[u8]) -> Option<&[u8]> {
        let ix = self.hash(key);
        let handle = self.slots[ix].search_key(&self.arena, key, self.cmp_key.as_ref())?;
        self.arena.get(handle).map(|(_, v)| v)
    }

    /// Removes `key` without invoking `free_elt`, returning its value
    /// bytes. `None` (no-op) if the key is absent.
    pub fn remove(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        let ix = self.hash(key);
        let handle = self.slots[ix].search_key(&self.arena, key, self.cmp_key.as_ref())?;
        let value = self.arena.get(handle).map(|(_, v)| v.to_vec())?;
        let removed = self.slots[ix].delete_bytes(&mut self.arena, handle);
        debug_assert!(removed);
        self.num_elts -= 1;
        Some(value)
    }

    /// Removes `key`, invoking `free_elt` on its value first.
    /// No-op (returns `false`) if the key is absent.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        self.delete_with_free(key, &NoopFreeElt)
    }

    /// As [`DivChainTable::delete`], with an explicit `free_elt`.
    pub fn delete_with_free(&mut self, key: &[u8], free_elt: &dyn FreeElt) -> bool {
        let ix = self.hash(key);
        let Some(handle) = self.slots[ix].search_key(&self.arena, key, self.cmp_key.as_ref()) else {
            return false;
        };
        if let Some(slot) = self.arena.get_value_mut(handle) {
            free_elt.free_elt(slot);
        }
        let removed = self.slots[ix].delete_bytes(&mut self.arena, handle);
        debug_assert!(removed);
        self.num_elts -= 1;
        true
    }

    /// Frees every chain (invoking `free_elt` on each value) and
    /// empties the table. `num_elts` resets to zero; `count` and the
    /// schedule position are unchanged, matching
    /// `DivChainTableMT::clear_with_free`.
    pub fn clear(&mut self) {
        self.clear_with_free(&NoopFreeElt);
    }

    pub fn clear_with_free(&mut self, free_elt: &dyn FreeElt) {
        for chain in &mut self.slots {
            for handle in chain.handles(&self.arena) {
                if let Some(slot) = self.arena.get_value_mut(handle) {
                    free_elt.free_elt(slot);
                }
            }
            chain.free_all(&mut self.arena);
        }
        self.num_elts = 0;
    }

    /// Advances the schedule until `num_elts <= max_num_elts` or the
    /// schedule is exhausted, then rehashes every live node into a
    /// freshly sized slot array. Nodes are spliced, never
    /// reallocated: their arena handles remain valid across the grow.
    fn grow(&mut self) {
        let old_count = self.count;
        let mut ix = self.schedule_ix;
        let mut count = self.count;
        loop {
            ix = ix.next();
            match ix.count() {
                Some(c) => {
                    count = c;
                    if self.num_elts <= self.load_bound.max_num_elts(c) {
                        break;
                    }
                }
                None => {
                    self.log.push(
                        LogLevel::Warn,
                        "schedule_exhausted",
                        Some(old_count),
                        None,
                        self.num_elts,
                        self.max_num_elts(),
                    );
                    break;
                }
            }
        }
        self.schedule_ix = ix;
        if count == old_count {
            // Exhausted without the count changing; nothing to rehash.
            return;
        }
        self.count = count;

        let old_slots = std::mem::replace(&mut self.slots, vec![Chain::new(); count as usize]);
        for mut old_chain in old_slots {
            for handle in old_chain.handles(&self.arena) {
                old_chain.remove(&mut self.arena, handle);
                let (key, _) = self.arena.get(handle).expect("just removed, still live");
                let new_ix = (self.rdc_key.reduce_key(key) % self.count) as usize;
                self.splice_existing(new_ix, handle);
            }
        }
        self.log.push(
            LogLevel::Info,
            "grow",
            Some(old_count),
            Some(count),
            self.num_elts,
            self.max_num_elts(),
        );
    }

    /// Splices an already-allocated arena node (as produced by
    /// removing it from its previous chain during a grow) onto the
    /// front of `slots[ix]`, without allocating.
    fn splice_existing(&mut self, ix: usize, handle: NodeHandle) {
        // `Chain` exposes allocation-based prepend only; grow reuses
        // the low-level ring-splice directly since the node already
        // exists in the arena.
        self.slots[ix].prepend_existing(&mut self.arena, handle);
    }
}
