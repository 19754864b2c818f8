//! Concurrent division-method chaining hash table.
//!
//! Storage is partitioned into `num_locks` shards (`slot_ix mod
//! num_locks`), each owning its own [`Arena`] and slice of
//! [`Chain`]s. A table-wide
//! `RwLock<TableMeta>` is the rehash lock: readers (search, and the
//! per-pair body of a batched insert) hold it in shared mode for the
//! duration of their work, so a grow — which needs every shard's
//! slots resized and every node possibly re-sharded — can only begin
//! once no reader or other writer is active. Lock order is always
//! rehash lock, then the one shard lock a given key hashes to; no
//! operation ever holds two shard locks at once.

use std::sync::atomic::{AtomicU64, Ordering};

use divchain_core::{
    Arena, ByteKeyCompare, Chain, DivChainError, FreeElt, KeyCompare, KeyReduce, LoadBound,
    NoopFreeElt, ScheduleIx, SumKeyReduce,
};
use parking_lot::{Condvar, Mutex, RwLock};

use crate::error::DivChainMtError;
use crate::log::{LifecycleLog, LogLevel};

/// Validated construction parameters for a [`DivChainTableMT`].
#[derive(Debug, Clone, Copy)]
pub struct TableConfigMt {
    pub key_size: usize,
    pub elt_size: usize,
    pub min_num: u64,
    pub alpha_n: u64,
    pub log_alpha_d: u32,
    /// Number of independent slot-group locks (and arena shards).
    pub num_locks: usize,
}

struct TableMeta {
    count: u64,
    schedule_ix: ScheduleIx,
}

struct Shard {
    arena: Arena,
    slots: Vec<Chain>,
}

struct RehashState {
    in_progress: bool,
}

struct RehashCoordinator {
    state: Mutex<RehashState>,
    done: Condvar,
}

/// Number of global slot indices congruent to `shard_id mod num_locks`
/// that fall below `total_count`.
fn shard_len(total_count: u64, num_locks: usize, shard_id: usize) -> usize {
    let num_locks = num_locks as u64;
    let shard_id = shard_id as u64;
    let base = total_count / num_locks;
    let rem = total_count % num_locks;
    (base + u64::from(shard_id < rem)) as usize
}

/// Concurrent division-method chaining hash table with batched,
/// atomically-published inserts.
pub struct DivChainTableMT {
    rehash: RwLock<TableMeta>,
    shards: Box<[Mutex<Shard>]>,
    num_locks: usize,
    key_size: usize,
    elt_size: usize,
    load_bound: LoadBound,
    cmp_key: Box<dyn KeyCompare>,
    rdc_key: Box<dyn KeyReduce>,
    num_elts: AtomicU64,
    coordinator: RehashCoordinator,
    log: LifecycleLog,
}

impl DivChainTableMT {
    /// Constructs a table with the default byte-wise comparator and
    /// little-endian summing key reducer.
    pub fn try_new(config: TableConfigMt) -> Result<Self, DivChainMtError> {
        Self::try_new_with_callbacks(config, Box::new(ByteKeyCompare), Box::new(SumKeyReduce))
    }

    pub fn try_new_with_callbacks(
        config: TableConfigMt,
        cmp_key: Box<dyn KeyCompare>,
        rdc_key: Box<dyn KeyReduce>,
    ) -> Result<Self, DivChainMtError> {
        if config.num_locks == 0 {
            return Err(DivChainMtError::ZeroLockStripes);
        }
        if config.key_size == 0 {
            return Err(DivChainMtError::Core(DivChainError::ZeroKeySize));
        }
        let load_bound = LoadBound::new(config.alpha_n, config.log_alpha_d).ok_or(
            DivChainMtError::Core(DivChainError::InvalidLoadBound {
                alpha_n: config.alpha_n,
                log_alpha_d: config.log_alpha_d,
            }),
        )?;

        let mut schedule_ix = ScheduleIx::first();
        loop {
            let Some(count) = schedule_ix.count() else {
                return Err(DivChainMtError::Core(DivChainError::ScheduleUnsatisfiable {
                    min_num: config.min_num,
                }));
            };
            if load_bound.max_num_elts(count) >= config.min_num {
                break;
            }
            schedule_ix = schedule_ix.next();
        }
        let count = schedule_ix.count().expect("checked above");

        let shards: Vec<Mutex<Shard>> = (0..config.num_locks)
            .map(|s| {
                let len = shard_len(count, config.num_locks, s);
                Mutex::new(Shard {
                    arena: Arena::new(config.key_size, config.elt_size, 1),
                    slots: vec![Chain::new(); len],
                })
            })
            .collect();

        Ok(Self {
            rehash: RwLock::new(TableMeta { count, schedule_ix }),
            shards: shards.into_boxed_slice(),
            num_locks: config.num_locks,
            key_size: config.key_size,
            elt_size: config.elt_size,
            load_bound,
            cmp_key,
            rdc_key,
            num_elts: AtomicU64::new(0),
            coordinator: RehashCoordinator {
                state: Mutex::new(RehashState { in_progress: false }),
                done: Condvar::new(),
            },
            log: LifecycleLog::new(),
        })
    }

    #[must_use]
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    #[must_use]
    pub fn elt_size(&self) -> usize {
        self.elt_size
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.rehash.read().count
    }

    #[must_use]
    pub fn num_elts(&self) -> u64 {
        self.num_elts.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn max_num_elts(&self) -> u64 {
        self.load_bound.max_num_elts(self.count())
    }

    #[must_use]
    pub fn lifecycle_logs(&self) -> Vec<crate::log::LifecycleRecord> {
        self.log.records()
    }

    pub fn drain_lifecycle_logs(&self) -> Vec<crate::log::LifecycleRecord> {
        self.log.drain()
    }

    /// Records the value-area alignment used by subsequently
    /// allocated nodes across every shard. Takes the rehash lock in
    /// writer mode since it touches every shard's arena.
    pub fn align_elt(&self, alignment: usize) -> Result<(), DivChainMtError> {
        if alignment == 0 {
            return Err(DivChainMtError::Core(DivChainError::ZeroAlignment));
        }
        let _meta = self.rehash.write();
        for shard_lock in self.shards.iter() {
            shard_lock.lock().arena.set_alignment(alignment);
        }
        Ok(())
    }

    fn locate(&self, count: u64, key: &[u8]) -> (usize, usize) {
        let slot_ix = (self.rdc_key.reduce_key(key) % count) as usize;
        (slot_ix % self.num_locks, slot_ix / self.num_locks)
    }

    /// Batched insert: every pair in `pairs` is visible to readers as
    /// soon as this call returns, never partially. Within the batch,
    /// pairs are applied in order — the last write of a repeated key
    /// wins.
    pub fn insert(&self, pairs: &[(Vec<u8>, Vec<u8>)]) -> Result<(), DivChainMtError> {
        self.insert_with_free(pairs, &NoopFreeElt)
    }

    /// As [`DivChainTableMT::insert`], invoking `free_elt` on any
    /// value displaced by an in-batch or pre-existing update.
    pub fn insert_with_free(
        &self,
        pairs: &[(Vec<u8>, Vec<u8>)],
        free_elt: &dyn FreeElt,
    ) -> Result<(), DivChainMtError> {
        if pairs.is_empty() {
            return Err(DivChainMtError::EmptyBatch);
        }
        let mut net_new: u64 = 0;
        {
            // Held for the whole batch: blocks a rehash writer from
            // starting mid-batch, but never blocks other readers or
            // concurrent batches touching different shards.
            let meta = self.rehash.read();
            for (key, value) in pairs {
                assert_eq!(key.len(), self.key_size, "key length must equal key_size");
                assert_eq!(value.len(), self.elt_size, "value length must equal elt_size");
                let (shard_id, local_ix) = self.locate(meta.count, key);
                let mut shard = self.shards[shard_id].lock();
                if let Some(handle) =
                    shard.slots[local_ix].search_key(&shard.arena, key, self.cmp_key.as_ref())
                {
                    let slot = shard
                        .arena
                        .get_value_mut(handle)
                        .expect("handle just returned by search_key is live");
                    free_elt.free_elt(slot);
                    slot.copy_from_slice(value);
                } else {
                    shard.slots[local_ix].prepend_new(&mut shard.arena, key, value);
                    net_new += 1;
                }
            }
        }
        if net_new > 0 {
            self.num_elts.fetch_add(net_new, Ordering::AcqRel);
        }
        self.log.push(
            LogLevel::Info,
            "batch_published",
            None,
            None,
            self.num_elts(),
            self.max_num_elts(),
        );
        if self.num_elts() > self.max_num_elts() {
            self.maybe_rehash();
        }
        Ok(())
    }

    /// Convenience wrapper over [`DivChainTableMT::insert`] for a
    /// single pair.
    pub fn insert_one(&self, key: &[u8], value: &[u8]) -> Result<(), DivChainMtError> {
        self.insert(&[(key.to_vec(), value.to_vec())])
    }

    /// Returns a clone of the value bytes for `key`, or `None` if
    /// absent. A search always sees a consistent pre- or post-rehash
    /// snapshot, never a torn one.
    #[must_use]
    pub fn search(&self, key: &[u8]) -> Option<Vec<u8>> {
        let meta = self.rehash.read();
        let (shard_id, local_ix) = self.locate(meta.count, key);
        let shard = self.shards[shard_id].lock();
        let handle = shard.slots[local_ix].search_key(&shard.arena, key, self.cmp_key.as_ref())?;
        shard.arena.get(handle).map(|(_, v)| v.to_vec())
    }

    /// Removes `key` without invoking `free_elt`, returning its value.
    /// A no-op (`None`) if the key is absent.
    pub fn remove(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.remove_with_free(key, &NoopFreeElt)
    }

    pub fn remove_with_free(&self, key: &[u8], free_elt: &dyn FreeElt) -> Option<Vec<u8>> {
        let meta = self.rehash.read();
        let (shard_id, local_ix) = self.locate(meta.count, key);
        let mut shard = self.shards[shard_id].lock();
        let handle = shard.slots[local_ix].search_key(&shard.arena, key, self.cmp_key.as_ref())?;
        let value = shard.arena.get(handle).map(|(_, v)| v.to_vec())?;
        if let Some(slot) = shard.arena.get_value_mut(handle) {
            free_elt.free_elt(slot);
        }
        let removed = shard.slots[local_ix].delete_bytes(&mut shard.arena, handle);
        debug_assert!(removed);
        drop(shard);
        drop(meta);
        self.num_elts.fetch_sub(1, Ordering::AcqRel);
        Some(value)
    }

    /// Removes `key`, invoking `free_elt` on its value. No-op
    /// (`false`) if absent.
    pub fn delete(&self, key: &[u8]) -> bool {
        self.remove(key).is_some()
    }

    /// Drops every node across every shard (invoking `free_elt` on
    /// each value first) and resets `num_elts` to zero. `count` and
    /// the schedule position are unchanged.
    pub fn clear_with_free(&self, free_elt: &dyn FreeElt) {
        let _meta = self.rehash.write();
        for shard_lock in self.shards.iter() {
            let mut shard = shard_lock.lock();
            for chain in &mut shard.slots {
                for handle in chain.handles(&shard.arena) {
                    if let Some(slot) = shard.arena.get_value_mut(handle) {
                        free_elt.free_elt(slot);
                    }
                }
                chain.free_all(&mut shard.arena);
            }
        }
        self.num_elts.store(0, Ordering::Release);
    }

    pub fn clear(&self) {
        self.clear_with_free(&NoopFreeElt);
    }

    /// Checks the global load bound and, if exceeded, elects one
    /// caller to perform the grow while every other caller that hits
    /// the same condition waits on the rehash-coordination condition
    /// variable until the winner finishes. Matches the "one thread
    /// wins the writer role" protocol: losing threads never attempt
    /// the rehash lock upgrade themselves.
    fn maybe_rehash(&self) {
        let exhausted = {
            let meta = self.rehash.read();
            if self.num_elts() <= self.load_bound.max_num_elts(meta.count) {
                return;
            }
            meta.schedule_ix.is_exhausted()
        };
        if exhausted {
            return;
        }
        {
            let mut state = self.coordinator.state.lock();
            if state.in_progress {
                while state.in_progress {
                    self.coordinator.done.wait(&mut state);
                }
                return;
            }
            state.in_progress = true;
        }
        self.do_grow();
        let mut state = self.coordinator.state.lock();
        state.in_progress = false;
        drop(state);
        self.coordinator.done.notify_all();
    }

    /// Exclusive rehash: advances the schedule, resizes every shard's
    /// slot vector, and redistributes every live node by its new
    /// `slot_ix`. A node's shard can change across a grow (the
    /// modulus changed), so unlike the single-threaded table's
    /// in-place splice, nodes here are read out, freed from their old
    /// shard's arena, and reinserted fresh into whichever shard now
    /// owns their slot.
    fn do_grow(&self) {
        let mut meta = self.rehash.write();
        let old_count = meta.count;
        let num_elts = self.num_elts();
        let mut ix = meta.schedule_ix;
        let mut new_count = old_count;
        loop {
            ix = ix.next();
            match ix.count() {
                Some(c) => {
                    new_count = c;
                    if num_elts <= self.load_bound.max_num_elts(c) {
                        break;
                    }
                }
                None => {
                    self.log.push(
                        LogLevel::Warn,
                        "schedule_exhausted",
                        Some(old_count),
                        None,
                        num_elts,
                        self.load_bound.max_num_elts(old_count),
                    );
                    break;
                }
            }
        }
        meta.schedule_ix = ix;
        if new_count == old_count {
            return;
        }
        meta.count = new_count;

        let mut shards: Vec<_> = self.shards.iter().map(Mutex::lock).collect();
        let mut pairs = Vec::new();
        for shard in shards.iter_mut() {
            for chain in &mut shard.slots {
                for handle in chain.handles(&shard.arena) {
                    if let Some((k, v)) = shard.arena.get(handle) {
                        pairs.push((k.to_vec(), v.to_vec()));
                    }
                }
                chain.free_all(&mut shard.arena);
            }
        }
        for (s, shard) in shards.iter_mut().enumerate() {
            shard.slots = vec![Chain::new(); shard_len(new_count, self.num_locks, s)];
        }
        for (key, value) in &pairs {
            let slot_ix = (self.rdc_key.reduce_key(key) % new_count) as usize;
            let shard_id = slot_ix % self.num_locks;
            let local_ix = slot_ix / self.num_locks;
            let shard = &mut shards[shard_id];
            shard.slots[local_ix].prepend_new(&mut shard.arena, key, value);
        }
        drop(shards);
        self.log.push(
            LogLevel::Info,
            "grow",
            Some(old_count),
            Some(new_count),
            num_elts,
            self.load_bound.max_num_elts(new_count),
        );
        self.log.push(
            LogLevel::Debug,
            "rehash_coordinated",
            Some(old_count),
            Some(new_count),
            num_elts,
            self.load_bound.max_num_elts(new_count),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn small_config() -> TableConfigMt {
        TableConfigMt {
            key_size: 8,
            elt_size: 8,
            min_num: 0,
            alpha_n: 1,
            log_alpha_d: 0,
            num_locks: 4,
        }
    }

    #[test]
    fn rejects_zero_lock_stripes() {
        let mut cfg = small_config();
        cfg.num_locks = 0;
        assert_eq!(
            DivChainTableMT::try_new(cfg),
            Err(DivChainMtError::ZeroLockStripes)
        );
    }

    #[test]
    fn rejects_empty_batch() {
        let t = DivChainTableMT::try_new(small_config()).unwrap();
        assert_eq!(t.insert(&[]), Err(DivChainMtError::EmptyBatch));
    }

    #[test]
    fn batch_insert_then_search() {
        let t = DivChainTableMT::try_new(small_config()).unwrap();
        let batch: Vec<_> = (0u64..100)
            .map(|i| (i.to_le_bytes().to_vec(), (i * 2).to_le_bytes().to_vec()))
            .collect();
        t.insert(&batch).unwrap();
        assert_eq!(t.num_elts(), 100);
        for i in 0u64..100 {
            let v = t.search(&i.to_le_bytes()).unwrap();
            assert_eq!(u64::from_le_bytes(v.try_into().unwrap()), i * 2);
        }
    }

    #[test]
    fn repeated_key_within_a_batch_applies_last_write() {
        let t = DivChainTableMT::try_new(small_config()).unwrap();
        let k = 7u64.to_le_bytes().to_vec();
        let batch = vec![
            (k.clone(), 1u64.to_le_bytes().to_vec()),
            (k.clone(), 2u64.to_le_bytes().to_vec()),
            (k.clone(), 3u64.to_le_bytes().to_vec()),
        ];
        t.insert(&batch).unwrap();
        assert_eq!(t.num_elts(), 1);
        let v = t.search(&k).unwrap();
        assert_eq!(u64::from_le_bytes(v.try_into().unwrap()), 3);
    }

    #[test]
    fn remove_then_search_is_none() {
        let t = DivChainTableMT::try_new(small_config()).unwrap();
        let k = 42u64.to_le_bytes().to_vec();
        t.insert_one(&k, &1u64.to_le_bytes()).unwrap();
        let out = t.remove(&k).unwrap();
        assert_eq!(u64::from_le_bytes(out.try_into().unwrap()), 1);
        assert_eq!(t.search(&k), None);
        assert_eq!(t.num_elts(), 0);
    }

    #[test]
    fn concurrent_disjoint_batches_all_land() {
        let t = Arc::new(DivChainTableMT::try_new(small_config()).unwrap());
        let mut handles = Vec::new();
        for worker in 0u64..8 {
            let t = Arc::clone(&t);
            handles.push(thread::spawn(move || {
                let batch: Vec<_> = (0u64..200)
                    .map(|i| {
                        let key = worker * 10_000 + i;
                        (key.to_le_bytes().to_vec(), key.to_le_bytes().to_vec())
                    })
                    .collect();
                t.insert(&batch).unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(t.num_elts(), 1600);
        for worker in 0u64..8 {
            for i in 0u64..200 {
                let key = worker * 10_000 + i;
                let v = t.search(&key.to_le_bytes()).unwrap();
                assert_eq!(u64::from_le_bytes(v.try_into().unwrap()), key);
            }
        }
    }

    #[test]
    fn grow_under_concurrent_load_preserves_every_entry() {
        let cfg = TableConfigMt {
            key_size: 8,
            elt_size: 8,
            min_num: 0,
            alpha_n: 1,
            log_alpha_d: 0,
            num_locks: 8,
        };
        let t = Arc::new(DivChainTableMT::try_new(cfg).unwrap());
        let mut handles = Vec::new();
        for worker in 0u64..8 {
            let t = Arc::clone(&t);
            handles.push(thread::spawn(move || {
                for chunk in 0u64..50 {
                    let batch: Vec<_> = (0u64..20)
                        .map(|i| {
                            let key = worker * 100_000 + chunk * 20 + i;
                            (key.to_le_bytes().to_vec(), key.to_le_bytes().to_vec())
                        })
                        .collect();
                    t.insert(&batch).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(t.num_elts(), 8 * 50 * 20);
        for worker in 0u64..8 {
            for chunk in 0u64..50 {
                for i in 0u64..20 {
                    let key = worker * 100_000 + chunk * 20 + i;
                    let v = t.search(&key.to_le_bytes()).unwrap();
                    assert_eq!(u64::from_le_bytes(v.try_into().unwrap()), key);
                }
            }
        }
        assert!(t.count() > 1543);
    }

    #[test]
    fn align_elt_rejects_zero_and_applies_to_every_shard() {
        let t = DivChainTableMT::try_new(small_config()).unwrap();
        assert_eq!(
            t.align_elt(0),
            Err(DivChainMtError::Core(DivChainError::ZeroAlignment))
        );
        assert!(t.align_elt(16).is_ok());
        t.insert_one(&1u64.to_le_bytes(), &1u64.to_le_bytes()).unwrap();
        assert_eq!(
            t.search(&1u64.to_le_bytes()),
            Some(1u64.to_le_bytes().to_vec())
        );
    }

    #[test]
    fn clear_empties_every_shard() {
        let t = DivChainTableMT::try_new(small_config()).unwrap();
        let batch: Vec<_> = (0u64..40)
            .map(|i| (i.to_le_bytes().to_vec(), i.to_le_bytes().to_vec()))
            .collect();
        t.insert(&batch).unwrap();
        t.clear();
        assert_eq!(t.num_elts(), 0);
        for i in 0u64..40 {
            assert_eq!(t.search(&i.to_le_bytes()), None);
        }
    }
}
