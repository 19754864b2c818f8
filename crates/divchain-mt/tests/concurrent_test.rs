//! Integration test: concurrent writer/reader scenarios
//!
//! Exercises DivChainTableMT under real OS threads: disjoint
//! concurrent batches, a grow forced mid-flight by concurrent writers,
//! and readers running alongside writers with no torn reads.
//!
//! Run: cargo test -p divchain-mt --test concurrent_test

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use divchain_mt::{DivChainTableMT, TableConfigMt};

fn cfg(num_locks: usize) -> TableConfigMt {
    TableConfigMt {
        key_size: 8,
        elt_size: 8,
        min_num: 0,
        alpha_n: 1,
        log_alpha_d: 1,
        num_locks,
    }
}

#[test]
fn many_writers_many_grows_no_lost_or_duplicated_entries() {
    let table = Arc::new(DivChainTableMT::try_new(cfg(8)).unwrap());
    const WORKERS: u64 = 16;
    const PER_WORKER: u64 = 4_000;
    const BATCH: u64 = 50;

    let handles: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                let mut i = 0u64;
                while i < PER_WORKER {
                    let batch: Vec<_> = (0..BATCH)
                        .map(|j| {
                            let key = worker * 1_000_000 + i + j;
                            (key.to_le_bytes().to_vec(), key.to_le_bytes().to_vec())
                        })
                        .collect();
                    table.insert(&batch).unwrap();
                    i += BATCH;
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(table.num_elts(), WORKERS * PER_WORKER);
    for worker in 0..WORKERS {
        for i in 0..PER_WORKER {
            let key = worker * 1_000_000 + i;
            let v = table.search(&key.to_le_bytes()).unwrap();
            assert_eq!(u64::from_le_bytes(v.try_into().unwrap()), key);
        }
    }
    assert!(table.count() > 1543, "table should have grown past its initial size");
}

#[test]
fn readers_never_observe_a_torn_table_during_concurrent_growth() {
    let table = Arc::new(DivChainTableMT::try_new(cfg(8)).unwrap());
    let stop = Arc::new(AtomicBool::new(false));

    // Seed a stable key before readers start, so every reader has
    // something guaranteed present to check on every iteration.
    table.insert_one(&0u64.to_le_bytes(), &0u64.to_le_bytes()).unwrap();

    let writer = {
        let table = Arc::clone(&table);
        thread::spawn(move || {
            for chunk in 0u64..200 {
                let batch: Vec<_> = (0u64..100)
                    .map(|i| {
                        let key = 1 + chunk * 100 + i;
                        (key.to_le_bytes().to_vec(), key.to_le_bytes().to_vec())
                    })
                    .collect();
                table.insert(&batch).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let table = Arc::clone(&table);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let v = table.search(&0u64.to_le_bytes());
                    assert_eq!(v, Some(0u64.to_le_bytes().to_vec()));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    stop.store(true, Ordering::Relaxed);
    for r in readers {
        r.join().unwrap();
    }

    assert_eq!(table.num_elts(), 1 + 200 * 100);
}
