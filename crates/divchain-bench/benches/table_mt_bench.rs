//! Concurrent table benchmarks: batched insert throughput and
//! contended search under a fixed shard count.

use std::sync::Arc;
use std::thread;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use divchain_mt::{DivChainTableMT, TableConfigMt};

fn config(num_locks: usize) -> TableConfigMt {
    TableConfigMt {
        key_size: 8,
        elt_size: 8,
        min_num: 0,
        alpha_n: 1,
        log_alpha_d: 0,
        num_locks,
    }
}

fn bench_batched_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("batched_insert");
    for &batch_size in &[16usize, 256, 4096] {
        group.bench_with_input(
            BenchmarkId::new("batch_size", batch_size),
            &batch_size,
            |b, &batch_size| {
                b.iter(|| {
                    let t = DivChainTableMT::try_new(config(16)).unwrap();
                    let batch: Vec<_> = (0u64..batch_size as u64)
                        .map(|i| (i.to_le_bytes().to_vec(), i.to_le_bytes().to_vec()))
                        .collect();
                    t.insert(&batch).unwrap();
                    criterion::black_box(&t);
                });
            },
        );
    }
    group.finish();
}

fn bench_concurrent_writers(c: &mut Criterion) {
    c.bench_function("concurrent_writers_8x1000", |b| {
        b.iter(|| {
            let t = Arc::new(DivChainTableMT::try_new(config(16)).unwrap());
            let handles: Vec<_> = (0u64..8)
                .map(|worker| {
                    let t = Arc::clone(&t);
                    thread::spawn(move || {
                        let batch: Vec<_> = (0u64..1000)
                            .map(|i| {
                                let key = worker * 100_000 + i;
                                (key.to_le_bytes().to_vec(), key.to_le_bytes().to_vec())
                            })
                            .collect();
                        t.insert(&batch).unwrap();
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            criterion::black_box(&t);
        });
    });
}

criterion_group!(benches, bench_batched_insert, bench_concurrent_writers);
criterion_main!(benches);
