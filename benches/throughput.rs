//! Throughput Benchmark for LapseKV
//!
//! This benchmark measures the performance of the key-value store
//! and the line parser under various workloads.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use lapsekv::protocol::parse_message;
use lapsekv::storage::{Context, KeyValueStore, ManualClock};
use std::sync::Arc;
use std::time::Duration;

/// A store holding `count` keys named `{prefix}:{i}`.
fn populated(prefix: &str, count: usize) -> KeyValueStore {
    let store = KeyValueStore::new();
    let ctx = Context::background();
    for i in 0..count {
        store.set(&ctx, format!("{}:{}", prefix, i), format!("value:{}", i));
    }
    store
}

/// Benchmark SET operations
fn bench_set(c: &mut Criterion) {
    let store = KeyValueStore::new();
    let ctx = Context::background();

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            store.set(&ctx, format!("key:{}", i), "small_value");
            i += 1;
        });
    });

    group.bench_function("set_medium", |b| {
        let mut i = 0u64;
        let value = "x".repeat(1024); // 1KB value
        b.iter(|| {
            store.set(&ctx, format!("key:{}", i), value.clone());
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let store = populated("key", 100_000);
    let ctx = Context::background();

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(store.get(&ctx, &key));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(store.get(&ctx, &key));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark mixed workload (80% reads, 20% writes)
fn bench_mixed(c: &mut Criterion) {
    let store = populated("key", 10_000);
    let ctx = Context::background();

    let mut group = c.benchmark_group("mixed");
    group.throughput(Throughput::Elements(1));

    group.bench_function("80_read_20_write", |b| {
        let mut i = 0u64;
        b.iter(|| {
            if i % 5 == 0 {
                // 20% writes
                store.set(&ctx, format!("new:{}", i), "value");
            } else {
                // 80% reads
                let key = format!("key:{}", i % 10_000);
                black_box(store.get(&ctx, &key));
            }
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark concurrent access
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    // One writer thread, three readers, all on the same single lock
    group.bench_function("1_writer_3_readers", |b| {
        let store = populated("key", 10_000);
        b.iter(|| {
            thread::scope(|scope| {
                scope.spawn(|| {
                    let ctx = Context::background();
                    for i in 0..10_000 {
                        store.set(&ctx, format!("key:{}", i), "updated");
                    }
                });
                for _ in 0..3 {
                    scope.spawn(|| {
                        let ctx = Context::background();
                        for i in 0..10_000 {
                            black_box(store.get(&ctx, &format!("key:{}", i)));
                        }
                    });
                }
            });
        });
    });

    group.finish();
}

/// Benchmark expiry operations
fn bench_expiry(c: &mut Criterion) {
    let store = populated("expire", 10_000);
    let ctx = Context::background();

    let mut group = c.benchmark_group("expiry");
    group.throughput(Throughput::Elements(1));

    group.bench_function("expire_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("expire:{}", i % 10_000);
            black_box(store.expire(&ctx, &key, 3600));
            i += 1;
        });
    });

    group.bench_function("ttl_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("expire:{}", i % 10_000);
            black_box(store.ttl(&ctx, &key));
            i += 1;
        });
    });

    // A full sweep over 10k entries, half of them expired
    group.bench_function("sweep_10k_half_expired", |b| {
        b.iter_batched(
            || {
                let clock = Arc::new(ManualClock::new(1_000));
                let store = KeyValueStore::with_clock(clock.clone());
                for i in 0..10_000 {
                    let key = format!("k:{}", i);
                    store.set(&ctx, key.clone(), "v");
                    if i % 2 == 0 {
                        store.expire(&ctx, &key, 1);
                    }
                }
                clock.advance(2);
                store
            },
            |store| black_box(store.sweep_expired()),
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

/// Benchmark KEYS pattern matching
fn bench_keys(c: &mut Criterion) {
    let store = populated("user", 1_000);
    let ctx = Context::background();
    for prefix in ["session", "cache"] {
        for i in 0..1_000 {
            store.set(&ctx, format!("{}:{}", prefix, i), "data");
        }
    }

    let mut group = c.benchmark_group("keys");

    group.bench_function("keys_pattern", |b| {
        b.iter(|| {
            black_box(store.keys(&ctx, "user:*"));
        });
    });

    group.bench_function("keys_all", |b| {
        b.iter(|| {
            black_box(store.keys(&ctx, "*"));
        });
    });

    group.bench_function("keys_exact", |b| {
        b.iter(|| {
            black_box(store.keys(&ctx, "session:500"));
        });
    });

    group.finish();
}

/// Benchmark line parsing
fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Elements(1));

    group.bench_function("parse_set", |b| {
        let line = b"SET user:1000 some_reasonably_sized_value\r\n";
        b.iter(|| black_box(parse_message(black_box(line))));
    });

    group.bench_function("parse_expire", |b| {
        let line = b"expire user:1000 3600\n";
        b.iter(|| black_box(parse_message(black_box(line))));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_mixed,
    bench_concurrent,
    bench_expiry,
    bench_keys,
    bench_parse,
);

criterion_main!(benches);
