//! Throughput Benchmark for RiftDB
//!
//! This benchmark measures the performance of the per-shard store,
//! ID generation, and the full command path through the engine.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use riftdb::command::Command;
use riftdb::config::Config;
use riftdb::engine::Engine;
use riftdb::ident::IdGenerator;
use riftdb::storage::{EvictionPolicy, ShardStore};
use std::sync::Arc;
use std::time::Duration;

fn bench_config() -> Config {
    Config {
        shard_count: 4,
        max_keys: 1 << 20,
        ..Config::default()
    }
}

/// Benchmark raw store writes
fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");
    group.throughput(Throughput::Elements(1));

    group.bench_function("put_small", |b| {
        let mut store = ShardStore::new(1 << 20, EvictionPolicy::AllKeysLru, 0.1);
        let mut i = 0u64;
        b.iter(|| {
            store.put(format!("key:{}", i), Bytes::from("small_value"));
            i += 1;
        });
    });

    group.bench_function("put_medium", |b| {
        let mut store = ShardStore::new(1 << 20, EvictionPolicy::AllKeysLru, 0.1);
        let value = Bytes::from("x".repeat(1024)); // 1KB value
        let mut i = 0u64;
        b.iter(|| {
            store.put(format!("key:{}", i), value.clone());
            i += 1;
        });
    });

    group.bench_function("put_large", |b| {
        let mut store = ShardStore::new(1 << 20, EvictionPolicy::AllKeysLru, 0.1);
        let value = Bytes::from("x".repeat(64 * 1024)); // 64KB value
        let mut i = 0u64;
        b.iter(|| {
            store.put(format!("key:{}", i), value.clone());
            i += 1;
        });
    });

    // Store at capacity: every new key pays for an eviction pass
    group.bench_function("put_evicting", |b| {
        let mut store = ShardStore::new(10_000, EvictionPolicy::AllKeysLru, 0.01);
        for i in 0..10_000 {
            store.put(format!("key:{}", i), Bytes::from("value"));
        }
        let mut i = 10_000u64;
        b.iter(|| {
            store.put(format!("key:{}", i), Bytes::from("value"));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark raw store reads
fn bench_get(c: &mut Criterion) {
    let mut store = ShardStore::new(1 << 20, EvictionPolicy::AllKeysLru, 0.1);

    // Pre-populate with data
    for i in 0..100_000 {
        store.put(format!("key:{}", i), Bytes::from(format!("value:{}", i)));
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(store.get(&key));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(store.get(&key));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark KEYS pattern matching
fn bench_keys(c: &mut Criterion) {
    let mut store = ShardStore::new(1 << 20, EvictionPolicy::AllKeysLru, 0.1);

    // Pre-populate with various key patterns
    for i in 0..1_000 {
        store.put(format!("user:{}", i), Bytes::from("user_data"));
        store.put(format!("session:{}", i), Bytes::from("session_data"));
        store.put(format!("cache:{}", i), Bytes::from("cache_data"));
    }

    let mut group = c.benchmark_group("keys");

    group.bench_function("keys_pattern", |b| {
        b.iter(|| {
            black_box(store.keys("user:*"));
        });
    });

    group.bench_function("keys_all", |b| {
        b.iter(|| {
            black_box(store.keys("*"));
        });
    });

    group.finish();
}

/// Benchmark request ID generation
fn bench_ident(c: &mut Criterion) {
    let ids = IdGenerator::new();

    let mut group = c.benchmark_group("ident");
    group.throughput(Throughput::Elements(1));

    group.bench_function("next_id", |b| {
        b.iter(|| {
            black_box(ids.next_id(7));
        });
    });

    group.bench_function("next_id_expanded", |b| {
        b.iter(|| {
            let id = ids.next_id(7);
            black_box(ids.expand_id(id));
        });
    });

    group.finish();
}

/// Benchmark the full command path: worker -> shard task -> response
fn bench_engine(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let config = bench_config();
    let engine = runtime.block_on(async { Arc::new(Engine::new(&config).unwrap()) });
    let worker = engine.connect().unwrap();

    // Pre-populate for the read benchmarks
    runtime.block_on(async {
        for i in 0..10_000 {
            let cmd = Command::new(
                "SET",
                vec![format!("key:{}", i), format!("value:{}", i)],
            );
            worker.execute(cmd).await.unwrap();
        }
    });

    let mut group = c.benchmark_group("engine");
    group.throughput(Throughput::Elements(1));
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("set_roundtrip", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let cmd = Command::new("SET", vec![format!("bench:{}", i), "value".to_string()]);
            black_box(runtime.block_on(worker.execute(cmd)).unwrap());
            i += 1;
        });
    });

    group.bench_function("get_roundtrip", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let cmd = Command::new("GET", vec![format!("key:{}", i % 10_000)]);
            black_box(runtime.block_on(worker.execute(cmd)).unwrap());
            i += 1;
        });
    });

    group.bench_function("mget_4_keys", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let cmd = Command::new(
                "MGET",
                vec![
                    format!("key:{}", i % 10_000),
                    format!("key:{}", (i + 1) % 10_000),
                    format!("key:{}", (i + 2) % 10_000),
                    format!("key:{}", (i + 3) % 10_000),
                ],
            );
            black_box(runtime.block_on(worker.execute(cmd)).unwrap());
            i += 4;
        });
    });

    group.finish();

    runtime.block_on(engine.shutdown());
}

criterion_group!(
    benches,
    bench_put,
    bench_get,
    bench_keys,
    bench_ident,
    bench_engine,
);

criterion_main!(benches);
