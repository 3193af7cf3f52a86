use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use simple_diskcache::{BackendConfig, Entry, EntryHasher, Sha256Hasher, SimpleBackend, WorkerPool};
use std::future::Future;
use std::time::Duration;

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

fn key(n: u64) -> String {
    format!("https://example.test/{:016x}", n)
}

fn block_on_local<F: Future>(rt: &tokio::runtime::Runtime, f: F) -> F::Output {
    tokio::task::LocalSet::new().block_on(rt, f)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn bench_hash_keys_10k(c: &mut Criterion) {
    let keys: Vec<String> = lcg(1).take(10_000).map(key).collect();
    c.bench_function("hasher::sha256_10k", |b| {
        b.iter(|| {
            let hasher = Sha256Hasher;
            for k in &keys {
                black_box(hasher.hash_key(k));
            }
        })
    });
}

fn bench_open_active_1k(c: &mut Criterion) {
    let rt = runtime();
    let dir = tempfile::tempdir().unwrap();
    let keys: Vec<String> = lcg(2).take(1_000).map(key).collect();
    c.bench_function("backend::open_active_1k", |b| {
        b.iter_batched(
            || {
                block_on_local(&rt, async {
                    let config = BackendConfig::new(dir.path().join("open"));
                    let backend = SimpleBackend::with_parts(config, WorkerPool::new(4), Sha256Hasher);
                    backend.initialize().await.unwrap();
                    let mut held: Vec<Entry> = Vec::with_capacity(keys.len());
                    for k in &keys {
                        held.push(backend.create(k).await.unwrap());
                    }
                    (backend, held)
                })
            },
            |(backend, held)| {
                block_on_local(&rt, async {
                    for k in &keys {
                        black_box(backend.open(k).await.unwrap());
                    }
                });
                black_box((backend, held))
            },
            BatchSize::PerIteration,
        )
    });
}

fn bench_create_doom_cycle_100(c: &mut Criterion) {
    let rt = runtime();
    let dir = tempfile::tempdir().unwrap();
    let keys: Vec<String> = lcg(3).take(100).map(key).collect();
    c.bench_function("backend::create_write_doom_100", |b| {
        b.iter(|| {
            block_on_local(&rt, async {
                let config = BackendConfig::new(dir.path().join("cycle"));
                let backend = SimpleBackend::with_parts(config, WorkerPool::new(4), Sha256Hasher);
                backend.initialize().await.unwrap();
                for k in &keys {
                    let entry = backend.create(k).await.unwrap();
                    entry.write(k.as_bytes().to_vec()).await.unwrap();
                }
                backend.doom_all().await.unwrap();
            })
        })
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(10)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1))
}

criterion_group! {
    name = benches_hash;
    config = bench_config();
    targets = bench_hash_keys_10k
}
criterion_group! {
    name = benches_backend;
    config = bench_config();
    targets = bench_open_active_1k, bench_create_doom_cycle_100
}
criterion_main!(benches_hash, benches_backend);
