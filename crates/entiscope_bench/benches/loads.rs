//! Load pipeline benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use entiscope_bench::{random_samples, seeded_factory, Sample};
use entiscope_core::Config;
use rand::seq::SliceRandom;

/// Session hits versus store loads for single keys.
fn bench_single_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_load");
    let (factory, keys) = seeded_factory(1000, Config::default());

    group.bench_function("store", |b| {
        let mut rng = rand::thread_rng();
        b.iter(|| {
            let key = keys.choose(&mut rng).unwrap();
            let scope = factory.begin();
            black_box(scope.load().key::<Sample>(key).unwrap())
        });
    });

    group.bench_function("session", |b| {
        let mut rng = rand::thread_rng();
        let scope = factory.begin();
        scope.load().raw(&keys).unwrap();
        b.iter(|| {
            let key = keys.choose(&mut rng).unwrap();
            black_box(scope.load().key::<Sample>(key).unwrap())
        });
    });
    group.finish();
}

/// Batched loads of increasing size.
fn bench_batch_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_load");
    let (factory, keys) = seeded_factory(1000, Config::default());

    for size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let scope = factory.begin();
                black_box(scope.load().keys::<Sample>(&keys[..size]).unwrap())
            });
        });
    }
    group.finish();
}

/// Transactional save of a batch of new entities.
fn bench_transactional_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("transactional_save");
    let (factory, _) = seeded_factory(0, Config::default());

    for size in [1, 10, 100].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let scope = factory.begin();
                scope
                    .transact(|txn| {
                        let mut samples = random_samples(size);
                        txn.save().entities(&mut samples)?.now()
                    })
                    .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_single_load, bench_batch_load, bench_transactional_save);
criterion_main!(benches);
