use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use gralloc_refs::{
    handle::SharedBuffer, BufferRegistry, LengthProbe, RegistryConfig, SanityChecker,
};
use std::time::Duration;

fn benchmark_retain_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("RetainRelease");

    for live in [1usize, 64, 1024].iter() {
        group.bench_with_input(BenchmarkId::new("cycle", live), live, |b, &live| {
            let registry = BufferRegistry::new(RegistryConfig::default()).unwrap();
            let buffer = SharedBuffer::allocate("bench_cycle", &[4096], 4096).unwrap();

            // Background records so lookups hit a populated table
            let background: Vec<_> = (0..live)
                .map(|_| Box::new(buffer.handle().unwrap()))
                .collect();
            for handle in &background {
                registry.retain(handle).unwrap();
            }

            let handle = Box::new(buffer.handle().unwrap());
            b.iter(|| {
                registry.retain(&handle).unwrap();
                registry.release(&handle).unwrap();
            });

            for handle in &background {
                registry.release(handle).unwrap();
            }
        });
    }

    group.finish();
}

fn benchmark_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("Map");

    group.bench_function("idempotent", |b| {
        let registry = BufferRegistry::new(RegistryConfig::default()).unwrap();
        let buffer = SharedBuffer::allocate("bench_idempotent", &[4096, 4096, 4096], 4096).unwrap();
        let handle = Box::new(buffer.handle().unwrap());
        registry.retain(&handle).unwrap();
        registry.map(&handle).unwrap();

        b.iter(|| registry.map(&handle).unwrap());

        registry.release(&handle).unwrap();
    });

    for size in [4096u64, 1 << 20].iter() {
        group.bench_with_input(BenchmarkId::new("first_map", size), size, |b, &size| {
            let registry = BufferRegistry::new(RegistryConfig::default()).unwrap();
            let buffer = SharedBuffer::allocate("bench_first_map", &[size], 4096).unwrap();
            let handle = Box::new(buffer.handle().unwrap());

            b.iter(|| {
                registry.retain(&handle).unwrap();
                registry.map(&handle).unwrap();
                registry.release(&handle).unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_validate(c: &mut Criterion) {
    let registry = BufferRegistry::new(RegistryConfig::default()).unwrap();
    let buffer = SharedBuffer::allocate("bench_validate", &[4096, 4096], 4096).unwrap();
    let handle = Box::new(buffer.handle().unwrap());
    registry.retain(&handle).unwrap();
    registry.map(&handle).unwrap();

    c.bench_function("validate_mapped", |b| {
        b.iter(|| registry.validate(&handle).unwrap());
    });

    registry.release(&handle).unwrap();
}

fn benchmark_sanity_probes(c: &mut Criterion) {
    let mut group = c.benchmark_group("SanityCheck");
    let buffer = SharedBuffer::allocate("bench_sanity", &[4096, 4096, 4096], 4096).unwrap();
    let handle = buffer.handle().unwrap();

    for probe in [LengthProbe::Auto, LengthProbe::Stat, LengthProbe::Seek] {
        let checker = SanityChecker::new(4096, probe);
        group.bench_function(probe.name(), |b| {
            b.iter(|| checker.check(&handle).unwrap());
        });
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(5));
    targets = benchmark_retain_release, benchmark_map, benchmark_validate, benchmark_sanity_probes
}
criterion_main!(benches);
