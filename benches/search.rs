use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use log_rag::embeddings::normalize;
use log_rag::index::FlatIndex;
use std::hint::black_box;

const DIMENSION: usize = 768;

/// Deterministic pseudo-random unit vector
fn vector(seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut values: Vec<f32> = (0..DIMENSION)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 33) as f32 / u32::MAX as f32) - 0.25
        })
        .collect();
    normalize(&mut values);
    values
}

fn build_index(size: usize) -> FlatIndex {
    let mut index = FlatIndex::new();
    let entries = (0..size)
        .map(|i| (format!("log_{:06}", i + 1), vector(i as u64)))
        .collect();
    index.add(entries).expect("vectors share one dimension");
    index
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let query = vector(u64::MAX);
    let mut group = c.benchmark_group("flat_search");
    for size in [1_000, 10_000, 50_000] {
        let index = build_index(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &index, |b, index| {
            b.iter(|| index.search(black_box(&query), black_box(20)));
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
