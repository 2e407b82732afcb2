//! Benchmarks for pipeline execution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use streamflow::prelude::*;

fn pipeline_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("tokio runtime");

    c.bench_function("filter_map_sequential", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let scope = CancellationToken::new();
                let values = Stream::of(&scope, 0..1_000u64)
                    .filter(|x| x % 2 == 0)
                    .map(|x| x * 3)
                    .to_vec()
                    .await;
                black_box(values)
            })
        })
    });

    c.bench_function("map_parallel_4", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let scope = CancellationToken::new();
                let count = Stream::of(&scope, 0..1_000u64)
                    .parallel(4)
                    .map(|x| x.wrapping_mul(2_654_435_761))
                    .count()
                    .await;
                black_box(count)
            })
        })
    });

    c.bench_function("sorted_distinct", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let scope = CancellationToken::new();
                let values = Stream::of(&scope, (0..1_000u64).map(|x| (x * 7919) % 257))
                    .distinct()
                    .sorted(natural_order())
                    .to_vec()
                    .await;
                black_box(values)
            })
        })
    });
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
