//! FILENAME: aggregate-engine/benches/group_throughput.rs
//! Throughput of the grouping/pivot engine on synthetic sales rows.

use aggregate_engine::{
    aggregate_rows, AggregationConfig, AggregationSpec, AggregationType, EngineOptions, HeaderMap,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn synthetic_rows(count: usize) -> Vec<Vec<String>> {
    (0..count)
        .map(|i| {
            vec![
                format!("region-{}", i % 50),
                format!("product-{}", i % 7),
                format!("Q{}", i % 4 + 1),
                format!("{}.{}", i % 1000, i % 10),
            ]
        })
        .collect()
}

fn bench_grouping(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_by");

    let flat = AggregationConfig::new()
        .with_keys("0,1")
        .with_aggregate(AggregationType::Sum, "3")
        .with_aggregate(AggregationType::Count, "3")
        .with_aggregate(AggregationType::Average, "3");
    let pivoted = AggregationConfig::new()
        .with_keys("0")
        .with_pivots("2")
        .with_aggregate(AggregationType::Sum, "3")
        .with_aggregate(AggregationType::Median, "3");

    for &size in &[10_000usize, 100_000] {
        let rows = synthetic_rows(size);
        group.throughput(Throughput::Elements(size as u64));

        for (name, config) in [("flat", &flat), ("pivot", &pivoted)] {
            let spec = AggregationSpec::build(config, &HeaderMap::default()).unwrap();
            group.bench_with_input(BenchmarkId::new(name, size), &rows, |b, rows| {
                b.iter(|| {
                    let table =
                        aggregate_rows(spec.clone(), EngineOptions::default(), rows.iter()).unwrap();
                    black_box(table)
                })
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_grouping);
criterion_main!(benches);
