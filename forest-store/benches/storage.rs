//! Storage Manager Benchmarks
//!
//! Save and load throughput at various dataset sizes, per backend.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use forest_store::dst::{SimConfig, Simulation};
use forest_store::selector::estimate_size;
use forest_store::{NoProgress, Record, RecordMeta, StoreConfig};

use std::time::Duration;

// =============================================================================
// Setup Helpers
// =============================================================================

fn create_test_records(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            Record::new(RecordMeta::for_sheet_row(i % 4, "抚育", i as u64))
                .with_field("林场", format!("林场{}", i % 9))
                .with_field("小班号", format!("{:04}", i % 2000))
                .with_field("作业面积", (i % 80) as f64 * 0.25)
                .with_field("作业人员", "张三、李四")
        })
        .collect()
}

fn bench_config(threshold_bytes: usize) -> StoreConfig {
    StoreConfig::default()
        .with_threshold_bytes(threshold_bytes)
        .with_yield_duration_ms(0)
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("storage_manager/save");
    group.measurement_time(Duration::from_secs(10));

    for (backend, threshold) in [("key_value", usize::MAX), ("object_store", 1)] {
        for size in [1_000, 10_000] {
            group.bench_with_input(
                BenchmarkId::new(backend, size),
                &size,
                |b, &size| {
                    let rt = tokio::runtime::Runtime::new().unwrap();
                    let env = Simulation::new(SimConfig::with_seed(42))
                        .with_kv_quota(usize::MAX)
                        .build();
                    let manager = env.manager_with_config(bench_config(threshold));
                    let records = create_test_records(size);

                    b.to_async(&rt).iter(|| async {
                        black_box(manager.save(&records, &NoProgress).await);
                    });
                },
            );
        }
    }
    group.finish();
}

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("storage_manager/load");
    group.measurement_time(Duration::from_secs(10));

    for (backend, threshold) in [("key_value", usize::MAX), ("object_store", 1)] {
        for size in [1_000, 10_000] {
            group.bench_with_input(
                BenchmarkId::new(backend, size),
                &size,
                |b, &size| {
                    let rt = tokio::runtime::Runtime::new().unwrap();
                    let env = Simulation::new(SimConfig::with_seed(42))
                        .with_kv_quota(usize::MAX)
                        .build();
                    let manager = env.manager_with_config(bench_config(threshold));
                    let records = create_test_records(size);
                    rt.block_on(manager.save(&records, &NoProgress));

                    b.to_async(&rt).iter(|| async {
                        black_box(manager.load().await);
                    });
                },
            );
        }
    }
    group.finish();
}

fn bench_estimate_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("selector/estimate_size");

    for size in [1_000, 10_000] {
        let records = create_test_records(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &records, |b, records| {
            b.iter(|| black_box(estimate_size(records)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_save, bench_load, bench_estimate_size);
criterion_main!(benches);
