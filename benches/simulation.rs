use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use soc_disk::{SimConfig, Simulation, SizeBounds};

fn config(disk_size_blocks: usize) -> SimConfig {
    SimConfig {
        disk_size_blocks,
        num_steps: 300,
        random_seed: 42,
        create_probability: 0.7,
        delete_probability: 0.3,
        size_distribution: SizeBounds::new(1, 20),
        fragmentation_threshold: 0.4,
        ..SimConfig::default()
    }
}

/// Benchmark complete runs by disk size
fn bench_full_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_run");
    group.sample_size(20);

    for blocks in [1_000usize, 10_000] {
        group.bench_with_input(BenchmarkId::new("blocks", blocks), &blocks, |b, &blocks| {
            b.iter(|| {
                let report = Simulation::new(config(blocks)).unwrap().run();
                black_box(report.summary)
            });
        });
    }

    group.finish();
}

/// Benchmark report encoding
fn bench_report_json(c: &mut Criterion) {
    let report = Simulation::new(config(1_000)).unwrap().run();

    c.bench_function("report_to_json", |b| {
        b.iter(|| black_box(report.to_json().unwrap()));
    });
}

criterion_group!(benches, bench_full_run, bench_report_json);
criterion_main!(benches);
