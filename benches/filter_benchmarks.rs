use criterion::{Criterion, criterion_group, criterion_main};
use rask_log_pipeline::{LogLevel, Pipeline, Properties};

fn benchmark_disabled_levels(c: &mut Criterion) {
    let pipeline = Pipeline::builder()
        .minimum_level(LogLevel::Information)
        .override_level("Microsoft", LogLevel::Warning)
        .override_level("Microsoft.Hosting.Lifetime", LogLevel::Information)
        .override_level("System", LogLevel::Warning)
        .build();

    let mut group = c.benchmark_group("disabled_levels");

    group.bench_function("is_enabled_default", |b| {
        b.iter(|| pipeline.is_enabled(std::hint::black_box("App.Orders"), LogLevel::Debug));
    });

    group.bench_function("is_enabled_override", |b| {
        b.iter(|| {
            pipeline.is_enabled(
                std::hint::black_box("Microsoft.AspNetCore.Routing"),
                LogLevel::Information,
            )
        });
    });

    group.bench_function("write_disabled", |b| {
        b.iter(|| {
            pipeline.write(LogLevel::Debug, "App.Orders", "Order {OrderId} loaded", || {
                Properties::new().add("OrderId", std::hint::black_box(42_i64))
            });
        });
    });

    group.finish();
}

fn benchmark_enabled_no_sinks(c: &mut Criterion) {
    let pipeline = Pipeline::builder().build();

    c.bench_function("write_enabled_no_sinks", |b| {
        b.iter(|| {
            pipeline.write(LogLevel::Warning, "App.Orders", "Order {OrderId} late", || {
                Properties::new().add("OrderId", std::hint::black_box(42_i64))
            });
        });
    });
}

criterion_group!(benches, benchmark_disabled_levels, benchmark_enabled_no_sinks);
criterion_main!(benches);
