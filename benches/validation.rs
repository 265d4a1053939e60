//! Benchmarks for the validation gate

use amigrid::{RawRecord, TelemetryReading, Validator};
use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn generate_records(count: usize) -> Vec<RawRecord> {
    let start = Utc.with_ymd_and_hms(2025, 12, 26, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            let voltage = 236.0 + (i as f64 % 10.0) * 0.8;
            let power = 800.0 + (i as f64 % 25.0) * 40.0;
            let reading = TelemetryReading::new(
                start + Duration::seconds(i as i64),
                format!("m_pole_A_{:04}", i % 50),
                "pole_A",
                i as u64,
                voltage,
                power / (voltage * 0.92),
                power,
            )
            .with_frequency(60.0);
            RawRecord::from_reading(&reading).unwrap()
        })
        .collect()
}

fn bench_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("validation");

    let records = generate_records(1000);
    let validator = Validator::default();
    let now = Utc::now();

    group.throughput(Throughput::Elements(1000));

    group.bench_function("validate_1000_records", |b| {
        b.iter(|| {
            for raw in &records {
                black_box(validator.validate(raw, now).ok());
            }
        })
    });

    group.finish();
}

fn bench_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire_format");

    let start = Utc.with_ymd_and_hms(2025, 12, 26, 0, 0, 0).unwrap();
    let readings: Vec<TelemetryReading> = (0..1000)
        .map(|i| TelemetryReading::new(start, "m1", "pole_A", i, 240.0, 4.0, 900.0))
        .collect();

    group.throughput(Throughput::Elements(1000));

    group.bench_function("to_payload_1000", |b| {
        b.iter(|| {
            for r in &readings {
                black_box(r.to_payload().unwrap());
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_validate, bench_serialize);
criterion_main!(benches);
