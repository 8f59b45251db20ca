//! Hot-path benchmarks: topic decode, payload parse and fall classification.

use criterion::{Criterion, criterion_group, criterion_main};
use fallwatch_bus::TopicCodec;
use fallwatch_lib::FallDetector;
use fallwatch_lib::models::{Measurement, PatientId, Sample};
use std::hint::black_box;

fn bench_topic_encode(c: &mut Criterion) {
    let codec = TopicCodec::new("BS2203FD");
    let id = PatientId::new("3");

    c.bench_function("topic_encode", |b| {
        b.iter(|| black_box(codec.encode(black_box(&id), Measurement::Acceleration)))
    });
}

fn bench_topic_decode(c: &mut Criterion) {
    let legacy = TopicCodec::new("BS2203FD");
    let full = TopicCodec::with_full_ids("BS2203FD");

    let mut group = c.benchmark_group("topic_decode");
    group.bench_function("first_char", |b| {
        b.iter(|| black_box(legacy.decode(black_box("BS2203FDP?3/acceleration"))))
    });
    group.bench_function("full", |b| {
        b.iter(|| black_box(full.decode(black_box("BS2203FDP?1234/acceleration"))))
    });
    group.finish();
}

fn bench_ingest_acceleration(c: &mut Criterion) {
    let codec = TopicCodec::new("BS2203FD");

    c.bench_function("ingest_acceleration", |b| {
        b.iter(|| {
            let Ok((_, measurement)) = codec.decode(black_box("BS2203FDP?3/acceleration")) else {
                return false;
            };
            match Sample::parse(measurement, black_box(b"3.2,1.7,2.9".as_slice())) {
                Ok(Sample::Acceleration(axes)) => FallDetector::analyse(&axes),
                _ => false,
            }
        })
    });
}

criterion_group!(
    benches,
    bench_topic_encode,
    bench_topic_decode,
    bench_ingest_acceleration
);
criterion_main!(benches);
