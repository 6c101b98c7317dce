use std::sync::Arc;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fusion_engine::{integrity_score, ModulePipeline};
use fusion_types::{CycleSnapshot, Profile, Reading, Readings};

const PROFILES: &[(&str, &str)] = &[
    ("btcusd", include_str!("../../profiles/btcusd.toml")),
    ("us10y", include_str!("../../profiles/us10y.toml")),
    ("usdjpy", include_str!("../../profiles/usdjpy.toml")),
    ("xauusd", include_str!("../../profiles/xauusd.toml")),
    ("xrp", include_str!("../../profiles/xrp.toml")),
    ("sol", include_str!("../../profiles/sol.toml")),
];

fn load(source: &str) -> Profile {
    toml::from_str(source).unwrap()
}

/// Every declared source present.
fn full_readings(profile: &Profile) -> Readings {
    let now = Utc::now();
    profile
        .source_ids()
        .enumerate()
        .map(|(i, id)| Reading::value(id, 10.0 + i as f64, now))
        .collect()
}

/// Every other declared source missing.
fn partial_readings(profile: &Profile) -> Readings {
    let now = Utc::now();
    profile
        .source_ids()
        .enumerate()
        .map(|(i, id)| {
            if i % 2 == 0 {
                Reading::value(id, 10.0 + i as f64, now)
            } else {
                Reading::failed(id, "timeout", now)
            }
        })
        .collect()
}

/// Benchmark a full M1..M7 derivation per profile
fn bench_derive(c: &mut Criterion) {
    let mut group = c.benchmark_group("derive");

    for (name, source) in PROFILES {
        let profile = Arc::new(load(source));
        let pipeline = ModulePipeline::new(Arc::clone(&profile));
        let readings = full_readings(&profile);
        let at = Utc::now();

        group.bench_with_input(BenchmarkId::from_parameter(name), &readings, |b, r| {
            b.iter(|| black_box(pipeline.derive(black_box(r), at)));
        });
    }
    group.finish();
}

/// Benchmark derivation when half the sources failed
fn bench_derive_partial(c: &mut Criterion) {
    let profile = Arc::new(load(PROFILES[0].1));
    let pipeline = ModulePipeline::new(Arc::clone(&profile));
    let readings = partial_readings(&profile);
    let at = Utc::now();

    c.bench_function("derive_partial_btcusd", |b| {
        b.iter(|| black_box(pipeline.derive(black_box(&readings), at)));
    });
}

/// Benchmark integrity scoring plus snapshot assembly and serialization
fn bench_score_and_serialize(c: &mut Criterion) {
    let profile = Arc::new(load(PROFILES[0].1));
    let pipeline = ModulePipeline::new(Arc::clone(&profile));
    let readings = partial_readings(&profile);
    let at = Utc::now();

    c.bench_function("score_and_serialize_btcusd", |b| {
        b.iter(|| {
            let score = integrity_score(&readings, &profile.integrity.key_sources);
            let snapshot = pipeline
                .derive(&readings, at)
                .into_iter()
                .fold(CycleSnapshot::builder(at).integrity_score(score), |b, m| {
                    b.module(m)
                })
                .build();
            black_box(serde_json::to_string_pretty(&snapshot).unwrap())
        });
    });
}

criterion_group!(
    benches,
    bench_derive,
    bench_derive_partial,
    bench_score_and_serialize
);
criterion_main!(benches);
