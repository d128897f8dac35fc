//! Filter Design Benchmarks
//!
//! Benchmarks for correlation estimation, GEVD synthesis and full strategies.

use criterion::{
    BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main,
};
use jaec_core::{ProcessingConfig, SceneGenerator, SceneSpec, Stft, Strategy, vad};
use jaec_engine::{correlation, gevd, strategy};

const SECONDS: f64 = 2.0;

fn bench_inputs(config: &ProcessingConfig) -> (jaec_core::Scene, jaec_core::ActivityMasks) {
    let stft = Stft::from_config(config).unwrap();
    let spec = SceneSpec {
        seconds: SECONDS,
        ..Default::default()
    };
    let scene = SceneGenerator::new(42).scene(&spec).analyze(&stft).unwrap();
    let masks = vad::activity_masks(&scene, config.vad_sensitivity, 0).unwrap();
    (scene, masks)
}

fn bench_correlation(c: &mut Criterion) {
    let config = ProcessingConfig::default();
    let (scene, masks) = bench_inputs(&config);
    let extended = scene.extended().unwrap();

    let mut group = c.benchmark_group("correlation");
    group.throughput(Throughput::Elements(scene.bins() as u64));
    group.bench_function("extended_speech_pair", |b| {
        b.iter(|| {
            black_box(
                correlation::estimate(
                    black_box(&extended.mixture),
                    &masks.speech_present(),
                    &masks.speech_absent(),
                    "speech-present",
                    "speech-absent",
                )
                .unwrap(),
            )
        })
    });
    group.finish();
}

fn bench_synthesis(c: &mut Criterion) {
    let config = ProcessingConfig::default();
    let (scene, masks) = bench_inputs(&config);
    let extended = scene.extended().unwrap();
    let pair = correlation::estimate(
        &extended.mixture,
        &masks.speech_present(),
        &masks.speech_absent(),
        "speech-present",
        "speech-absent",
    )
    .unwrap()
    .load_absent(config.diagonal_loading);

    let mut group = c.benchmark_group("gevd_synthesize");
    group.throughput(Throughput::Elements(pair.bins() as u64));
    for rank in 1..=pair.channels() {
        group.bench_with_input(BenchmarkId::from_parameter(rank), &rank, |b, &rank| {
            b.iter(|| black_box(gevd::synthesize(black_box(&pair), rank).unwrap()))
        });
    }
    group.finish();
}

fn bench_strategies(c: &mut Criterion) {
    let config = ProcessingConfig::default();
    let (scene, masks) = bench_inputs(&config);

    let mut group = c.benchmark_group("strategy");
    group.sample_size(10);
    for mode in Strategy::ALL {
        group.bench_with_input(BenchmarkId::from_parameter(mode.name()), &mode, |b, &mode| {
            b.iter(|| black_box(strategy::run(mode, &scene, &masks, &config).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_correlation, bench_synthesis, bench_strategies);

criterion_main!(benches);
