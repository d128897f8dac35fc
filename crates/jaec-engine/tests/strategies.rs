//! Strategy Integration Tests
//!
//! Runs every strategy end to end on seeded synthetic recordings.
//! Verifies:
//! - Output SNR is not below input SNR at 0 dB input
//! - Distortion is finite over a non-empty speech frame set
//! - MWFext without loudspeakers reproduces MWF exactly
//! - Echo components are attenuated by the AEC strategies
//! - Every valid rank pair runs for every strategy
//! - NRext-AEC-PF is a distinct composition from AEC-NR

use jaec_core::metrics::{self, QualityReport};
use jaec_core::{
    ActivityMasks, FreqSignal, JaecError, ProcessingConfig, Scene, SceneGenerator, SceneSpec,
    Stft, Strategy, vad,
};
use jaec_engine::strategy;

const SEED: u64 = 2024;

struct Fixture {
    config: ProcessingConfig,
    stft: Stft,
    scene: Scene,
    masks: ActivityMasks,
    num_samples: usize,
}

fn fixture(spec: &SceneSpec, config: ProcessingConfig) -> Fixture {
    let stft = Stft::from_config(&config).unwrap();
    let time = SceneGenerator::new(SEED).scene(spec);
    let scene = time.analyze(&stft).unwrap();
    let masks =
        vad::activity_masks(&scene, config.vad_sensitivity, config.reference_channel).unwrap();
    Fixture {
        config,
        stft,
        scene,
        masks,
        num_samples: time.num_samples(),
    }
}

fn evaluate(f: &Fixture, strategy: Strategy) -> QualityReport {
    let output = strategy::run(strategy, &f.scene, &f.masks, &f.config).unwrap();
    metrics::evaluate(
        strategy.name(),
        &f.stft,
        &f.scene.mic,
        &output,
        f.num_samples,
        &f.config,
    )
    .unwrap()
}

fn default_spec() -> SceneSpec {
    SceneSpec {
        seconds: 6.0,
        snr_db: 0.0,
        ..Default::default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// END-TO-END QUALITY
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_all_strategies_improve_snr() {
    let f = fixture(&default_spec(), ProcessingConfig::default());

    for strategy in Strategy::ALL {
        let report = evaluate(&f, strategy);
        assert!(
            report.snr_in.abs() < 3.0,
            "{}: input SNR {:.2} dB is not near 0 dB",
            strategy,
            report.snr_in
        );
        assert!(
            report.snr_out >= report.snr_in,
            "{}: SNR {:.2} dB -> {:.2} dB",
            strategy,
            report.snr_in,
            report.snr_out
        );
        assert!(report.frames > 0);
    }
}

#[test]
fn test_nrext_aec_pf_distortion_is_finite() {
    let f = fixture(&default_spec(), ProcessingConfig::default());
    let report = evaluate(&f, Strategy::NrExtAecPf);

    assert!(report.sd.is_finite() && report.sd >= 0.0, "SD {}", report.sd);
    assert!(report.frames > 0);
}

#[test]
fn test_report_serializes() {
    let f = fixture(&default_spec(), ProcessingConfig::default());
    let report = evaluate(&f, Strategy::Mwf);
    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"strategy\":\"MWF\""));
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEGENERATE EXTENSION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_mwf_ext_without_loudspeakers_equals_mwf() {
    let spec = SceneSpec {
        seconds: 3.0,
        num_loudspeakers: 0,
        ..Default::default()
    };
    let f = fixture(&spec, ProcessingConfig::default().with_channels(2, 0));
    assert_eq!(f.scene.num_loudspeakers(), 0);

    let mwf = strategy::run(Strategy::Mwf, &f.scene, &f.masks, &f.config).unwrap();
    let ext = strategy::run(Strategy::MwfExt, &f.scene, &f.masks, &f.config).unwrap();
    assert_eq!(mwf, ext);
}

#[test]
fn test_aec_strategies_reject_missing_loudspeakers() {
    let spec = SceneSpec {
        seconds: 1.0,
        num_loudspeakers: 0,
        ..Default::default()
    };
    let f = fixture(&spec, ProcessingConfig::default().with_channels(2, 0));
    for strategy in [Strategy::AecNr, Strategy::NrAec, Strategy::NrExtAecPf] {
        assert!(strategy::run(strategy, &f.scene, &f.masks, &f.config).is_err());
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ECHO ATTENUATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_aec_strategies_attenuate_echo() {
    let spec = SceneSpec {
        echo_to_noise_db: 20.0,
        ..default_spec()
    };
    let f = fixture(&spec, ProcessingConfig::default());
    let echo_in = f.scene.mic.echo_speech.channel_energy(0);
    let speech_in = f.scene.mic.speech.channel_energy(0);

    for strategy in [Strategy::AecNr, Strategy::NrAec, Strategy::NrExtAecPf] {
        let out = strategy::run(strategy, &f.scene, &f.masks, &f.config).unwrap();
        let echo_ratio_in = echo_in / speech_in;
        let echo_ratio_out = out.echo_speech.channel_energy(0) / out.speech.channel_energy(0);
        assert!(
            echo_ratio_out < echo_ratio_in,
            "{}: echo-to-speech ratio {:.3e} -> {:.3e}",
            strategy,
            echo_ratio_in,
            echo_ratio_out
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RANK BOUNDARIES
// ═══════════════════════════════════════════════════════════════════════════════

fn is_finite(signal: &FreqSignal) -> bool {
    signal
        .data()
        .iter()
        .all(|v| v.re.is_finite() && v.im.is_finite())
}

#[test]
fn test_every_valid_rank_pair_runs() {
    let spec = SceneSpec {
        seconds: 3.0,
        ..Default::default()
    };
    let base = fixture(&spec, ProcessingConfig::default());

    // M = 2, L = 1: rank_s reaches 3 only for MWFext, rank_ses spans 1..=3
    for rank_s in 1..=3 {
        for rank_ses in 1..=3 {
            let config = base.config.clone().with_ranks(rank_s, rank_ses);
            for strategy in Strategy::ALL {
                let result = strategy::run(strategy, &base.scene, &base.masks, &config);
                if config.validate_for(strategy).is_err() {
                    assert!(
                        matches!(result, Err(JaecError::Configuration(_))),
                        "{} rank_s={} rank_ses={} should be rejected",
                        strategy,
                        rank_s,
                        rank_ses
                    );
                    continue;
                }
                let out = result.unwrap_or_else(|e| {
                    panic!("{} rank_s={} rank_ses={}: {}", strategy, rank_s, rank_ses, e)
                });
                assert_eq!(out.channels(), 2);
                assert!(
                    is_finite(&out.mixture),
                    "{} rank_s={} rank_ses={}",
                    strategy,
                    rank_s,
                    rank_ses
                );
            }
        }
    }
}

#[test]
fn test_nrext_aec_pf_runs_at_every_extended_rank() {
    let f = fixture(&default_spec(), ProcessingConfig::default());
    let channels = f.scene.num_mics() + f.scene.num_loudspeakers();

    for rank_ses in 1..=channels {
        let config = f.config.clone().with_ranks(1, rank_ses);
        let out = strategy::run(Strategy::NrExtAecPf, &f.scene, &f.masks, &config)
            .unwrap_or_else(|e| panic!("rank_ses={}: {}", rank_ses, e));
        assert!(is_finite(&out.mixture), "rank_ses={}", rank_ses);
        assert!(out.speech.energy() > 0.0, "rank_ses={}", rank_ses);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISTINCT COMPOSITIONS
// ═══════════════════════════════════════════════════════════════════════════════

fn relative_difference(a: &FreqSignal, b: &FreqSignal) -> f64 {
    let diff: f64 = a
        .data()
        .iter()
        .zip(b.data().iter())
        .map(|(x, y)| (x - y).norm_sqr())
        .sum();
    diff / b.energy()
}

#[test]
fn test_nrext_aec_pf_differs_from_aec_nr() {
    let f = fixture(&default_spec(), ProcessingConfig::default());
    let aec_nr = strategy::run(Strategy::AecNr, &f.scene, &f.masks, &f.config).unwrap();

    for rank_ses in 2..=3 {
        let config = f.config.clone().with_ranks(1, rank_ses);
        let pf = strategy::run(Strategy::NrExtAecPf, &f.scene, &f.masks, &config).unwrap();
        let diff = relative_difference(&pf.mixture, &aec_nr.mixture);
        assert!(diff > 1e-3, "rank_ses={}: relative difference {:.3e}", rank_ses, diff);
    }
}

#[test]
fn test_nrext_aec_pf_depends_on_extended_rank() {
    let f = fixture(&default_spec(), ProcessingConfig::default());
    let low = f.config.clone().with_ranks(1, 1);
    let high = f.config.clone().with_ranks(1, 3);

    let a = strategy::run(Strategy::NrExtAecPf, &f.scene, &f.masks, &low).unwrap();
    let b = strategy::run(Strategy::NrExtAecPf, &f.scene, &f.masks, &high).unwrap();
    assert!(relative_difference(&a.mixture, &b.mixture) > 1e-3);
}
