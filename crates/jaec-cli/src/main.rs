//! JAEC command-line driver
//!
//! Usage:
//!   jaec process  - Mix component recordings, run a strategy, write the output
//!   jaec simulate - Run strategies on a seeded synthetic scene

mod wav;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ndarray::Array2;

use jaec_core::generators::TimeScene;
use jaec_core::metrics::{self, QualityReport};
use jaec_core::{
    ActivityMasks, FreqSignal, ProcessingConfig, Scene, SceneGenerator, SceneSpec, Stft, Strategy,
    Views, vad,
};
use jaec_engine::strategy;

use crate::wav::Recording;

#[derive(Parser)]
#[command(name = "jaec", about = "Joint acoustic echo cancellation and noise reduction")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process component recordings with one strategy
    Process {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Near-end speech at the microphones
        #[arg(long)]
        speech: PathBuf,
        /// Background noise at the microphones
        #[arg(long)]
        noise: PathBuf,
        /// Far-end speech echo at the microphones
        #[arg(long)]
        echo_speech: PathBuf,
        /// Far-end noise echo at the microphones
        #[arg(long)]
        echo_noise: PathBuf,
        /// Far-end speech at the loudspeakers
        #[arg(long)]
        loudspeaker_speech: PathBuf,
        /// Far-end noise at the loudspeakers
        #[arg(long)]
        loudspeaker_noise: PathBuf,
        /// Strategy name (overrides the configuration)
        #[arg(short, long)]
        strategy: Option<String>,
        /// Output WAV (reference microphone)
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Evaluate strategies on a synthetic scene
    Simulate {
        /// Random seed
        #[arg(long, default_value_t = 1)]
        seed: u64,
        /// Scene duration in seconds
        #[arg(long, default_value_t = 4.0)]
        seconds: f64,
        /// Strategy name, or "all"
        #[arg(short, long, default_value = "all")]
        strategy: String,
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            config,
            speech,
            noise,
            echo_speech,
            echo_noise,
            loudspeaker_speech,
            loudspeaker_noise,
            strategy,
            output,
        } => {
            let inputs = Inputs {
                speech,
                noise,
                echo_speech,
                echo_noise,
                loudspeaker_speech,
                loudspeaker_noise,
            };
            process(config.as_deref(), &inputs, strategy.as_deref(), &output)
        }
        Commands::Simulate {
            seed,
            seconds,
            strategy,
            config,
        } => simulate(config.as_deref(), seed, seconds, &strategy),
    }
}

struct Inputs {
    speech: PathBuf,
    noise: PathBuf,
    echo_speech: PathBuf,
    echo_noise: PathBuf,
    loudspeaker_speech: PathBuf,
    loudspeaker_noise: PathBuf,
}

fn load_config(path: Option<&Path>) -> Result<ProcessingConfig> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            ProcessingConfig::from_json(&json)
                .with_context(|| format!("invalid configuration in {}", path.display()))
        }
        None => Ok(ProcessingConfig::default()),
    }
}

fn process(
    config_path: Option<&Path>,
    inputs: &Inputs,
    strategy_name: Option<&str>,
    output: &Path,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(name) = strategy_name {
        config.strategy = name.parse()?;
    }

    let speech = Recording::load(&inputs.speech)?;
    let noise = Recording::load(&inputs.noise)?;
    let echo_speech = Recording::load(&inputs.echo_speech)?;
    let echo_noise = Recording::load(&inputs.echo_noise)?;
    let ls_speech = Recording::load(&inputs.loudspeaker_speech)?;
    let ls_noise = Recording::load(&inputs.loudspeaker_noise)?;

    let sample_rate = speech.sample_rate;
    let num_samples = speech.num_samples();
    let num_mics = speech.channels();
    let num_loudspeakers = ls_speech.channels();

    let components = [
        (&speech, num_mics),
        (&noise, num_mics),
        (&echo_speech, num_mics),
        (&echo_noise, num_mics),
        (&ls_speech, num_loudspeakers),
        (&ls_noise, num_loudspeakers),
    ];
    for (rec, expected_channels) in components {
        if rec.sample_rate != sample_rate || rec.num_samples() != num_samples {
            bail!(
                "component recordings disagree: {} samples at {} Hz vs {} samples at {} Hz",
                rec.num_samples(),
                rec.sample_rate,
                num_samples,
                sample_rate
            );
        }
        if rec.channels() != expected_channels {
            bail!(
                "component has {} channels, expected {}",
                rec.channels(),
                expected_channels
            );
        }
    }

    config.sample_rate = sample_rate;
    config.num_mics = num_mics;
    config.num_loudspeakers = num_loudspeakers;
    config.validate()?;

    let mixture = &speech.samples + &noise.samples + &echo_speech.samples + &echo_noise.samples;
    let time = TimeScene {
        mic: Views {
            mixture,
            speech: speech.samples,
            noise: noise.samples,
            echo_speech: echo_speech.samples,
            echo_noise: echo_noise.samples,
        },
        loudspeaker: Views {
            mixture: &ls_speech.samples + &ls_noise.samples,
            speech: Array2::zeros((num_loudspeakers, num_samples)),
            noise: Array2::zeros((num_loudspeakers, num_samples)),
            echo_speech: ls_speech.samples,
            echo_noise: ls_noise.samples,
        },
    };

    let stft = Stft::from_config(&config)?;
    let analyzed = Analyzed::new(&time, &stft, &config)?;
    let (outputs, report) = analyzed.run(config.strategy, &config)?;

    let reference = outputs
        .mixture
        .select_channels(config.reference_channel..config.reference_channel + 1)?;
    let samples = stft.synthesize(&reference, num_samples)?;
    wav::write_mono(output, &samples.row(0).to_vec(), sample_rate)?;
    log::info!("wrote {}", output.display());

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn simulate(
    config_path: Option<&Path>,
    seed: u64,
    seconds: f64,
    strategy_name: &str,
) -> Result<()> {
    let config = load_config(config_path)?;
    let strategies: Vec<Strategy> = if strategy_name == "all" {
        Strategy::ALL.to_vec()
    } else {
        vec![strategy_name.parse()?]
    };

    let spec = SceneSpec {
        sample_rate: config.sample_rate,
        seconds,
        num_mics: config.num_mics,
        num_loudspeakers: config.num_loudspeakers,
        ..Default::default()
    };
    log::info!("simulating {:.1} s scene with seed {}", seconds, seed);
    let time = SceneGenerator::new(seed).scene(&spec);
    let stft = Stft::from_config(&config)?;
    let analyzed = Analyzed::new(&time, &stft, &config)?;

    let mut reports = Vec::with_capacity(strategies.len());
    for mode in strategies {
        let (_, report) = analyzed.run(mode, &config)?;
        reports.push(report);
    }

    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

/// Frequency-domain scene with its activity masks
struct Analyzed<'a> {
    stft: &'a Stft,
    scene: Scene,
    masks: ActivityMasks,
    num_samples: usize,
}

impl<'a> Analyzed<'a> {
    fn new(time: &TimeScene, stft: &'a Stft, config: &ProcessingConfig) -> Result<Self> {
        let scene = time.analyze(stft)?;
        let masks = vad::activity_masks(&scene, config.vad_sensitivity, config.reference_channel)?;
        Ok(Self {
            stft,
            scene,
            masks,
            num_samples: time.num_samples(),
        })
    }

    fn run(
        &self,
        mode: Strategy,
        config: &ProcessingConfig,
    ) -> Result<(Views<FreqSignal>, QualityReport)> {
        let outputs = strategy::run(mode, &self.scene, &self.masks, config)
            .with_context(|| format!("{} failed", mode))?;
        let report = metrics::evaluate(
            mode.name(),
            self.stft,
            &self.scene.mic,
            &outputs,
            self.num_samples,
            config,
        )?;
        log::info!(
            "{}: SNR {:.2} dB -> {:.2} dB, SD {:.2} dB",
            mode,
            report.snr_in,
            report.snr_out,
            report.sd
        );
        Ok((outputs, report))
    }
}
