//! Seeded synthetic recordings
//!
//! Every generator draws from one `ChaCha8Rng` seeded by the caller, so a
//! scene is reproducible from `(SceneSpec, seed)` alone.

use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::JaecResult;
use crate::signal::{Scene, Views};
use crate::stft::Stft;

/// Synthetic scene parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSpec {
    /// Sample rate (Hz)
    pub sample_rate: u32,
    /// Duration (seconds)
    pub seconds: f64,
    /// Microphone count
    pub num_mics: usize,
    /// Loudspeaker count
    pub num_loudspeakers: usize,
    /// Speech-to-interference ratio on the reference microphone during speech (dB)
    pub snr_db: f64,
    /// Echo-to-background-noise power ratio (dB)
    pub echo_to_noise_db: f64,
    /// Far-end noise level relative to far-end speech (dB)
    pub far_noise_db: f64,
    /// Room impulse response length (taps)
    pub rir_taps: usize,
    /// Shortest and longest activity block (seconds)
    pub block_seconds: (f64, f64),
}

impl Default for SceneSpec {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            seconds: 4.0,
            num_mics: 2,
            num_loudspeakers: 1,
            snr_db: 0.0,
            echo_to_noise_db: 0.0,
            far_noise_db: -20.0,
            rir_taps: 8,
            block_seconds: (0.2, 0.6),
        }
    }
}

impl SceneSpec {
    /// Number of samples
    pub fn num_samples(&self) -> usize {
        (self.seconds * self.sample_rate as f64).round() as usize
    }
}

/// Time-domain recording as `[channel, sample]` views
#[derive(Debug, Clone)]
pub struct TimeScene {
    /// Microphone views
    pub mic: Views<Array2<f64>>,
    /// Loudspeaker views
    pub loudspeaker: Views<Array2<f64>>,
}

impl TimeScene {
    /// Samples per channel
    pub fn num_samples(&self) -> usize {
        self.mic.mixture.ncols()
    }

    /// Transform every view to the frequency domain
    pub fn analyze(&self, stft: &Stft) -> JaecResult<Scene> {
        let mic = self.mic.try_map(|v| stft.analyze(v.view()))?;
        let loudspeaker = self.loudspeaker.try_map(|v| stft.analyze(v.view()))?;
        Scene::new(mic, loudspeaker)
    }
}

/// Seeded source of synthetic signals
pub struct SceneGenerator {
    rng: ChaCha8Rng,
}

impl SceneGenerator {
    /// Create generator from an explicit seed
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Uniform white noise in [-1, 1)
    pub fn white_noise(&mut self, len: usize) -> Vec<f64> {
        (0..len).map(|_| self.rng.random::<f64>() * 2.0 - 1.0).collect()
    }

    /// Low-pass coloured noise, a crude stand-in for a speech spectrum
    pub fn colored_noise(&mut self, len: usize, pole: f64) -> Vec<f64> {
        let mut state = 0.0;
        self.white_noise(len)
            .into_iter()
            .map(|x| {
                state = pole * state + (1.0 - pole) * x;
                state
            })
            .collect()
    }

    /// Alternating on/off activity with random block lengths
    pub fn activity(&mut self, len: usize, min_block: usize, max_block: usize) -> Vec<bool> {
        let mut gate = Vec::with_capacity(len);
        let mut on = self.rng.random::<bool>();
        while gate.len() < len {
            let block = self.rng.random_range(min_block..=max_block.max(min_block));
            let remaining = len - gate.len();
            gate.extend(std::iter::repeat_n(on, block.min(remaining)));
            on = !on;
        }
        gate
    }

    /// Exponentially decaying random impulse response with unit energy
    pub fn impulse_response(&mut self, taps: usize) -> Vec<f64> {
        let taps = taps.max(1);
        let decay = taps as f64 / 3.0;
        let mut h: Vec<f64> = (0..taps)
            .map(|i| (self.rng.random::<f64>() * 2.0 - 1.0) * (-(i as f64) / decay).exp())
            .collect();
        // Keep a dominant direct path
        h[0] = h[0].signum() * (h[0].abs() + 1.0);
        let norm = h.iter().map(|v| v * v).sum::<f64>().sqrt();
        h.iter_mut().for_each(|v| *v /= norm);
        h
    }

    /// Generate a full recording
    pub fn scene(&mut self, spec: &SceneSpec) -> TimeScene {
        let len = spec.num_samples();
        let m = spec.num_mics;
        let l = spec.num_loudspeakers;
        let min_block = (spec.block_seconds.0 * spec.sample_rate as f64) as usize;
        let max_block = (spec.block_seconds.1 * spec.sample_rate as f64) as usize;

        // Near-end speech: one source, M room responses
        let speech_gate = self.activity(len, min_block.max(1), max_block.max(1));
        let source: Vec<f64> = self
            .colored_noise(len, 0.6)
            .into_iter()
            .zip(&speech_gate)
            .map(|(x, &on)| if on { x } else { 0.0 })
            .collect();
        let mut speech = Array2::zeros((m, len));
        for mic in 0..m {
            let h = self.impulse_response(spec.rir_taps);
            speech.row_mut(mic).assign(&Array1::from(convolve(&source, &h)));
        }

        // Far-end signals: gated speech plus continuous low-level noise
        let far_noise_gain = 10f64.powf(spec.far_noise_db / 20.0);
        let mut far_speech = Array2::zeros((l, len));
        let mut far_noise = Array2::zeros((l, len));
        for ls in 0..l {
            let gate = self.activity(len, min_block.max(1), max_block.max(1));
            let talk: Vec<f64> = self
                .colored_noise(len, 0.5)
                .into_iter()
                .zip(&gate)
                .map(|(x, &on)| if on { x } else { 0.0 })
                .collect();
            far_speech.row_mut(ls).assign(&Array1::from(talk));
            let hiss: Vec<f64> = self.white_noise(len).iter().map(|x| x * far_noise_gain).collect();
            far_noise.row_mut(ls).assign(&Array1::from(hiss));
        }

        // Echo paths loudspeaker -> microphone
        let mut echo_speech = Array2::zeros((m, len));
        let mut echo_noise = Array2::zeros((m, len));
        for mic in 0..m {
            for ls in 0..l {
                let h = self.impulse_response(spec.rir_taps);
                let es = convolve(far_speech.row(ls).as_slice().unwrap_or(&[]), &h);
                let en = convolve(far_noise.row(ls).as_slice().unwrap_or(&[]), &h);
                for (i, (s, n)) in es.into_iter().zip(en).enumerate() {
                    echo_speech[[mic, i]] += s;
                    echo_noise[[mic, i]] += n;
                }
            }
        }

        // Spatially white background noise
        let mut noise = Array2::zeros((m, len));
        for mic in 0..m {
            noise.row_mut(mic).assign(&Array1::from(self.white_noise(len)));
        }

        // Scale interference on the reference microphone during speech activity
        let active_power = |x: &Array2<f64>| -> f64 {
            let (sum, count) = x
                .row(0)
                .iter()
                .zip(&speech_gate)
                .filter(|&(_, &on)| on)
                .fold((0.0, 0usize), |(s, c), (v, _)| (s + v * v, c + 1));
            if count == 0 {
                0.0
            } else {
                sum / count as f64
            }
        };
        let p_speech = active_power(&speech);
        let p_echo = active_power(&echo_speech) + active_power(&echo_noise);
        let p_noise = active_power(&noise);
        let p_interference = p_speech / 10f64.powf(spec.snr_db / 10.0);
        let echo_share = 1.0 / (1.0 + 10f64.powf(-spec.echo_to_noise_db / 10.0));

        if p_echo > 0.0 {
            let g = (p_interference * echo_share / p_echo).sqrt();
            echo_speech *= g;
            echo_noise *= g;
            // The loudspeaker signals scale with their echoes
            far_speech *= g;
            far_noise *= g;
        }
        if p_noise > 0.0 {
            let share = if l == 0 { 1.0 } else { 1.0 - echo_share };
            noise *= (p_interference * share / p_noise).sqrt();
        }

        let mic_mixture = &speech + &noise + &echo_speech + &echo_noise;
        let ls_mixture = &far_speech + &far_noise;

        TimeScene {
            mic: Views {
                mixture: mic_mixture,
                speech,
                noise,
                echo_speech,
                echo_noise,
            },
            loudspeaker: Views {
                mixture: ls_mixture,
                speech: Array2::zeros((l, len)),
                noise: Array2::zeros((l, len)),
                echo_speech: far_speech,
                echo_noise: far_noise,
            },
        }
    }
}

/// Linear convolution truncated to the input length
pub fn convolve(x: &[f64], h: &[f64]) -> Vec<f64> {
    (0..x.len())
        .map(|i| {
            h.iter()
                .enumerate()
                .take(i + 1)
                .map(|(j, &hj)| hj * x[i - j])
                .sum()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reproducibility() {
        let spec = SceneSpec {
            seconds: 0.5,
            ..Default::default()
        };
        let a = SceneGenerator::new(42).scene(&spec);
        let b = SceneGenerator::new(42).scene(&spec);
        let c = SceneGenerator::new(43).scene(&spec);
        assert_eq!(a.mic.mixture, b.mic.mixture);
        assert_eq!(a.loudspeaker.mixture, b.loudspeaker.mixture);
        assert_ne!(a.mic.mixture, c.mic.mixture);
    }

    #[test]
    fn test_views_sum_to_mixture() {
        let spec = SceneSpec {
            seconds: 0.5,
            ..Default::default()
        };
        let scene = SceneGenerator::new(5).scene(&spec);
        let sum =
            &scene.mic.speech + &scene.mic.noise + &scene.mic.echo_speech + &scene.mic.echo_noise;
        for (a, b) in sum.iter().zip(scene.mic.mixture.iter()) {
            approx::assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
        assert_eq!(scene.num_samples(), 8000);
        assert!(scene.loudspeaker.speech.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_interference_level() {
        let spec = SceneSpec {
            seconds: 2.0,
            snr_db: 0.0,
            ..Default::default()
        };
        let scene = SceneGenerator::new(9).scene(&spec);
        let gate: Vec<bool> = scene.mic.speech.row(0).iter().map(|&v| v != 0.0).collect();
        let power = |x: &Array2<f64>| -> f64 {
            x.row(0)
                .iter()
                .zip(&gate)
                .filter(|&(_, &on)| on)
                .map(|(v, _)| v * v)
                .sum::<f64>()
        };
        let interference = &scene.mic.noise + &scene.mic.echo_speech + &scene.mic.echo_noise;
        let snr = 10.0 * (power(&scene.mic.speech) / power(&interference)).log10();
        assert!(snr.abs() < 1.5, "input SNR {}", snr);
    }

    #[test]
    fn test_convolve_impulse() {
        let x = vec![1.0, 2.0, 3.0];
        assert_eq!(convolve(&x, &[1.0]), x);
        assert_eq!(convolve(&x, &[0.0, 1.0]), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_impulse_response_unit_energy() {
        let mut generator = SceneGenerator::new(1);
        let h = generator.impulse_response(16);
        let energy: f64 = h.iter().map(|v| v * v).sum();
        approx::assert_abs_diff_eq!(energy, 1.0, epsilon = 1e-12);
    }
}
