//! Speech quality metrics (SNR, spectral distortion)
//!
//! Both metrics operate on single-channel time-domain signals and are
//! restricted to frames where the clean speech reference is active,
//! after an initial warm-up interval.

use std::ops::Range;

use num_complex::Complex64;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

use crate::config::{MetricsConfig, ProcessingConfig};
use crate::error::{JaecError, JaecResult};
use crate::signal::{FreqSignal, Views};
use crate::stft::{Stft, hann};
use crate::vad;

/// Power floor for logarithms
const POWER_FLOOR: f64 = 1e-20;

/// Speech-active evaluation frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechFrames {
    frame_size: usize,
    frames: Vec<Range<usize>>,
}

impl SpeechFrames {
    /// Detect speech-active frames on a clean speech reference
    pub fn detect(reference: &[f64], config: &MetricsConfig, sample_rate: u32) -> JaecResult<Self> {
        let frame_size = config.frame_size;
        let warmup = (config.warmup_seconds * sample_rate as f64).round().max(0.0) as usize;

        let activity = vad::detect_time(reference, frame_size, config.vad_sensitivity);
        let frames: Vec<Range<usize>> = activity
            .into_iter()
            .enumerate()
            .filter(|&(i, active)| active && i * frame_size >= warmup)
            .map(|(i, _)| i * frame_size..(i + 1) * frame_size)
            .collect();

        if frames.is_empty() {
            return Err(JaecError::NoSpeechFrames);
        }
        Ok(Self { frame_size, frames })
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True when no frames are selected
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame length in samples
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Sample ranges of the selected frames
    pub fn iter(&self) -> impl Iterator<Item = &Range<usize>> {
        self.frames.iter()
    }

    fn energy(&self, samples: &[f64]) -> f64 {
        self.frames
            .iter()
            .filter(|r| r.end <= samples.len())
            .map(|r| samples[r.clone()].iter().map(|s| s * s).sum::<f64>())
            .sum()
    }
}

/// Signal-to-noise ratio (dB) over speech-active frames
pub fn snr(signal: &[f64], noise: &[f64], frames: &SpeechFrames) -> f64 {
    let signal_energy = frames.energy(signal);
    let noise_energy = frames.energy(noise);
    10.0 * ((signal_energy + POWER_FLOOR) / (noise_energy + POWER_FLOOR)).log10()
}

/// Mean log-spectral distance (dB) over speech-active frames
pub fn sd(reference: &[f64], processed: &[f64], frames: &SpeechFrames) -> JaecResult<f64> {
    if reference.len() != processed.len() {
        return Err(JaecError::config(format!(
            "reference has {} samples, processed has {}",
            reference.len(),
            processed.len()
        )));
    }

    let size = frames.frame_size();
    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(size);
    let window = hann(size);

    let mut input = fft.make_input_vec();
    let mut ref_spectrum = fft.make_output_vec();
    let mut proc_spectrum = fft.make_output_vec();

    let mut spectrum_of = |samples: &[f64], out: &mut Vec<Complex64>| -> JaecResult<()> {
        for ((dst, &s), w) in input.iter_mut().zip(samples).zip(&window) {
            *dst = s * w;
        }
        fft.process(&mut input, out)
            .map_err(|e| JaecError::Fft(e.to_string()))
    };

    let mut total = 0.0;
    let mut count = 0usize;
    for range in frames.iter().filter(|r| r.end <= reference.len()) {
        spectrum_of(&reference[range.clone()], &mut ref_spectrum)?;
        spectrum_of(&processed[range.clone()], &mut proc_spectrum)?;

        let mean_sq = ref_spectrum
            .iter()
            .zip(&proc_spectrum)
            .map(|(r, p)| {
                let ratio = (r.norm_sqr() + POWER_FLOOR) / (p.norm_sqr() + POWER_FLOOR);
                let d = 10.0 * ratio.log10();
                d * d
            })
            .sum::<f64>()
            / ref_spectrum.len() as f64;
        total += mean_sq.sqrt();
        count += 1;
    }

    if count == 0 {
        return Err(JaecError::NoSpeechFrames);
    }
    Ok(total / count as f64)
}

/// Quality of one processed recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    /// Strategy name
    pub strategy: String,
    /// SNR of the unprocessed reference microphone (dB)
    pub snr_in: f64,
    /// SNR of the processed output (dB)
    pub snr_out: f64,
    /// Speech distortion of the processed output (dB)
    pub sd: f64,
    /// Number of frames the metrics were computed over
    pub frames: usize,
}

/// Evaluate processed views against the unprocessed reference microphone
pub fn evaluate(
    strategy: &str,
    stft: &Stft,
    input: &Views<FreqSignal>,
    output: &Views<FreqSignal>,
    num_samples: usize,
    config: &ProcessingConfig,
) -> JaecResult<QualityReport> {
    let reference_channel = config.reference_channel;
    let to_time = |signal: &FreqSignal| -> JaecResult<Vec<f64>> {
        let reference = signal.select_channels(reference_channel..reference_channel + 1)?;
        Ok(stft.synthesize(&reference, num_samples)?.row(0).to_vec())
    };

    let speech_in = to_time(&input.speech)?;
    let interference_in = to_time(&input.interference_sum()?)?;
    let speech_out = to_time(&output.speech)?;
    let interference_out = to_time(&output.interference_sum()?)?;

    let frames = SpeechFrames::detect(&speech_in, &config.metrics, config.sample_rate)?;
    Ok(QualityReport {
        strategy: strategy.to_string(),
        snr_in: snr(&speech_in, &interference_in, &frames),
        snr_out: snr(&speech_out, &interference_out, &frames),
        sd: sd(&speech_in, &speech_out, &frames)?,
        frames: frames.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MetricsConfig {
        MetricsConfig {
            frame_size: 100,
            warmup_seconds: 0.0,
            vad_sensitivity: 0.3,
        }
    }

    fn gated_tone(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| {
                if (i / 100) % 2 == 0 {
                    (i as f64 * 0.3).sin()
                } else {
                    0.0
                }
            })
            .collect()
    }

    #[test]
    fn test_speech_frames_skip_silence_and_warmup() {
        let speech = gated_tone(1000);
        let frames = SpeechFrames::detect(&speech, &config(), 1000).unwrap();
        assert_eq!(frames.len(), 5);

        let warm = MetricsConfig {
            warmup_seconds: 0.45,
            ..config()
        };
        let frames = SpeechFrames::detect(&speech, &warm, 1000).unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_no_speech_frames() {
        let silence = vec![0.0; 1000];
        assert_eq!(
            SpeechFrames::detect(&silence, &config(), 1000),
            Err(JaecError::NoSpeechFrames)
        );
    }

    #[test]
    fn test_snr_scaling() {
        let speech = gated_tone(1000);
        let frames = SpeechFrames::detect(&speech, &config(), 1000).unwrap();
        let noise: Vec<f64> = speech.iter().map(|s| s * 0.1).collect();
        approx::assert_abs_diff_eq!(snr(&speech, &noise, &frames), 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_sd_identity_and_gain() {
        let speech = gated_tone(1000);
        let frames = SpeechFrames::detect(&speech, &config(), 1000).unwrap();
        approx::assert_abs_diff_eq!(sd(&speech, &speech, &frames).unwrap(), 0.0, epsilon = 1e-9);

        // A broadband gain of 0.5 is a 6.02 dB distance in every bin with energy
        let halved: Vec<f64> = speech.iter().map(|s| s * 0.5).collect();
        let d = sd(&speech, &halved, &frames).unwrap();
        approx::assert_abs_diff_eq!(d, 20.0 * 2.0f64.log10(), epsilon = 1e-6);
    }
}
