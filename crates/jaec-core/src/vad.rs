//! Energy-threshold voice activity detection

use ndarray::Array2;
use num_complex::Complex64;

use crate::error::{JaecError, JaecResult};
use crate::signal::{ActivityMasks, FreqSignal, Mask, Scene};

/// Per-bin activity mask on the reference channel
///
/// A frame is active in a bin when its magnitude exceeds
/// `sensitivity` times the bin's standard deviation over all frames.
pub fn detect(
    signal: &FreqSignal,
    sensitivity: f64,
    reference_channel: usize,
) -> JaecResult<Mask> {
    if reference_channel >= signal.channels() {
        return Err(JaecError::config(format!(
            "reference channel {} out of range for {} channels",
            reference_channel,
            signal.channels()
        )));
    }

    let frames = signal.frames();
    let bins = signal.bins();
    let mut active = Array2::from_elem((frames, bins), false);
    if frames == 0 {
        return Ok(Mask::from_array(active));
    }

    let data = signal.data();
    for n in 0..bins {
        let mean = (0..frames)
            .map(|k| data[[reference_channel, k, n]])
            .sum::<Complex64>()
            / frames as f64;
        let variance = (0..frames)
            .map(|k| (data[[reference_channel, k, n]] - mean).norm_sqr())
            .sum::<f64>()
            / frames as f64;
        let threshold = sensitivity * variance.sqrt();

        for k in 0..frames {
            active[[k, n]] = data[[reference_channel, k, n]].norm() > threshold;
        }
    }

    Ok(Mask::from_array(active))
}

/// Frame-wise activity of a time-domain signal
///
/// Frames are non-overlapping blocks of `frame_size` samples; a trailing
/// partial block is ignored. A frame is active when its RMS exceeds
/// `sensitivity` times the standard deviation of the whole signal.
pub fn detect_time(samples: &[f64], frame_size: usize, sensitivity: f64) -> Vec<bool> {
    if frame_size == 0 || samples.is_empty() {
        return Vec::new();
    }

    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let std = (samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n).sqrt();
    let threshold = sensitivity * std;

    samples
        .chunks_exact(frame_size)
        .map(|frame| {
            let rms = (frame.iter().map(|s| s * s).sum::<f64>() / frame_size as f64).sqrt();
            rms > threshold
        })
        .collect()
}

/// Oracle activity masks from the clean speech and echo-speech views
pub fn activity_masks(
    scene: &Scene,
    sensitivity: f64,
    reference_channel: usize,
) -> JaecResult<ActivityMasks> {
    let speech = detect(&scene.mic.speech, sensitivity, reference_channel)?;
    let echo = detect(&scene.mic.echo_speech, sensitivity, reference_channel)?;
    log::debug!(
        "VAD: {} speech-active and {} echo-active frame/bin cells",
        speech.data().iter().filter(|&&v| v).count(),
        echo.data().iter().filter(|&&v| v).count()
    );
    Ok(ActivityMasks { speech, echo })
}
