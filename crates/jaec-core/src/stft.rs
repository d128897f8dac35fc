//! Analysis/synthesis filterbank (STFT with weighted overlap-add)
//!
//! The input is zero-padded by `dft_size - hop_size` at both ends so every
//! sample of the recording is covered by a full set of overlapping frames.
//! Synthesis divides by the summed window envelope, which makes
//! `synthesize(analyze(x)) == x` up to rounding for any window whose
//! envelope is non-zero.

use std::sync::Arc;

use ndarray::{Array2, ArrayView2};
use num_complex::Complex64;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::config::ProcessingConfig;
use crate::error::{JaecError, JaecResult};
use crate::signal::FreqSignal;

const ENVELOPE_FLOOR: f64 = 1e-10;

/// Periodic square-root Hann window
pub fn sqrt_hann(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / size as f64;
            (0.5 * (1.0 - phase.cos())).sqrt()
        })
        .collect()
}

/// Periodic Hann window
pub fn hann(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / size as f64;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Short-time Fourier transform filterbank
pub struct Stft {
    dft_size: usize,
    hop_size: usize,
    window: Vec<f64>,
    forward: Arc<dyn RealToComplex<f64>>,
    inverse: Arc<dyn ComplexToReal<f64>>,
}

impl Stft {
    /// Create filterbank with a square-root Hann window
    pub fn new(dft_size: usize, hop_size: usize) -> JaecResult<Self> {
        Self::with_window(dft_size, hop_size, sqrt_hann(dft_size))
    }

    /// Create filterbank from pipeline configuration
    pub fn from_config(config: &ProcessingConfig) -> JaecResult<Self> {
        Self::new(config.dft_size, config.hop_size)
    }

    /// Create filterbank with a custom analysis/synthesis window
    pub fn with_window(dft_size: usize, hop_size: usize, window: Vec<f64>) -> JaecResult<Self> {
        if dft_size == 0 || dft_size % 2 != 0 {
            return Err(JaecError::config(format!(
                "DFT size must be even and positive, got {}",
                dft_size
            )));
        }
        if hop_size == 0 || hop_size > dft_size {
            return Err(JaecError::config(format!(
                "hop size {} invalid for DFT size {}",
                hop_size, dft_size
            )));
        }
        if window.len() != dft_size {
            return Err(JaecError::config(format!(
                "window length {} does not match DFT size {}",
                window.len(),
                dft_size
            )));
        }

        let mut planner = RealFftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(dft_size);
        let inverse = planner.plan_fft_inverse(dft_size);

        Ok(Self {
            dft_size,
            hop_size,
            window,
            forward,
            inverse,
        })
    }

    /// DFT size
    pub fn dft_size(&self) -> usize {
        self.dft_size
    }

    /// Hop size
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Number of bins
    pub fn num_bins(&self) -> usize {
        self.dft_size / 2 + 1
    }

    fn padding(&self) -> usize {
        self.dft_size - self.hop_size
    }

    /// Frame count produced for a recording of `len` samples
    pub fn num_frames(&self, len: usize) -> usize {
        let padded = len + 2 * self.padding();
        if padded <= self.dft_size {
            1
        } else {
            (padded - self.dft_size).div_ceil(self.hop_size) + 1
        }
    }

    fn buffer_len(&self, frames: usize) -> usize {
        (frames - 1) * self.hop_size + self.dft_size
    }

    /// Analyze a `[channel, sample]` time signal
    pub fn analyze(&self, signal: ArrayView2<'_, f64>) -> JaecResult<FreqSignal> {
        let (channels, len) = signal.dim();
        let frames = self.num_frames(len);
        let bins = self.num_bins();
        let pad = self.padding();

        let mut out = FreqSignal::zeros(channels, frames, bins);
        let mut padded = vec![0.0f64; self.buffer_len(frames)];
        let mut input = self.forward.make_input_vec();
        let mut spectrum = self.forward.make_output_vec();

        for c in 0..channels {
            padded.fill(0.0);
            for (dst, &src) in padded[pad..pad + len].iter_mut().zip(signal.row(c).iter()) {
                *dst = src;
            }

            for k in 0..frames {
                let start = k * self.hop_size;
                for (i, sample) in input.iter_mut().enumerate() {
                    *sample = padded[start + i] * self.window[i];
                }
                self.forward
                    .process(&mut input, &mut spectrum)
                    .map_err(|e| JaecError::Fft(e.to_string()))?;
                for (n, &value) in spectrum.iter().enumerate() {
                    out.data_mut()[[c, k, n]] = value;
                }
            }
        }

        Ok(out)
    }

    /// Resynthesize `len` samples per channel from a frequency signal
    pub fn synthesize(&self, spectrum: &FreqSignal, len: usize) -> JaecResult<Array2<f64>> {
        let frames = spectrum.frames();
        if spectrum.bins() != self.num_bins() {
            return Err(JaecError::config(format!(
                "signal has {} bins, filterbank expects {}",
                spectrum.bins(),
                self.num_bins()
            )));
        }
        if frames != self.num_frames(len) {
            return Err(JaecError::config(format!(
                "{} frames cannot produce {} samples (expected {} frames)",
                frames,
                len,
                self.num_frames(len)
            )));
        }

        let pad = self.padding();
        let buffer_len = self.buffer_len(frames);
        let norm = 1.0 / self.dft_size as f64;
        let last_bin = self.num_bins() - 1;

        // Window envelope is identical for every channel
        let mut envelope = vec![0.0f64; buffer_len];
        for k in 0..frames {
            let start = k * self.hop_size;
            for (i, w) in self.window.iter().enumerate() {
                envelope[start + i] += w * w;
            }
        }

        let mut out = Array2::zeros((spectrum.channels(), len));
        let mut buffer = vec![0.0f64; buffer_len];
        let mut bins = self.inverse.make_input_vec();
        let mut frame = self.inverse.make_output_vec();

        for c in 0..spectrum.channels() {
            buffer.fill(0.0);
            for k in 0..frames {
                for (n, value) in bins.iter_mut().enumerate() {
                    *value = spectrum.data()[[c, k, n]];
                }
                // DC and Nyquist must be real for the inverse real transform
                bins[0] = Complex64::new(bins[0].re, 0.0);
                bins[last_bin] = Complex64::new(bins[last_bin].re, 0.0);

                self.inverse
                    .process(&mut bins, &mut frame)
                    .map_err(|e| JaecError::Fft(e.to_string()))?;

                let start = k * self.hop_size;
                for (i, &sample) in frame.iter().enumerate() {
                    buffer[start + i] += sample * norm * self.window[i];
                }
            }

            for (i, value) in out.row_mut(c).iter_mut().enumerate() {
                let env = envelope[pad + i];
                *value = if env > ENVELOPE_FLOOR {
                    buffer[pad + i] / env
                } else {
                    0.0
                };
            }
        }

        Ok(out)
    }
}
