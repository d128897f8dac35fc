//! WAV loading and writing

use std::path::Path;

use anyhow::{Context, Result, bail};
use ndarray::Array2;

/// Multichannel recording `[channel, sample]`
#[derive(Debug, Clone)]
pub struct Recording {
    /// Samples per channel
    pub samples: Array2<f64>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl Recording {
    /// Channel count
    pub fn channels(&self) -> usize {
        self.samples.nrows()
    }

    /// Samples per channel
    pub fn num_samples(&self) -> usize {
        self.samples.ncols()
    }

    /// Load a WAV file, scaling integer formats to [-1, 1)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = hound::WavReader::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;

        let spec = reader.spec();
        let num_channels = spec.channels as usize;
        if num_channels == 0 {
            bail!("{}: no channels", path.display());
        }

        let interleaved: Vec<f64> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .map(|s| s.map(|v| v as f64))
                .collect::<std::result::Result<Vec<_>, _>>()
                .with_context(|| format!("failed to decode {}", path.display()))?,
            hound::SampleFormat::Int => {
                let max_val = (1i64 << (spec.bits_per_sample - 1)) as f64;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f64 / max_val))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .with_context(|| format!("failed to decode {}", path.display()))?
            }
        };

        // Deinterleave
        let num_samples = interleaved.len() / num_channels;
        let samples = Array2::from_shape_fn((num_channels, num_samples), |(c, i)| {
            interleaved[i * num_channels + c]
        });

        log::debug!(
            "loaded {}: {} channels, {} samples at {} Hz",
            path.display(),
            num_channels,
            num_samples,
            spec.sample_rate
        );

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }
}

/// Write a mono 32-bit float WAV file
pub fn write_mono<P: AsRef<Path>>(path: P, samples: &[f64], sample_rate: u32) -> Result<()> {
    let path = path.as_ref();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for &s in samples {
        writer.write_sample(s as f32)?;
    }
    writer
        .finalize()
        .with_context(|| format!("failed to finalize {}", path.display()))
}
