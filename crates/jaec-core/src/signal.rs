//! Frequency-domain signal containers
//!
//! A [`FreqSignal`] holds complex STFT coefficients indexed by
//! `(channel, frame, bin)`. A recording is carried as [`Views`]: the mixture
//! plus its separable components, so every linear stage can be applied to
//! each component and the output of each component tracked.

use std::ops::Range;

use ndarray::{Array2, Array3, ArrayView1, Axis, s};
use num_complex::Complex64;

use crate::error::{JaecError, JaecResult};

/// Multichannel frequency-domain signal `[channel, frame, bin]`
#[derive(Debug, Clone, PartialEq)]
pub struct FreqSignal {
    data: Array3<Complex64>,
}

impl FreqSignal {
    /// All-zero signal
    pub fn zeros(channels: usize, frames: usize, bins: usize) -> Self {
        Self {
            data: Array3::zeros((channels, frames, bins)),
        }
    }

    /// Wrap an existing `[channel, frame, bin]` array
    pub fn from_array(data: Array3<Complex64>) -> Self {
        Self { data }
    }

    /// Number of channels
    pub fn channels(&self) -> usize {
        self.data.dim().0
    }

    /// Number of frames
    pub fn frames(&self) -> usize {
        self.data.dim().1
    }

    /// Number of bins
    pub fn bins(&self) -> usize {
        self.data.dim().2
    }

    /// Underlying array
    pub fn data(&self) -> &Array3<Complex64> {
        &self.data
    }

    /// Mutable underlying array
    pub fn data_mut(&mut self) -> &mut Array3<Complex64> {
        &mut self.data
    }

    /// Consume into the underlying array
    pub fn into_array(self) -> Array3<Complex64> {
        self.data
    }

    /// Channel vector of one frame in one bin
    pub fn frame_vector(&self, frame: usize, bin: usize) -> ArrayView1<'_, Complex64> {
        self.data.slice(s![.., frame, bin])
    }

    /// Stack channels of `self` on top of `other` (microphones over loudspeakers)
    pub fn stack_channels(&self, other: &FreqSignal) -> JaecResult<FreqSignal> {
        if self.frames() != other.frames() || self.bins() != other.bins() {
            return Err(JaecError::config(format!(
                "cannot stack {}x{} signal onto {}x{} signal",
                other.frames(),
                other.bins(),
                self.frames(),
                self.bins()
            )));
        }
        let data = ndarray::concatenate(Axis(0), &[self.data.view(), other.data.view()])
            .map_err(|e| JaecError::config(e.to_string()))?;
        Ok(Self { data })
    }

    /// Copy out a contiguous channel range
    pub fn select_channels(&self, range: Range<usize>) -> JaecResult<FreqSignal> {
        if range.end > self.channels() || range.start > range.end {
            return Err(JaecError::config(format!(
                "channel range {:?} out of bounds for {} channels",
                range,
                self.channels()
            )));
        }
        Ok(Self {
            data: self.data.slice(s![range, .., ..]).to_owned(),
        })
    }

    /// Total energy (sum of squared magnitudes)
    pub fn energy(&self) -> f64 {
        self.data.iter().map(|c| c.norm_sqr()).sum()
    }

    /// Energy of one channel
    pub fn channel_energy(&self, channel: usize) -> f64 {
        self.data
            .index_axis(Axis(0), channel)
            .iter()
            .map(|c| c.norm_sqr())
            .sum()
    }

    /// Elementwise sum of two same-shaped signals
    pub fn add(&self, other: &FreqSignal) -> JaecResult<FreqSignal> {
        self.check_same_shape(other)?;
        Ok(Self {
            data: &self.data + &other.data,
        })
    }

    /// Error unless frame and bin counts match
    pub fn check_grid(&self, frames: usize, bins: usize) -> JaecResult<()> {
        if self.frames() != frames || self.bins() != bins {
            return Err(JaecError::config(format!(
                "signal grid {}x{} does not match expected {}x{}",
                self.frames(),
                self.bins(),
                frames,
                bins
            )));
        }
        Ok(())
    }

    fn check_same_shape(&self, other: &FreqSignal) -> JaecResult<()> {
        if self.data.dim() != other.data.dim() {
            return Err(JaecError::config(format!(
                "shape mismatch: {:?} vs {:?}",
                self.data.dim(),
                other.data.dim()
            )));
        }
        Ok(())
    }
}

/// Frame-selection mask `[frame, bin]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    data: Array2<bool>,
}

impl Mask {
    /// Wrap an existing `[frame, bin]` array
    pub fn from_array(data: Array2<bool>) -> Self {
        Self { data }
    }

    /// Mask with every entry set to `value`
    pub fn filled(frames: usize, bins: usize, value: bool) -> Self {
        Self {
            data: Array2::from_elem((frames, bins), value),
        }
    }

    /// Number of frames
    pub fn frames(&self) -> usize {
        self.data.nrows()
    }

    /// Number of bins
    pub fn bins(&self) -> usize {
        self.data.ncols()
    }

    /// Whether frame `frame` is selected in bin `bin`
    pub fn get(&self, frame: usize, bin: usize) -> bool {
        self.data[[frame, bin]]
    }

    /// Set one entry
    pub fn set(&mut self, frame: usize, bin: usize, value: bool) {
        self.data[[frame, bin]] = value;
    }

    /// Selected frame count in one bin
    pub fn count_in_bin(&self, bin: usize) -> usize {
        self.data.column(bin).iter().filter(|&&v| v).count()
    }

    /// Underlying array
    pub fn data(&self) -> &Array2<bool> {
        &self.data
    }

    /// Logical NOT
    pub fn not(&self) -> Mask {
        Self {
            data: self.data.mapv(|v| !v),
        }
    }

    /// Logical AND
    pub fn and(&self, other: &Mask) -> JaecResult<Mask> {
        self.combine(other, |a, b| a && b)
    }

    /// Logical OR
    pub fn or(&self, other: &Mask) -> JaecResult<Mask> {
        self.combine(other, |a, b| a || b)
    }

    /// Error unless the mask covers the signal's frame/bin grid
    pub fn check_matches(&self, signal: &FreqSignal) -> JaecResult<()> {
        if self.frames() != signal.frames() || self.bins() != signal.bins() {
            return Err(JaecError::config(format!(
                "mask shape {}x{} does not match signal {}x{}",
                self.frames(),
                self.bins(),
                signal.frames(),
                signal.bins()
            )));
        }
        Ok(())
    }

    fn combine(&self, other: &Mask, op: impl Fn(bool, bool) -> bool) -> JaecResult<Mask> {
        if self.data.dim() != other.data.dim() {
            return Err(JaecError::config(format!(
                "mask shape mismatch: {:?} vs {:?}",
                self.data.dim(),
                other.data.dim()
            )));
        }
        let mut data = self.data.clone();
        data.zip_mut_with(&other.data, |a, &b| *a = op(*a, b));
        Ok(Self { data })
    }
}

/// Per-recording activity masks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityMasks {
    /// Desired near-end speech active
    pub speech: Mask,
    /// Far-end (echo) speech active
    pub echo: Mask,
}

impl ActivityMasks {
    /// Speech present
    pub fn speech_present(&self) -> Mask {
        self.speech.clone()
    }

    /// Speech absent
    pub fn speech_absent(&self) -> Mask {
        self.speech.not()
    }

    /// Speech absent and echo present
    pub fn echo_only(&self) -> JaecResult<Mask> {
        self.speech.not().and(&self.echo)
    }

    /// Speech and echo both present
    pub fn both_active(&self) -> JaecResult<Mask> {
        self.speech.and(&self.echo)
    }

    /// Speech and echo both absent
    pub fn both_inactive(&self) -> JaecResult<Mask> {
        self.speech.or(&self.echo).map(|m| m.not())
    }
}

/// Separable components of one recording
///
/// `mixture = speech + noise + echo_speech + echo_noise` holds for every view
/// set produced by the generators and preserved by every linear stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Views<T> {
    /// Observed signal
    pub mixture: T,
    /// Desired near-end speech
    pub speech: T,
    /// Background noise
    pub noise: T,
    /// Echo of far-end speech
    pub echo_speech: T,
    /// Echo of far-end noise
    pub echo_noise: T,
}

impl<T> Views<T> {
    /// Apply `f` to every view
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> Views<U> {
        Views {
            mixture: f(&self.mixture),
            speech: f(&self.speech),
            noise: f(&self.noise),
            echo_speech: f(&self.echo_speech),
            echo_noise: f(&self.echo_noise),
        }
    }

    /// Apply a fallible `f` to every view
    pub fn try_map<U, E>(&self, mut f: impl FnMut(&T) -> Result<U, E>) -> Result<Views<U>, E> {
        Ok(Views {
            mixture: f(&self.mixture)?,
            speech: f(&self.speech)?,
            noise: f(&self.noise)?,
            echo_speech: f(&self.echo_speech)?,
            echo_noise: f(&self.echo_noise)?,
        })
    }

    /// Combine matching views of two sets with a fallible `f`
    pub fn try_zip<U, V, E>(
        &self,
        other: &Views<U>,
        mut f: impl FnMut(&T, &U) -> Result<V, E>,
    ) -> Result<Views<V>, E> {
        Ok(Views {
            mixture: f(&self.mixture, &other.mixture)?,
            speech: f(&self.speech, &other.speech)?,
            noise: f(&self.noise, &other.noise)?,
            echo_speech: f(&self.echo_speech, &other.echo_speech)?,
            echo_noise: f(&self.echo_noise, &other.echo_noise)?,
        })
    }
}

impl Views<FreqSignal> {
    /// Sum of the interference views
    pub fn interference_sum(&self) -> JaecResult<FreqSignal> {
        self.noise.add(&self.echo_speech)?.add(&self.echo_noise)
    }

    /// Channel count shared by all views
    pub fn channels(&self) -> usize {
        self.mixture.channels()
    }
}

/// Microphone and loudspeaker views of one recording
///
/// Loudspeaker views carry the loudspeaker share of each component:
/// `speech` and `noise` are zero, `echo_speech` and `echo_noise` hold the
/// signals that produced the corresponding microphone echoes.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    /// Microphone views (M channels)
    pub mic: Views<FreqSignal>,
    /// Loudspeaker views (L channels)
    pub loudspeaker: Views<FreqSignal>,
}

impl Scene {
    /// Validate that every view shares one frame/bin grid and channel layout
    pub fn new(mic: Views<FreqSignal>, loudspeaker: Views<FreqSignal>) -> JaecResult<Self> {
        let frames = mic.mixture.frames();
        let bins = mic.mixture.bins();
        let m = mic.mixture.channels();
        let l = loudspeaker.mixture.channels();
        mic.try_map(|v| {
            v.check_grid(frames, bins)?;
            check_channels(v, m)
        })?;
        loudspeaker.try_map(|v| {
            v.check_grid(frames, bins)?;
            check_channels(v, l)
        })?;
        Ok(Self { mic, loudspeaker })
    }

    /// Microphone count
    pub fn num_mics(&self) -> usize {
        self.mic.mixture.channels()
    }

    /// Loudspeaker count
    pub fn num_loudspeakers(&self) -> usize {
        self.loudspeaker.mixture.channels()
    }

    /// Frame count
    pub fn frames(&self) -> usize {
        self.mic.mixture.frames()
    }

    /// Bin count
    pub fn bins(&self) -> usize {
        self.mic.mixture.bins()
    }

    /// Extended views (microphones stacked over loudspeakers)
    pub fn extended(&self) -> JaecResult<Views<FreqSignal>> {
        self.mic.try_zip(&self.loudspeaker, |m, l| m.stack_channels(l))
    }
}

fn check_channels(signal: &FreqSignal, expected: usize) -> JaecResult<()> {
    if signal.channels() != expected {
        return Err(JaecError::config(format!(
            "view has {} channels, expected {}",
            signal.channels(),
            expected
        )));
    }
    Ok(())
}
