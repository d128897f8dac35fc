//! Configuration types for the processing pipeline

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{JaecError, JaecResult};

/// Processing strategy selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Multichannel Wiener filter on the microphones
    #[serde(rename = "MWF")]
    Mwf,
    /// Wiener filter on the stacked microphone+loudspeaker signal
    #[serde(rename = "MWFext")]
    MwfExt,
    /// Echo cancellation followed by noise reduction
    #[serde(rename = "AEC-NR")]
    AecNr,
    /// Noise reduction followed by echo cancellation
    #[serde(rename = "NR-AEC")]
    NrAec,
    /// Extended noise reduction, echo cancellation, post-filter
    #[default]
    #[serde(rename = "NRext-AEC-PF")]
    NrExtAecPf,
}

impl Strategy {
    /// All strategies in canonical order
    pub const ALL: [Strategy; 5] = [
        Strategy::Mwf,
        Strategy::MwfExt,
        Strategy::AecNr,
        Strategy::NrAec,
        Strategy::NrExtAecPf,
    ];

    /// Canonical name
    pub fn name(self) -> &'static str {
        match self {
            Strategy::Mwf => "MWF",
            Strategy::MwfExt => "MWFext",
            Strategy::AecNr => "AEC-NR",
            Strategy::NrAec => "NR-AEC",
            Strategy::NrExtAecPf => "NRext-AEC-PF",
        }
    }

    /// Whether the strategy contains an echo-path estimation stage
    pub fn uses_aec(self) -> bool {
        matches!(
            self,
            Strategy::AecNr | Strategy::NrAec | Strategy::NrExtAecPf
        )
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = JaecError;

    fn from_str(s: &str) -> JaecResult<Self> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.name() == s)
            .ok_or_else(|| JaecError::config(format!("unknown strategy '{}'", s)))
    }
}

/// Quality metric configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Frame length for the time-domain speech VAD and SD (samples)
    pub frame_size: usize,
    /// Initial interval excluded from the metrics (seconds)
    pub warmup_seconds: f64,
    /// Time-domain VAD sensitivity
    pub vad_sensitivity: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            frame_size: 512,
            warmup_seconds: 0.5,
            vad_sensitivity: 0.3,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Sample rate (Hz)
    pub sample_rate: u32,
    /// Reference microphone index
    pub reference_channel: usize,
    /// Microphone count (M)
    pub num_mics: usize,
    /// Loudspeaker count (L)
    pub num_loudspeakers: usize,
    /// Signal subspace rank for speech-only filters
    pub rank_s: usize,
    /// Signal subspace rank for the extended speech+echo filter
    pub rank_ses: usize,
    /// Processing strategy
    pub strategy: Strategy,
    /// DFT size
    pub dft_size: usize,
    /// Hop size
    pub hop_size: usize,
    /// Per-bin VAD sensitivity
    pub vad_sensitivity: f64,
    /// Relative diagonal loading applied to absent-regime correlations
    pub diagonal_loading: f64,
    /// Quality metric settings
    pub metrics: MetricsConfig,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            reference_channel: 0,
            num_mics: 2,
            num_loudspeakers: 1,
            rank_s: 1,
            rank_ses: 2,
            strategy: Strategy::default(),
            dft_size: 512,
            hop_size: 256,
            vad_sensitivity: 0.1,
            diagonal_loading: 1e-9,
            metrics: MetricsConfig::default(),
        }
    }
}

impl ProcessingConfig {
    /// Parse configuration from JSON
    pub fn from_json(json: &str) -> JaecResult<Self> {
        serde_json::from_str(json).map_err(|e| JaecError::config(e.to_string()))
    }

    /// Set strategy
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set microphone and loudspeaker counts
    pub fn with_channels(mut self, num_mics: usize, num_loudspeakers: usize) -> Self {
        self.num_mics = num_mics;
        self.num_loudspeakers = num_loudspeakers;
        self
    }

    /// Set subspace ranks
    pub fn with_ranks(mut self, rank_s: usize, rank_ses: usize) -> Self {
        self.rank_s = rank_s;
        self.rank_ses = rank_ses;
        self
    }

    /// Extended channel count (M+L)
    pub fn extended_channels(&self) -> usize {
        self.num_mics + self.num_loudspeakers
    }

    /// Number of frequency bins
    pub fn num_bins(&self) -> usize {
        self.dft_size / 2 + 1
    }

    /// Validate against the configured strategy
    pub fn validate(&self) -> JaecResult<()> {
        self.validate_for(self.strategy)
    }

    /// Validate against a specific strategy
    pub fn validate_for(&self, strategy: Strategy) -> JaecResult<()> {
        if self.sample_rate == 0 {
            return Err(JaecError::config("sample rate must be positive"));
        }
        if self.num_mics == 0 {
            return Err(JaecError::config("at least one microphone is required"));
        }
        if self.reference_channel >= self.num_mics {
            return Err(JaecError::config(format!(
                "reference channel {} out of range for {} microphones",
                self.reference_channel, self.num_mics
            )));
        }
        if self.dft_size == 0 || self.dft_size % 2 != 0 {
            return Err(JaecError::config(format!(
                "DFT size must be even and positive, got {}",
                self.dft_size
            )));
        }
        if self.hop_size == 0 || self.hop_size > self.dft_size {
            return Err(JaecError::config(format!(
                "hop size {} invalid for DFT size {}",
                self.hop_size, self.dft_size
            )));
        }
        if !self.vad_sensitivity.is_finite() || self.vad_sensitivity < 0.0 {
            return Err(JaecError::config("VAD sensitivity must be finite and non-negative"));
        }
        if !self.diagonal_loading.is_finite() || self.diagonal_loading < 0.0 {
            return Err(JaecError::config("diagonal loading must be finite and non-negative"));
        }
        if strategy.uses_aec() && self.num_loudspeakers == 0 {
            return Err(JaecError::config(format!(
                "{} requires at least one loudspeaker channel",
                strategy
            )));
        }

        let rank_s_channels = match strategy {
            Strategy::MwfExt => self.extended_channels(),
            _ => self.num_mics,
        };
        check_rank("rank_s", self.rank_s, rank_s_channels)?;
        if strategy == Strategy::NrExtAecPf {
            check_rank("rank_ses", self.rank_ses, self.extended_channels())?;
        }
        Ok(())
    }
}

/// Check 1 <= rank <= channels
pub fn check_rank(name: &str, rank: usize, channels: usize) -> JaecResult<()> {
    if rank == 0 || rank > channels {
        return Err(JaecError::config(format!(
            "{} = {} outside [1, {}]",
            name, rank, channels
        )));
    }
    Ok(())
}
