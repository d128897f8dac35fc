//! JAEC Core
//!
//! Shared building blocks for joint acoustic echo and noise reduction:
//!
//! ## Signal model
//! - Multichannel STFT-domain container `[channel, frame, bin]`
//! - Frame-selection masks with AND/NOT/OR combinators
//! - Component views (mixture, speech, noise, echo-speech, echo-noise)
//!
//! ## Filterbank
//! - Square-root Hann STFT with weighted overlap-add resynthesis
//!
//! ## Voice activity
//! - Per-bin energy threshold on the reference channel
//! - Time-domain frame VAD for metric evaluation
//!
//! ## Metrics
//! - Segmental SNR and log-spectral distortion over speech-active frames
//!
//! ## Test signals
//! - Seeded synthetic scenes with known speech, noise and echo components

#![warn(missing_docs)]

pub mod config;
pub mod generators;
pub mod metrics;
pub mod signal;
pub mod stft;
pub mod vad;

mod error;

pub use config::{MetricsConfig, ProcessingConfig, Strategy, check_rank};
pub use error::{JaecError, JaecResult};
pub use generators::{SceneGenerator, SceneSpec, TimeScene};
pub use metrics::{QualityReport, SpeechFrames};
pub use signal::{ActivityMasks, FreqSignal, Mask, Scene, Views};
pub use stft::Stft;
