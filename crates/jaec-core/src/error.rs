//! Error types for joint echo and noise reduction

use thiserror::Error;

/// Pipeline error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JaecError {
    /// Invalid configuration or mismatched input shapes
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A frame-selection mask selects no frames for a bin
    #[error("Insufficient data: {regime} mask selects zero frames in bin {bin}")]
    InsufficientData {
        /// Frequency bin
        bin: usize,
        /// Name of the empty regime
        regime: &'static str,
    },

    /// The time-domain speech VAD finds no frames to evaluate
    #[error("Insufficient data: no speech-active frames after warm-up")]
    NoSpeechFrames,

    /// Matrix not invertible within tolerance
    #[error("Singular matrix in bin {bin}: {context}")]
    Singularity {
        /// Frequency bin
        bin: usize,
        /// Matrix that failed to factor
        context: String,
    },

    /// Generalized eigenvalues negative or non-finite beyond tolerance
    #[error("Numerical instability in bin {bin}: generalized eigenvalue {value}")]
    NumericalInstability {
        /// Frequency bin
        bin: usize,
        /// Offending eigenvalue
        value: f64,
    },

    /// Filterbank transform failure
    #[error("FFT error: {0}")]
    Fft(String),
}

impl JaecError {
    /// Shorthand for a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

/// Result type for pipeline operations
pub type JaecResult<T> = Result<T, JaecError>;
