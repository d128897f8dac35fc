//! Masked spatial correlation estimation
//!
//! For every bin the selected frames are first counted, then gathered by
//! index into a pre-sized `channels x count` buffer `X`, and the correlation
//! is `X X^H / count`. Bins are independent and estimated in parallel.

use jaec_core::{FreqSignal, JaecError, JaecResult, Mask};
use rayon::prelude::*;

use crate::linalg::{self, CMatrix};

/// Per-bin correlation matrices of the present (`a`) and absent (`b`) regimes
#[derive(Debug, Clone)]
pub struct CorrelationPair {
    /// Desired-signal-present correlation per bin
    pub a: Vec<CMatrix>,
    /// Desired-signal-absent correlation per bin
    pub b: Vec<CMatrix>,
}

impl CorrelationPair {
    /// Number of bins
    pub fn bins(&self) -> usize {
        self.a.len()
    }

    /// Channel count
    pub fn channels(&self) -> usize {
        self.a.first().map_or(0, |r| r.nrows())
    }

    /// Apply relative diagonal loading to the absent-regime matrices
    pub fn load_absent(mut self, delta: f64) -> Self {
        self.b = self.b.iter().map(|r| linalg::diagonal_load(r, delta)).collect();
        self
    }
}

/// Estimate correlations over two frame selections
///
/// `regime_a` and `regime_b` name the masks in `InsufficientData` errors.
pub fn estimate(
    signal: &FreqSignal,
    mask_a: &Mask,
    mask_b: &Mask,
    regime_a: &'static str,
    regime_b: &'static str,
) -> JaecResult<CorrelationPair> {
    let a = estimate_single(signal, mask_a, regime_a)?;
    let b = estimate_single(signal, mask_b, regime_b)?;
    Ok(CorrelationPair { a, b })
}

/// Estimate one regime's correlation matrix in every bin
pub fn estimate_single(
    signal: &FreqSignal,
    mask: &Mask,
    regime: &'static str,
) -> JaecResult<Vec<CMatrix>> {
    mask.check_matches(signal)?;

    (0..signal.bins())
        .into_par_iter()
        .map(|bin| {
            let count = mask.count_in_bin(bin);
            if count == 0 {
                return Err(JaecError::InsufficientData { bin, regime });
            }

            let mut frames = Vec::with_capacity(count);
            frames.extend((0..signal.frames()).filter(|&k| mask.get(k, bin)));

            let x = linalg::gather(signal, bin, &frames);
            let r = (&x * x.adjoint()).map(|v| v / count as f64);
            Ok(linalg::hermitian_part(&r))
        })
        .collect()
}
