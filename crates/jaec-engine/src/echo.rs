//! Correlation-regression echo path estimation and cancellation
//!
//! Operates on extended signals whose first `M` channels are microphones and
//! whose remaining `L` channels are loudspeaker references. Over pure-echo
//! frames the least-squares predictor of the microphones from the
//! loudspeakers is `F = pinv(R_ll) R_lm`; the echo transfer is `H = F^H`
//! and the echo estimate `H x_l` is subtracted from the microphones.

use jaec_core::{FreqSignal, JaecError, JaecResult, Mask, Views};
use ndarray::Array3;
use rayon::prelude::*;

use crate::correlation;
use crate::linalg::{self, CMatrix};

/// Per-bin echo transfer `H[n]` (`M x L`), microphone echo `= H x_l`
#[derive(Debug, Clone)]
pub struct EchoPath {
    transfer: Vec<CMatrix>,
    num_mics: usize,
}

impl EchoPath {
    /// Microphone count
    pub fn num_mics(&self) -> usize {
        self.num_mics
    }

    /// Loudspeaker count
    pub fn num_loudspeakers(&self) -> usize {
        self.transfer.first().map_or(0, |h| h.ncols())
    }

    /// Number of bins
    pub fn bins(&self) -> usize {
        self.transfer.len()
    }

    /// Transfer matrix of one bin
    pub fn transfer(&self, bin: usize) -> &CMatrix {
        &self.transfer[bin]
    }

    /// Subtract the predicted echo from the microphone channels
    ///
    /// Returns the `M`-channel residual.
    pub fn cancel(&self, extended: &FreqSignal) -> JaecResult<FreqSignal> {
        let m = self.num_mics;
        let l = self.num_loudspeakers();
        if extended.channels() != m + l || extended.bins() != self.bins() {
            return Err(JaecError::config(format!(
                "echo path is {}+{} channels x {} bins, signal is {} channels x {} bins",
                m,
                l,
                self.bins(),
                extended.channels(),
                extended.bins()
            )));
        }

        let per_bin: Vec<CMatrix> = self
            .transfer
            .par_iter()
            .enumerate()
            .map(|(bin, h)| {
                let x = linalg::bin_matrix(extended, bin);
                let mics = x.rows(0, m);
                let loudspeakers = x.rows(m, l);
                mics - h * loudspeakers
            })
            .collect();

        let out = Array3::from_shape_fn((m, extended.frames(), extended.bins()), |(c, k, n)| {
            per_bin[n][(c, k)]
        });
        Ok(FreqSignal::from_array(out))
    }

    /// Cancel echo in every view using each view's own loudspeaker share
    pub fn cancel_views(&self, extended: &Views<FreqSignal>) -> JaecResult<Views<FreqSignal>> {
        extended.try_map(|v| self.cancel(v))
    }
}

/// Estimate the echo transfer from pure-echo frames of an extended signal
pub fn estimate_echo(
    extended: &FreqSignal,
    echo_only: &Mask,
    num_mics: usize,
) -> JaecResult<EchoPath> {
    let channels = extended.channels();
    if num_mics == 0 || num_mics >= channels {
        return Err(JaecError::config(format!(
            "extended signal with {} channels has no loudspeaker block after {} microphones",
            channels, num_mics
        )));
    }

    let correlations = correlation::estimate_single(extended, echo_only, "echo-only")?;

    let transfer = correlations
        .par_iter()
        .enumerate()
        .map(|(bin, r)| {
            let r_ll = linalg::block(r, num_mics..channels, num_mics..channels);
            let r_lm = linalg::block(r, num_mics..channels, 0..num_mics);
            let f = linalg::pinv(&r_ll, bin, "loudspeaker correlation")? * r_lm;
            Ok(f.adjoint())
        })
        .collect::<JaecResult<Vec<_>>>()?;

    Ok(EchoPath { transfer, num_mics })
}
