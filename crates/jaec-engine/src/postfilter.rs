//! Residual post-filter
//!
//! `W_pf = pinv(R1) R_res pinv(W11)`, where `W11` is the microphone block of
//! the extended noise-reduction filter applied upstream. `R1` and `R_res` are
//! the present-regime and residual correlations of that same factorization,
//! restricted to the microphones and seen at the filter's microphone outputs
//! (`W11^H R W11`). Both inverses are pseudo-inverses.
//!
//! With an invertible `W11` the cascade `W11 W_pf` equals
//! `R11^{-1} R_res,11`, the microphone Wiener filter of the upstream pair, so
//! the coloration of the extended stage is undone.

use jaec_core::{JaecError, JaecResult};
use rayon::prelude::*;

use crate::apply::SpatialFilter;
use crate::linalg::{self, CMatrix};

/// Map upstream `C x C` correlations to the microphone outputs of `W11`
///
/// Each bin yields `W11^H R[0..M, 0..M] W11`, with `M` the row count of
/// `W11`.
pub fn output_statistics(correlation: &[CMatrix], w11: &[CMatrix]) -> JaecResult<Vec<CMatrix>> {
    if correlation.len() != w11.len() {
        return Err(JaecError::config(format!(
            "{} correlation bins for {} filter bins",
            correlation.len(),
            w11.len()
        )));
    }

    correlation
        .par_iter()
        .zip(w11.par_iter())
        .enumerate()
        .map(|(bin, (r, w))| {
            let m = w.nrows();
            if r.nrows() < m || r.ncols() < m || !r.is_square() {
                return Err(JaecError::config(format!(
                    "bin {}: correlation {:?} has no {}x{} microphone block",
                    bin,
                    r.shape(),
                    m,
                    m
                )));
            }
            let r11 = linalg::block(r, 0..m, 0..m);
            Ok(linalg::hermitian_part(&(w.adjoint() * r11 * w)))
        })
        .collect()
}

/// Build the post-filter from per-bin statistics
pub fn postfilter(
    present: &[CMatrix],
    residual: &[CMatrix],
    w11: &[CMatrix],
) -> JaecResult<SpatialFilter> {
    if present.len() != residual.len() || present.len() != w11.len() {
        return Err(JaecError::config(format!(
            "post-filter inputs cover {}, {} and {} bins",
            present.len(),
            residual.len(),
            w11.len()
        )));
    }

    let bins = present
        .par_iter()
        .zip(residual.par_iter())
        .zip(w11.par_iter())
        .enumerate()
        .map(|(bin, ((r1, r_res), w))| {
            let n = r1.nrows();
            if r_res.shape() != (n, n) || w.shape() != (n, n) {
                return Err(JaecError::config(format!(
                    "bin {}: post-filter shapes {:?}, {:?}, {:?} differ",
                    bin,
                    r1.shape(),
                    r_res.shape(),
                    w.shape()
                )));
            }
            let r1_inv = linalg::pinv(r1, bin, "post-filter speech correlation")?;
            let w_inv = linalg::pinv(w, bin, "extended filter microphone block")?;
            Ok(r1_inv * r_res * w_inv)
        })
        .collect::<JaecResult<Vec<_>>>()?;

    SpatialFilter::new(bins)
}
