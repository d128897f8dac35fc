//! Dense complex matrix helpers shared by the per-bin stages

use jaec_core::{FreqSignal, JaecError, JaecResult};
use nalgebra::DMatrix;
use num_complex::Complex64;

/// Complex dense matrix
pub type CMatrix = DMatrix<Complex64>;

/// Relative singular-value cutoff for pseudo-inverses
pub const PINV_TOLERANCE: f64 = 1e-10;

/// Gather the channel vectors of the given frames in one bin as columns
pub fn gather(signal: &FreqSignal, bin: usize, frames: &[usize]) -> CMatrix {
    let data = signal.data();
    CMatrix::from_fn(signal.channels(), frames.len(), |c, j| {
        data[[c, frames[j], bin]]
    })
}

/// All frames of one bin as a `channels x frames` matrix
pub fn bin_matrix(signal: &FreqSignal, bin: usize) -> CMatrix {
    let data = signal.data();
    CMatrix::from_fn(signal.channels(), signal.frames(), |c, k| data[[c, k, bin]])
}

/// `(A + A^H) / 2`
pub fn hermitian_part(a: &CMatrix) -> CMatrix {
    (a + a.adjoint()).map(|v| v * 0.5)
}

/// Add `delta * tr(R)/C` to the diagonal
pub fn diagonal_load(r: &CMatrix, delta: f64) -> CMatrix {
    let n = r.nrows();
    if n == 0 || delta == 0.0 {
        return r.clone();
    }
    let level = delta * r.trace().re / n as f64;
    let mut loaded = r.clone();
    for i in 0..n {
        loaded[(i, i)] += Complex64::new(level, 0.0);
    }
    loaded
}

/// Owned copy of a sub-block
pub fn block(m: &CMatrix, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>) -> CMatrix {
    m.view((rows.start, cols.start), (rows.len(), cols.len()))
        .into_owned()
}

/// Moore-Penrose pseudo-inverse with relative truncation
///
/// Singular values below `PINV_TOLERANCE * sigma_max` are discarded and the
/// truncation is logged as a warning.
pub fn pinv(m: &CMatrix, bin: usize, context: &str) -> JaecResult<CMatrix> {
    if m.is_empty() {
        return Ok(CMatrix::zeros(m.ncols(), m.nrows()));
    }

    let svd = m.clone().svd(true, true);
    let sigma_max = svd.singular_values.max();
    if !sigma_max.is_finite() {
        return Err(JaecError::NumericalInstability {
            bin,
            value: sigma_max,
        });
    }

    let tolerance = PINV_TOLERANCE * sigma_max;
    let discarded = svd
        .singular_values
        .iter()
        .filter(|&&s| s <= tolerance)
        .count();
    if discarded > 0 {
        log::warn!(
            "bin {}: pseudo-inverse of {} discarded {} of {} singular values",
            bin,
            context,
            discarded,
            svd.singular_values.len()
        );
    }

    svd.pseudo_inverse(tolerance)
        .map_err(|_| JaecError::NumericalInstability {
            bin,
            value: tolerance,
        })
}

/// Largest absolute entry difference between two matrices
pub fn max_abs_diff(a: &CMatrix, b: &CMatrix) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).norm())
        .fold(0.0, f64::max)
}
