//! GEVD-based rank-constrained Wiener filter design
//!
//! The pair `(Ra, Rb)` is jointly diagonalized as `Ra = Q Λ Q^H`,
//! `Rb = Q Q^H` with Λ sorted in descending order. Writing `X = Q^{-H}`,
//! the filter is
//!
//! ```text
//! W = X Σ Q^H,   Σ_ii = max(0, (λ_i - 1) / λ_i)  for i < rank
//!                Σ_ii = 0                          otherwise
//! ```
//!
//! which equals `Ra^{-1}(Ra - Rb)` at full rank. The reduction uses the
//! Cholesky factor `Rb = L L^H`: the Hermitian matrix `L^{-1} Ra L^{-H}` is
//! eigendecomposed as `U Λ U^H`, then `Q = L U` and `X = L^{-H} U`.

use jaec_core::{JaecError, JaecResult, check_rank};
use nalgebra::{DVector, SymmetricEigen};
use num_complex::Complex64;
use rayon::prelude::*;

use crate::apply::SpatialFilter;
use crate::correlation::CorrelationPair;
use crate::linalg::{self, CMatrix};

/// Minimum ratio between the smallest and largest squared Cholesky pivot
const CONDITION_FLOOR: f64 = 1e-13;

/// Relative tolerance for negative generalized eigenvalues
const EIGENVALUE_TOLERANCE: f64 = 1e-8;

/// Joint diagonalization of one bin
#[derive(Debug, Clone)]
pub struct GevdFactors {
    /// Generalized eigenvectors (`Ra = Q Λ Q^H`, `Rb = Q Q^H`)
    pub q: CMatrix,
    /// `Q^{-H}`
    pub x: CMatrix,
    /// Generalized eigenvalues, descending, clamped to be non-negative
    pub eigenvalues: DVector<f64>,
}

impl GevdFactors {
    /// Wiener gains with hard truncation beyond `rank`
    pub fn gains(&self, rank: usize) -> DVector<f64> {
        DVector::from_iterator(
            self.eigenvalues.len(),
            self.eigenvalues.iter().enumerate().map(|(i, &l)| {
                if i < rank && l > 1.0 {
                    (l - 1.0) / l
                } else {
                    0.0
                }
            }),
        )
    }

    /// `W = X Σ Q^H`
    pub fn filter(&self, rank: usize) -> CMatrix {
        let gains = self.gains(rank);
        let mut xs = self.x.clone();
        for (j, mut col) in xs.column_iter_mut().enumerate() {
            col *= Complex64::new(gains[j], 0.0);
        }
        xs * self.q.adjoint()
    }

    /// `Q diag(max(0, λ - 1)) Q^H` over the retained subspace
    pub fn residual(&self, rank: usize) -> CMatrix {
        let mut qd = self.q.clone();
        for (j, mut col) in qd.column_iter_mut().enumerate() {
            let excess = if j < rank {
                (self.eigenvalues[j] - 1.0).max(0.0)
            } else {
                0.0
            };
            col *= Complex64::new(excess, 0.0);
        }
        qd * self.q.adjoint()
    }
}

/// Filter and residual correlation of one design
#[derive(Debug, Clone)]
pub struct GevdDesign {
    /// Per-bin filter
    pub filter: SpatialFilter,
    /// Per-bin rank-truncated residual correlation `Q diag(max(0, λ-1)) Q^H`
    pub residual: Vec<CMatrix>,
}

/// Jointly diagonalize `(Ra, Rb)` for one bin
pub fn decompose(ra: &CMatrix, rb: &CMatrix, bin: usize) -> JaecResult<GevdFactors> {
    let n = ra.nrows();
    if ra.shape() != (n, n) || rb.shape() != (n, n) {
        return Err(JaecError::config(format!(
            "bin {}: correlation shapes {:?} and {:?} are not matching squares",
            bin,
            ra.shape(),
            rb.shape()
        )));
    }

    let l = cholesky_factor(rb, bin)?;

    // C = L^{-1} Ra L^{-H}
    let left = l
        .solve_lower_triangular(ra)
        .ok_or_else(|| singular(bin, "forward substitution"))?;
    let reduced = l
        .solve_lower_triangular(&left.adjoint())
        .ok_or_else(|| singular(bin, "forward substitution"))?
        .adjoint();
    let reduced = linalg::hermitian_part(&reduced);

    let eigen = SymmetricEigen::new(reduced);

    let max_abs = eigen.eigenvalues.iter().fold(0.0f64, |m, l| m.max(l.abs()));
    if let Some(&bad) = eigen.eigenvalues.iter().find(|l| !l.is_finite()) {
        return Err(JaecError::NumericalInstability { bin, value: bad });
    }
    if let Some(&bad) = eigen
        .eigenvalues
        .iter()
        .find(|&&l| l < -EIGENVALUE_TOLERANCE * max_abs)
    {
        return Err(JaecError::NumericalInstability { bin, value: bad });
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| eigen.eigenvalues[j].total_cmp(&eigen.eigenvalues[i]));

    let u = eigen.eigenvectors.select_columns(order.iter());
    let eigenvalues =
        DVector::from_iterator(n, order.iter().map(|&i| eigen.eigenvalues[i].max(0.0)));

    let q = &l * &u;
    let x = l
        .adjoint()
        .solve_upper_triangular(&u)
        .ok_or_else(|| singular(bin, "back substitution"))?;

    Ok(GevdFactors { q, x, eigenvalues })
}

/// Design per-bin filters and residual correlations from a correlation pair
pub fn synthesize(pair: &CorrelationPair, rank: usize) -> JaecResult<GevdDesign> {
    if pair.a.len() != pair.b.len() {
        return Err(JaecError::config(format!(
            "correlation pair has {} present and {} absent bins",
            pair.a.len(),
            pair.b.len()
        )));
    }
    check_rank("rank", rank, pair.channels())?;

    let designs: Vec<(CMatrix, CMatrix)> = pair
        .a
        .par_iter()
        .zip(pair.b.par_iter())
        .enumerate()
        .map(|(bin, (ra, rb))| {
            let factors = decompose(ra, rb, bin)?;
            Ok((factors.filter(rank), factors.residual(rank)))
        })
        .collect::<JaecResult<_>>()?;

    let (filters, residual) = designs.into_iter().unzip();
    Ok(GevdDesign {
        filter: SpatialFilter::new(filters)?,
        residual,
    })
}

fn cholesky_factor(rb: &CMatrix, bin: usize) -> JaecResult<CMatrix> {
    let l = rb
        .clone()
        .cholesky()
        .ok_or_else(|| singular(bin, "absent-regime correlation is not positive definite"))?
        .l();

    // Pivots must be real, positive and within the conditioning floor
    let pivots: Vec<f64> = l.diagonal().iter().map(|d| d.re * d.re).collect();
    let finite = l.iter().all(|v| v.re.is_finite() && v.im.is_finite());
    let max = pivots.iter().copied().fold(0.0, f64::max);
    let min = pivots.iter().copied().fold(f64::INFINITY, f64::min);
    if !finite || max <= 0.0 || min / max < CONDITION_FLOOR {
        return Err(singular(
            bin,
            "absent-regime correlation is ill-conditioned",
        ));
    }
    Ok(l)
}

fn singular(bin: usize, context: &str) -> JaecError {
    JaecError::Singularity {
        bin,
        context: context.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    fn random_psd(n: usize, rng: &mut ChaCha8Rng) -> CMatrix {
        let a = CMatrix::from_fn(n, 2 * n, |_, _| {
            Complex64::new(rng.random::<f64>() - 0.5, rng.random::<f64>() - 0.5)
        });
        linalg::hermitian_part(&(&a * a.adjoint()))
    }

    fn pair(n: usize, seed: u64) -> (CMatrix, CMatrix) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let rb = random_psd(n, &mut rng);
        let signal = random_psd(n, &mut rng);
        let ra = linalg::hermitian_part(&(&rb + &signal));
        (ra, rb)
    }

    #[test]
    fn test_factors_diagonalize_pair() {
        let (ra, rb) = pair(3, 1);
        let f = decompose(&ra, &rb, 0).unwrap();

        let lambda = CMatrix::from_diagonal(&f.eigenvalues.map(|l| Complex64::new(l, 0.0)));
        assert!(linalg::max_abs_diff(&(&f.q * lambda * f.q.adjoint()), &ra) < 1e-10);
        assert!(linalg::max_abs_diff(&(&f.q * f.q.adjoint()), &rb) < 1e-10);
        assert!(linalg::max_abs_diff(&(f.x.adjoint() * &f.q), &CMatrix::identity(3, 3)) < 1e-10);

        for w in f.eigenvalues.as_slice().windows(2) {
            assert!(w[0] >= w[1]);
        }
    }

    #[test]
    fn test_full_rank_filter_is_wiener() {
        let (ra, rb) = pair(3, 2);
        let f = decompose(&ra, &rb, 0).unwrap();
        // Ra = Rb + PSD, so every generalized eigenvalue exceeds one
        assert!(f.eigenvalues.iter().all(|&l| l > 1.0));

        let w = f.filter(3);
        let expected = ra.clone().try_inverse().unwrap() * (&ra - &rb);
        assert!(linalg::max_abs_diff(&w, &expected) < 1e-9);
        assert!(f.gains(3).iter().all(|&g| g > 0.0));
    }

    #[test]
    fn test_truncation_gives_exact_zero_gain() {
        let (ra, rb) = pair(4, 3);
        let f = decompose(&ra, &rb, 0).unwrap();
        let gains = f.gains(2);
        assert!(gains[0] > 0.0 && gains[1] > 0.0);
        assert_eq!(gains[2], 0.0);
        assert_eq!(gains[3], 0.0);

        // Inputs along a discarded generalized eigenvector produce no output
        let w = f.filter(2);
        let leak = w.adjoint() * f.q.column(3);
        assert!(leak.norm() < 1e-10 * f.q.column(3).norm());
    }

    #[test]
    fn test_residual_relation() {
        let (ra, rb) = pair(3, 4);
        let f = decompose(&ra, &rb, 0).unwrap();
        for rank in 1..=3 {
            let lhs = ra.clone().try_inverse().unwrap() * f.residual(rank);
            assert!(linalg::max_abs_diff(&lhs, &f.filter(rank)) < 1e-9);
        }
    }

    #[test]
    fn test_singular_absent_regime() {
        let (ra, _) = pair(2, 5);
        let one = Complex64::new(1.0, 0.0);
        let rb = CMatrix::from_element(2, 2, one);
        assert!(matches!(
            decompose(&ra, &rb, 7),
            Err(JaecError::Singularity { bin: 7, .. })
        ));
    }

    fn diag(values: &[f64]) -> CMatrix {
        CMatrix::from_diagonal(&DVector::from_iterator(
            values.len(),
            values.iter().map(|&v| Complex64::new(v, 0.0)),
        ))
    }

    #[test]
    fn test_negative_eigenvalue_is_reported() {
        let result = decompose(&diag(&[1.0, -1.0]), &CMatrix::identity(2, 2), 9);
        match result {
            Err(JaecError::NumericalInstability { bin, value }) => {
                assert_eq!(bin, 9);
                assert_abs_diff_eq!(value, -1.0, epsilon = 1e-12);
            }
            other => panic!("expected numerical instability, got {:?}", other),
        }
    }

    #[test]
    fn test_tiny_negative_eigenvalue_is_clamped() {
        let f = decompose(&diag(&[1.0, -1e-12]), &CMatrix::identity(2, 2), 0).unwrap();
        assert_abs_diff_eq!(f.eigenvalues[0], 1.0, epsilon = 1e-12);
        assert_eq!(f.eigenvalues[1], 0.0);
    }

    #[test]
    fn test_synthesize_rank_bounds() {
        let (ra, rb) = pair(2, 6);
        let pair = CorrelationPair {
            a: vec![ra.clone(), ra],
            b: vec![rb.clone(), rb],
        };
        assert!(matches!(synthesize(&pair, 0), Err(JaecError::Configuration(_))));
        assert!(matches!(synthesize(&pair, 3), Err(JaecError::Configuration(_))));

        let design = synthesize(&pair, 2).unwrap();
        assert_eq!(design.filter.bins(), 2);
        assert_eq!(design.residual.len(), 2);
        assert_abs_diff_eq!(
            design.filter.bin(0)[(0, 0)].re,
            design.filter.bin(1)[(0, 0)].re,
            epsilon = 1e-15
        );
    }

    #[test]
    fn test_equal_regimes_give_zero_filter() {
        let (_, rb) = pair(3, 8);
        let f = decompose(&rb, &rb, 0).unwrap();
        for &l in f.eigenvalues.iter() {
            assert_abs_diff_eq!(l, 1.0, epsilon = 1e-9);
        }
        assert!(f.filter(3).norm() < 1e-6);
    }
}
