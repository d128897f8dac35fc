//! Per-bin spatial filters and their application
//!
//! A filter holds one `C_in x C_out` matrix `W` per bin and maps the channel
//! vector of every frame as `y = W^H x`.

use std::ops::Range;

use jaec_core::{FreqSignal, JaecError, JaecResult, Views};
use ndarray::Array3;
use num_complex::Complex64;
use rayon::prelude::*;

use crate::linalg::{self, CMatrix};

/// Per-bin filter matrices `[bin] -> C_in x C_out`
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialFilter {
    bins: Vec<CMatrix>,
}

impl SpatialFilter {
    /// Wrap per-bin matrices, which must share one shape
    pub fn new(bins: Vec<CMatrix>) -> JaecResult<Self> {
        if let Some(first) = bins.first() {
            let shape = first.shape();
            if let Some((bin, m)) = bins.iter().enumerate().find(|(_, m)| m.shape() != shape) {
                return Err(JaecError::config(format!(
                    "filter bin {} has shape {:?}, expected {:?}",
                    bin,
                    m.shape(),
                    shape
                )));
            }
        }
        Ok(Self { bins })
    }

    /// Number of bins
    pub fn bins(&self) -> usize {
        self.bins.len()
    }

    /// Input channel count
    pub fn inputs(&self) -> usize {
        self.bins.first().map_or(0, |w| w.nrows())
    }

    /// Output channel count
    pub fn outputs(&self) -> usize {
        self.bins.first().map_or(0, |w| w.ncols())
    }

    /// Filter matrix of one bin
    pub fn bin(&self, bin: usize) -> &CMatrix {
        &self.bins[bin]
    }

    /// Keep only the given output channels
    pub fn select_outputs(&self, range: Range<usize>) -> JaecResult<Self> {
        if range.end > self.outputs() || range.start > range.end {
            return Err(JaecError::config(format!(
                "output range {:?} out of bounds for {} outputs",
                range,
                self.outputs()
            )));
        }
        let inputs = self.inputs();
        Ok(Self {
            bins: self
                .bins
                .iter()
                .map(|w| linalg::block(w, 0..inputs, range.clone()))
                .collect(),
        })
    }

    /// Force a block of every bin's matrix to zero
    pub fn zero_block(mut self, rows: Range<usize>, cols: Range<usize>) -> JaecResult<Self> {
        self.check_block(&rows, &cols)?;
        for w in &mut self.bins {
            w.view_mut((rows.start, cols.start), (rows.len(), cols.len()))
                .fill(Complex64::new(0.0, 0.0));
        }
        Ok(self)
    }

    /// Copy of the given block of every bin
    pub fn block(&self, rows: Range<usize>, cols: Range<usize>) -> JaecResult<Vec<CMatrix>> {
        self.check_block(&rows, &cols)?;
        Ok(self
            .bins
            .iter()
            .map(|w| linalg::block(w, rows.clone(), cols.clone()))
            .collect())
    }

    fn check_block(&self, rows: &Range<usize>, cols: &Range<usize>) -> JaecResult<()> {
        if rows.start > rows.end
            || cols.start > cols.end
            || rows.end > self.inputs()
            || cols.end > self.outputs()
        {
            return Err(JaecError::config(format!(
                "block {:?} x {:?} out of bounds for {}x{} filter",
                rows,
                cols,
                self.inputs(),
                self.outputs()
            )));
        }
        Ok(())
    }

    /// Filter a signal: `y[:, k, n] = W[n]^H x[:, k, n]`
    pub fn apply(&self, signal: &FreqSignal) -> JaecResult<FreqSignal> {
        if signal.bins() != self.bins() {
            return Err(JaecError::config(format!(
                "filter has {} bins, signal has {}",
                self.bins(),
                signal.bins()
            )));
        }
        if signal.channels() != self.inputs() {
            return Err(JaecError::config(format!(
                "filter expects {} input channels, signal has {}",
                self.inputs(),
                signal.channels()
            )));
        }

        let per_bin: Vec<CMatrix> = self
            .bins
            .par_iter()
            .enumerate()
            .map(|(bin, w)| w.adjoint() * linalg::bin_matrix(signal, bin))
            .collect();

        let out = Array3::from_shape_fn(
            (self.outputs(), signal.frames(), signal.bins()),
            |(c, k, n)| per_bin[n][(c, k)],
        );
        Ok(FreqSignal::from_array(out))
    }

    /// Filter every view
    pub fn apply_views(&self, views: &Views<FreqSignal>) -> JaecResult<Views<FreqSignal>> {
        views.try_map(|v| self.apply(v))
    }
}
