//! JAEC Engine
//!
//! Per-bin spatial filter design and the processing strategies built on it:
//!
//! ## Filter design
//! - Masked correlation estimation (present/absent regimes)
//! - GEVD-based rank-constrained Wiener filters with hard subspace truncation
//! - Residual correlation byproduct for post-filtering
//!
//! ## Stages
//! - Filter application `y = W^H x` with output selection and block forcing
//! - Correlation-regression echo path estimation and cancellation
//! - Residual post-filter
//!
//! ## Strategies
//! - MWF, MWFext, AEC-NR, NR-AEC, NRext-AEC-PF
//!
//! All per-bin work runs in parallel with rayon; bins never share state.

#![warn(missing_docs)]

pub mod apply;
pub mod correlation;
pub mod echo;
pub mod gevd;
pub mod linalg;
pub mod postfilter;
pub mod strategy;

pub use apply::SpatialFilter;
pub use correlation::{CorrelationPair, estimate, estimate_single};
pub use echo::{EchoPath, estimate_echo};
pub use gevd::{GevdDesign, GevdFactors, decompose, synthesize};
pub use postfilter::{output_statistics, postfilter};
pub use strategy::{process, run};
