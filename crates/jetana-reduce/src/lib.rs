//! # jetana-reduce
//!
//! Everything that turns stored histograms into analysis quantities:
//!
//! - [`project`]: reduce a sparse N-dimensional handle onto 1 to 3 axes under
//!   physical-range cuts, restoring the handle's axis ranges afterwards.
//! - [`slices`]: per-slice fits of a 2D response histogram, yielding the
//!   JES (mean) and JER (width) profiles.
//! - [`derived`]: forward/backward ratios and ranged 2D → 1D projections.
//! - [`optimizer`]: the L-BFGS wrapper the slice fits minimize with.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Ratios and ranged projections of already-reduced histograms.
pub mod derived;
/// Generic numerical optimizer (L-BFGS backend).
pub mod optimizer;
/// Sparse projection with scoped axis-range restoration.
pub mod project;
/// Slice-wise fits of 2D histograms.
pub mod slices;

pub use derived::{Bound, project_range, ratio};
pub use optimizer::{LbfgsbOptimizer, ObjectiveFunction, OptimizationResult, OptimizerConfig};
pub use project::{AxisRangeGuard, ProjectionSpec, project};
pub use slices::{
    FitParameter, GaussianFit, MomentsFit, SliceFit, SliceFitConfig, SliceFitResult, SliceProfiles,
    extract_profile, fit_slices,
};
