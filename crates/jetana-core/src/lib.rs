//! # jetana-core
//!
//! Backend-agnostic data model shared by every jetana crate:
//!
//! - [`Histogram`]: a detached, dense view of 1D/2D/3D/N-D binned data with
//!   per-bin symmetric errors and per-axis bin edges.
//! - [`SparseHistogram`]: the projectable N-dimensional handle (filled bins
//!   only, with per-axis active ranges).
//! - [`Error`] / [`Warning`]: the error taxonomy used across the workspace.
//! - [`paths`]: deterministic mapping from analysis parameters to input files.
//! - [`config`]: YAML/JSON settings decoding.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod histogram;
pub mod paths;
pub mod sparse;

pub use error::{Error, Result, Warning};
pub use histogram::{Axis, BackendTag, Histogram, HistogramKind, MAX_DENSE_CELLS};
pub use sparse::{AxisRange, RangedAxis, SparseBin, SparseHistogram};

/// Crate version, shared by every workspace member.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
