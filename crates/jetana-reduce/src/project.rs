//! Projection of sparse N-dimensional histograms onto 1 to 3 axes.
//!
//! Cuts narrow the handle's axis ranges for the duration of one projection.
//! [`AxisRangeGuard`] snapshots every range first and puts it back when it
//! goes out of scope, so the handle is unchanged on every exit path.

use std::ops::{Deref, DerefMut};

use jetana_core::paths::sanitize_name;
use jetana_core::sparse::RangeState;
use jetana_core::{AxisRange, Error, Histogram, Result, SparseHistogram};

/// Largest number of target axes a projection supports.
pub const MAX_TARGETS: usize = 3;

/// Target axes plus physical-range cuts on the remaining axes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionSpec {
    /// Axes to keep, outermost first.
    pub targets: Vec<usize>,
    /// Cuts applied to non-target axes.
    pub ranges: Vec<AxisRange>,
}

impl ProjectionSpec {
    /// Projection onto `targets` (outermost first) without cuts.
    pub fn new(targets: impl Into<Vec<usize>>) -> Self {
        Self { targets: targets.into(), ranges: Vec::new() }
    }

    /// Add a cut `low..high` on `axis`, builder style.
    pub fn with_range(mut self, axis: usize, low: f64, high: f64) -> Self {
        self.ranges.push(AxisRange::new(axis, low, high));
        self
    }
}

/// Restores a handle's axis ranges when dropped.
pub struct AxisRangeGuard<'a> {
    handle: &'a mut SparseHistogram,
    saved: Vec<RangeState>,
}

impl<'a> AxisRangeGuard<'a> {
    /// Snapshot every axis range of `handle`.
    pub fn new(handle: &'a mut SparseHistogram) -> Self {
        let saved = handle.range_states();
        Self { handle, saved }
    }
}

impl Deref for AxisRangeGuard<'_> {
    type Target = SparseHistogram;

    fn deref(&self) -> &SparseHistogram {
        self.handle
    }
}

impl DerefMut for AxisRangeGuard<'_> {
    fn deref_mut(&mut self) -> &mut SparseHistogram {
        self.handle
    }
}

impl Drop for AxisRangeGuard<'_> {
    fn drop(&mut self) {
        self.handle.restore_ranges(&self.saved);
    }
}

/// Upper bound nudged below `high` so a bin starting exactly there is excluded.
fn shrink_high(high: f64) -> f64 {
    if high == 0.0 { -f64::MIN_POSITIVE } else { high - 1e-6 * high.abs() }
}

/// Project `handle` onto `spec.targets` under `spec.ranges`, naming the result
/// after `label`.
///
/// Targets are listed outermost first: the result's storage order follows
/// the request, so `targets = [2, 0]` yields `shape() == [n2, n0]` with source
/// axis 0 as the result's x axis. Ranges on target axes are ignored.
pub fn project(handle: &mut SparseHistogram, spec: &ProjectionSpec, label: &str) -> Result<Histogram> {
    let ndim = handle.ndim();
    let targets = &spec.targets;
    if targets.len() > MAX_TARGETS {
        return Err(Error::UnsupportedProjection(format!(
            "projection of '{}' onto {} axes; at most {} are supported",
            handle.name,
            targets.len(),
            MAX_TARGETS
        )));
    }
    if targets.is_empty() {
        return Err(Error::InvalidArgument(format!("projection of '{}' without target axes", handle.name)));
    }
    if let Some(&bad) = targets.iter().chain(spec.ranges.iter().map(|r| &r.axis)).find(|&&a| a >= ndim) {
        return Err(Error::InvalidArgument(format!(
            "axis {} out of range for '{}' with {} dimensions",
            bad, handle.name, ndim
        )));
    }

    let mut guard = AxisRangeGuard::new(handle);
    for cut in &spec.ranges {
        if targets.contains(&cut.axis) {
            log::warn!("ignoring cut on target axis {} of '{}'", cut.axis, guard.name);
            continue;
        }
        let Some(axis) = guard.axis_mut(cut.axis) else {
            continue;
        };
        let first = axis.axis.find_bin(cut.low);
        let last = axis.axis.find_bin(shrink_high(cut.high));
        log::debug!(
            "axis {}: [{}, {}) → bins {}..={}",
            cut.axis,
            cut.low,
            cut.high,
            first,
            last
        );
        axis.set_range(first as i64, last as i64);
    }

    // Result axis i is target len-1-i: the last requested axis is innermost.
    let order: Vec<usize> = targets.iter().rev().copied().collect();
    let reduced = guard.reduce(&order)?;
    if reduced.ndim() != targets.len() {
        return Err(Error::DegenerateProjection(format!(
            "projection of '{}' onto {:?} produced {} dimensions",
            guard.name,
            targets,
            reduced.ndim()
        )));
    }
    let mut out = reduced.to_dense()?;
    out.name = sanitize_name(label);
    Ok(out)
}
