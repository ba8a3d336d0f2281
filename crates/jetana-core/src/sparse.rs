//! Sparse N-dimensional histogram handle.
//!
//! Only filled bins are stored, addressed by ROOT bin coordinates: `0` is the
//! underflow bin, `1..=n_bins` the regular bins and `n_bins + 1` the overflow
//! bin of each axis. Every axis carries an active range (`first..=last`) that
//! restricts which bins take part in a reduction.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::histogram::{Axis, BackendTag, Histogram, HistogramKind, dense_cell_count};

/// A per-axis cut in physical coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisRange {
    /// Axis index in the sparse histogram.
    pub axis: usize,
    /// Lower physical bound.
    pub low: f64,
    /// Upper physical bound.
    pub high: f64,
}

impl AxisRange {
    /// Create a cut; a swapped `(low, high)` pair is normalized.
    pub fn new(axis: usize, low: f64, high: f64) -> Self {
        if low <= high { Self { axis, low, high } } else { Self { axis, low: high, high: low } }
    }
}

/// Saved active-range state of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeState {
    first: usize,
    last: usize,
    restricted: bool,
}

/// An axis with an active bin range.
#[derive(Debug, Clone, PartialEq)]
pub struct RangedAxis {
    /// Binning and title.
    pub axis: Axis,
    first: usize,
    last: usize,
    restricted: bool,
}

impl RangedAxis {
    /// Wrap an axis with its full range active.
    pub fn new(axis: Axis) -> Self {
        let last = axis.n_bins();
        Self { axis, first: 1, last, restricted: false }
    }

    /// Wrap an axis with a stored `(first, last)` range.
    ///
    /// `(0, 0)` is ROOT's encoding for "no range set".
    pub fn with_stored_range(axis: Axis, first: usize, last: usize) -> Self {
        let mut ranged = Self::new(axis);
        if first != 0 || last != 0 {
            ranged.set_range(first as i64, last as i64);
        }
        ranged
    }

    /// Number of regular bins.
    pub fn n_bins(&self) -> usize {
        self.axis.n_bins()
    }

    /// Restrict the axis to bins `first..=last` (ROOT numbering).
    ///
    /// Bounds are clamped to `0..=n_bins + 1`. An empty or fully out-of-range
    /// request resets the axis to its full range.
    pub fn set_range(&mut self, first: i64, last: i64) {
        let n_cells = self.n_bins() as i64 + 1;
        let inverted = last < first;
        let outside = (first < 0 && last < 0) || (first > n_cells && last > n_cells);
        if inverted || outside {
            self.reset_range();
            return;
        }
        self.first = first.clamp(0, n_cells) as usize;
        self.last = last.clamp(0, n_cells) as usize;
        self.restricted = true;
    }

    /// Make the whole axis active again.
    pub fn reset_range(&mut self) {
        self.first = 1;
        self.last = self.n_bins();
        self.restricted = false;
    }

    /// Active `(first, last)` bins.
    pub fn range(&self) -> (usize, usize) {
        (self.first, self.last)
    }

    /// Whether a range restriction is in effect.
    pub fn is_restricted(&self) -> bool {
        self.restricted
    }

    /// Whether ROOT bin `coord` passes the active range.
    ///
    /// Unrestricted axes accept every bin, including under/overflow.
    #[inline]
    pub fn accepts(&self, coord: u32) -> bool {
        !self.restricted || (self.first..=self.last).contains(&(coord as usize))
    }

    /// Snapshot of the current range.
    pub fn state(&self) -> RangeState {
        RangeState { first: self.first, last: self.last, restricted: self.restricted }
    }

    /// Restore a snapshot taken with [`state`](Self::state).
    pub fn restore(&mut self, state: RangeState) {
        self.first = state.first;
        self.last = state.last;
        self.restricted = state.restricted;
    }
}

/// One filled bin.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseBin {
    /// ROOT bin coordinates, one per axis.
    pub coords: Vec<u32>,
    /// Sum of weights.
    pub content: f64,
    /// Sum of squared weights (only meaningful when the histogram tracks it).
    pub sumw2: f64,
}

/// A sparse N-dimensional histogram.
#[derive(Debug, Clone)]
pub struct SparseHistogram {
    /// Object name.
    pub name: String,
    /// Object title.
    pub title: String,
    axes: Vec<RangedAxis>,
    bins: Vec<SparseBin>,
    index: HashMap<Vec<u32>, usize>,
    has_sumw2: bool,
    /// Producer of this handle.
    pub source: BackendTag,
}

impl SparseHistogram {
    /// Create an empty sparse histogram over `axes`.
    pub fn new(name: impl Into<String>, axes: Vec<Axis>) -> Result<Self> {
        Self::with_ranged_axes(name, axes.into_iter().map(RangedAxis::new).collect())
    }

    /// Create an empty sparse histogram from axes carrying active ranges.
    pub fn with_ranged_axes(name: impl Into<String>, axes: Vec<RangedAxis>) -> Result<Self> {
        let name = name.into();
        if axes.is_empty() {
            return Err(Error::InvalidArgument(format!("sparse histogram '{}' has no axes", name)));
        }
        Ok(Self {
            name,
            title: String::new(),
            axes,
            bins: Vec::new(),
            index: HashMap::new(),
            has_sumw2: false,
            source: BackendTag::Computed,
        })
    }

    /// Build a sparse handle from the non-empty bins of a dense histogram.
    pub fn from_histogram(h: &Histogram) -> Result<Self> {
        let mut sparse = Self::new(h.name.clone(), h.axes.clone())?;
        sparse.title = h.title.clone();
        sparse.source = h.source;
        sparse.has_sumw2 = true;
        let counts: Vec<usize> = h.axes.iter().map(Axis::n_bins).collect();
        for (flat, (&v, &e)) in h.values.iter().zip(&h.errors).enumerate() {
            if v == 0.0 && e == 0.0 {
                continue;
            }
            let mut rest = flat;
            let coords = counts
                .iter()
                .map(|&n| {
                    let c = (rest % n) as u32 + 1;
                    rest /= n;
                    c
                })
                .collect();
            sparse.add_bin(coords, v, e * e);
        }
        Ok(sparse)
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.axes.len()
    }

    /// Axis `i` with its active range.
    pub fn axis(&self, i: usize) -> Option<&RangedAxis> {
        self.axes.get(i)
    }

    /// Mutable access to axis `i` (range manipulation).
    pub fn axis_mut(&mut self, i: usize) -> Option<&mut RangedAxis> {
        self.axes.get_mut(i)
    }

    /// All axes.
    pub fn axes(&self) -> &[RangedAxis] {
        &self.axes
    }

    /// Filled bins.
    pub fn bins(&self) -> &[SparseBin] {
        &self.bins
    }

    /// Number of filled bins.
    pub fn n_filled(&self) -> usize {
        self.bins.len()
    }

    /// Whether per-bin squared weights are tracked.
    pub fn has_sumw2(&self) -> bool {
        self.has_sumw2
    }

    /// Enable per-bin squared weight tracking.
    ///
    /// Bins filled before this call get `sumw2 = content`, which is the
    /// unweighted-fill assumption.
    pub fn enable_sumw2(&mut self) {
        if !self.has_sumw2 {
            for bin in &mut self.bins {
                bin.sumw2 = bin.content;
            }
            self.has_sumw2 = true;
        }
    }

    /// Snapshot every axis range.
    pub fn range_states(&self) -> Vec<RangeState> {
        self.axes.iter().map(RangedAxis::state).collect()
    }

    /// Restore a snapshot from [`range_states`](Self::range_states).
    pub fn restore_ranges(&mut self, states: &[RangeState]) {
        for (axis, &state) in self.axes.iter_mut().zip(states) {
            axis.restore(state);
        }
    }

    /// Accumulate `content`/`sumw2` into the bin at `coords`.
    pub fn add_bin(&mut self, coords: Vec<u32>, content: f64, sumw2: f64) {
        debug_assert_eq!(coords.len(), self.ndim());
        match self.index.get(&coords) {
            Some(&i) => {
                self.bins[i].content += content;
                self.bins[i].sumw2 += sumw2;
            }
            None => {
                self.index.insert(coords.clone(), self.bins.len());
                self.bins.push(SparseBin { coords, content, sumw2 });
            }
        }
    }

    /// Fill one entry at physical point `x` with weight `w`.
    pub fn fill(&mut self, x: &[f64], w: f64) -> Result<()> {
        if x.len() != self.ndim() {
            return Err(Error::InvalidArgument(format!(
                "fill of '{}' expects {} coordinates, got {}",
                self.name,
                self.ndim(),
                x.len()
            )));
        }
        let coords = self.axes.iter().zip(x).map(|(a, &v)| a.axis.find_bin(v) as u32).collect();
        let sumw2 = if self.has_sumw2 { w * w } else { w };
        self.add_bin(coords, w, sumw2);
        Ok(())
    }

    /// Error of a stored bin: `sqrt(sumw2)` when tracked, else `sqrt(|content|)`.
    #[inline]
    pub fn bin_error(&self, bin: &SparseBin) -> f64 {
        if self.has_sumw2 { bin.sumw2.max(0.0).sqrt() } else { bin.content.abs().sqrt() }
    }

    /// Sum the bins passing every active range onto `axes`.
    ///
    /// The result's axis `i` is this histogram's axis `axes[i]` (full range).
    /// Repeated axis indices are collapsed, so the result can have fewer
    /// dimensions than requested.
    pub fn reduce(&self, axes: &[usize]) -> Result<SparseHistogram> {
        if let Some(&bad) = axes.iter().find(|&&a| a >= self.ndim()) {
            return Err(Error::InvalidArgument(format!(
                "axis {} out of range for '{}' with {} dimensions",
                bad,
                self.name,
                self.ndim()
            )));
        }
        let mut kept: Vec<usize> = Vec::with_capacity(axes.len());
        for &a in axes {
            if !kept.contains(&a) {
                kept.push(a);
            }
        }

        let new_axes = kept.iter().map(|&a| self.axes[a].axis.clone()).collect();
        let mut out = SparseHistogram::new(self.name.clone(), new_axes)?;
        out.title = self.title.clone();
        out.has_sumw2 = self.has_sumw2;
        out.source = BackendTag::Computed;

        for bin in &self.bins {
            let inside = self.axes.iter().zip(&bin.coords).all(|(a, &c)| a.accepts(c));
            if !inside {
                continue;
            }
            let coords = kept.iter().map(|&a| bin.coords[a]).collect();
            out.add_bin(coords, bin.content, bin.sumw2);
        }
        Ok(out)
    }

    /// Materialize every regular bin into a dense array tagged `SparseNd`.
    ///
    /// Coordinates outside the regular bins are dropped. Fails with
    /// `UnsupportedShape` when the regular bins exceed
    /// [`MAX_DENSE_CELLS`](crate::histogram::MAX_DENSE_CELLS); reduce first.
    pub fn materialize(&self) -> Result<Histogram> {
        let (values, errors) = self.dense_arrays()?;
        Ok(Histogram {
            name: self.name.clone(),
            title: self.title.clone(),
            kind: HistogramKind::SparseNd { ndim: self.ndim() },
            axes: self.plain_axes(),
            values,
            errors,
            source: self.source,
        })
    }

    /// Convert to a dense 1D/2D/3D histogram.
    pub fn to_dense(&self) -> Result<Histogram> {
        let kind = HistogramKind::dense(self.ndim()).ok_or_else(|| {
            Error::UnsupportedShape(format!(
                "'{}' has {} dimensions; dense histograms support 1 to 3",
                self.name,
                self.ndim()
            ))
        })?;
        let mut h = self.materialize()?;
        h.kind = kind;
        Ok(h)
    }

    fn plain_axes(&self) -> Vec<Axis> {
        self.axes.iter().map(|a| a.axis.clone()).collect()
    }

    fn dense_arrays(&self) -> Result<(Vec<f64>, Vec<f64>)> {
        let counts: Vec<usize> = self.axes.iter().map(RangedAxis::n_bins).collect();
        let n = dense_cell_count(&self.name, counts.iter().copied())?;
        let mut values = vec![0.0; n];
        let mut variances = vec![0.0; n];
        let mut dropped = 0usize;

        'bins: for bin in &self.bins {
            let mut flat = 0;
            let mut stride = 1;
            for (&c, &nb) in bin.coords.iter().zip(&counts) {
                if c == 0 || c as usize > nb {
                    dropped += 1;
                    continue 'bins;
                }
                flat += (c as usize - 1) * stride;
                stride *= nb;
            }
            values[flat] += bin.content;
            variances[flat] += if self.has_sumw2 { bin.sumw2 } else { bin.content };
        }
        if dropped > 0 {
            log::debug!("'{}': dropped {} bins outside the regular range", self.name, dropped);
        }
        let errors = variances.iter().map(|v| v.abs().sqrt()).collect();
        Ok((values, errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cube() -> SparseHistogram {
        let axes = vec![
            Axis::uniform(4, 0.0, 4.0, "a0").unwrap(),
            Axis::uniform(3, 0.0, 30.0, "a1").unwrap(),
            Axis::uniform(2, -1.0, 1.0, "a2").unwrap(),
        ];
        let mut h = SparseHistogram::new("cube", axes).unwrap();
        h.enable_sumw2();
        h.fill(&[0.5, 5.0, -0.5], 1.0).unwrap();
        h.fill(&[0.5, 15.0, 0.5], 2.0).unwrap();
        h.fill(&[3.5, 25.0, 0.5], 3.0).unwrap();
        h.fill(&[3.5, 25.0, 0.5], 1.0).unwrap();
        h.fill(&[9.0, 25.0, 0.5], 5.0).unwrap(); // overflow on axis 0
        h
    }

    #[test]
    fn axis_range_normalizes_swapped_bounds() {
        let r = AxisRange::new(2, 5.0, -1.0);
        assert_eq!((r.low, r.high), (-1.0, 5.0));
    }

    #[test]
    fn set_range_follows_root_clamping() {
        let mut ax = RangedAxis::new(Axis::uniform(5, 0.0, 5.0, "x").unwrap());
        ax.set_range(2, 9);
        assert_eq!(ax.range(), (2, 6));
        assert!(ax.is_restricted());
        ax.set_range(4, 2);
        assert_eq!(ax.range(), (1, 5));
        assert!(!ax.is_restricted());
    }

    #[test]
    fn stored_zero_range_means_full() {
        let ax = RangedAxis::with_stored_range(Axis::uniform(5, 0.0, 5.0, "x").unwrap(), 0, 0);
        assert!(!ax.is_restricted());
        let ax = RangedAxis::with_stored_range(Axis::uniform(5, 0.0, 5.0, "x").unwrap(), 2, 3);
        assert_eq!(ax.range(), (2, 3));
    }

    #[test]
    fn fill_merges_identical_coordinates() {
        let h = cube();
        assert_eq!(h.n_filled(), 4);
        let merged = h.bins().iter().find(|b| b.coords == vec![4, 3, 2]).unwrap();
        assert_relative_eq!(merged.content, 4.0);
        assert_relative_eq!(merged.sumw2, 10.0);
    }

    #[test]
    fn materialize_drops_flow_bins() {
        let h = cube().materialize().unwrap();
        assert_eq!(h.kind, HistogramKind::SparseNd { ndim: 3 });
        assert_eq!(h.shape(), vec![2, 3, 4]);
        assert_relative_eq!(h.integral(), 7.0);
        assert_relative_eq!(h.value(&[3, 2, 1]).unwrap(), 4.0);
        assert_relative_eq!(h.error(&[3, 2, 1]).unwrap(), 10f64.sqrt());
    }

    #[test]
    fn materialize_rejects_oversized_cell_counts() {
        let axes: Vec<Axis> = (0..10).map(|i| Axis::uniform(100, 0.0, 1.0, format!("a{}", i)).unwrap()).collect();
        let mut h = SparseHistogram::new("wide", axes).unwrap();
        h.fill(&[0.5; 10], 1.0).unwrap();
        assert!(matches!(h.materialize(), Err(Error::UnsupportedShape(_))));

        // 100^6 does not overflow but is still beyond the dense limit
        let axes: Vec<Axis> = (0..6).map(|i| Axis::uniform(100, 0.0, 1.0, format!("a{}", i)).unwrap()).collect();
        let mut h = SparseHistogram::new("wide6", axes).unwrap();
        h.fill(&[0.5; 6], 1.0).unwrap();
        assert!(matches!(h.materialize(), Err(Error::UnsupportedShape(_))));

        // reducing to the populated axes makes it materializable again
        let d = h.reduce(&[0, 1]).unwrap().to_dense().unwrap();
        assert_eq!(d.shape(), vec![100, 100]);
        assert_relative_eq!(d.integral(), 1.0);
    }

    #[test]
    fn reduce_respects_active_ranges() {
        let mut h = cube();
        h.axis_mut(1).unwrap().set_range(3, 3);
        let r = h.reduce(&[0]).unwrap();
        assert_eq!(r.ndim(), 1);
        let d = r.to_dense().unwrap();
        assert_eq!(d.values, vec![0.0, 0.0, 0.0, 4.0]);
    }

    #[test]
    fn reduce_collapses_repeated_axes() {
        let h = cube();
        let r = h.reduce(&[1, 1]).unwrap();
        assert_eq!(r.ndim(), 1);
        assert!(h.reduce(&[3]).is_err());
    }

    #[test]
    fn from_histogram_round_trips_contents() {
        let dense = cube().to_dense().unwrap();
        let back = SparseHistogram::from_histogram(&dense).unwrap().to_dense().unwrap();
        assert_eq!(back.values, dense.values);
        for (a, b) in back.errors.iter().zip(&dense.errors) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }
}
