//! Backend-agnostic histogram value.
//!
//! A [`Histogram`] is fully detached from the file or object it was read from.
//! Bin contents are stored flat in *storage order*: the last axis is the
//! outermost index and axis 0 the innermost, so a 2D histogram with `nx` bins
//! on x and `ny` bins on y has `shape() == [ny, nx]` and
//! `values[iy * nx + ix]` addresses bin `(ix, iy)`.
//!
//! Under/overflow bins are never part of the value arrays.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, Warning};

/// Largest number of cells a dense array may hold (2^28, 2 GiB of `f64`).
pub const MAX_DENSE_CELLS: usize = 1 << 28;

/// Number of cells spanned by `counts`, or `UnsupportedShape` when the product
/// overflows or exceeds [`MAX_DENSE_CELLS`].
pub fn dense_cell_count(name: &str, counts: impl IntoIterator<Item = usize>) -> Result<usize> {
    counts
        .into_iter()
        .try_fold(1usize, |acc, c| acc.checked_mul(c))
        .filter(|&n| n <= MAX_DENSE_CELLS)
        .ok_or_else(|| {
            Error::UnsupportedShape(format!(
                "'{}' is too large to hold densely (limit {} cells)",
                name, MAX_DENSE_CELLS
            ))
        })
}

/// Which reader (or transform) produced a histogram. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendTag {
    /// Zero-copy typed reader over a memory-mapped file.
    Mmap,
    /// Object-streamer reader (superset of shapes, including sparse N-D).
    Streamer,
    /// Produced in memory by a projection, slice fit or ratio.
    Computed,
}

impl BackendTag {
    /// Short lowercase name used in logs and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendTag::Mmap => "mmap",
            BackendTag::Streamer => "streamer",
            BackendTag::Computed => "computed",
        }
    }
}

/// Closed set of histogram shapes, resolved once when the object is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistogramKind {
    /// One-dimensional dense histogram.
    Dense1D,
    /// Two-dimensional dense histogram.
    Dense2D,
    /// Three-dimensional dense histogram.
    Dense3D,
    /// Sparse N-dimensional histogram, materialized densely.
    SparseNd {
        /// Number of dimensions.
        ndim: usize,
    },
}

impl HistogramKind {
    /// Dense kind for `ndim` axes, or `None` above three.
    pub fn dense(ndim: usize) -> Option<Self> {
        match ndim {
            1 => Some(HistogramKind::Dense1D),
            2 => Some(HistogramKind::Dense2D),
            3 => Some(HistogramKind::Dense3D),
            _ => None,
        }
    }

    /// Number of dimensions implied by the kind.
    pub fn ndim(&self) -> usize {
        match self {
            HistogramKind::Dense1D => 1,
            HistogramKind::Dense2D => 2,
            HistogramKind::Dense3D => 3,
            HistogramKind::SparseNd { ndim } => *ndim,
        }
    }

    /// Whether the kind is one of the dense variants.
    pub fn is_dense(&self) -> bool {
        !matches!(self, HistogramKind::SparseNd { .. })
    }
}

/// A binned axis: strictly increasing edges plus a title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    /// Bin edges (length = n_bins + 1).
    pub edges: Vec<f64>,
    /// Axis title (may be a placeholder such as `axis_0`).
    pub label: String,
}

impl Axis {
    /// Create an axis from explicit edges.
    pub fn new(edges: Vec<f64>, label: impl Into<String>) -> Result<Self> {
        validate_edges(&edges)?;
        Ok(Self { edges, label: label.into() })
    }

    /// Create an axis with `n_bins` equal-width bins on `[low, high)`.
    pub fn uniform(n_bins: usize, low: f64, high: f64, label: impl Into<String>) -> Result<Self> {
        if n_bins == 0 {
            return Err(Error::InvalidArgument("axis needs at least one bin".into()));
        }
        let width = (high - low) / n_bins as f64;
        let edges = (0..=n_bins).map(|i| low + i as f64 * width).collect();
        Self::new(edges, label)
    }

    /// Number of regular bins.
    #[inline]
    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Lower edge of the first bin.
    #[inline]
    pub fn low(&self) -> f64 {
        self.edges[0]
    }

    /// Upper edge of the last bin.
    #[inline]
    pub fn high(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    /// Width of zero-based bin `i`.
    #[inline]
    pub fn width(&self, i: usize) -> f64 {
        self.edges[i + 1] - self.edges[i]
    }

    /// Center of zero-based bin `i`.
    #[inline]
    pub fn center(&self, i: usize) -> f64 {
        0.5 * (self.edges[i] + self.edges[i + 1])
    }

    /// Locate `x` using ROOT bin numbering.
    ///
    /// Returns `0` for underflow, `1..=n_bins` for regular bins and
    /// `n_bins + 1` for overflow. A value equal to a bin's lower edge belongs
    /// to that bin.
    pub fn find_bin(&self, x: f64) -> usize {
        let n = self.n_bins();
        if x.is_nan() || x < self.low() {
            return 0;
        }
        if x >= self.high() {
            return n + 1;
        }
        // First edge strictly greater than x, minus one, is the zero-based bin.
        let upper = self.edges.partition_point(|&e| e <= x);
        upper.clamp(1, n)
    }
}

fn validate_edges(edges: &[f64]) -> Result<()> {
    if edges.len() < 2 {
        return Err(Error::InvalidArgument(format!(
            "axis needs at least 2 edges, got {}",
            edges.len()
        )));
    }
    if edges.iter().any(|e| !e.is_finite()) {
        return Err(Error::InvalidArgument("axis edges must be finite".into()));
    }
    if edges.windows(2).any(|w| w[1] <= w[0]) {
        return Err(Error::InvalidArgument("axis edges must be strictly increasing".into()));
    }
    Ok(())
}

/// A detached N-dimensional histogram with symmetric per-bin errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Object name.
    pub name: String,
    /// Object title.
    pub title: String,
    /// Shape tag resolved at read time.
    pub kind: HistogramKind,
    /// Axes in x, y, z, ... order.
    pub axes: Vec<Axis>,
    /// Bin contents, storage order (last axis outermost).
    pub values: Vec<f64>,
    /// Symmetric bin errors, same layout as `values`.
    pub errors: Vec<f64>,
    /// Producer of this histogram.
    pub source: BackendTag,
}

impl Histogram {
    /// Build a histogram, checking the shape invariants.
    ///
    /// The kind is `Dense1D/2D/3D` for up to three axes and `SparseNd` above.
    pub fn new(
        name: impl Into<String>,
        axes: Vec<Axis>,
        values: Vec<f64>,
        errors: Vec<f64>,
        source: BackendTag,
    ) -> Result<Self> {
        let kind = HistogramKind::dense(axes.len())
            .unwrap_or(HistogramKind::SparseNd { ndim: axes.len() });
        Self::with_kind(name, kind, axes, values, errors, source)
    }

    /// Build a histogram with an explicit kind tag.
    pub fn with_kind(
        name: impl Into<String>,
        kind: HistogramKind,
        axes: Vec<Axis>,
        values: Vec<f64>,
        errors: Vec<f64>,
        source: BackendTag,
    ) -> Result<Self> {
        let name = name.into();
        if axes.is_empty() {
            return Err(Error::InvalidArgument(format!("histogram '{}' has no axes", name)));
        }
        if kind.ndim() != axes.len() {
            return Err(Error::InvalidArgument(format!(
                "histogram '{}': kind {:?} does not match {} axes",
                name,
                kind,
                axes.len()
            )));
        }
        for axis in &axes {
            validate_edges(&axis.edges)?;
        }
        let n = dense_cell_count(&name, axes.iter().map(Axis::n_bins))?;
        if values.len() != n || errors.len() != n {
            return Err(Error::InvalidArgument(format!(
                "histogram '{}': expected {} bins, got {} values and {} errors",
                name,
                n,
                values.len(),
                errors.len()
            )));
        }
        if errors.iter().any(|e| *e < 0.0) {
            return Err(Error::InvalidArgument(format!(
                "histogram '{}' has negative bin errors",
                name
            )));
        }
        Ok(Self { name, title: String::new(), kind, axes, values, errors, source })
    }

    /// Set the title, builder style.
    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Number of dimensions.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.axes.len()
    }

    /// Per-axis bin counts in storage order (outermost axis first).
    pub fn shape(&self) -> Vec<usize> {
        self.axes.iter().rev().map(Axis::n_bins).collect()
    }

    /// Total number of bins (excluding under/overflow).
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the histogram has no bins.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Axis labels in axis order.
    pub fn labels(&self) -> Vec<&str> {
        self.axes.iter().map(|a| a.label.as_str()).collect()
    }

    /// Flat index of the bin with zero-based per-axis indices (axis order).
    pub fn flat_index(&self, bin: &[usize]) -> Option<usize> {
        if bin.len() != self.ndim() {
            return None;
        }
        let mut idx = 0;
        let mut stride = 1;
        for (axis, &i) in self.axes.iter().zip(bin) {
            if i >= axis.n_bins() {
                return None;
            }
            idx += i * stride;
            stride *= axis.n_bins();
        }
        Some(idx)
    }

    /// Content of the bin with zero-based per-axis indices (axis order).
    pub fn value(&self, bin: &[usize]) -> Option<f64> {
        self.flat_index(bin).map(|i| self.values[i])
    }

    /// Error of the bin with zero-based per-axis indices (axis order).
    pub fn error(&self, bin: &[usize]) -> Option<f64> {
        self.flat_index(bin).map(|i| self.errors[i])
    }

    /// Product of bin widths for the bin at `flat`.
    fn bin_volume(&self, flat: usize) -> f64 {
        let mut rest = flat;
        let mut volume = 1.0;
        for axis in &self.axes {
            let n = axis.n_bins();
            volume *= axis.width(rest % n);
            rest /= n;
        }
        volume
    }

    fn area(&self) -> f64 {
        self.values.iter().enumerate().map(|(i, v)| v * self.bin_volume(i)).sum()
    }

    /// Sum of bin contents (bin-count weighted, not area weighted).
    pub fn integral(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Sum over bins of `value × product of bin widths`.
    ///
    /// Returns 0 and reports [`Warning::EmptyHistogram`] if the sum is ≤ 0.
    pub fn total_integral(&self) -> f64 {
        let area = self.area();
        if area > 0.0 {
            area
        } else {
            self.empty_warning().report();
            0.0
        }
    }

    /// The warning a normalization of this histogram would report, if any.
    pub fn integral_warning(&self) -> Option<Warning> {
        if self.area() > 0.0 { None } else { Some(self.empty_warning()) }
    }

    fn empty_warning(&self) -> Warning {
        Warning::EmptyHistogram { name: self.name.clone() }
    }

    /// Return a copy with every value and error multiplied by `factor`.
    pub fn scale(&self, factor: f64) -> Histogram {
        self.clone().into_scaled(factor)
    }

    fn into_scaled(mut self, factor: f64) -> Histogram {
        let abs = factor.abs();
        self.values.iter_mut().for_each(|v| *v *= factor);
        self.errors.iter_mut().for_each(|e| *e *= abs);
        self
    }

    /// Divide values and errors by [`total_integral`](Self::total_integral).
    ///
    /// A histogram with non-positive integral is returned unchanged and the
    /// empty-histogram warning is reported.
    pub fn normalize_to_unit_area(&self) -> Histogram {
        self.clone().into_unit_area()
    }

    /// Divide values and errors by the plain sum of contents.
    ///
    /// A histogram whose contents sum to 0 is returned unchanged.
    pub fn normalize_to_unit_integral(&self) -> Histogram {
        self.clone().into_unit_integral()
    }

    /// Area normalization followed by unit-integral normalization.
    ///
    /// Consumes `self` and rescales its own buffers in place. Applying it
    /// twice gives the same result as applying it once.
    pub fn rescale(self) -> Histogram {
        self.into_unit_area().into_unit_integral()
    }

    fn into_unit_area(self) -> Histogram {
        let total = self.total_integral();
        if total > 0.0 { self.into_scaled(1.0 / total) } else { self }
    }

    fn into_unit_integral(self) -> Histogram {
        let sum = self.integral();
        if sum != 0.0 { self.into_scaled(1.0 / sum) } else { self }
    }

    /// Return a copy with a new name.
    pub fn renamed(&self, name: impl Into<String>) -> Histogram {
        let mut h = self.clone();
        h.name = name.into();
        h
    }
}
