//! Histograms derived from already-reduced data.

use jetana_core::{BackendTag, Error, Histogram, Result};

/// Token replaced in the forward histogram's name and title by [`ratio`].
const FORWARD_TOKEN: &str = "Forward";
const RATIO_TOKEN: &str = "FBRatio";

/// Bin-wise `forward / backward` of two 1D histograms.
///
/// Bins with a zero denominator are 0 with error 0. Errors combine the two
/// relative errors in quadrature. The result takes the forward histogram's
/// name and title with `Forward` replaced by `FBRatio`.
pub fn ratio(forward: &Histogram, backward: &Histogram) -> Result<Histogram> {
    for h in [forward, backward] {
        if h.ndim() != 1 {
            return Err(Error::TypeMismatch(format!(
                "ratio needs 1D histograms; '{}' has {} dimensions",
                h.name,
                h.ndim()
            )));
        }
    }
    if forward.len() != backward.len() {
        return Err(Error::TypeMismatch(format!(
            "ratio of '{}' ({} bins) and '{}' ({} bins)",
            forward.name,
            forward.len(),
            backward.name,
            backward.len()
        )));
    }

    let mut values = Vec::with_capacity(forward.len());
    let mut errors = Vec::with_capacity(forward.len());
    for i in 0..forward.len() {
        let (c1, e1) = (forward.values[i], forward.errors[i]);
        let (c2, e2) = (backward.values[i], backward.errors[i]);
        if c2 == 0.0 {
            values.push(0.0);
            errors.push(0.0);
            continue;
        }
        let c2sq = c2 * c2;
        values.push(c1 / c2);
        errors.push(((e1 * e1 * c2sq + e2 * e2 * c1 * c1) / (c2sq * c2sq)).sqrt());
    }

    let name = if forward.name.contains(FORWARD_TOKEN) {
        forward.name.replace(FORWARD_TOKEN, RATIO_TOKEN)
    } else {
        format!("{}_{}", forward.name, RATIO_TOKEN)
    };
    Ok(Histogram::new(name, forward.axes.clone(), values, errors, BackendTag::Computed)?
        .titled(forward.title.replace(FORWARD_TOKEN, RATIO_TOKEN)))
}

/// One end of an x range: a physical value or a ROOT bin number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    /// Physical coordinate, located with `find_bin`.
    Value(f64),
    /// ROOT bin number (1-based).
    Bin(i64),
}

impl From<f64> for Bound {
    fn from(v: f64) -> Self {
        Bound::Value(v)
    }
}

impl From<i64> for Bound {
    fn from(b: i64) -> Self {
        Bound::Bin(b)
    }
}

impl From<usize> for Bound {
    fn from(b: usize) -> Self {
        Bound::Bin(i64::try_from(b).unwrap_or(i64::MAX))
    }
}

/// Sum the x bins `low..=high` of a 2D histogram into a 1D histogram over y.
///
/// Missing bounds default to the first/last bin, out-of-range bounds are
/// clamped to `1..=nx` and reversed bounds are swapped. The result is named
/// `<name>_ptAve_<first>_<last>`.
pub fn project_range(h2: &Histogram, low: Option<Bound>, high: Option<Bound>) -> Result<Histogram> {
    if h2.ndim() != 2 {
        return Err(Error::InvalidArgument(format!(
            "ranged projection needs a 2D histogram; '{}' has {} dimensions",
            h2.name,
            h2.ndim()
        )));
    }
    let (xaxis, yaxis) = (&h2.axes[0], &h2.axes[1]);
    let (nx, ny) = (xaxis.n_bins(), yaxis.n_bins());

    let to_bin = |b: Option<Bound>, default: usize| -> usize {
        let raw = match b {
            None => return default,
            Some(Bound::Bin(i)) => i,
            Some(Bound::Value(v)) if v.is_nan() => return default,
            Some(Bound::Value(v)) => xaxis.find_bin(v) as i64,
        };
        let clamped = raw.clamp(1, nx as i64) as usize;
        if clamped as i64 != raw {
            log::debug!("'{}': x bound {} clamped to bin {}", h2.name, raw, clamped);
        }
        clamped
    };
    let mut first = to_bin(low, 1);
    let mut last = to_bin(high, nx);
    if first > last {
        std::mem::swap(&mut first, &mut last);
    }

    let mut values = vec![0.0; ny];
    let mut variances = vec![0.0; ny];
    for iy in 0..ny {
        for ix in (first - 1)..last {
            let flat = ix + nx * iy;
            values[iy] += h2.values[flat];
            variances[iy] += h2.errors[flat] * h2.errors[flat];
        }
    }
    let errors = variances.into_iter().map(f64::sqrt).collect();
    Histogram::new(
        format!("{}_ptAve_{}_{}", h2.name, first, last),
        vec![yaxis.clone()],
        values,
        errors,
        BackendTag::Computed,
    )
}
