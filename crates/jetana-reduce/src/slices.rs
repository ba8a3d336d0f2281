//! Slice-wise fits of 2D histograms.
//!
//! For every x bin of a 2D histogram the y distribution (the slice) is fitted
//! and the fit parameters are collected into 1D profiles over the x axis:
//! `_0` constant, `_1` mean (JES), `_2` width (JER), `_chi2` chi²/ndf.
//! Slices that are too sparse or whose fit fails stay empty.

use jetana_core::{BackendTag, Error, Histogram, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::optimizer::{LbfgsbOptimizer, ObjectiveFunction, OptimizerConfig};

/// A fitted value with its uncertainty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitParameter {
    /// Best-fit value.
    pub value: f64,
    /// Symmetric uncertainty.
    pub error: f64,
}

impl FitParameter {
    fn new(value: f64, error: f64) -> Self {
        Self { value, error }
    }
}

/// Result of fitting one slice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SliceFitResult {
    /// Normalization.
    pub constant: FitParameter,
    /// Location estimate.
    pub mean: FitParameter,
    /// Width estimate.
    pub sigma: FitParameter,
    /// χ² per degree of freedom (0 when not defined).
    pub chi2_ndf: f64,
}

/// A fit strategy for one unimodal slice.
pub trait SliceFit {
    /// Fit the distribution `values ± errors` sampled at bin `centers`.
    fn fit(&self, centers: &[f64], values: &[f64], errors: &[f64]) -> Result<SliceFitResult>;
}

/// Slice selection settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SliceFitConfig {
    /// Slices whose summed content is below this are skipped.
    pub min_entries: f64,
    /// When set, refit within `mean ± fit_range_sigma × sigma` of the first fit.
    pub fit_range_sigma: Option<f64>,
}

impl Default for SliceFitConfig {
    fn default() -> Self {
        Self { min_entries: 0.0, fit_range_sigma: None }
    }
}

/// Per-slice mean and RMS, without a fit.
#[derive(Debug, Clone, Copy, Default)]
pub struct MomentsFit;

impl SliceFit for MomentsFit {
    fn fit(&self, centers: &[f64], values: &[f64], errors: &[f64]) -> Result<SliceFitResult> {
        let sumw: f64 = values.iter().sum();
        if sumw <= 0.0 {
            return Err(Error::Computation("slice has no positive content".into()));
        }
        let mean = centers.iter().zip(values).map(|(x, w)| x * w).sum::<f64>() / sumw;
        let var = centers.iter().zip(values).map(|(x, w)| w * (x - mean).powi(2)).sum::<f64>() / sumw;
        let rms = var.max(0.0).sqrt();
        let sumw2: f64 = errors.iter().map(|e| e * e).sum();
        let neff = if sumw2 > 0.0 { sumw * sumw / sumw2 } else { sumw };
        Ok(SliceFitResult {
            constant: FitParameter::new(sumw, sumw2.sqrt()),
            mean: FitParameter::new(mean, rms / neff.sqrt()),
            sigma: FitParameter::new(rms, rms / (2.0 * neff).sqrt()),
            chi2_ndf: 0.0,
        })
    }
}

/// χ² fit of `c · exp(-(x - μ)² / 2σ²)` minimized with L-BFGS.
///
/// Bins with zero error carry no information and are left out of the χ².
#[derive(Debug, Clone, Default)]
pub struct GaussianFit {
    optimizer: OptimizerConfig,
}

impl GaussianFit {
    /// Gaussian fit with custom minimizer settings.
    pub fn new(optimizer: OptimizerConfig) -> Self {
        Self { optimizer }
    }
}

struct Chi2<'a> {
    x: &'a [f64],
    y: &'a [f64],
    e: &'a [f64],
}

fn gauss(p: &[f64], x: f64) -> f64 {
    let z = (x - p[1]) / p[2];
    p[0] * (-0.5 * z * z).exp()
}

impl Chi2<'_> {
    fn ndf(&self) -> isize {
        self.x.len() as isize - 3
    }

    fn hessian(&self, p: &[f64]) -> Result<DMatrix<f64>> {
        let n = p.len();
        let g0 = self.gradient(p)?;
        let mut h = DMatrix::zeros(n, n);
        for j in 0..n {
            let eps = 1e-5 * p[j].abs().max(1e-3);
            let mut shifted = p.to_vec();
            shifted[j] += eps;
            let g = self.gradient(&shifted)?;
            for i in 0..n {
                h[(i, j)] = (g[i] - g0[i]) / eps;
            }
        }
        let ht = h.transpose();
        Ok((&h + &ht) * 0.5)
    }
}

impl ObjectiveFunction for Chi2<'_> {
    fn eval(&self, p: &[f64]) -> Result<f64> {
        Ok(self
            .x
            .iter()
            .zip(self.y)
            .zip(self.e)
            .map(|((&x, &y), &e)| ((y - gauss(p, x)) / e).powi(2))
            .sum())
    }

    fn gradient(&self, p: &[f64]) -> Result<Vec<f64>> {
        let mut g = vec![0.0; 3];
        for ((&x, &y), &e) in self.x.iter().zip(self.y).zip(self.e) {
            let z = (x - p[1]) / p[2];
            let shape = (-0.5 * z * z).exp();
            let f = p[0] * shape;
            let r = -2.0 * (y - f) / (e * e);
            g[0] += r * shape;
            g[1] += r * f * z / p[2];
            g[2] += r * f * z * z / p[2];
        }
        Ok(g)
    }
}

impl GaussianFit {
    fn fit_points(&self, x: &[f64], y: &[f64], e: &[f64], start: [f64; 3]) -> Result<SliceFitResult> {
        let chi2 = Chi2 { x, y, e };
        if chi2.ndf() < 0 {
            return Err(Error::Computation(format!("{} points cannot constrain 3 parameters", x.len())));
        }
        let lo = x.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let span = (hi - lo).max(f64::EPSILON);
        let ymax = y.iter().copied().fold(0.0, f64::max);
        let bounds = [(0.0, 10.0 * ymax.max(start[0])), (lo - span, hi + span), (1e-6 * span, 10.0 * span)];

        let res = LbfgsbOptimizer::new(self.optimizer).minimize(&chi2, &start, &bounds)?;
        if !res.converged {
            log::debug!("gaussian slice fit: {}", res.message);
        }
        let p = &res.parameters;
        let cov = chi2
            .hessian(p)?
            .try_inverse()
            .ok_or_else(|| Error::Computation("singular χ² Hessian".into()))?
            * 2.0;
        let err = |i: usize| {
            let v = cov[(i, i)];
            if v.is_finite() && v > 0.0 { Ok(v.sqrt()) } else { Err(Error::Computation("non-positive variance".into())) }
        };
        let ndf = chi2.ndf();
        Ok(SliceFitResult {
            constant: FitParameter::new(p[0], err(0)?),
            mean: FitParameter::new(p[1], err(1)?),
            sigma: FitParameter::new(p[2], err(2)?),
            chi2_ndf: if ndf > 0 { res.fval / ndf as f64 } else { 0.0 },
        })
    }
}

impl SliceFit for GaussianFit {
    fn fit(&self, centers: &[f64], values: &[f64], errors: &[f64]) -> Result<SliceFitResult> {
        let mut x = Vec::with_capacity(centers.len());
        let mut y = Vec::with_capacity(centers.len());
        let mut e = Vec::with_capacity(centers.len());
        for ((&c, &v), &err) in centers.iter().zip(values).zip(errors) {
            if err > 0.0 {
                x.push(c);
                y.push(v);
                e.push(err);
            }
        }
        let m = MomentsFit.fit(centers, values, errors)?;
        let width = if m.sigma.value > 0.0 { m.sigma.value } else { 1.0 };
        let peak = y.iter().copied().fold(0.0, f64::max);
        self.fit_points(&x, &y, &e, [peak, m.mean.value, width])
    }
}

/// Fit profiles of a 2D histogram, one bin per x bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceProfiles {
    /// `<name>_0`: fitted constant.
    pub constant: Histogram,
    /// `<name>_1`: location, titled `JES`.
    pub mean: Histogram,
    /// `<name>_2`: width, titled `JER`.
    pub width: Histogram,
    /// `<name>_chi2`: χ²/ndf.
    pub chi2: Histogram,
}

/// Fit every x slice of `h2` with `fitter`.
pub fn fit_slices(h2: &Histogram, fitter: &dyn SliceFit, config: &SliceFitConfig) -> Result<SliceProfiles> {
    if h2.ndim() != 2 {
        return Err(Error::TypeMismatch(format!(
            "slice fits need a 2D histogram; '{}' has {} dimensions",
            h2.name,
            h2.ndim()
        )));
    }
    let xaxis = &h2.axes[0];
    let yaxis = &h2.axes[1];
    let (nx, ny) = (xaxis.n_bins(), yaxis.n_bins());
    let centers: Vec<f64> = (0..ny).map(|iy| yaxis.center(iy)).collect();

    let mut out = [vec![0.0; nx], vec![0.0; nx], vec![0.0; nx], vec![0.0; nx]];
    let mut errs = [vec![0.0; nx], vec![0.0; nx], vec![0.0; nx], vec![0.0; nx]];
    let mut fitted = 0usize;
    for ix in 0..nx {
        let values: Vec<f64> = (0..ny).map(|iy| h2.values[ix + nx * iy]).collect();
        let errors: Vec<f64> = (0..ny).map(|iy| h2.errors[ix + nx * iy]).collect();
        let entries: f64 = values.iter().sum();
        if entries <= 0.0 || entries < config.min_entries {
            continue;
        }
        let result = fitter.fit(&centers, &values, &errors).and_then(|first| match config.fit_range_sigma {
            Some(k) => refit_in_window(fitter, &centers, &values, &errors, &first, k),
            None => Ok(first),
        });
        let r = match result {
            Ok(r) => r,
            Err(e) => {
                log::debug!("'{}': slice {} left empty: {}", h2.name, ix + 1, e);
                continue;
            }
        };
        for (k, p) in [r.constant, r.mean, r.sigma].iter().enumerate() {
            out[k][ix] = p.value;
            errs[k][ix] = p.error;
        }
        out[3][ix] = r.chi2_ndf;
        fitted += 1;
    }
    log::debug!("'{}': fitted {} of {} slices", h2.name, fitted, nx);

    let [c, m, s, q] = out;
    let [ce, me, se, qe] = errs;
    let profile = |suffix: &str, values: Vec<f64>, errors: Vec<f64>, title: &str| {
        Histogram::new(format!("{}_{}", h2.name, suffix), vec![xaxis.clone()], values, errors, BackendTag::Computed)
            .map(|h| h.titled(title))
    };
    Ok(SliceProfiles {
        constant: profile("0", c, ce, "")?,
        mean: profile("1", m, me, "JES")?,
        width: profile("2", s, se, "JER")?,
        chi2: profile("chi2", q, qe, "")?,
    })
}

fn refit_in_window(
    fitter: &dyn SliceFit,
    centers: &[f64],
    values: &[f64],
    errors: &[f64],
    first: &SliceFitResult,
    k: f64,
) -> Result<SliceFitResult> {
    let lo = first.mean.value - k * first.sigma.value;
    let hi = first.mean.value + k * first.sigma.value;
    let keep: Vec<usize> = (0..centers.len()).filter(|&i| (lo..=hi).contains(&centers[i])).collect();
    let pick = |src: &[f64]| keep.iter().map(|&i| src[i]).collect::<Vec<_>>();
    fitter.fit(&pick(centers), &pick(values), &pick(errors))
}

/// JES (mean) and JER (width) profiles of `h2` from Gaussian slice fits.
pub fn extract_profile(h2: &Histogram) -> Result<(Histogram, Histogram)> {
    let profiles = fit_slices(h2, &GaussianFit::default(), &SliceFitConfig::default())?;
    Ok((profiles.mean, profiles.width))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use jetana_core::Axis;

    fn gaussian_bins(n: usize, lo: f64, hi: f64, norm: f64, mu: f64, sigma: f64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let width = (hi - lo) / n as f64;
        let centers: Vec<f64> = (0..n).map(|i| lo + (i as f64 + 0.5) * width).collect();
        let values: Vec<f64> = centers.iter().map(|&x| norm * (-0.5 * ((x - mu) / sigma).powi(2)).exp()).collect();
        let errors = values.iter().map(|v| v.sqrt().max(1.0)).collect();
        (centers, values, errors)
    }

    #[test]
    fn gaussian_fit_recovers_parameters() {
        let (x, y, e) = gaussian_bins(40, 0.0, 2.0, 500.0, 1.02, 0.12);
        let r = GaussianFit::default().fit(&x, &y, &e).unwrap();
        assert_relative_eq!(r.mean.value, 1.02, epsilon = 1e-3);
        assert_relative_eq!(r.sigma.value, 0.12, epsilon = 1e-3);
        assert_relative_eq!(r.constant.value, 500.0, max_relative = 1e-2);
        assert!(r.mean.error > 0.0 && r.mean.error < 0.05);
        assert!(r.chi2_ndf < 0.1, "chi2/ndf = {}", r.chi2_ndf);
    }

    #[test]
    fn moments_of_symmetric_slice() {
        let r = MomentsFit.fit(&[0.5, 1.5, 2.5], &[1.0, 2.0, 1.0], &[1.0, 1.0, 1.0]).unwrap();
        assert_relative_eq!(r.mean.value, 1.5);
        assert_relative_eq!(r.sigma.value, 0.5f64.sqrt());
        assert_relative_eq!(r.constant.value, 4.0);
    }

    #[test]
    fn profiles_follow_the_x_axis() {
        let nx = 3;
        let ny = 40;
        let x = Axis::new(vec![30.0, 50.0, 80.0, 120.0], "p_{T}").unwrap();
        let y = Axis::uniform(ny, 0.0, 2.0, "response").unwrap();
        let mut values = vec![0.0; nx * ny];
        let mus = [0.9, 1.0, 1.1];
        for (ix, &mu) in mus.iter().enumerate() {
            let (_, slice, _) = gaussian_bins(ny, 0.0, 2.0, 300.0, mu, 0.1);
            for (iy, v) in slice.into_iter().enumerate() {
                values[ix + nx * iy] = v;
            }
        }
        // leave the middle slice empty
        for iy in 0..ny {
            values[1 + nx * iy] = 0.0;
        }
        let errors = values.iter().map(|v: &f64| v.sqrt()).collect();
        let h2 = Histogram::new("hJES", vec![x, y], values, errors, BackendTag::Computed).unwrap();

        let (mean, width) = extract_profile(&h2).unwrap();
        assert_eq!(mean.name, "hJES_1");
        assert_eq!(width.name, "hJES_2");
        assert_eq!(mean.title, "JES");
        assert_eq!(width.title, "JER");
        assert_eq!(mean.axes[0], h2.axes[0]);
        assert_relative_eq!(mean.values[0], 0.9, epsilon = 1e-3);
        assert_relative_eq!(mean.values[2], 1.1, epsilon = 1e-3);
        assert_eq!(mean.values[1], 0.0);
        assert_relative_eq!(width.values[2], 0.1, epsilon = 1e-3);
    }

    #[test]
    fn min_entries_skips_slices() {
        let x = Axis::uniform(2, 0.0, 2.0, "x").unwrap();
        let y = Axis::uniform(3, 0.0, 3.0, "y").unwrap();
        let values = vec![1.0, 10.0, 2.0, 20.0, 1.0, 10.0];
        let errors = vec![1.0; 6];
        let h2 = Histogram::new("h", vec![x, y], values, errors, BackendTag::Computed).unwrap();
        let cfg = SliceFitConfig { min_entries: 10.0, fit_range_sigma: None };
        let p = fit_slices(&h2, &MomentsFit, &cfg).unwrap();
        assert_eq!(p.mean.values[0], 0.0);
        assert_relative_eq!(p.mean.values[1], 1.5);
        assert_eq!(p.chi2.name, "h_chi2");
    }

    #[test]
    fn rejects_non_2d() {
        let h = Histogram::new(
            "h1",
            vec![Axis::uniform(2, 0.0, 1.0, "x").unwrap()],
            vec![1.0, 1.0],
            vec![1.0, 1.0],
            BackendTag::Computed,
        )
        .unwrap();
        assert!(matches!(extract_profile(&h), Err(Error::TypeMismatch(_))));
    }
}
