//! File to profile: write a sparse histogram, read it back, project it and
//! fit the slices.

use std::path::PathBuf;

use approx::assert_relative_eq;
use jetana_core::{Axis, SparseHistogram};
use jetana_reduce::{GaussianFit, ProjectionSpec, SliceFitConfig, fit_slices, project};
use jetana_root::RootFileWriter;

fn fixture_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("jetana-reduce-{}-{}", std::process::id(), name))
}

/// pT (3 bins), eta (2 bins), response (40 bins). Each pT bin holds a
/// Gaussian response peak at `0.9 + 0.05 * ipt` with width 0.1.
fn response_cube() -> SparseHistogram {
    let axes = vec![
        Axis::new(vec![30.0, 60.0, 120.0, 240.0], "p_{T}").unwrap(),
        Axis::uniform(2, 0.0, 2.6, "|#eta|").unwrap(),
        Axis::uniform(40, 0.0, 2.0, "R").unwrap(),
    ];
    let mut h = SparseHistogram::new("hResponse", axes).unwrap();
    h.enable_sumw2();
    for (ipt, pt) in [45.0, 90.0, 180.0].into_iter().enumerate() {
        let mu = 0.9 + 0.05 * ipt as f64;
        for ir in 0..40 {
            let r = 0.025 + 0.05 * ir as f64;
            let w = 1000.0 * (-0.5 * ((r - mu) / 0.1f64).powi(2)).exp();
            if w > 1e-3 {
                h.fill(&[pt, 0.5, r], w).unwrap();
                // a second eta bin that the cut removes
                h.fill(&[pt, 2.0, r], 3.0 * w).unwrap();
            }
        }
    }
    h
}

#[test]
fn projection_of_read_back_handle_matches_in_memory() {
    let mut src = response_cube();
    let mut w = RootFileWriter::new().with_compression(1);
    w.add_sparse("resp/hResponse", &src).unwrap();
    let path = fixture_path("pipeline.root");
    w.write(&path).unwrap();

    let mut handle = jetana_root::read_sparse(&path, "resp/hResponse").expect("read sparse");
    let spec = ProjectionSpec::new([2, 0]).with_range(1, 0.0, 1.3);
    let from_file = project(&mut handle, &spec, "hJES").unwrap();
    let in_memory = project(&mut src, &spec, "hJES").unwrap();

    assert_eq!(from_file.shape(), vec![40, 3]);
    for (a, b) in from_file.axes.iter().zip(&in_memory.axes) {
        assert_eq!(a.label, b.label);
        assert_eq!(a.edges.len(), b.edges.len());
        for (x, y) in a.edges.iter().zip(&b.edges) {
            assert_relative_eq!(*x, *y, epsilon = 1e-12);
        }
    }
    for (a, b) in from_file.values.iter().zip(&in_memory.values) {
        assert_relative_eq!(*a, *b, epsilon = 1e-9);
    }
    assert!(!handle.axis(1).unwrap().is_restricted());
    std::fs::remove_file(&path).ok();
}

#[test]
fn slice_fits_recover_response_peaks() {
    let mut src = response_cube();
    let spec = ProjectionSpec::new([2, 0]).with_range(1, 0.0, 1.3);
    let h2 = project(&mut src, &spec, "hJES").unwrap();

    let profiles = fit_slices(&h2, &GaussianFit::default(), &SliceFitConfig::default()).unwrap();
    assert_eq!(profiles.mean.name, "hJES_1");
    assert_eq!(profiles.mean.title, "JES");
    assert_eq!(profiles.width.title, "JER");
    for ipt in 0..3 {
        assert_relative_eq!(profiles.mean.values[ipt], 0.9 + 0.05 * ipt as f64, epsilon = 5e-3);
        assert_relative_eq!(profiles.width.values[ipt], 0.1, epsilon = 5e-3);
    }
}
