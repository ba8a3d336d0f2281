//! Normalization and sparse materialization properties.

use approx::assert_relative_eq;
use jetana_core::{Axis, BackendTag, Histogram, SparseHistogram, Warning};
use proptest::prelude::*;

fn variable_axis(widths: &[f64]) -> Axis {
    let mut edges = vec![0.0];
    for w in widths {
        edges.push(edges[edges.len() - 1] + w);
    }
    Axis::new(edges, "x").unwrap()
}

proptest! {
    #[test]
    fn unit_area_with_variable_bins(
        bins in prop::collection::vec((0.1f64..5.0, 0.0f64..100.0), 1..25),
    ) {
        prop_assume!(bins.iter().any(|(_, v)| *v > 0.0));
        let widths: Vec<f64> = bins.iter().map(|(w, _)| *w).collect();
        let values: Vec<f64> = bins.iter().map(|(_, v)| *v).collect();
        let errors = values.iter().map(|v| v.sqrt()).collect();
        let h = Histogram::new("h", vec![variable_axis(&widths)], values, errors, BackendTag::Computed).unwrap();

        let n = h.normalize_to_unit_area();
        prop_assert!((n.total_integral() - 1.0).abs() < 1e-9);
        prop_assert!(n.integral_warning().is_none());
    }

    #[test]
    fn rescale_is_idempotent(values in prop::collection::vec(0.0f64..50.0, 1..20)) {
        prop_assume!(values.iter().sum::<f64>() > 0.0);
        let n = values.len();
        let errors = values.iter().map(|v| v.sqrt()).collect();
        let h = Histogram::new("h", vec![Axis::uniform(n, -1.0, 1.0, "x").unwrap()], values, errors, BackendTag::Computed)
            .unwrap();
        let once = h.clone().rescale();
        let twice = once.clone().rescale();
        prop_assert!((once.integral() - 1.0).abs() < 1e-9);
        for (a, b) in once.values.iter().zip(&twice.values) {
            prop_assert!((a - b).abs() < 1e-12);
        }
    }
}

#[test]
fn empty_histogram_is_returned_unchanged_with_warning() {
    let h = Histogram::new("hEmpty", vec![Axis::uniform(3, 0.0, 3.0, "x").unwrap()], vec![0.0; 3], vec![0.0; 3], BackendTag::Computed)
        .unwrap();
    assert_eq!(h.integral_warning(), Some(Warning::EmptyHistogram { name: "hEmpty".into() }));
    let n = h.normalize_to_unit_area();
    assert_eq!(n, h);
}

#[test]
fn sparse_to_dense_uses_storage_order() {
    let axes = vec![Axis::uniform(3, 0.0, 3.0, "x").unwrap(), Axis::uniform(2, 0.0, 2.0, "y").unwrap()];
    let mut s = SparseHistogram::new("s", axes).unwrap();
    s.enable_sumw2();
    s.fill(&[2.5, 0.5], 2.0).unwrap();
    s.fill(&[0.5, 1.5], 3.0).unwrap();
    s.fill(&[0.5, 1.5], 1.0).unwrap();

    let d = s.to_dense().unwrap();
    assert_eq!(d.shape(), vec![2, 3]);
    assert_eq!(d.value(&[2, 0]), Some(2.0));
    assert_eq!(d.value(&[0, 1]), Some(4.0));
    // sumw2 = 3² + 1²
    assert_relative_eq!(d.error(&[0, 1]).unwrap(), 10.0f64.sqrt());
}
