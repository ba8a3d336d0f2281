//! Property tests for projections and derived histograms.

use approx::assert_relative_eq;
use jetana_core::{Axis, BackendTag, Histogram, SparseHistogram};
use jetana_reduce::{Bound, ProjectionSpec, project, project_range, ratio};
use proptest::prelude::*;

fn h1(values: Vec<f64>) -> Histogram {
    let n = values.len();
    let errors = values.iter().map(|v| v.abs().sqrt()).collect();
    Histogram::new("hForward", vec![Axis::uniform(n, 0.0, 2.0, "x").unwrap()], values, errors, BackendTag::Computed)
        .unwrap()
}

fn h2(nx: usize, ny: usize, values: Vec<f64>) -> Histogram {
    let x = Axis::uniform(nx, 0.0, 100.0, "x").unwrap();
    let y = Axis::uniform(ny, -1.0, 1.0, "y").unwrap();
    let errors = values.iter().map(|v| v.abs().sqrt()).collect();
    Histogram::new("h2", vec![x, y], values, errors, BackendTag::Computed).unwrap()
}

proptest! {
    #[test]
    fn self_ratio_is_one_or_zero(values in prop::collection::vec(prop_oneof![Just(0.0), 0.1f64..1e4], 1..40)) {
        let h = h1(values.clone());
        let r = ratio(&h, &h).unwrap();
        for (got, orig) in r.values.iter().zip(&values) {
            let want = if *orig == 0.0 { 0.0 } else { 1.0 };
            prop_assert!((got - want).abs() < 1e-12);
        }
        prop_assert_eq!(r.name.as_str(), "hFBRatio");
    }

    #[test]
    fn swapped_bounds_are_equivalent(
        (nx, ny, values) in (1usize..8, 1usize..5).prop_flat_map(|(nx, ny)| {
            (Just(nx), Just(ny), prop::collection::vec(0.0f64..100.0, nx * ny))
        }),
        a in -2i64..10,
        b in -2i64..10,
    ) {
        let h = h2(nx, ny, values);
        let p = project_range(&h, Some(Bound::Bin(a)), Some(Bound::Bin(b))).unwrap();
        let q = project_range(&h, Some(Bound::Bin(b)), Some(Bound::Bin(a))).unwrap();
        prop_assert_eq!(&p.name, &q.name);
        prop_assert_eq!(&p.values, &q.values);
        prop_assert_eq!(p.len(), ny);
    }

    #[test]
    fn unit_area_normalization(values in prop::collection::vec(0.0f64..1e3, 1..30)) {
        prop_assume!(values.iter().any(|v| *v > 0.0));
        let h = h1(values);
        let n = h.normalize_to_unit_area();
        let width = 2.0 / n.len() as f64;
        let area: f64 = n.values.iter().map(|v| v * width).sum();
        prop_assert!((area - 1.0).abs() < 1e-9, "area = {}", area);
    }

    #[test]
    fn projection_keeps_in_range_content(
        fills in prop::collection::vec((0.0f64..4.0, 0.0f64..3.0, 0.1f64..5.0), 1..50),
    ) {
        let axes = vec![
            Axis::uniform(4, 0.0, 4.0, "a0").unwrap(),
            Axis::uniform(3, 0.0, 3.0, "a1").unwrap(),
        ];
        let mut h = SparseHistogram::new("s", axes).unwrap();
        let mut total = 0.0;
        for (x, y, w) in &fills {
            h.fill(&[*x, *y], *w).unwrap();
            total += w;
        }
        for target in [0usize, 1] {
            let p = project(&mut h, &ProjectionSpec::new([target]), "p").unwrap();
            prop_assert!((p.integral() - total).abs() < 1e-9 * total.max(1.0));
        }
    }
}

#[test]
fn ratio_propagates_relative_errors() {
    let f = h1(vec![100.0, 25.0]);
    let b = h1(vec![25.0, 100.0]);
    let r = ratio(&f, &b).unwrap();
    // relative errors add in quadrature: 1/sqrt(100) and 1/sqrt(25)
    let rel = (0.01f64 + 0.04).sqrt();
    assert_relative_eq!(r.errors[0], 4.0 * rel, epsilon = 1e-12);
    assert_relative_eq!(r.errors[1], 0.25 * rel, epsilon = 1e-12);
}
