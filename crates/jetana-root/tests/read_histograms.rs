//! Integration tests: write fixture files with `RootFileWriter`, read them back
//! through both backends.

use std::path::PathBuf;

use approx::assert_relative_eq;
use jetana_core::{Axis, BackendTag, Histogram, HistogramKind, SparseHistogram};
use jetana_root::{ArrayKind, HistogramBackend, MmapBackend, Reader, RootFileWriter, StreamerBackend};

fn fixture_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("jetana-root-{}-{}", std::process::id(), name))
}

fn h2() -> Histogram {
    // nx = 3 (pT), ny = 2 (response)
    let x = Axis::new(vec![30.0, 50.0, 80.0, 120.0], "p_{T}^{gen}").unwrap();
    let y = Axis::uniform(2, 0.0, 2.0, "p_{T}^{reco}/p_{T}^{gen}").unwrap();
    let values: Vec<f64> = (1..=6).map(f64::from).collect();
    let errors = values.iter().map(|v| 0.1 * v).collect();
    Histogram::new("hJESvsPt", vec![x, y], values, errors, BackendTag::Computed)
        .unwrap()
        .titled("response")
}

fn sparse3() -> SparseHistogram {
    let axes = vec![
        Axis::uniform(4, 0.0, 400.0, "p_{T}^{ave}").unwrap(),
        Axis::uniform(5, 0.0, 50.0, "p_{T}").unwrap(),
        Axis::uniform(6, -3.0, 3.0, "#eta").unwrap(),
    ];
    let mut h = SparseHistogram::new("hDijetPtEta", axes).unwrap();
    h.enable_sumw2();
    h.fill(&[50.0, 15.0, -2.5], 1.0).unwrap();
    h.fill(&[150.0, 15.0, 0.5], 2.0).unwrap();
    h.fill(&[150.0, 25.0, 0.5], 0.5).unwrap();
    h.fill(&[350.0, 45.0, 2.5], 3.0).unwrap();
    h.fill(&[350.0, 45.0, 9.0], 1.0).unwrap(); // overflow on eta
    h
}

fn write_fixture(name: &str, writer: &RootFileWriter) -> PathBuf {
    let path = fixture_path(name);
    writer.write(&path).unwrap_or_else(|e| panic!("failed to write {}: {}", path.display(), e));
    path
}

#[test]
fn read_2d_shape_and_order() {
    let mut w = RootFileWriter::new();
    w.add_histogram("hJESvsPt", &h2()).unwrap();
    let path = write_fixture("shape2d.root", &w);

    let h = jetana_root::read(&path, "hJESvsPt").expect("failed to read 2D histogram");
    assert_eq!(h.ndim(), 2);
    assert_eq!(h.kind, HistogramKind::Dense2D);
    assert_eq!(h.axes.len(), 2);
    assert_eq!(h.shape(), vec![h.axes[1].edges.len() - 1, h.axes[0].edges.len() - 1]);
    assert_eq!(h.shape(), vec![2, 3]);
    assert_eq!(h.source, BackendTag::Mmap);
    assert_eq!(h.title, "response");
    assert_eq!(h.axes[0].label, "p_{T}^{gen}");

    // value at (ix = 2, iy = 1) sits at flat index 2 + 3 * 1
    assert_eq!(h.value(&[2, 1]), Some(6.0));
    assert_eq!(h.value(&[1, 0]), Some(2.0));
    assert_relative_eq!(h.error(&[2, 1]).unwrap(), 0.6, epsilon = 1e-12);
    std::fs::remove_file(&path).ok();
}

#[test]
fn both_backends_agree_on_dense_objects() {
    let mut w = RootFileWriter::new().with_compression(6);
    w.add_histogram("jets/hJESvsPt", &h2()).unwrap();
    w.add_histogram_as("jets/hF", &h2().renamed("hF"), ArrayKind::F32).unwrap();
    let path = write_fixture("agree.root", &w);

    for name in ["jets/hJESvsPt", "jets/hF"] {
        let a = MmapBackend.read(&path, name).unwrap_or_else(|e| panic!("mmap '{}': {}", name, e));
        let b = StreamerBackend.read(&path, name).unwrap_or_else(|e| panic!("streamer '{}': {}", name, e));
        assert_eq!(a.source, BackendTag::Mmap);
        assert_eq!(b.source, BackendTag::Streamer);
        assert_eq!(a.axes, b.axes, "{}: axes differ", name);
        for (x, y) in a.values.iter().zip(&b.values) {
            assert_relative_eq!(*x, *y, epsilon = 1e-6);
        }
        for (x, y) in a.errors.iter().zip(&b.errors) {
            assert_relative_eq!(*x, *y, epsilon = 1e-6);
        }
    }
    std::fs::remove_file(&path).ok();
}

#[test]
fn integer_contents_fall_back_to_streamer() {
    let axis = Axis::uniform(3, 0.0, 3.0, "n").unwrap();
    let h = Histogram::new("hCount", vec![axis], vec![4.0, 9.0, 0.0], vec![2.0, 3.0, 0.0], BackendTag::Computed)
        .unwrap();
    let mut w = RootFileWriter::new();
    w.add_histogram_as("hCount", &h, ArrayKind::I32).unwrap();
    let path = write_fixture("fallback.root", &w);

    assert!(MmapBackend.read(&path, "hCount").is_err());
    let got = Reader::default().read(&path, "hCount").expect("fallback should succeed");
    assert_eq!(got.source, BackendTag::Streamer);
    assert_eq!(got.values, vec![4.0, 9.0, 0.0]);
    // no sumw2 stored: errors are sqrt(|content|)
    assert_eq!(got.errors, vec![2.0, 3.0, 0.0]);
    std::fs::remove_file(&path).ok();
}

#[test]
fn sparse_reads_as_handle_and_materialized() {
    let mut w = RootFileWriter::new().with_sparse_chunk_size(2);
    let mut src = sparse3();
    src.axis_mut(1).unwrap().set_range(2, 3);
    w.add_sparse("hDijetPtEta", &src).unwrap();
    let path = write_fixture("sparse.root", &w);

    let handle = jetana_root::read_sparse(&path, "hDijetPtEta").expect("failed to read sparse");
    assert_eq!(handle.ndim(), 3);
    assert_eq!(handle.source, BackendTag::Streamer);
    assert!(handle.has_sumw2());
    assert_eq!(handle.n_filled(), src.n_filled());
    assert_eq!(handle.axis(1).unwrap().range(), (2, 3));
    assert!(handle.axis(1).unwrap().is_restricted());
    assert!(!handle.axis(0).unwrap().is_restricted());
    for (a, b) in handle.bins().iter().zip(src.bins()) {
        assert_eq!(a.coords, b.coords);
        assert_relative_eq!(a.content, b.content);
        assert_relative_eq!(a.sumw2, b.sumw2);
    }

    let dense = jetana_root::read(&path, "hDijetPtEta").expect("failed to read materialized");
    assert_eq!(dense.kind, HistogramKind::SparseNd { ndim: 3 });
    assert_eq!(dense.shape(), vec![6, 5, 4]);
    // the overflow fill is dropped
    assert_relative_eq!(dense.integral(), 6.5, epsilon = 1e-12);
    std::fs::remove_file(&path).ok();
}

#[test]
fn load_histograms_skips_missing_names() {
    let mut w = RootFileWriter::new();
    w.add_histogram("a", &h2().renamed("a")).unwrap();
    w.add_histogram("dir/b", &h2().renamed("b")).unwrap();
    let path = write_fixture("load.root", &w);

    let hs = jetana_root::load_histograms(&path, &["a", "missing", "dir/b"]).unwrap();
    let names: Vec<&str> = hs.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    std::fs::remove_file(&path).ok();
}

#[test]
fn list_keys_walks_subdirectories() {
    let mut w = RootFileWriter::new();
    w.add_histogram("top", &h2().renamed("top")).unwrap();
    w.add_histogram("eta/pt/h", &h2().renamed("h")).unwrap();
    w.add_sparse("eta/s", &sparse3()).unwrap();
    let path = write_fixture("keys.root", &w);

    let keys = jetana_root::list_keys(&path).unwrap();
    let entries: Vec<(&str, &str)> = keys.iter().map(|k| (k.path.as_str(), k.class_name.as_str())).collect();
    assert!(entries.contains(&("top", "TH2D")));
    assert!(entries.contains(&("eta", "TDirectoryFile")));
    assert!(entries.contains(&("eta/pt", "TDirectoryFile")));
    assert!(entries.contains(&("eta/pt/h", "TH2D")));
    assert!(entries.contains(&("eta/s", "THnSparseT<TArrayD>")));
    std::fs::remove_file(&path).ok();
}

#[test]
fn missing_object_is_not_found() {
    let mut w = RootFileWriter::new();
    w.add_histogram("a", &h2()).unwrap();
    let path = write_fixture("notfound.root", &w);

    let err = jetana_root::read(&path, "nope").unwrap_err();
    assert!(err.is_not_found(), "expected NotFound, got {:?}", err);
    std::fs::remove_file(&path).ok();
}

#[test]
fn garbage_file_is_io_failure() {
    let path = fixture_path("garbage.root");
    std::fs::write(&path, vec![7u8; 256]).unwrap();
    let err = jetana_root::read(&path, "h").unwrap_err();
    assert!(matches!(err, jetana_core::Error::IoFailure(_)), "got {:?}", err);
    std::fs::remove_file(&path).ok();
}

#[test]
fn oversized_sparse_reads_only_as_handle() {
    let axes: Vec<Axis> = (0..6).map(|i| Axis::uniform(100, 0.0, 1.0, format!("a{}", i)).unwrap()).collect();
    let mut s = SparseHistogram::new("hWide", axes).unwrap();
    s.fill(&[0.5; 6], 2.0).unwrap();
    let mut w = RootFileWriter::new();
    w.add_sparse("hWide", &s).unwrap();
    let path = write_fixture("wide.root", &w);

    let err = jetana_root::read(&path, "hWide").unwrap_err();
    assert!(matches!(err, jetana_core::Error::UnsupportedShape(_)), "got {:?}", err);
    let handle = jetana_root::read_sparse(&path, "hWide").unwrap();
    assert_eq!(handle.n_filled(), 1);
    assert_eq!(handle.ndim(), 6);
    std::fs::remove_file(&path).ok();
}

mod roundtrip {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static CASE: AtomicUsize = AtomicUsize::new(0);

    fn contents() -> impl Strategy<Value = (usize, usize, Vec<(f64, f64)>)> {
        (1usize..6, 1usize..5).prop_flat_map(|(nx, ny)| {
            (Just(nx), Just(ny), prop::collection::vec((-1e6f64..1e6, 0.0f64..1e3), nx * ny))
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn written_th2d_reads_back_through_both_backends((nx, ny, cells) in contents()) {
            let x = Axis::uniform(nx, -1.0, 1.0, "x").unwrap();
            let y = Axis::uniform(ny, 0.0, 5.0, "y").unwrap();
            let values: Vec<f64> = cells.iter().map(|c| c.0).collect();
            let errors: Vec<f64> = cells.iter().map(|c| c.1).collect();
            let h = Histogram::new("hRandom", vec![x, y], values, errors, BackendTag::Computed).unwrap();

            let mut w = RootFileWriter::new().with_compression(1);
            w.add_histogram("d/hRandom", &h).unwrap();
            let path = write_fixture(&format!("roundtrip-{}.root", CASE.fetch_add(1, Ordering::Relaxed)), &w);

            for backend in [&MmapBackend as &dyn HistogramBackend, &StreamerBackend] {
                let got = backend.read(&path, "d/hRandom").unwrap();
                prop_assert_eq!(got.shape(), vec![ny, nx]);
                for (a, b) in got.values.iter().zip(&h.values) {
                    prop_assert!((a - b).abs() <= 1e-9 * b.abs().max(1.0));
                }
                for (a, b) in got.errors.iter().zip(&h.errors) {
                    prop_assert!((a - b).abs() <= 1e-9 * b.abs().max(1.0));
                }
            }
            std::fs::remove_file(&path).ok();
        }
    }
}
