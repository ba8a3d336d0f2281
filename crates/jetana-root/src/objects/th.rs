//! TH1/TH2/TH3 deserialization.
//!
//! ROOT dense histogram layout (ROOT 6):
//! ```text
//! TH{1,2,3}{D,F,I,S,C}
//!   ├─ TH2 / TH3 (only for 2D/3D; stats follow the TH1 base, skipped via byte count)
//!   │    └─ TH1 (base)
//!   │         ├─ TNamed (name, title)
//!   │         ├─ TAttLine, TAttFill, TAttMarker (skipped via byte count)
//!   │         ├─ fNcells (i32)
//!   │         ├─ fXaxis, fYaxis, fZaxis (TAxis)
//!   │         ├─ fBarOffset, fBarWidth (i16), fEntries, fTsumw, fTsumw2, fTsumwx, fTsumwx2
//!   │         ├─ fMaximum, fMinimum (v ≥ 2), fNormFactor (v ≥ 3)
//!   │         ├─ fContour (TArrayD), fSumw2 (TArrayD)
//!   │         └─ fOption, fFunctions, fBuffer, ... (skipped via byte count)
//!   └─ TArray{D,F,I,S,C} (cell contents, fNcells values)
//! ```

use super::{ArrayKind, DenseObject, RawAxis};
use crate::error::{Result, RootError};
use crate::rbuffer::RBuffer;

/// A floating-point element type decoded directly from big-endian bytes.
pub(crate) trait Element {
    const KIND: ArrayKind;
    fn decode(bytes: &[u8]) -> Vec<f64>;
}

impl Element for f64 {
    const KIND: ArrayKind = ArrayKind::F64;

    fn decode(bytes: &[u8]) -> Vec<f64> {
        bytes
            .chunks_exact(8)
            .map(|b| f64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect()
    }
}

impl Element for f32 {
    const KIND: ArrayKind = ArrayKind::F32;

    fn decode(bytes: &[u8]) -> Vec<f64> {
        bytes.chunks_exact(4).map(|b| f32::from_be_bytes([b[0], b[1], b[2], b[3]]) as f64).collect()
    }
}

/// Fields of the TH1 base class we keep.
struct Th1Base {
    name: String,
    title: String,
    n_cells: usize,
    axes: [RawAxis; 3],
    entries: f64,
    sumw2: Vec<f64>,
}

/// Decode a dense histogram whose contents are `T`.
pub(crate) fn read_dense<T: Element>(data: &[u8], ndim: usize) -> Result<DenseObject> {
    let mut r = RBuffer::new(data);
    let (outer_end, base) = read_header_and_base(&mut r, ndim)?;
    let n = r.read_len()?;
    check_cells(n, base.n_cells)?;
    let bytes = r.read_bytes(n * T::KIND.size())?;
    let contents = T::decode(bytes);
    r.seek_end(outer_end)?;
    Ok(assemble(base, ndim, contents, T::KIND))
}

/// Decode a dense histogram of any content type.
pub(crate) fn read_dense_dyn(data: &[u8], ndim: usize, kind: ArrayKind) -> Result<DenseObject> {
    let mut r = RBuffer::new(data);
    let (outer_end, base) = read_header_and_base(&mut r, ndim)?;
    let n = r.read_len()?;
    check_cells(n, base.n_cells)?;
    let contents = kind.read_values(&mut r, n)?;
    r.seek_end(outer_end)?;
    Ok(assemble(base, ndim, contents, kind))
}

fn read_header_and_base(r: &mut RBuffer, ndim: usize) -> Result<(Option<usize>, Th1Base)> {
    let (ver, outer_end) = r.read_version()?;
    if ver < 1 {
        return Err(RootError::Deserialization(format!("unsupported histogram version: {}", ver)));
    }
    let base = if ndim > 1 {
        // TH2 / TH3 wrapper around TH1
        let (_ver, mid_end) = r.read_version()?;
        let base = read_th1_base(r)?;
        if mid_end.is_none() {
            return Err(RootError::Deserialization(format!("TH{} base without byte count", ndim)));
        }
        r.seek_end(mid_end)?;
        base
    } else {
        read_th1_base(r)?
    };
    Ok((outer_end, base))
}

fn check_cells(n: usize, n_cells: usize) -> Result<()> {
    if n != n_cells {
        return Err(RootError::Deserialization(format!(
            "content array size {} != fNcells {}",
            n, n_cells
        )));
    }
    Ok(())
}

fn assemble(base: Th1Base, ndim: usize, contents: Vec<f64>, kind: ArrayKind) -> DenseObject {
    let sumw2 = if base.sumw2.len() == base.n_cells { base.sumw2 } else { Vec::new() };
    let [x, y, z] = base.axes;
    let mut axes = vec![x, y, z];
    axes.truncate(ndim);
    DenseObject {
        name: base.name,
        title: base.title,
        axes,
        contents,
        sumw2,
        entries: base.entries,
        kind,
    }
}

fn read_th1_base(r: &mut RBuffer) -> Result<Th1Base> {
    let (th1_ver, th1_end) = r.read_version()?;
    let Some(th1_end) = th1_end else {
        return Err(RootError::Deserialization("TH1 base without byte count".into()));
    };

    let (name, title) = r.read_tnamed()?;

    // TAttLine, TAttFill, TAttMarker
    r.skip_object()?;
    r.skip_object()?;
    r.skip_object()?;

    let n_cells = r.read_len()?;

    let x = read_taxis(r)?;
    let y = read_taxis(r)?;
    let z = read_taxis(r)?;

    let _bar_offset = r.read_i16()?;
    let _bar_width = r.read_i16()?;
    let entries = r.read_f64()?;
    let _tsumw = r.read_f64()?;
    let _tsumw2 = r.read_f64()?;
    let _tsumwx = r.read_f64()?;
    let _tsumwx2 = r.read_f64()?;
    if th1_ver >= 2 {
        let _max = r.read_f64()?;
        let _min = r.read_f64()?;
    }
    if th1_ver >= 3 {
        let _norm = r.read_f64()?;
    }

    let contour_n = r.read_len()?;
    r.skip(contour_n * 8)?;
    let sumw2 = r.read_tarray_d()?;

    // fOption, fFunctions, fBuffer and later members are not needed.
    r.seek_end(Some(th1_end))?;

    Ok(Th1Base { name, title, n_cells, axes: [x, y, z], entries, sumw2 })
}

/// Read a TAxis.
pub(crate) fn read_taxis(r: &mut RBuffer) -> Result<RawAxis> {
    let (_ver, axis_end) = r.read_version()?;
    let Some(axis_end) = axis_end else {
        return Err(RootError::Deserialization("TAxis without byte count".into()));
    };

    let (name, title) = r.read_tnamed()?;
    // TAttAxis
    r.skip_object()?;

    let n_bins = r.read_len()?;
    let x_min = r.read_f64()?;
    let x_max = r.read_f64()?;
    let edges = r.read_tarray_d()?;
    if !edges.is_empty() && edges.len() != n_bins + 1 {
        return Err(RootError::Deserialization(format!(
            "axis '{}' has {} bins but {} edges",
            name,
            n_bins,
            edges.len()
        )));
    }
    let first = r.read_i32()?;
    let last = r.read_i32()?;

    // fBits2, fTimeDisplay, fTimeFormat, fLabels, fModLabs
    r.seek_end(Some(axis_end))?;

    Ok(RawAxis { name, title, n_bins, x_min, x_max, edges, first, last })
}
