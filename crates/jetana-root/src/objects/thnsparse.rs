//! `THnSparseT<TArray*>` deserialization.
//!
//! ```text
//! THnSparseT<TArrayD>
//!   └─ THnSparse
//!        ├─ THnBase
//!        │    ├─ TNamed
//!        │    ├─ fNdimensions (i32)
//!        │    ├─ fAxes (TObjArray of TAxis)
//!        │    ├─ fEntries, fTsumw, fTsumw2 (f64)
//!        │    └─ fTsumwx, fTsumwx2 (TArrayD)
//!        ├─ fChunkSize (i32)
//!        ├─ fFilledBins (i64)
//!        └─ fBinContent (TObjArray of THnSparseArrayChunk)
//!
//! THnSparseArrayChunk
//!   ├─ TObject
//!   ├─ fSingleCoordinateSize, fCoordinatesSize (i32)
//!   ├─ fCoordinates (flag byte + fCoordinatesSize bytes)
//!   ├─ fContent (pointer to TArray*)
//!   └─ fSumw2 (pointer to TArrayD, null without errors)
//! ```
//!
//! Bin coordinates are bit-packed little-endian, `num_bits(nbins + 2)` bits per
//! axis, in axis order.

use super::pointer::{ClassRefs, read_object_any, read_tobjarray};
use super::th::read_taxis;
use super::{ArrayKind, RawAxis};
use crate::error::{Result, RootError};
use crate::rbuffer::RBuffer;

/// One filled bin of a stored sparse histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseObjectBin {
    /// ROOT bin coordinates (0 underflow, n+1 overflow).
    pub coords: Vec<u32>,
    /// Bin content.
    pub content: f64,
    /// Sum of squared weights, when stored.
    pub sumw2: Option<f64>,
}

/// A decoded THnSparse.
#[derive(Debug, Clone)]
pub struct SparseObject {
    /// Object name.
    pub name: String,
    /// Object title.
    pub title: String,
    /// One axis per dimension.
    pub axes: Vec<RawAxis>,
    /// Stored number of entries.
    pub entries: f64,
    /// Filled bins in storage order.
    pub bins: Vec<SparseObjectBin>,
    /// Content type of the chunks.
    pub kind: ArrayKind,
}

impl SparseObject {
    /// Whether every chunk carried a sum of squared weights.
    pub fn has_sumw2(&self) -> bool {
        !self.bins.is_empty() && self.bins.iter().all(|b| b.sumw2.is_some())
    }
}

/// Content type of a sparse class name (`THnSparseT<TArrayF>` or `THnSparseF`).
pub fn sparse_class(class: &str) -> Option<ArrayKind> {
    if let Some(inner) = class.strip_prefix("THnSparseT<").and_then(|s| s.strip_suffix('>')) {
        return ArrayKind::from_array_class(inner.trim());
    }
    let suffix = class.strip_prefix("THnSparse")?;
    let mut chars = suffix.chars();
    let kind = ArrayKind::from_suffix(chars.next()?)?;
    if chars.next().is_some() {
        return None;
    }
    Some(kind)
}

/// Number of bits ROOT uses to store a coordinate in `0..n`.
pub fn num_bits(n: u32) -> u32 {
    let mut r = u32::from(n > 0);
    let mut n = n;
    loop {
        n /= 2;
        if n == 0 {
            return r;
        }
        r += 1;
    }
}

/// Bit offsets of every axis in a packed coordinate, plus the total.
pub(crate) fn bit_offsets(n_bins: impl IntoIterator<Item = usize>) -> Vec<u32> {
    let mut offsets = vec![0u32];
    for n in n_bins {
        let prev = offsets[offsets.len() - 1];
        offsets.push(prev + num_bits(n as u32 + 2));
    }
    offsets
}

fn unpack(buf: &[u8], offsets: &[u32]) -> Vec<u32> {
    offsets
        .windows(2)
        .map(|w| {
            let mut v = 0u32;
            for (i, bit) in (w[0]..w[1]).enumerate() {
                if (buf[(bit / 8) as usize] >> (bit % 8)) & 1 == 1 {
                    v |= 1 << i;
                }
            }
            v
        })
        .collect()
}

struct Chunk {
    single: usize,
    coordinates: Vec<u8>,
    content: Vec<f64>,
    sumw2: Option<Vec<f64>>,
}

pub(crate) fn read_thnsparse(r: &mut RBuffer, kind: ArrayKind) -> Result<SparseObject> {
    let mut refs = ClassRefs::new();

    let (_ver, end_t) = r.read_version()?;
    let (_ver, end_s) = r.read_version()?;

    // THnBase
    let (_ver, end_b) = r.read_version()?;
    let (name, title) = r.read_tnamed()?;
    let ndim = r.read_len()?;
    let axes = read_tobjarray(r, &mut refs, |r, _, class| match class {
        "TAxis" => read_taxis(r),
        other => Err(RootError::Deserialization(format!("expected TAxis in fAxes, got {}", other))),
    })?;
    let axes: Vec<RawAxis> = axes
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| RootError::Deserialization(format!("'{}': null axis in fAxes", name)))?;
    if axes.len() != ndim {
        return Err(RootError::Deserialization(format!(
            "'{}': fNdimensions {} but {} axes",
            name,
            ndim,
            axes.len()
        )));
    }
    let entries = r.read_f64()?;
    let _tsumw = r.read_f64()?;
    let _tsumw2 = r.read_f64()?;
    let _tsumwx = r.read_tarray_d()?;
    let _tsumwx2 = r.read_tarray_d()?;
    r.seek_end(end_b)?;

    // THnSparse
    let _chunk_size = r.read_i32()?;
    let filled = r.read_i64()?;
    let chunks = read_tobjarray(r, &mut refs, |r, refs, class| match class {
        "THnSparseArrayChunk" => read_chunk(r, refs, kind),
        other => Err(RootError::Deserialization(format!(
            "expected THnSparseArrayChunk in fBinContent, got {}",
            other
        ))),
    })?;
    r.seek_end(end_s)?;
    r.seek_end(end_t)?;

    let offsets = bit_offsets(axes.iter().map(|a| a.n_bins));
    let packed_len = (offsets[ndim] as usize).div_ceil(8);
    let mut bins = Vec::with_capacity(usize::try_from(filled).unwrap_or(0).min(1 << 24));
    for chunk in chunks.into_iter().flatten() {
        if chunk.single == 0 {
            continue;
        }
        if chunk.single != packed_len {
            return Err(RootError::Deserialization(format!(
                "'{}': coordinate size {} does not match {} packed bits",
                name, chunk.single, offsets[ndim]
            )));
        }
        let n = chunk.coordinates.len() / chunk.single;
        if chunk.content.len() < n || chunk.sumw2.as_ref().is_some_and(|s| s.len() < n) {
            return Err(RootError::Deserialization(format!(
                "'{}': chunk holds {} coordinates but fewer contents",
                name, n
            )));
        }
        for (i, packed) in chunk.coordinates.chunks_exact(chunk.single).enumerate() {
            bins.push(SparseObjectBin {
                coords: unpack(packed, &offsets),
                content: chunk.content[i],
                sumw2: chunk.sumw2.as_ref().map(|s| s[i]),
            });
        }
    }
    if filled >= 0 && bins.len() as i64 != filled {
        log::debug!("'{}': fFilledBins {} but {} coordinates stored", name, filled, bins.len());
    }

    Ok(SparseObject { name, title, axes, entries, bins, kind })
}

fn read_chunk(r: &mut RBuffer, refs: &mut ClassRefs, kind: ArrayKind) -> Result<Chunk> {
    let (_ver, end) = r.read_version()?;
    r.read_tobject()?;
    let single = r.read_len()?;
    let size = r.read_len()?;
    let has_coordinates = r.read_u8()? != 0;
    let coordinates = if has_coordinates { r.read_bytes(size)?.to_vec() } else { Vec::new() };

    let content = read_object_any(r, refs, &mut |r, _, class| {
        let found = ArrayKind::from_array_class(class)
            .ok_or_else(|| RootError::Deserialization(format!("chunk content of class {}", class)))?;
        if found != kind {
            log::debug!("chunk content is {} inside a {} histogram", class, kind.array_class());
        }
        let n = r.read_len()?;
        found.read_values(r, n)
    })?
    .ok_or_else(|| RootError::Deserialization("chunk without content array".into()))?;

    let sumw2 = read_object_any(r, refs, &mut |r, _, class| match class {
        "TArrayD" => r.read_tarray_d(),
        other => Err(RootError::Deserialization(format!("chunk errors of class {}", other))),
    })?;

    r.seek_end(end)?;
    Ok(Chunk { single, coordinates, content, sumw2 })
}
