//! ROOT object deserialization dispatch.
//!
//! Two entry points mirror the two read paths:
//! - [`read_typed`] decodes only `TH{1,2,3}{D,F}` and reads bin contents
//!   straight out of the payload slice.
//! - [`read_streamed`] walks the full streamer layout and additionally accepts
//!   integer-content histograms and `THnSparseT<TArray*>`.

mod pointer;
mod th;
mod thnsparse;

pub use pointer::ClassRefs;
pub use thnsparse::{SparseObject, SparseObjectBin, num_bits};

use crate::error::{Result, RootError};
use crate::rbuffer::RBuffer;

/// Element type of a ROOT `TArray*` or histogram class suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    /// `TArrayD` / `...D`
    F64,
    /// `TArrayF` / `...F`
    F32,
    /// `TArrayL64` / `...L`
    I64,
    /// `TArrayI` / `...I`
    I32,
    /// `TArrayS` / `...S`
    I16,
    /// `TArrayC` / `...C`
    I8,
}

impl ArrayKind {
    /// From a class-name suffix letter (`TH2F` → `F`).
    pub fn from_suffix(c: char) -> Option<Self> {
        match c {
            'D' => Some(Self::F64),
            'F' => Some(Self::F32),
            'L' => Some(Self::I64),
            'I' => Some(Self::I32),
            'S' => Some(Self::I16),
            'C' => Some(Self::I8),
            _ => None,
        }
    }

    /// From a `TArray*` class name.
    pub fn from_array_class(class: &str) -> Option<Self> {
        match class {
            "TArrayD" => Some(Self::F64),
            "TArrayF" => Some(Self::F32),
            "TArrayL64" | "TArrayL" => Some(Self::I64),
            "TArrayI" => Some(Self::I32),
            "TArrayS" => Some(Self::I16),
            "TArrayC" => Some(Self::I8),
            _ => None,
        }
    }

    /// Matching `TArray*` class name.
    pub fn array_class(&self) -> &'static str {
        match self {
            Self::F64 => "TArrayD",
            Self::F32 => "TArrayF",
            Self::I64 => "TArrayL64",
            Self::I32 => "TArrayI",
            Self::I16 => "TArrayS",
            Self::I8 => "TArrayC",
        }
    }

    /// Histogram class suffix letter.
    pub fn suffix(&self) -> char {
        match self {
            Self::F64 => 'D',
            Self::F32 => 'F',
            Self::I64 => 'L',
            Self::I32 => 'I',
            Self::I16 => 'S',
            Self::I8 => 'C',
        }
    }

    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::F64 | Self::I64 => 8,
            Self::F32 | Self::I32 => 4,
            Self::I16 => 2,
            Self::I8 => 1,
        }
    }

    /// Read `n` elements, widening to f64.
    pub fn read_values(&self, r: &mut RBuffer, n: usize) -> Result<Vec<f64>> {
        let bytes = r.read_bytes(n.checked_mul(self.size()).ok_or_else(|| {
            RootError::Deserialization(format!("array of {} elements overflows", n))
        })?)?;
        Ok(match self {
            Self::F64 => bytes
                .chunks_exact(8)
                .map(|b| f64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                .collect(),
            Self::F32 => {
                bytes.chunks_exact(4).map(|b| f32::from_be_bytes([b[0], b[1], b[2], b[3]]) as f64).collect()
            }
            Self::I64 => bytes
                .chunks_exact(8)
                .map(|b| i64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f64)
                .collect(),
            Self::I32 => {
                bytes.chunks_exact(4).map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]) as f64).collect()
            }
            Self::I16 => bytes.chunks_exact(2).map(|b| i16::from_be_bytes([b[0], b[1]]) as f64).collect(),
            Self::I8 => bytes.iter().map(|&b| b as i8 as f64).collect(),
        })
    }
}

/// Axis information extracted from a streamed TAxis.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAxis {
    /// Axis name (`xaxis`, `yaxis`, ...).
    pub name: String,
    /// Axis title, used as the label.
    pub title: String,
    /// Number of regular bins.
    pub n_bins: usize,
    /// Lower edge of the first bin.
    pub x_min: f64,
    /// Upper edge of the last bin.
    pub x_max: f64,
    /// Variable-width bin edges (empty for uniform binning).
    pub edges: Vec<f64>,
    /// First bin of the stored active range.
    pub first: i32,
    /// Last bin of the stored active range.
    pub last: i32,
}

impl RawAxis {
    /// Bin edges, expanding uniform binning.
    pub fn bin_edges(&self) -> Vec<f64> {
        if !self.edges.is_empty() {
            return self.edges.clone();
        }
        let width = (self.x_max - self.x_min) / self.n_bins.max(1) as f64;
        (0..=self.n_bins).map(|i| self.x_min + i as f64 * width).collect()
    }
}

/// A dense TH1/TH2/TH3 as stored: cell arrays include under/overflow.
#[derive(Debug, Clone)]
pub struct DenseObject {
    /// Object name.
    pub name: String,
    /// Object title.
    pub title: String,
    /// The first `ndim` axes (x, y, z).
    pub axes: Vec<RawAxis>,
    /// Cell contents, `(nx+2)(ny+2)(nz+2)` values, x fastest.
    pub contents: Vec<f64>,
    /// Per-cell sum of squared weights; empty when not stored.
    pub sumw2: Vec<f64>,
    /// Stored number of entries.
    pub entries: f64,
    /// Element type of the stored contents.
    pub kind: ArrayKind,
}

/// Any object the streamer path can decode.
#[derive(Debug, Clone)]
pub enum StreamedObject {
    /// TH1/TH2/TH3 of any content type.
    Dense(DenseObject),
    /// THnSparse of any content type.
    Sparse(SparseObject),
}

/// Dimension and content type of a dense histogram class (`TH2F` → (2, F32)).
pub fn dense_class(class: &str) -> Option<(usize, ArrayKind)> {
    let rest = class.strip_prefix("TH")?;
    let mut chars = rest.chars();
    let ndim = match chars.next()? {
        '1' => 1,
        '2' => 2,
        '3' => 3,
        _ => return None,
    };
    let kind = ArrayKind::from_suffix(chars.next()?)?;
    if chars.next().is_some() {
        return None;
    }
    Some((ndim, kind))
}

/// Decode a dense histogram with floating-point contents.
pub fn read_typed(payload: &[u8], class: &str) -> Result<DenseObject> {
    match class {
        "TH1D" => th::read_dense::<f64>(payload, 1),
        "TH1F" => th::read_dense::<f32>(payload, 1),
        "TH2D" => th::read_dense::<f64>(payload, 2),
        "TH2F" => th::read_dense::<f32>(payload, 2),
        "TH3D" => th::read_dense::<f64>(payload, 3),
        "TH3F" => th::read_dense::<f32>(payload, 3),
        _ => Err(RootError::UnsupportedClass(class.to_string())),
    }
}

/// Decode any supported histogram object through its streamer layout.
///
/// `key_len` is needed to resolve class references inside the payload.
pub fn read_streamed(payload: &[u8], key_len: usize, class: &str) -> Result<StreamedObject> {
    if let Some(kind) = thnsparse::sparse_class(class) {
        let mut r = RBuffer::with_displacement(payload, key_len);
        return thnsparse::read_thnsparse(&mut r, kind).map(StreamedObject::Sparse);
    }
    let (ndim, kind) =
        dense_class(class).ok_or_else(|| RootError::UnsupportedClass(class.to_string()))?;
    th::read_dense_dyn(payload, ndim, kind).map(StreamedObject::Dense)
}
