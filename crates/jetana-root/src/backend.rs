//! Histogram backends and the fallback reader.
//!
//! [`MmapBackend`] maps the file and decodes `TH{1,2,3}{D,F}` contents straight
//! from the mapped bytes. [`StreamerBackend`] reads the file into memory and
//! walks the full streamer layout, so it also understands integer contents and
//! `THnSparse`. [`Reader`] tries the first and falls back to the second.
//!
//! Both produce values addressed `[outermost axis, ..., innermost axis]`
//! (axis 0 varies fastest in the flat array), and both drop the file before
//! returning.

use std::path::Path;

use jetana_core::histogram::dense_cell_count;
use jetana_core::{Axis, BackendTag, Error, Histogram, RangedAxis, Result, SparseHistogram};

use crate::file::RootFile;
use crate::key::KeyInfo;
use crate::objects::{self, DenseObject, RawAxis, SparseObject, StreamedObject};

/// One way of turning a stored object into a [`Histogram`].
pub trait HistogramBackend {
    /// Tag stamped on histograms produced by this backend.
    fn tag(&self) -> BackendTag;

    /// Open `path` the way this backend reads files.
    fn open(&self, path: &Path) -> Result<RootFile>;

    /// Decode the object at `name` (`dir/sub/name[;cycle]`) from an open file.
    fn decode(&self, file: &RootFile, name: &str) -> Result<Histogram>;

    /// Decode the object at `name` as a projectable sparse handle.
    fn decode_sparse(&self, file: &RootFile, name: &str) -> Result<SparseHistogram>;

    /// Open `path`, decode `name`, close the file.
    fn read(&self, path: &Path, name: &str) -> Result<Histogram> {
        let file = self.open(path)?;
        self.decode(&file, name)
    }
}

/// Typed, zero-copy backend for floating-point dense histograms.
#[derive(Debug, Default, Clone, Copy)]
pub struct MmapBackend;

impl HistogramBackend for MmapBackend {
    fn tag(&self) -> BackendTag {
        BackendTag::Mmap
    }

    fn open(&self, path: &Path) -> Result<RootFile> {
        Ok(RootFile::open(path)?)
    }

    fn decode(&self, file: &RootFile, name: &str) -> Result<Histogram> {
        let key = file.find_key(name)?;
        let payload = file.payload(&key)?;
        let obj = objects::read_typed(&payload, &key.class_name)?;
        dense_to_histogram(obj, self.tag())
    }

    fn decode_sparse(&self, file: &RootFile, name: &str) -> Result<SparseHistogram> {
        let key = file.find_key(name)?;
        let payload = file.payload(&key)?;
        let obj = objects::read_typed(&payload, &key.class_name)?;
        dense_to_handle(obj, self.tag())
    }
}

/// Streamer-walking backend; slower, accepts every supported class.
#[derive(Debug, Default, Clone, Copy)]
pub struct StreamerBackend;

impl StreamerBackend {
    fn streamed(&self, file: &RootFile, name: &str) -> Result<StreamedObject> {
        let key = file.find_key(name)?;
        let payload = file.payload(&key)?;
        Ok(objects::read_streamed(&payload, key.key_len as usize, &key.class_name)?)
    }
}

impl HistogramBackend for StreamerBackend {
    fn tag(&self) -> BackendTag {
        BackendTag::Streamer
    }

    fn open(&self, path: &Path) -> Result<RootFile> {
        Ok(RootFile::open_owned(path)?)
    }

    fn decode(&self, file: &RootFile, name: &str) -> Result<Histogram> {
        match self.streamed(file, name)? {
            StreamedObject::Dense(obj) => dense_to_histogram(obj, self.tag()),
            StreamedObject::Sparse(obj) => sparse_to_handle(obj, self.tag())?.materialize(),
        }
    }

    fn decode_sparse(&self, file: &RootFile, name: &str) -> Result<SparseHistogram> {
        match self.streamed(file, name)? {
            StreamedObject::Dense(obj) => dense_to_handle(obj, self.tag()),
            StreamedObject::Sparse(obj) => sparse_to_handle(obj, self.tag()),
        }
    }
}

/// Reads histograms with a primary backend and falls back to a second one.
pub struct Reader {
    primary: Box<dyn HistogramBackend>,
    fallback: Box<dyn HistogramBackend>,
}

impl Default for Reader {
    fn default() -> Self {
        Self::new(Box::new(MmapBackend), Box::new(StreamerBackend))
    }
}

impl Reader {
    /// Reader trying `primary` first.
    pub fn new(primary: Box<dyn HistogramBackend>, fallback: Box<dyn HistogramBackend>) -> Self {
        Self { primary, fallback }
    }

    /// Read the histogram `name` from `path`.
    ///
    /// Any failure of the primary backend is logged and the fallback is tried;
    /// only the fallback's error reaches the caller.
    pub fn read(&self, path: impl AsRef<Path>, name: &str) -> Result<Histogram> {
        let path = path.as_ref();
        self.primary.read(path, name).or_else(|e| {
            self.warn_fallback(path, name, &e);
            self.fallback.read(path, name)
        })
    }

    /// Read `name` from `path` as a projectable sparse handle.
    pub fn read_sparse(&self, path: impl AsRef<Path>, name: &str) -> Result<SparseHistogram> {
        let path = path.as_ref();
        let primary = self.primary.open(path).and_then(|f| self.primary.decode_sparse(&f, name));
        primary.or_else(|e| {
            self.warn_fallback(path, name, &e);
            let file = self.fallback.open(path)?;
            self.fallback.decode_sparse(&file, name)
        })
    }

    /// Read several histograms, opening the file at most once per backend.
    ///
    /// Names neither backend can read are skipped with a warning. Fails only
    /// when the file cannot be opened at all.
    pub fn load_histograms(&self, path: impl AsRef<Path>, names: &[&str]) -> Result<Vec<Histogram>> {
        let path = path.as_ref();
        let primary = match self.primary.open(path) {
            Ok(f) => Some(f),
            Err(e) => {
                log::warn!("{} backend cannot open {}: {}", self.primary.tag().as_str(), path.display(), e);
                None
            }
        };
        let mut fallback: Option<RootFile> = None;

        let mut out = Vec::with_capacity(names.len());
        for &name in names {
            let first = match &primary {
                Some(f) => self.primary.decode(f, name),
                None => Err(Error::IoFailure(format!("{} not opened", path.display()))),
            };
            let h = match first {
                Ok(h) => Ok(h),
                Err(e) => {
                    self.warn_fallback(path, name, &e);
                    if fallback.is_none() {
                        fallback = Some(self.fallback.open(path)?);
                    }
                    match &fallback {
                        Some(f) => self.fallback.decode(f, name),
                        None => Err(Error::IoFailure(format!("{} not opened", path.display()))),
                    }
                }
            };
            match h {
                Ok(h) => out.push(h),
                Err(e) => log::warn!("skipping '{}' from {}: {}", name, path.display(), e),
            }
        }
        Ok(out)
    }

    fn warn_fallback(&self, path: &Path, name: &str, e: &Error) {
        log::warn!(
            "{} backend failed on '{}' in {}: {}; retrying with {} backend",
            self.primary.tag().as_str(),
            name,
            path.display(),
            e,
            self.fallback.tag().as_str()
        );
    }
}

/// Object inventory of a file, descending into subdirectories.
pub fn list_keys(path: impl AsRef<Path>) -> Result<Vec<KeyInfo>> {
    let file = RootFile::open(path)?;
    Ok(file.list_keys()?)
}

fn to_axis(raw: &RawAxis) -> Result<Axis> {
    Axis::new(raw.bin_edges(), raw.title.clone())
}

fn to_ranged_axis(raw: &RawAxis) -> Result<RangedAxis> {
    let first = usize::try_from(raw.first).unwrap_or(0);
    let last = usize::try_from(raw.last).unwrap_or(0);
    Ok(RangedAxis::with_stored_range(to_axis(raw)?, first, last))
}

/// Regular bins of a cell array with one flow bin on each side of every axis.
fn strip_flows(cells: &[f64], counts: &[usize]) -> Vec<f64> {
    let n: usize = counts.iter().product();
    let mut out = Vec::with_capacity(n);
    let mut idx = vec![0usize; counts.len()];
    for _ in 0..n {
        let mut cell = 0;
        let mut stride = 1;
        for (&i, &c) in idx.iter().zip(counts) {
            cell += (i + 1) * stride;
            stride *= c + 2;
        }
        out.push(cells[cell]);
        for (i, &c) in idx.iter_mut().zip(counts) {
            *i += 1;
            if *i < c {
                break;
            }
            *i = 0;
        }
    }
    out
}

fn dense_to_histogram(obj: DenseObject, source: BackendTag) -> Result<Histogram> {
    let axes = obj.axes.iter().map(to_axis).collect::<Result<Vec<_>>>()?;
    let counts: Vec<usize> = axes.iter().map(Axis::n_bins).collect();
    let n_cells = dense_cell_count(&obj.name, counts.iter().map(|c| c + 2))?;
    if obj.contents.len() != n_cells {
        return Err(Error::IoFailure(format!(
            "'{}': {} cells stored for axes with {} cells",
            obj.name,
            obj.contents.len(),
            n_cells
        )));
    }
    let values = strip_flows(&obj.contents, &counts);
    let errors = if obj.sumw2.is_empty() {
        values.iter().map(|v| v.abs().sqrt()).collect()
    } else {
        strip_flows(&obj.sumw2, &counts).iter().map(|w| w.max(0.0).sqrt()).collect()
    };
    log::debug!("decoded '{}' ({:?}, {} axes) via {}", obj.name, obj.kind, axes.len(), source.as_str());
    Ok(Histogram::new(obj.name, axes, values, errors, source)?.titled(obj.title))
}

fn dense_to_handle(obj: DenseObject, source: BackendTag) -> Result<SparseHistogram> {
    let ranged = obj.axes.iter().map(to_ranged_axis).collect::<Result<Vec<_>>>()?;
    let h = dense_to_histogram(obj, source)?;
    let mut handle = SparseHistogram::from_histogram(&h)?;
    for (i, axis) in ranged.iter().enumerate() {
        if axis.is_restricted() {
            let (first, last) = axis.range();
            if let Some(a) = handle.axis_mut(i) {
                a.set_range(first as i64, last as i64);
            }
        }
    }
    Ok(handle)
}

fn sparse_to_handle(obj: SparseObject, source: BackendTag) -> Result<SparseHistogram> {
    let axes = obj.axes.iter().map(to_ranged_axis).collect::<Result<Vec<_>>>()?;
    let has_sumw2 = obj.has_sumw2();
    let mut handle = SparseHistogram::with_ranged_axes(obj.name, axes)?;
    handle.title = obj.title;
    handle.source = source;
    if has_sumw2 {
        handle.enable_sumw2();
    }
    let ndim = handle.ndim();
    for bin in obj.bins {
        if bin.coords.len() != ndim {
            return Err(Error::IoFailure(format!(
                "'{}': bin with {} coordinates in a {}-dimensional histogram",
                handle.name,
                bin.coords.len(),
                ndim
            )));
        }
        let sumw2 = bin.sumw2.unwrap_or(bin.content);
        handle.add_bin(bin.coords, bin.content, sumw2);
    }
    Ok(handle)
}
