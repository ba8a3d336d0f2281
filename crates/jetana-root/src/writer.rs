//! Minimal ROOT file writer for histograms.
//!
//! Writes `TH{1,2,3}{D,F,I}` and `THnSparseT<TArrayD>` objects into a small
//! (32-bit seek) file with optional zlib compression and nested
//! subdirectories. The output carries no `TStreamerInfo` record: it reads back
//! through [`RootFile`](crate::RootFile) and is used for fixtures and CLI
//! output.
//!
//! File layout:
//! ```text
//! header (fBEGIN = 100)
//! TFile key + name/title + TDirectory record
//! object keys (one per histogram, depth first)
//! subdirectory keys, their objects and key lists
//! top-level key list
//! ```

use std::path::{Path, PathBuf};

use jetana_core::{Axis, Histogram, SparseHistogram};

use crate::decompress::compress_zlib;
use crate::error::{Result, RootError};
use crate::objects::ArrayKind;
use crate::objects::num_bits;
use crate::wbuffer::WBuffer;

const FILE_VERSION: u32 = 63_006;
const BEGIN: usize = 100;
const KEY_VERSION: u16 = 4;
/// 2024-01-01 00:00:00 in ROOT's packed datime encoding.
const DATIME: u32 = ((2024 - 1995) << 26) | (1 << 22) | (1 << 17);
/// Size of a small-file TDirectory record.
const DIR_RECORD_LEN: usize = 2 + 4 * 7 + 18;
const DEFAULT_CHUNK_SIZE: usize = 1024 * 16;

struct PendingObject {
    class_name: String,
    name: String,
    title: String,
    cycle: u16,
    /// Serialized object body, built against the final key length.
    body: Vec<u8>,
}

#[derive(Default)]
struct DirNode {
    name: String,
    objects: Vec<PendingObject>,
    subdirs: Vec<DirNode>,
}

impl DirNode {
    fn subdir(&mut self, name: &str) -> &mut DirNode {
        let idx = match self.subdirs.iter().position(|d| d.name == name) {
            Some(i) => i,
            None => {
                self.subdirs.push(DirNode { name: name.to_string(), ..Default::default() });
                self.subdirs.len() - 1
            }
        };
        &mut self.subdirs[idx]
    }

    fn next_cycle(&self, name: &str) -> u16 {
        self.objects.iter().filter(|o| o.name == name).map(|o| o.cycle).max().unwrap_or(0) + 1
    }
}

/// Builder for a ROOT file holding histograms.
pub struct RootFileWriter {
    root: DirNode,
    compression: Option<u32>,
    chunk_size: usize,
}

impl Default for RootFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl RootFileWriter {
    /// Writer producing uncompressed objects.
    pub fn new() -> Self {
        Self { root: DirNode::default(), compression: None, chunk_size: DEFAULT_CHUNK_SIZE }
    }

    /// Compress object payloads with zlib at `level` (1..=9).
    pub fn with_compression(mut self, level: u32) -> Self {
        self.compression = Some(level.clamp(1, 9));
        self
    }

    /// Number of filled bins per `THnSparseArrayChunk`.
    pub fn with_sparse_chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = n.max(1);
        self
    }

    /// Store a dense histogram with double-precision contents at `path`
    /// (`dir/sub/name`). Re-adding a path bumps its cycle.
    pub fn add_histogram(&mut self, path: &str, h: &Histogram) -> Result<()> {
        self.add_histogram_as(path, h, ArrayKind::F64)
    }

    /// Store a dense histogram with contents of type `kind`.
    ///
    /// Integer kinds round contents to the nearest integer and drop errors.
    pub fn add_histogram_as(&mut self, path: &str, h: &Histogram, kind: ArrayKind) -> Result<()> {
        let ndim = h.ndim();
        if !(1..=3).contains(&ndim) {
            return Err(RootError::Serialization(format!(
                "'{}' has {} dimensions; dense histograms support 1 to 3",
                h.name, ndim
            )));
        }
        if !matches!(kind, ArrayKind::F64 | ArrayKind::F32 | ArrayKind::I32) {
            return Err(RootError::Serialization(format!(
                "writing {} contents is not supported",
                kind.array_class()
            )));
        }
        let class_name = format!("TH{}{}", ndim, kind.suffix());
        let (dir, name) = self.locate(path)?;
        let title = h.title.clone();
        let key_len = key_len(&class_name, &name, &title);
        let body = write_dense(h, &name, kind, key_len)?;
        let cycle = dir.next_cycle(&name);
        log::debug!("queued {} '{}' ({} bytes, cycle {})", class_name, path, body.len(), cycle);
        dir.objects.push(PendingObject { class_name, name, title, cycle, body });
        Ok(())
    }

    /// Store a sparse histogram as `THnSparseT<TArrayD>`, keeping axis ranges.
    pub fn add_sparse(&mut self, path: &str, h: &SparseHistogram) -> Result<()> {
        let class_name = "THnSparseT<TArrayD>".to_string();
        let chunk_size = self.chunk_size;
        let (dir, name) = self.locate(path)?;
        let title = h.title.clone();
        let key_len = key_len(&class_name, &name, &title);
        let body = write_sparse(h, &name, key_len, chunk_size)?;
        let cycle = dir.next_cycle(&name);
        log::debug!("queued sparse '{}' ({} bins, cycle {})", path, h.n_filled(), cycle);
        dir.objects.push(PendingObject { class_name, name, title, cycle, body });
        Ok(())
    }

    fn locate(&mut self, path: &str) -> Result<(&mut DirNode, String)> {
        let mut parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let name = parts
            .pop()
            .ok_or_else(|| RootError::Serialization(format!("empty object path '{}'", path)))?;
        if name.contains(';') {
            return Err(RootError::Serialization(format!("object name '{}' contains ';'", name)));
        }
        let mut dir = &mut self.root;
        for part in parts {
            if dir.objects.iter().any(|o| o.name == part) {
                return Err(RootError::Serialization(format!(
                    "'{}' already names an object, not a directory",
                    part
                )));
            }
            dir = dir.subdir(part);
        }
        Ok((dir, name.to_string()))
    }

    /// Serialize the whole file, using `file_name` as the TFile name.
    pub fn to_bytes(&self, file_name: &str) -> Result<Vec<u8>> {
        let mut out = FileBuf { data: vec![0u8; BEGIN], compression: self.compression };

        // TFile key: name/title strings then the top directory record.
        let top_key_len = key_len("TFile", file_name, "");
        let mut names = WBuffer::new(0);
        names.write_string(file_name);
        names.write_string("");
        let names = names.into_inner();
        let nbytes_name = top_key_len + names.len();
        let top_total = nbytes_name + DIR_RECORD_LEN;
        let header = key_header(&KeyFields {
            class_name: "TFile",
            name: file_name,
            title: "",
            n_bytes: to_u32(top_total)?,
            obj_len: to_u32(top_total - top_key_len)?,
            cycle: 1,
            seek_key: BEGIN as u32,
            seek_pdir: 0,
        });
        out.data.extend_from_slice(&header);
        out.data.extend_from_slice(&names);
        let record_pos = out.data.len();
        out.data.extend_from_slice(&dir_record(to_u32(nbytes_name)?, BEGIN as u32, 0));

        let top = DirRef { seek: BEGIN as u32, class_name: "TFile", name: file_name, title: "" };
        out.write_dir(&self.root, &top, record_pos)?;

        let end = to_u32(out.data.len())?;
        let mut head = WBuffer::new(0);
        head.write_bytes(b"root");
        head.write_u32(FILE_VERSION);
        head.write_u32(BEGIN as u32);
        head.write_u32(end); // fEND
        head.write_u32(0); // fSeekFree
        head.write_u32(0); // fNbytesFree
        head.write_u32(0); // nfree
        head.write_u32(to_u32(nbytes_name)?);
        head.write_u8(4); // fUnits
        head.write_u32(self.compression.map_or(0, |l| 100 + l));
        head.write_u32(0); // fSeekInfo
        head.write_u32(0); // fNbytesInfo
        head.write_u16(1);
        head.write_bytes(&[0u8; 16]);
        let head = head.into_inner();
        out.data[..head.len()].copy_from_slice(&head);
        Ok(out.data)
    }

    /// Write the file to `path`.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("output.root");
        let bytes = self.to_bytes(file_name)?;
        std::fs::write(path, &bytes)?;
        log::info!("wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(path.to_path_buf())
    }
}

struct KeyFields<'a> {
    class_name: &'a str,
    name: &'a str,
    title: &'a str,
    n_bytes: u32,
    obj_len: u32,
    cycle: u16,
    seek_key: u32,
    seek_pdir: u32,
}

struct DirRef<'a> {
    seek: u32,
    class_name: &'a str,
    name: &'a str,
    title: &'a str,
}

struct FileBuf {
    data: Vec<u8>,
    compression: Option<u32>,
}

impl FileBuf {
    fn pos(&self) -> Result<u32> {
        to_u32(self.data.len())
    }

    fn patch_u32(&mut self, at: usize, v: u32) {
        self.data[at..at + 4].copy_from_slice(&v.to_be_bytes());
    }

    /// Write the objects and subdirectories of `node`, then its key list,
    /// and patch the directory record at `record_pos`.
    fn write_dir(&mut self, node: &DirNode, me: &DirRef<'_>, record_pos: usize) -> Result<()> {
        let mut headers: Vec<Vec<u8>> = Vec::new();

        for obj in &node.objects {
            let seek_key = self.pos()?;
            let stored = match self.compression {
                Some(level) => compress_zlib(&obj.body, level)?,
                None => None,
            };
            let data = stored.as_deref().unwrap_or(&obj.body);
            let key_len = key_len(&obj.class_name, &obj.name, &obj.title);
            let header = key_header(&KeyFields {
                class_name: &obj.class_name,
                name: &obj.name,
                title: &obj.title,
                n_bytes: to_u32(key_len + data.len())?,
                obj_len: to_u32(obj.body.len())?,
                cycle: obj.cycle,
                seek_key,
                seek_pdir: me.seek,
            });
            self.data.extend_from_slice(&header);
            self.data.extend_from_slice(data);
            headers.push(header);
        }

        for sub in &node.subdirs {
            let seek_key = self.pos()?;
            let class_name = "TDirectoryFile";
            let key_len = key_len(class_name, &sub.name, &sub.name);
            let header = key_header(&KeyFields {
                class_name,
                name: &sub.name,
                title: &sub.name,
                n_bytes: to_u32(key_len + DIR_RECORD_LEN)?,
                obj_len: to_u32(DIR_RECORD_LEN)?,
                cycle: 1,
                seek_key,
                seek_pdir: me.seek,
            });
            self.data.extend_from_slice(&header);
            let sub_record = self.data.len();
            self.data.extend_from_slice(&dir_record(to_u32(key_len)?, seek_key, me.seek));
            headers.push(header);

            let sub_ref = DirRef { seek: seek_key, class_name, name: &sub.name, title: &sub.name };
            self.write_dir(sub, &sub_ref, sub_record)?;
        }

        // Key list: a key header for the list itself, nkeys, then the headers.
        let seek_keys = self.pos()?;
        let list_key_len = key_len(me.class_name, me.name, me.title);
        let body_len = 4 + headers.iter().map(Vec::len).sum::<usize>();
        let list_header = key_header(&KeyFields {
            class_name: me.class_name,
            name: me.name,
            title: me.title,
            n_bytes: to_u32(list_key_len + body_len)?,
            obj_len: to_u32(body_len)?,
            cycle: 1,
            seek_key: seek_keys,
            seek_pdir: me.seek,
        });
        let nbytes_keys = to_u32(list_header.len() + body_len)?;
        self.data.extend_from_slice(&list_header);
        self.data.extend_from_slice(&to_u32(headers.len())?.to_be_bytes());
        for h in &headers {
            self.data.extend_from_slice(h);
        }

        self.patch_u32(record_pos + 10, nbytes_keys);
        self.patch_u32(record_pos + 26, seek_keys);
        Ok(())
    }
}

fn to_u32(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| RootError::Serialization("file exceeds 4 GiB".into()))
}

fn string_len(s: &str) -> usize {
    if s.len() < 255 { 1 + s.len() } else { 5 + s.len() }
}

/// Length of a small-file key header.
fn key_len(class_name: &str, name: &str, title: &str) -> usize {
    4 + 2 + 4 + 4 + 2 + 2 + 4 + 4 + string_len(class_name) + string_len(name) + string_len(title)
}

fn key_header(k: &KeyFields<'_>) -> Vec<u8> {
    let mut w = WBuffer::new(0);
    w.write_u32(k.n_bytes);
    w.write_u16(KEY_VERSION);
    w.write_u32(k.obj_len);
    w.write_u32(DATIME);
    w.write_u16(key_len(k.class_name, k.name, k.title) as u16);
    w.write_u16(k.cycle);
    w.write_u32(k.seek_key);
    w.write_u32(k.seek_pdir);
    w.write_string(k.class_name);
    w.write_string(k.name);
    w.write_string(k.title);
    w.into_inner()
}

/// TDirectory record; `nbytes_keys` and `seek_keys` are patched later.
fn dir_record(nbytes_name: u32, seek_dir: u32, seek_parent: u32) -> Vec<u8> {
    let mut w = WBuffer::new(0);
    w.write_u16(5);
    w.write_u32(DATIME);
    w.write_u32(DATIME);
    w.write_u32(0); // fNbytesKeys
    w.write_u32(nbytes_name);
    w.write_u32(seek_dir);
    w.write_u32(seek_parent);
    w.write_u32(0); // fSeekKeys
    w.write_u16(1);
    w.write_bytes(&[0u8; 16]);
    w.into_inner()
}

/// Per-cell arrays with one flow cell on each side of every axis.
fn embed_flows(values: &[f64], counts: &[usize]) -> Vec<f64> {
    let n_cells: usize = counts.iter().map(|c| c + 2).product();
    let mut cells = vec![0.0; n_cells];
    let mut idx = vec![0usize; counts.len()];
    for &v in values {
        let mut cell = 0;
        let mut stride = 1;
        for (&i, &c) in idx.iter().zip(counts) {
            cell += (i + 1) * stride;
            stride *= c + 2;
        }
        cells[cell] = v;
        for (i, &c) in idx.iter_mut().zip(counts) {
            *i += 1;
            if *i < c {
                break;
            }
            *i = 0;
        }
    }
    cells
}

fn is_uniform(axis: &Axis) -> bool {
    let n = axis.n_bins() as f64;
    let width = (axis.high() - axis.low()) / n;
    axis.edges
        .iter()
        .enumerate()
        .all(|(i, &e)| (e - (axis.low() + i as f64 * width)).abs() <= 1e-12 * width.abs().max(1.0))
}

fn write_att_line(w: &mut WBuffer) -> Result<()> {
    let start = w.begin_object(2);
    w.write_i16(602);
    w.write_i16(1);
    w.write_i16(1);
    w.end_object(start)
}

fn write_att_fill(w: &mut WBuffer) -> Result<()> {
    let start = w.begin_object(2);
    w.write_i16(0);
    w.write_i16(1001);
    w.end_object(start)
}

fn write_att_marker(w: &mut WBuffer) -> Result<()> {
    let start = w.begin_object(2);
    w.write_i16(1);
    w.write_i16(1);
    w.write_f32(1.0);
    w.end_object(start)
}

fn write_att_axis(w: &mut WBuffer) -> Result<()> {
    let start = w.begin_object(4);
    w.write_i32(510); // fNdivisions
    w.write_i16(1); // fAxisColor
    w.write_i16(1); // fLabelColor
    w.write_i16(42); // fLabelFont
    w.write_f32(0.005); // fLabelOffset
    w.write_f32(0.035); // fLabelSize
    w.write_f32(0.03); // fTickLength
    w.write_f32(1.0); // fTitleOffset
    w.write_f32(0.035); // fTitleSize
    w.write_i16(1); // fTitleColor
    w.write_i16(42); // fTitleFont
    w.end_object(start)
}

fn write_taxis(w: &mut WBuffer, name: &str, axis: &Axis, range: (usize, usize)) -> Result<()> {
    let start = w.begin_object(10);
    w.write_tnamed(name, &axis.label)?;
    write_att_axis(w)?;
    w.write_len(axis.n_bins())?;
    w.write_f64(axis.low());
    w.write_f64(axis.high());
    if is_uniform(axis) {
        w.write_tarray_d(&[])?;
    } else {
        w.write_tarray_d(&axis.edges)?;
    }
    w.write_len(range.0)?;
    w.write_len(range.1)?;
    w.write_u16(0); // fBits2
    w.write_u8(0); // fTimeDisplay
    w.write_string(""); // fTimeFormat
    w.write_null_pointer(); // fLabels
    w.write_null_pointer(); // fModLabs
    w.end_object(start)
}

/// Weighted sums used for the TH1/TH2/TH3 statistics members.
#[derive(Default)]
struct Moments {
    sumw: f64,
    sumw2: f64,
    /// `[x, y, z]` first moments.
    sumwx: [f64; 3],
    /// `[xx, yy, zz]` second moments.
    sumwx2: [f64; 3],
    /// `[xy, xz, yz]` cross moments.
    cross: [f64; 3],
}

fn moments(h: &Histogram) -> Moments {
    let counts: Vec<usize> = h.axes.iter().map(Axis::n_bins).collect();
    let mut m = Moments::default();
    let mut idx = vec![0usize; counts.len()];
    for (&v, &e) in h.values.iter().zip(&h.errors) {
        let mut c = [0.0; 3];
        for (d, &i) in idx.iter().enumerate() {
            c[d] = h.axes[d].center(i);
        }
        m.sumw += v;
        m.sumw2 += e * e;
        for d in 0..3 {
            m.sumwx[d] += v * c[d];
            m.sumwx2[d] += v * c[d] * c[d];
        }
        m.cross[0] += v * c[0] * c[1];
        m.cross[1] += v * c[0] * c[2];
        m.cross[2] += v * c[1] * c[2];
        for (i, &n) in idx.iter_mut().zip(&counts) {
            *i += 1;
            if *i < n {
                break;
            }
            *i = 0;
        }
    }
    m
}

fn write_th1_base(
    w: &mut WBuffer,
    h: &Histogram,
    name: &str,
    n_cells: usize,
    sumw2: &[f64],
    m: &Moments,
) -> Result<()> {
    let start = w.begin_object(8);
    w.write_tnamed(name, &h.title)?;
    write_att_line(w)?;
    write_att_fill(w)?;
    write_att_marker(w)?;
    w.write_len(n_cells)?;

    let unit = Axis::uniform(1, 0.0, 1.0, "")
        .map_err(|e| RootError::Serialization(e.to_string()))?;
    for (i, axis_name) in ["xaxis", "yaxis", "zaxis"].iter().enumerate() {
        write_taxis(w, axis_name, h.axes.get(i).unwrap_or(&unit), (0, 0))?;
    }

    w.write_i16(0); // fBarOffset
    w.write_i16(1000); // fBarWidth
    w.write_f64(m.sumw); // fEntries
    w.write_f64(m.sumw);
    w.write_f64(m.sumw2);
    w.write_f64(m.sumwx[0]);
    w.write_f64(m.sumwx2[0]);
    w.write_f64(-1111.0); // fMaximum
    w.write_f64(-1111.0); // fMinimum
    w.write_f64(0.0); // fNormFactor
    w.write_tarray_d(&[])?; // fContour
    w.write_tarray_d(sumw2)?;
    w.write_string(""); // fOption

    // fFunctions: an empty TList
    let list = w.begin_object(5);
    w.write_tobject();
    w.write_string("");
    w.write_i32(0);
    w.end_object(list)?;

    w.write_i32(0); // fBufferSize
    w.write_u8(0); // fBuffer (null)
    w.write_i32(0); // fBinStatErrOpt
    w.write_i32(2); // fStatOverflows
    w.end_object(start)
}

fn write_dense(h: &Histogram, name: &str, kind: ArrayKind, key_len: usize) -> Result<Vec<u8>> {
    let counts: Vec<usize> = h.axes.iter().map(Axis::n_bins).collect();
    let contents = embed_flows(&h.values, &counts);
    let sumw2 = if kind == ArrayKind::I32 {
        Vec::new()
    } else {
        let variances: Vec<f64> = h.errors.iter().map(|e| e * e).collect();
        embed_flows(&variances, &counts)
    };
    let m = moments(h);

    let mut w = WBuffer::new(key_len);
    let outer = w.begin_object(if h.ndim() == 1 { 3 } else { 4 });
    match h.ndim() {
        1 => write_th1_base(&mut w, h, name, contents.len(), &sumw2, &m)?,
        2 => {
            let th2 = w.begin_object(5);
            write_th1_base(&mut w, h, name, contents.len(), &sumw2, &m)?;
            w.write_f64(1.0); // fScalefactor
            w.write_f64(m.sumwx[1]);
            w.write_f64(m.sumwx2[1]);
            w.write_f64(m.cross[0]);
            w.end_object(th2)?;
        }
        _ => {
            let th3 = w.begin_object(6);
            write_th1_base(&mut w, h, name, contents.len(), &sumw2, &m)?;
            let att3d = w.begin_object(1);
            w.end_object(att3d)?;
            w.write_f64(m.sumwx[1]);
            w.write_f64(m.sumwx2[1]);
            w.write_f64(m.cross[0]);
            w.write_f64(m.sumwx[2]);
            w.write_f64(m.sumwx2[2]);
            w.write_f64(m.cross[1]);
            w.write_f64(m.cross[2]);
            w.end_object(th3)?;
        }
    }

    w.write_len(contents.len())?;
    match kind {
        ArrayKind::F64 => contents.iter().for_each(|&v| w.write_f64(v)),
        ArrayKind::F32 => contents.iter().for_each(|&v| w.write_f32(v as f32)),
        _ => contents.iter().for_each(|&v| w.write_i32(v.round() as i32)),
    }
    w.end_object(outer)?;
    Ok(w.into_inner())
}

/// Pack ROOT coordinates little-endian, `num_bits(nbins + 2)` bits per axis.
fn pack_coords(coords: &[u32], bits: &[u32], out: &mut Vec<u8>) {
    let total: u32 = bits.iter().sum();
    let start = out.len();
    out.resize(start + (total as usize).div_ceil(8), 0);
    let mut bit = 0u32;
    for (&c, &nb) in coords.iter().zip(bits) {
        for i in 0..nb {
            if (c >> i) & 1 == 1 {
                out[start + (bit / 8) as usize] |= 1 << (bit % 8);
            }
            bit += 1;
        }
    }
}

fn write_sparse(h: &SparseHistogram, name: &str, key_len: usize, chunk_size: usize) -> Result<Vec<u8>> {
    let ndim = h.ndim();
    let bits: Vec<u32> = h.axes().iter().map(|a| num_bits(a.n_bins() as u32 + 2)).collect();
    let single = (bits.iter().sum::<u32>() as usize).div_ceil(8);

    let mut sumw = 0.0;
    let mut sumw2 = 0.0;
    let mut sumwx = vec![0.0; ndim];
    let mut sumwx2 = vec![0.0; ndim];
    for bin in h.bins() {
        sumw += bin.content;
        sumw2 += if h.has_sumw2() { bin.sumw2 } else { bin.content };
        for (d, &c) in bin.coords.iter().enumerate() {
            let axis = &h.axes()[d].axis;
            if c >= 1 && (c as usize) <= axis.n_bins() {
                let x = axis.center(c as usize - 1);
                sumwx[d] += bin.content * x;
                sumwx2[d] += bin.content * x * x;
            }
        }
    }

    let mut w = WBuffer::new(key_len);
    let outer = w.begin_object(1);
    let sparse = w.begin_object(3);
    let base = w.begin_object(1);
    w.write_tnamed(name, &h.title)?;
    w.write_len(ndim)?;

    let axes = w.begin_object(3);
    w.write_tobject();
    w.write_string("");
    w.write_len(ndim)?;
    w.write_i32(0);
    for (d, ranged) in h.axes().iter().enumerate() {
        let range = if ranged.is_restricted() { ranged.range() } else { (0, 0) };
        let axis_name = format!("axis{}", d);
        w.write_object_pointer("TAxis", |w| write_taxis(w, &axis_name, &ranged.axis, range))?;
    }
    w.end_object(axes)?;

    w.write_f64(sumw); // fEntries
    w.write_f64(sumw);
    w.write_f64(sumw2);
    w.write_tarray_d(&sumwx)?;
    w.write_tarray_d(&sumwx2)?;
    w.end_object(base)?;

    w.write_len(chunk_size)?;
    w.write_i64(h.n_filled() as i64);

    let chunks: Vec<_> = h.bins().chunks(chunk_size).collect();
    let list = w.begin_object(3);
    w.write_tobject();
    w.write_string("");
    w.write_len(chunks.len())?;
    w.write_i32(0);
    for chunk in &chunks {
        w.write_object_pointer("THnSparseArrayChunk", |w| {
            let start = w.begin_object(1);
            w.write_tobject();
            w.write_len(single)?;
            let mut coords = Vec::with_capacity(single * chunk.len());
            for bin in chunk.iter() {
                pack_coords(&bin.coords, &bits, &mut coords);
            }
            w.write_len(coords.len())?;
            w.write_u8(u8::from(!coords.is_empty()));
            w.write_bytes(&coords);
            let content: Vec<f64> = chunk.iter().map(|b| b.content).collect();
            w.write_object_pointer("TArrayD", |w| w.write_tarray_d(&content))?;
            if h.has_sumw2() {
                let errs: Vec<f64> = chunk.iter().map(|b| b.sumw2).collect();
                w.write_object_pointer("TArrayD", |w| w.write_tarray_d(&errs))?;
            } else {
                w.write_null_pointer();
            }
            w.end_object(start)
        })?;
    }
    w.end_object(list)?;
    w.end_object(sparse)?;
    w.end_object(outer)?;
    Ok(w.into_inner())
}
