//! # jetana-root
//!
//! ROOT file access for jetana, without ROOT itself.
//!
//! Two read paths share one file/key/decompression layer:
//! - [`MmapBackend`]: memory-maps the file and decodes `TH{1,2,3}{D,F}` bin
//!   contents straight from the mapped bytes.
//! - [`StreamerBackend`]: walks the full streamer layout, adding integer
//!   contents and `THnSparse`.
//!
//! [`Reader`] tries the first and falls back to the second. Supports zlib,
//! LZ4, ZSTD and XZ compressed objects. [`RootFileWriter`] writes histograms
//! back out.
//!
//! ## Example
//!
//! ```no_run
//! let h = jetana_root::read("jets.root", "ak4/hJESvsPt").unwrap();
//! println!("{} bins, integral {}", h.len(), h.integral());
//!
//! for key in jetana_root::list_keys("jets.root").unwrap() {
//!     println!("{} ({})", key.path, key.class_name);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod decompress;
pub mod directory;
pub mod error;
pub mod file;
pub mod key;
pub mod objects;
pub mod rbuffer;
pub mod wbuffer;
pub mod writer;

use std::path::Path;

pub use backend::{HistogramBackend, MmapBackend, Reader, StreamerBackend, list_keys};
pub use error::{Result, RootError};
pub use file::RootFile;
pub use key::KeyInfo;
pub use objects::ArrayKind;
pub use writer::RootFileWriter;

/// Read one histogram with the default mmap-then-streamer [`Reader`].
pub fn read(path: impl AsRef<Path>, name: &str) -> jetana_core::Result<jetana_core::Histogram> {
    Reader::default().read(path, name)
}

/// Read one object as a projectable sparse handle.
pub fn read_sparse(
    path: impl AsRef<Path>,
    name: &str,
) -> jetana_core::Result<jetana_core::SparseHistogram> {
    Reader::default().read_sparse(path, name)
}

/// Read several histograms from one file, skipping unreadable names.
pub fn load_histograms(
    path: impl AsRef<Path>,
    names: &[&str],
) -> jetana_core::Result<Vec<jetana_core::Histogram>> {
    Reader::default().load_histograms(path, names)
}
