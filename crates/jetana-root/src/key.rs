//! TKey parsing: the record header used by ROOT to locate objects.

use crate::error::Result;
use crate::rbuffer::RBuffer;

/// A parsed TKey record.
#[derive(Debug, Clone)]
pub struct Key {
    /// Total number of bytes in compressed object + key header.
    pub n_bytes: u32,
    /// Version of key class.
    pub version: u16,
    /// Uncompressed object length.
    pub obj_len: u32,
    /// Key creation time (ROOT datime).
    pub datime: u32,
    /// Length of the key header itself.
    pub key_len: u16,
    /// Cycle number (ROOT versioning within a directory).
    pub cycle: u16,
    /// Absolute position of this key in the file.
    pub seek_key: u64,
    /// Parent directory seek position.
    pub seek_pdir: u64,
    /// Class name of the stored object.
    pub class_name: String,
    /// Object name.
    pub name: String,
    /// Object title.
    pub title: String,
}

/// Public info about a key (for `list_keys()`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// Object path relative to the file root (`dir/sub/name`).
    pub path: String,
    /// Object class name (e.g. "TH2D", "THnSparseT<TArrayD>", "TDirectoryFile").
    pub class_name: String,
    /// Object title.
    pub title: String,
    /// Cycle number.
    pub cycle: u16,
}

impl KeyInfo {
    /// Create from an internal Key located in directory `dir` (empty for the top level).
    pub fn from_key(dir: &str, key: &Key) -> Self {
        let path = if dir.is_empty() { key.name.clone() } else { format!("{}/{}", dir, key.name) };
        Self { path, class_name: key.class_name.clone(), title: key.title.clone(), cycle: key.cycle }
    }

    /// Whether this key is a subdirectory.
    pub fn is_directory(&self) -> bool {
        is_directory_class(&self.class_name)
    }
}

/// Whether `class_name` names a ROOT directory.
pub fn is_directory_class(class_name: &str) -> bool {
    matches!(class_name, "TDirectoryFile" | "TDirectory")
}

impl Key {
    /// Read a TKey from the buffer at the current position.
    pub fn read(r: &mut RBuffer, is_large: bool) -> Result<Self> {
        let n_bytes = r.read_u32()?;
        let version = r.read_u16()?;
        let obj_len = r.read_u32()?;
        let datime = r.read_u32()?;
        let key_len = r.read_u16()?;
        let cycle = r.read_u16()?;

        let (seek_key, seek_pdir) = if version > 1000 || is_large {
            (r.read_u64()?, r.read_u64()?)
        } else {
            (r.read_u32()? as u64, r.read_u32()? as u64)
        };

        let class_name = r.read_string()?;
        let name = r.read_string()?;
        let title = r.read_string()?;

        Ok(Key {
            n_bytes,
            version,
            obj_len,
            datime,
            key_len,
            cycle,
            seek_key,
            seek_pdir,
            class_name,
            name,
            title,
        })
    }

    /// Whether the object bytes are stored without compression.
    pub fn is_uncompressed(&self) -> bool {
        self.obj_len as usize == (self.n_bytes as usize).saturating_sub(self.key_len as usize)
    }
}
