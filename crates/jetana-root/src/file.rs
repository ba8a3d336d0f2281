//! TFile header parsing and top-level ROOT file interface.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use crate::decompress::decompress;
use crate::directory::{Directory, DirectoryRecord};
use crate::error::{Result, RootError};
use crate::key::{Key, KeyInfo, is_directory_class};
use crate::rbuffer::RBuffer;

/// Parsed ROOT file header.
#[derive(Debug, Clone, Copy)]
struct FileHeader {
    /// Offset of first data record (also where top-level TKey sits).
    begin: u64,
    /// Whether the file uses large (64-bit) seek pointers (version >= 1000000).
    is_large: bool,
    /// Key list of the top-level directory.
    top: DirectoryRecord,
}

/// File bytes: mapped for the typed backend, read into memory otherwise.
enum FileBytes {
    Mapped(memmap2::Mmap),
    Loaded(Vec<u8>),
}

impl std::ops::Deref for FileBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            FileBytes::Mapped(m) => m,
            FileBytes::Loaded(v) => v,
        }
    }
}

/// A ROOT file opened for reading.
pub struct RootFile {
    data: FileBytes,
    header: FileHeader,
    path: PathBuf,
}

const ROOT_MAGIC: &[u8; 4] = b"root";
const MIN_FILE_LEN: usize = 64;

/// An object path split into directory components, object name and optional cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPath<'a> {
    /// Directory components from the file root.
    pub dirs: Vec<&'a str>,
    /// Object name.
    pub name: &'a str,
    /// Explicit cycle (`name;2`).
    pub cycle: Option<u16>,
}

impl<'a> ObjectPath<'a> {
    /// Parse `dir/sub/name[;cycle]`.
    pub fn parse(path: &'a str) -> Result<Self> {
        let mut parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let last = parts.pop().ok_or_else(|| RootError::KeyNotFound(path.to_string()))?;
        let (name, cycle) = match last.split_once(';') {
            Some((name, cycle)) => {
                let cycle = cycle.parse::<u16>().map_err(|_| {
                    RootError::KeyNotFound(format!("{} (bad cycle '{}')", path, cycle))
                })?;
                (name, Some(cycle))
            }
            None => (last, None),
        };
        Ok(Self { dirs: parts, name, cycle })
    }
}

impl RootFile {
    /// Open and parse a ROOT file from disk using memory mapping.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = fs::File::open(&path)?;
        // SAFETY: the mapping is read-only and lives no longer than this
        // RootFile; histograms are copied out before the file is dropped.
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        Self::from_file_bytes(FileBytes::Mapped(mmap), path)
    }

    /// Read a ROOT file fully into memory.
    pub fn open_owned(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = fs::read(&path)?;
        Self::from_file_bytes(FileBytes::Loaded(bytes), path)
    }

    /// Parse a ROOT file from a byte vector.
    pub fn from_bytes(data: Vec<u8>, path: PathBuf) -> Result<Self> {
        Self::from_file_bytes(FileBytes::Loaded(data), path)
    }

    fn from_file_bytes(data: FileBytes, path: PathBuf) -> Result<Self> {
        if data.len() < MIN_FILE_LEN || &data[0..4] != ROOT_MAGIC {
            return Err(RootError::BadMagic);
        }
        let header = Self::parse_header(&data)?;
        log::debug!(
            "opened {} ({} bytes, {}, large={})",
            path.display(),
            data.len(),
            if matches!(data, FileBytes::Mapped(_)) { "mapped" } else { "loaded" },
            header.is_large
        );
        Ok(Self { data, header, path })
    }

    /// Parse the file-level header and the embedded top-level TDirectory.
    ///
    /// ROOT file header layout (small file, version < 1000000):
    /// ```text
    /// offset  size  field
    ///    0      4   magic "root"
    ///    4      4   fVersion
    ///    8      4   fBEGIN
    ///   12      4   fEND
    ///   16      4   fSeekFree
    ///   20      4   fNbytesFree
    ///   24      4   nfree
    ///   28      4   fNbytesName
    ///   32      1   fUnits
    ///   33      4   fCompress
    ///   37      4   fSeekInfo
    ///   41      4   fNbytesInfo
    ///   45     18   fUUID
    /// ```
    ///
    /// Large files widen fEND, fSeekFree and fSeekInfo to 8 bytes.
    /// The TDirectory streamer is located at `fBEGIN + fNbytesName`.
    fn parse_header(data: &[u8]) -> Result<FileHeader> {
        let mut r = RBuffer::new(data);
        r.skip(4)?;

        let version = r.read_u32()?;
        let is_large = version >= 1_000_000;
        let begin = r.read_u32()? as u64;
        if is_large {
            r.skip(16)?; // fEND, fSeekFree
        } else {
            r.skip(8)?;
        }
        let _nbytes_free = r.read_u32()?;
        let _nfree = r.read_u32()?;
        let nbytes_name = r.read_u32()? as u64;

        let dir_offset = usize::try_from(begin + nbytes_name).map_err(|_| {
            RootError::Deserialization("TDirectory offset does not fit in memory".into())
        })?;
        if dir_offset >= data.len() {
            return Err(RootError::Deserialization("TDirectory offset past end of file".into()));
        }
        r.set_pos(dir_offset)?;
        let top = DirectoryRecord::read(&mut r)?;
        Ok(FileHeader { begin, is_large, top })
    }

    /// Path this file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether file uses 64-bit seek pointers.
    pub fn is_large(&self) -> bool {
        self.header.is_large
    }

    /// Offset of the first record.
    pub fn begin(&self) -> u64 {
        self.header.begin
    }

    /// Whether the bytes are memory-mapped.
    pub fn is_mapped(&self) -> bool {
        matches!(self.data, FileBytes::Mapped(_))
    }

    /// List every object key, descending into subdirectories.
    pub fn list_keys(&self) -> Result<Vec<KeyInfo>> {
        let mut out = Vec::new();
        self.collect_keys(&self.top_directory()?, "", &mut out)?;
        Ok(out)
    }

    fn collect_keys(&self, dir: &Directory, prefix: &str, out: &mut Vec<KeyInfo>) -> Result<()> {
        for key in dir.keys() {
            let info = KeyInfo::from_key(prefix, key);
            if is_directory_class(&key.class_name) {
                let sub = self.read_subdirectory(key)?;
                let path = info.path.clone();
                out.push(info);
                self.collect_keys(&sub, &path, out)?;
            } else {
                out.push(info);
            }
        }
        Ok(())
    }

    /// Locate the key of an object by path (`dir/sub/name[;cycle]`).
    pub fn find_key(&self, path: &str) -> Result<Key> {
        let parsed = ObjectPath::parse(path)?;
        let mut dir = self.top_directory()?;
        for &part in &parsed.dirs {
            let key = dir
                .find_key(part, None)
                .ok_or_else(|| RootError::KeyNotFound(format!("{} (in path {})", part, path)))?;
            if !is_directory_class(&key.class_name) {
                return Err(RootError::Deserialization(format!(
                    "'{}' is not a directory (class: {})",
                    part, key.class_name
                )));
            }
            dir = self.read_subdirectory(key)?;
        }
        dir.find_key(parsed.name, parsed.cycle)
            .cloned()
            .ok_or_else(|| RootError::KeyNotFound(path.to_string()))
    }

    fn top_directory(&self) -> Result<Directory> {
        Directory::read_key_list(&self.data, self.header.top, self.header.is_large)
    }

    fn read_subdirectory(&self, key: &Key) -> Result<Directory> {
        let payload = self.payload(key)?;
        Directory::read_from_payload(&payload, self.header.is_large, &self.data)
    }

    /// Object bytes of a key.
    ///
    /// Uncompressed objects are borrowed straight from the file bytes;
    /// compressed ones are inflated into an owned buffer.
    pub fn payload(&self, key: &Key) -> Result<Cow<'_, [u8]>> {
        let record = self.read_file_range(key.seek_key, key.n_bytes as u64)?;
        let key_len = key.key_len as usize;
        if key_len > record.len() {
            return Err(RootError::Deserialization(format!(
                "key '{}' header ({} bytes) longer than its record ({} bytes)",
                key.name,
                key_len,
                record.len()
            )));
        }
        let object = &record[key_len..];
        if key.is_uncompressed() {
            Ok(Cow::Borrowed(object))
        } else {
            Ok(Cow::Owned(decompress(object, key.obj_len as usize)?))
        }
    }

    fn read_file_range(&self, seek: u64, n_bytes: u64) -> Result<&[u8]> {
        let start: usize = seek
            .try_into()
            .map_err(|_| RootError::Deserialization(format!("seek offset too large: {}", seek)))?;
        let len: usize = n_bytes.try_into().map_err(|_| {
            RootError::Deserialization(format!("range length too large: {}", n_bytes))
        })?;
        let end = start.checked_add(len).ok_or_else(|| {
            RootError::Deserialization(format!("range overflow for seek={} n_bytes={}", seek, n_bytes))
        })?;
        if end > self.data.len() {
            return Err(RootError::BufferUnderflow {
                offset: start,
                need: len,
                have: self.data.len().saturating_sub(start),
            });
        }
        Ok(&self.data[start..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_non_root_file() {
        let result = RootFile::from_bytes(vec![0u8; 100], PathBuf::from("test.root"));
        assert!(matches!(result, Err(RootError::BadMagic)));
    }

    #[test]
    fn reject_too_small() {
        let result = RootFile::from_bytes(b"root".to_vec(), PathBuf::from("test.root"));
        assert!(matches!(result, Err(RootError::BadMagic)));
    }

    #[test]
    fn object_path_parsing() {
        let p = ObjectPath::parse("jets/pt/hJES;3").unwrap();
        assert_eq!(p.dirs, vec!["jets", "pt"]);
        assert_eq!(p.name, "hJES");
        assert_eq!(p.cycle, Some(3));

        let p = ObjectPath::parse("/h").unwrap();
        assert!(p.dirs.is_empty());
        assert_eq!(p.cycle, None);

        assert!(matches!(ObjectPath::parse(""), Err(RootError::KeyNotFound(_))));
        assert!(ObjectPath::parse("h;x").is_err());
    }

    #[test]
    fn open_missing_file_is_io_error() {
        let r = RootFile::open("/nonexistent/definitely/missing.root");
        assert!(matches!(r, Err(RootError::Io(_))));
    }
}
