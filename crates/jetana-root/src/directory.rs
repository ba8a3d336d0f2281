//! TDirectory parsing and key-list navigation.

use crate::error::{Result, RootError};
use crate::key::Key;
use crate::rbuffer::RBuffer;

/// Location of a directory's key list, read from a TDirectory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryRecord {
    /// Offset of the key list.
    pub seek_keys: u64,
    /// Size of the key list record.
    pub nbytes_keys: u32,
}

impl DirectoryRecord {
    /// Parse a TDirectory streamer at the reader's position.
    pub fn read(r: &mut RBuffer) -> Result<Self> {
        let dir_version = r.read_u16()?;
        let _datime_c = r.read_u32()?;
        let _datime_m = r.read_u32()?;
        let nbytes_keys = r.read_u32()?;
        let _nbytes_name = r.read_u32()?;

        let seek_keys = if dir_version > 1000 {
            let _seek_dir = r.read_u64()?;
            let _seek_parent = r.read_u64()?;
            r.read_u64()?
        } else {
            let _seek_dir = r.read_u32()?;
            let _seek_parent = r.read_u32()?;
            r.read_u32()? as u64
        };
        Ok(Self { seek_keys, nbytes_keys })
    }
}

/// A parsed TDirectory: an ordered list of TKeys.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    keys: Vec<Key>,
}

impl Directory {
    /// Read the key list from the file at `seek_keys`.
    ///
    /// The key list starts with a TKey header for the list itself, then
    /// a u32 `nkeys`, followed by `nkeys` TKey records.
    pub fn read_key_list(file_data: &[u8], record: DirectoryRecord, is_large: bool) -> Result<Self> {
        if record.seek_keys == 0 {
            return Ok(Self::default());
        }
        let seek = usize::try_from(record.seek_keys).map_err(|_| {
            RootError::Deserialization(format!("seek_keys too large: {}", record.seek_keys))
        })?;
        let mut r = RBuffer::new(file_data);
        r.set_pos(seek)?;

        let _list_key = Key::read(&mut r, is_large)?;
        let nkeys = r.read_u32()? as usize;

        let mut keys = Vec::with_capacity(nkeys.min(1 << 16));
        for _ in 0..nkeys {
            keys.push(Key::read(&mut r, is_large)?);
        }
        Ok(Directory { keys })
    }

    /// Read a subdirectory from the decompressed payload of a TDirectoryFile key.
    pub fn read_from_payload(payload: &[u8], is_large: bool, file_data: &[u8]) -> Result<Self> {
        let mut r = RBuffer::new(payload);
        let record = DirectoryRecord::read(&mut r)?;
        Self::read_key_list(file_data, record, is_large)
    }

    /// Access the list of keys.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Find a key by name. Without an explicit cycle the highest cycle wins.
    pub fn find_key(&self, name: &str, cycle: Option<u16>) -> Option<&Key> {
        match cycle {
            Some(c) => self.keys.iter().find(|k| k.name == name && k.cycle == c),
            None => self.keys.iter().filter(|k| k.name == name).max_by_key(|k| k.cycle),
        }
    }
}
