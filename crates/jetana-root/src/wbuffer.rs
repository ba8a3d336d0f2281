//! Binary writer producing ROOT's big-endian serialization format.

use std::collections::HashMap;

use crate::error::{Result, RootError};
use crate::rbuffer::{BYTE_COUNT_MASK, CLASS_MASK, MAP_OFFSET, NEW_CLASS_TAG};

/// `kNotDeleted | kIsOnHeap`, the bits ROOT stores for heap objects.
const TOBJECT_BITS: u32 = 0x0300_0000;

/// Append-only buffer with ROOT streamer helpers.
pub struct WBuffer {
    data: Vec<u8>,
    displacement: usize,
    classes: HashMap<String, u32>,
}

impl WBuffer {
    /// Buffer for an object whose key header will be `key_len` bytes long.
    pub fn new(key_len: usize) -> Self {
        Self { data: Vec::new(), displacement: key_len, classes: HashMap::new() }
    }

    /// Bytes written so far.
    pub fn pos(&self) -> usize {
        self.data.len()
    }

    /// Finished bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, b: &[u8]) {
        self.data.extend_from_slice(b);
    }

    /// Append a byte.
    pub fn write_u8(&mut self, v: u8) {
        self.data.push(v);
    }

    /// Append a big-endian i16.
    pub fn write_i16(&mut self, v: i16) {
        self.write_bytes(&v.to_be_bytes());
    }

    /// Append a big-endian u16.
    pub fn write_u16(&mut self, v: u16) {
        self.write_bytes(&v.to_be_bytes());
    }

    /// Append a big-endian i32.
    pub fn write_i32(&mut self, v: i32) {
        self.write_bytes(&v.to_be_bytes());
    }

    /// Append a big-endian u32.
    pub fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_be_bytes());
    }

    /// Append a big-endian i64.
    pub fn write_i64(&mut self, v: i64) {
        self.write_bytes(&v.to_be_bytes());
    }

    /// Append a big-endian f32.
    pub fn write_f32(&mut self, v: f32) {
        self.write_bytes(&v.to_be_bytes());
    }

    /// Append a big-endian f64.
    pub fn write_f64(&mut self, v: f64) {
        self.write_bytes(&v.to_be_bytes());
    }

    /// Overwrite a u32 written earlier.
    pub fn patch_u32(&mut self, at: usize, v: u32) {
        self.data[at..at + 4].copy_from_slice(&v.to_be_bytes());
    }

    /// Append a length-prefixed ROOT string.
    pub fn write_string(&mut self, s: &str) {
        let b = s.as_bytes();
        if b.len() < 255 {
            self.write_u8(b.len() as u8);
        } else {
            self.write_u8(255);
            self.write_u32(b.len() as u32);
        }
        self.write_bytes(b);
    }

    /// Append a non-negative length as i32.
    pub fn write_len(&mut self, n: usize) -> Result<()> {
        let n = i32::try_from(n)
            .map_err(|_| RootError::Serialization(format!("length {} exceeds i32", n)))?;
        self.write_i32(n);
        Ok(())
    }

    /// Start a streamed object: reserve the byte count and write `version`.
    pub fn begin_object(&mut self, version: u16) -> usize {
        let start = self.pos();
        self.write_u32(0);
        self.write_u16(version);
        start
    }

    /// Close an object opened with [`begin_object`](Self::begin_object).
    pub fn end_object(&mut self, start: usize) -> Result<()> {
        let count = self.pos() - start - 4;
        let count = u32::try_from(count)
            .ok()
            .filter(|c| c & BYTE_COUNT_MASK == 0)
            .ok_or_else(|| RootError::Serialization(format!("object of {} bytes too large", count)))?;
        self.patch_u32(start, count | BYTE_COUNT_MASK);
        Ok(())
    }

    /// Append a `TObject` header.
    pub fn write_tobject(&mut self) {
        self.write_u16(1);
        self.write_u32(0);
        self.write_u32(TOBJECT_BITS);
    }

    /// Append a `TNamed`.
    pub fn write_tnamed(&mut self, name: &str, title: &str) -> Result<()> {
        let start = self.begin_object(1);
        self.write_tobject();
        self.write_string(name);
        self.write_string(title);
        self.end_object(start)
    }

    /// Append a `TArrayD` body.
    pub fn write_tarray_d(&mut self, values: &[f64]) -> Result<()> {
        self.write_len(values.len())?;
        for &v in values {
            self.write_f64(v);
        }
        Ok(())
    }

    /// Append a null object pointer.
    pub fn write_null_pointer(&mut self) {
        self.write_u32(0);
    }

    /// Append a pointer to an object of `class` streamed by `body`.
    ///
    /// The class name is written once per buffer and referenced afterwards.
    pub fn write_object_pointer(
        &mut self,
        class: &str,
        body: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        let start = self.pos();
        self.write_u32(0);
        match self.classes.get(class) {
            Some(&offset) => self.write_u32(offset | CLASS_MASK),
            None => {
                let tag_pos = self.pos() + self.displacement;
                self.write_u32(NEW_CLASS_TAG);
                self.write_bytes(class.as_bytes());
                self.write_u8(0);
                self.classes.insert(class.to_string(), (tag_pos + MAP_OFFSET) as u32);
            }
        }
        body(self)?;
        self.end_object(start)
    }
}
