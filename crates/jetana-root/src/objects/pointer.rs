//! Object pointers and `TObjArray` members.
//!
//! A streamed pointer is either `0` (null) or
//! ```text
//! u32  byte count | kByteCountMask
//! u32  kNewClassTag followed by a NUL-terminated class name,
//!      or (map offset | kClassMask) referring to a class seen earlier
//! ...  the object's own streamer
//! ```
//! Map offsets are buffer positions relative to the start of the key record
//! plus `kMapOffset`.

use std::collections::HashMap;

use crate::error::{Result, RootError};
use crate::rbuffer::{BYTE_COUNT_MASK, CLASS_MASK, MAP_OFFSET, NEW_CLASS_TAG, RBuffer};

/// Class names registered while reading one object payload.
#[derive(Debug, Default)]
pub struct ClassRefs {
    classes: HashMap<usize, String>,
}

impl ClassRefs {
    /// Empty reference map.
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, offset: usize, class: String) {
        self.classes.insert(offset, class);
    }

    fn get(&self, offset: usize) -> Option<&str> {
        self.classes.get(&offset).map(String::as_str)
    }
}

/// Read one object pointer, decoding the pointee with `read`.
///
/// Returns `None` for null pointers and for back-references to objects
/// already streamed earlier in the buffer.
pub fn read_object_any<T>(
    r: &mut RBuffer,
    refs: &mut ClassRefs,
    read: &mut impl FnMut(&mut RBuffer, &mut ClassRefs, &str) -> Result<T>,
) -> Result<Option<T>> {
    let beg = r.pos();
    let first = r.read_u32()?;
    if first == 0 {
        return Ok(None);
    }

    let (tag, end, tag_pos) = if first & BYTE_COUNT_MASK != 0 && first != NEW_CLASS_TAG {
        let count = (first & !BYTE_COUNT_MASK) as usize;
        let tag_pos = r.ref_pos();
        (r.read_u32()?, Some(beg + 4 + count), Some(tag_pos))
    } else {
        (first, None, None)
    };

    let class = if tag == NEW_CLASS_TAG {
        let class = r.read_cstring()?;
        if let Some(pos) = tag_pos {
            refs.insert(pos + MAP_OFFSET, class.clone());
        }
        class
    } else if tag & CLASS_MASK != 0 {
        let offset = (tag & !CLASS_MASK) as usize;
        refs.get(offset)
            .ok_or_else(|| {
                RootError::Deserialization(format!("unknown class reference {:#x}", offset))
            })?
            .to_string()
    } else {
        log::debug!("skipping back-reference to object at {:#x}", tag);
        r.seek_end(end)?;
        return Ok(None);
    };

    let value = read(r, refs, &class)?;
    r.seek_end(end)?;
    Ok(Some(value))
}

/// Read a `TObjArray` streamed in place, decoding each element with `read`.
pub fn read_tobjarray<T>(
    r: &mut RBuffer,
    refs: &mut ClassRefs,
    mut read: impl FnMut(&mut RBuffer, &mut ClassRefs, &str) -> Result<T>,
) -> Result<Vec<Option<T>>> {
    let (ver, end) = r.read_version()?;
    if ver > 2 {
        r.read_tobject()?;
    }
    if ver > 1 {
        let _name = r.read_string()?;
    }
    let n = r.read_len()?;
    let _lower_bound = r.read_i32()?;

    let mut out = Vec::with_capacity(n.min(1 << 16));
    for _ in 0..n {
        out.push(read_object_any(r, refs, &mut read)?);
    }
    r.seek_end(end)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pointer_to_new_class(class: &str, body: &[u8]) -> Vec<u8> {
        let mut inner = NEW_CLASS_TAG.to_be_bytes().to_vec();
        inner.extend_from_slice(class.as_bytes());
        inner.push(0);
        inner.extend_from_slice(body);
        let mut out = ((inner.len() as u32) | BYTE_COUNT_MASK).to_be_bytes().to_vec();
        out.extend_from_slice(&inner);
        out
    }

    #[test]
    fn null_pointer() {
        let data = [0u8; 4];
        let mut r = RBuffer::new(&data);
        let mut refs = ClassRefs::new();
        let got = read_object_any(&mut r, &mut refs, &mut |_, _, _| Ok(1)).unwrap();
        assert!(got.is_none());
        assert_eq!(r.pos(), 4);
    }

    #[test]
    fn new_class_then_reference() {
        let key_len = 50;
        let mut data = pointer_to_new_class("TArrayD", &[0, 0, 0, 7]);
        // The class tag of the first pointer sits at offset 4.
        let class_ref = ((key_len + 4 + MAP_OFFSET) as u32) | CLASS_MASK;
        let mut second = class_ref.to_be_bytes().to_vec();
        second.extend_from_slice(&[0, 0, 0, 9]);
        data.extend_from_slice(&((second.len() as u32) | BYTE_COUNT_MASK).to_be_bytes());
        data.extend_from_slice(&second);

        let mut r = RBuffer::with_displacement(&data, key_len);
        let mut refs = ClassRefs::new();
        let mut read = |r: &mut RBuffer, _: &mut ClassRefs, class: &str| -> Result<(String, i32)> {
            Ok((class.to_string(), r.read_i32()?))
        };
        let a = read_object_any(&mut r, &mut refs, &mut read).unwrap().unwrap();
        let b = read_object_any(&mut r, &mut refs, &mut read).unwrap().unwrap();
        assert_eq!(a, ("TArrayD".to_string(), 7));
        assert_eq!(b, ("TArrayD".to_string(), 9));
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn dangling_class_reference_is_an_error() {
        let mut data = ((4u32) | BYTE_COUNT_MASK).to_be_bytes().to_vec();
        data.extend_from_slice(&(0x99u32 | CLASS_MASK).to_be_bytes());
        let mut r = RBuffer::new(&data);
        let mut refs = ClassRefs::new();
        let got = read_object_any(&mut r, &mut refs, &mut |_, _, _| Ok(()));
        assert!(matches!(got, Err(RootError::Deserialization(_))));
    }
}
