//! ROOT compression blocks (ZL = zlib, L4 = LZ4, ZS = ZSTD, XZ = LZMA).
//!
//! ROOT writes compressed data as one or more 9-byte-header blocks:
//! ```text
//! bytes 0-1:  algorithm tag ("ZL", "XZ", "L4", "ZS")
//! byte  2:    method (ignored)
//! bytes 3-5:  compressed size   (3-byte little-endian)
//! bytes 6-8:  uncompressed size (3-byte little-endian)
//! ```
//! The compressed payload immediately follows the 9-byte header.

use std::io::{Read, Write};

use crate::error::{Result, RootError};

/// Largest uncompressed size a single block can describe.
pub const MAX_BLOCK_SIZE: usize = 0xFF_FFFF;

const HEADER_LEN: usize = 9;

/// Decompress ROOT-compressed data into `expected_len` bytes.
pub fn decompress(src: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_len);
    let mut offset = 0;

    while out.len() < expected_len && offset + HEADER_LEN <= src.len() {
        let tag = &src[offset..offset + 2];
        let c_size = read_le24(&src[offset + 3..offset + 6]);
        let u_size = read_le24(&src[offset + 6..offset + 9]);
        offset += HEADER_LEN;

        let end = offset + c_size;
        if end > src.len() {
            return Err(RootError::Decompression(format!(
                "compressed block claims {} bytes but only {} remain",
                c_size,
                src.len() - offset
            )));
        }
        let compressed = &src[offset..end];

        let block = match tag {
            b"ZL" => decompress_zlib(compressed, u_size)?,
            b"L4" => decompress_lz4(compressed, u_size)?,
            b"ZS" => decompress_zstd(compressed, u_size)?,
            b"XZ" => decompress_xz(compressed, u_size)?,
            _ => {
                return Err(RootError::Decompression(format!(
                    "unsupported compression algorithm: {:?}",
                    String::from_utf8_lossy(tag)
                )));
            }
        };

        if block.len() != u_size {
            return Err(RootError::Decompression(format!(
                "expected {} uncompressed bytes, got {}",
                u_size,
                block.len()
            )));
        }

        out.extend_from_slice(&block);
        offset = end;
    }

    if out.len() != expected_len {
        return Err(RootError::Decompression(format!(
            "total decompressed length {} != expected {}",
            out.len(),
            expected_len
        )));
    }
    Ok(out)
}

/// Compress `data` into zlib blocks at `level` (0-9).
///
/// Returns `None` when compression does not make the payload smaller, in
/// which case ROOT stores the object uncompressed.
pub fn compress_zlib(data: &[u8], level: u32) -> Result<Option<Vec<u8>>> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    let mut out = Vec::with_capacity(data.len() / 2 + HEADER_LEN);
    for chunk in data.chunks(MAX_BLOCK_SIZE) {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
        encoder.write_all(chunk)?;
        let compressed = encoder.finish()?;
        if compressed.len() > MAX_BLOCK_SIZE {
            return Ok(None);
        }
        out.extend_from_slice(b"ZL");
        out.push(0x08);
        out.extend_from_slice(&le24(compressed.len()));
        out.extend_from_slice(&le24(chunk.len()));
        out.extend_from_slice(&compressed);
    }
    if out.len() >= data.len() {
        return Ok(None);
    }
    Ok(Some(out))
}

fn decompress_zlib(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    use flate2::read::ZlibDecoder;

    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::with_capacity(expected);
    decoder.read_to_end(&mut out).map_err(|e| RootError::Decompression(format!("zlib: {}", e)))?;
    Ok(out)
}

fn decompress_lz4(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    // 8-byte xxhash64 checksum precedes the LZ4 payload; not verified.
    if data.len() < 8 {
        return Err(RootError::Decompression("LZ4 block too small for checksum header".into()));
    }
    lz4_flex::decompress(&data[8..], expected)
        .map_err(|e| RootError::Decompression(format!("lz4: {}", e)))
}

fn decompress_zstd(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut decoder = ruzstd::decoding::StreamingDecoder::new(data)
        .map_err(|e| RootError::Decompression(format!("zstd: {}", e)))?;
    let mut out = Vec::with_capacity(expected);
    decoder.read_to_end(&mut out).map_err(|e| RootError::Decompression(format!("zstd: {}", e)))?;
    Ok(out)
}

fn decompress_xz(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut input = std::io::BufReader::new(data);
    let mut out = Vec::with_capacity(expected);
    lzma_rs::xz_decompress(&mut input, &mut out)
        .map_err(|e| RootError::Decompression(format!("xz: {}", e)))?;
    Ok(out)
}

/// Read a 3-byte little-endian unsigned integer.
fn read_le24(b: &[u8]) -> usize {
    b[0] as usize | ((b[1] as usize) << 8) | ((b[2] as usize) << 16)
}

fn le24(n: usize) -> [u8; 3] {
    [(n & 0xFF) as u8, ((n >> 8) & 0xFF) as u8, ((n >> 16) & 0xFF) as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_root_block(tag: &[u8; 2], method: u8, compressed: &[u8], u_len: usize) -> Vec<u8> {
        let mut block = Vec::new();
        block.extend_from_slice(tag);
        block.push(method);
        block.extend_from_slice(&le24(compressed.len()));
        block.extend_from_slice(&le24(u_len));
        block.extend_from_slice(compressed);
        block
    }

    #[test]
    fn le24_values() {
        assert_eq!(read_le24(&[0x10, 0x00, 0x00]), 16);
        assert_eq!(read_le24(&[0xff, 0xff, 0xff]), 0xFF_FFFF);
        assert_eq!(read_le24(&le24(256)), 256);
    }

    #[test]
    fn zlib_blocks_from_writer_are_readable() {
        let original: Vec<u8> = (0..4000u32).map(|i| (i % 7) as u8).collect();
        let blocks = compress_zlib(&original, 6).unwrap().expect("repetitive data compresses");
        assert_eq!(&blocks[..2], b"ZL");
        assert_eq!(decompress(&blocks, original.len()).unwrap(), original);
    }

    #[test]
    fn incompressible_payload_is_left_alone() {
        assert!(compress_zlib(&[1, 2, 3], 6).unwrap().is_none());
    }

    #[test]
    fn zstd_block() {
        let original = b"Hello ROOT ZSTD compression! Repeated data: BBBBBBBBBB";
        let compressed = ruzstd::encoding::compress_to_vec(
            &original[..],
            ruzstd::encoding::CompressionLevel::Fastest,
        );
        let block = make_root_block(b"ZS", 0x04, &compressed, original.len());
        assert_eq!(decompress(&block, original.len()).unwrap(), &original[..]);
    }

    #[test]
    fn xz_block() {
        let original = b"Hello ROOT XZ compression! Repeated data: CCCCCCCCCC";
        let mut compressed = Vec::new();
        lzma_rs::xz_compress(&mut std::io::BufReader::new(&original[..]), &mut compressed).unwrap();
        let block = make_root_block(b"XZ", 0x05, &compressed, original.len());
        assert_eq!(decompress(&block, original.len()).unwrap(), &original[..]);
    }

    #[test]
    fn lz4_block_skips_checksum() {
        let original = b"lz4 lz4 lz4 lz4 lz4 lz4 lz4 lz4";
        let mut payload = vec![0u8; 8];
        payload.extend_from_slice(&lz4_flex::compress(original));
        let block = make_root_block(b"L4", 0x01, &payload, original.len());
        assert_eq!(decompress(&block, original.len()).unwrap(), &original[..]);
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let block = make_root_block(b"QQ", 0, &[0, 0], 2);
        assert!(matches!(decompress(&block, 2), Err(RootError::Decompression(_))));
    }
}
