//! Chunk compression.
//!
//! Chunks are deflated with zlib when the dataset declares a compression level.
//! Every encoded chunk starts with one tag byte telling raw payloads from
//! compressed ones.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::format::{CHUNK_RAW, CHUNK_ZLIB};
use crate::util::{Error, Result};

/// Highest accepted compression level.
pub const MAX_LEVEL: u8 = 9;

/// Encode a chunk payload.
///
/// Level 0 stores the payload raw. Compressed output is only kept when it is
/// smaller than the input.
pub fn encode_chunk(data: &[u8], level: u8) -> Result<Vec<u8>> {
    if level > 0 && !data.is_empty() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(MAX_LEVEL) as u32));
        encoder.write_all(data)?;
        let compressed = encoder.finish()?;

        if compressed.len() < data.len() {
            let mut out = Vec::with_capacity(1 + compressed.len());
            out.push(CHUNK_ZLIB);
            out.extend_from_slice(&compressed);
            return Ok(out);
        }
    }

    let mut out = Vec::with_capacity(1 + data.len());
    out.push(CHUNK_RAW);
    out.extend_from_slice(data);
    Ok(out)
}

/// Decode a chunk produced by [`encode_chunk`].
pub fn decode_chunk(data: &[u8]) -> Result<Vec<u8>> {
    let (&tag, payload) = data
        .split_first()
        .ok_or_else(|| Error::invalid("empty chunk block"))?;

    match tag {
        CHUNK_RAW => Ok(payload.to_vec()),
        CHUNK_ZLIB => {
            let mut decoder = ZlibDecoder::new(payload);
            let mut out = Vec::with_capacity(payload.len() * 4);
            decoder.read_to_end(&mut out)?;
            Ok(out)
        }
        other => Err(Error::invalid(format!("unknown chunk encoding {}", other))),
    }
}

/// Check if an encoded chunk is compressed.
pub fn is_compressed(data: &[u8]) -> bool {
    data.first() == Some(&CHUNK_ZLIB)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_decompress() {
        let original = b"Hello, World! This is some test data that should compress well when repeated. ".repeat(100);

        let encoded = encode_chunk(&original, 6).unwrap();
        assert!(is_compressed(&encoded));
        assert!(encoded.len() < original.len());

        assert_eq!(decode_chunk(&encoded).unwrap(), original);
    }

    #[test]
    fn test_no_compression_level_zero() {
        let original = vec![7u8; 512];
        let encoded = encode_chunk(&original, 0).unwrap();
        assert!(!is_compressed(&encoded));
        assert_eq!(decode_chunk(&encoded).unwrap(), original);
    }

    #[test]
    fn test_no_compression_if_larger() {
        let original = b"Hi";
        let encoded = encode_chunk(original, 9).unwrap();
        assert!(!is_compressed(&encoded));
        assert_eq!(decode_chunk(&encoded).unwrap(), original);
    }

    #[test]
    fn test_unknown_tag() {
        assert!(decode_chunk(&[42, 1, 2]).is_err());
        assert!(decode_chunk(&[]).is_err());
    }
}
