//! Gzip body codec

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::CodecError;

/// Gzip `data` at the best compression level
pub fn compress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::best());
    encoder.write_all(data).map_err(CodecError::Compress)?;
    encoder.finish().map_err(CodecError::Compress)
}

/// Inflate a gzip stream; truncated or non-gzip input is an error
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(CodecError::Decompress)?;
    Ok(out)
}

/// Inflate a gzip stream, stopping once the output passes `limit` bytes
pub fn decompress_limited(data: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
    let mut decoder = GzDecoder::new(data).take(limit as u64 + 1);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(CodecError::Decompress)?;
    if out.len() > limit {
        return Err(CodecError::TooLarge(limit));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_roundtrip() {
        let body = br#"[{"id":"Alloc","type":"gauge","value":1024.0}]"#;
        let packed = compress(body).unwrap();
        assert_eq!(&packed[..2], &[0x1f, 0x8b]);
        assert_eq!(decompress(&packed).unwrap(), body.to_vec());
    }

    #[test]
    fn test_decompress_garbage() {
        assert!(matches!(
            decompress(b"definitely not gzip"),
            Err(CodecError::Decompress(_))
        ));
    }

    #[test]
    fn test_decompress_limited_stops_at_limit() {
        let packed = compress(&vec![0u8; 1 << 20]).unwrap();
        assert!(packed.len() < 8 * 1024);
        assert!(matches!(
            decompress_limited(&packed, 64 * 1024),
            Err(CodecError::TooLarge(65536))
        ));
    }

    #[test]
    fn test_decompress_limited_accepts_exact_size() {
        let body = vec![3u8; 4096];
        let packed = compress(&body).unwrap();
        assert_eq!(decompress_limited(&packed, 4096).unwrap(), body);
        assert!(decompress_limited(&packed, 4095).is_err());
    }

    #[test]
    fn test_decompress_truncated() {
        let packed = compress(&[7u8; 4096]).unwrap();
        assert!(decompress(&packed[..packed.len() / 2]).is_err());
    }
}
