//! JSON frame encoding with optional gzip.
//!
//! Decoding sniffs the gzip magic bytes, so compressed and plain payloads
//! can be mixed freely in one store or directory.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StoreError};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Encodes records as UTF-8 JSON, gzipped when `compress` is set.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    compress: bool,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self { compress: true }
    }
}

impl FrameCodec {
    pub fn new(compress: bool) -> Self {
        Self { compress }
    }

    pub fn compresses(&self) -> bool {
        self.compress
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let json = serde_json::to_vec_pretty(value)?;
        if !self.compress {
            return Ok(json);
        }
        let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 4), Compression::default());
        encoder.write_all(&json)?;
        Ok(encoder.finish()?)
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        decode(bytes)
    }
}

/// Whether the payload starts with the gzip magic bytes.
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[..2] == GZIP_MAGIC
}

/// Decode a JSON payload, inflating it first if gzipped.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if is_gzip(bytes) {
        let mut json = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut json)
            .map_err(|e| StoreError::Codec(format!("gzip: {e}")))?;
        Ok(serde_json::from_slice(&json)?)
    } else {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_compressed_payload_has_magic() {
        let bytes = FrameCodec::new(true).encode(&json!({"tick": 1})).unwrap();
        assert!(is_gzip(&bytes));
        let back: Value = decode(&bytes).unwrap();
        assert_eq!(back["tick"], 1);
    }

    #[test]
    fn test_plain_payload_decodes() {
        let bytes = FrameCodec::new(false).encode(&json!({"tick": 2})).unwrap();
        assert!(!is_gzip(&bytes));
        let back: Value = FrameCodec::new(true).decode(&bytes).unwrap();
        assert_eq!(back["tick"], 2);
    }

    #[test]
    fn test_corrupt_gzip_is_codec_error() {
        let err = decode::<Value>(&[0x1f, 0x8b, 0x00, 0x01]).unwrap_err();
        assert!(matches!(err, StoreError::Codec(_)));
    }
}
