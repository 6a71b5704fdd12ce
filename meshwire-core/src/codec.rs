//! Compression codec trait and implementations.
//!
//! This module provides the [`Codec`] trait for body compression and the
//! implementations the mesh speaks on the wire:
//! - [`IdentityCodec`]: passthrough
//! - [`ZstdCodec`]: Zstandard, the only compressed encoding peers negotiate

use bytes::Bytes;
use std::io::{self, Read};
use std::sync::Arc;

/// Codec trait for whole-body compression.
///
/// # Example
///
/// ```ignore
/// use meshwire_core::Codec;
/// use bytes::Bytes;
/// use std::io;
///
/// struct Lz4Codec;
///
/// impl Codec for Lz4Codec {
///     fn name(&self) -> &'static str { "lz4" }
///
///     fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
///         // ... lz4 compression
///     }
///
///     fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
///         // ... lz4 decompression
///     }
/// }
/// ```
pub trait Codec: Send + Sync + 'static {
    /// The encoding name for HTTP headers (e.g., "zstd").
    fn name(&self) -> &'static str;

    /// Compress data.
    fn compress(&self, data: &[u8]) -> io::Result<Bytes>;

    /// Decompress data.
    fn decompress(&self, data: &[u8]) -> io::Result<Bytes>;
}

/// A boxed codec for type-erased storage.
///
/// Use `Option<BoxedCodec>` where `None` represents identity (no compression).
#[derive(Clone)]
pub struct BoxedCodec(Arc<dyn Codec>);

impl BoxedCodec {
    /// Create a new boxed codec.
    pub fn new<C: Codec>(codec: C) -> Self {
        BoxedCodec(Arc::new(codec))
    }

    /// Get the codec name for HTTP headers.
    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Compress data.
    pub fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        self.0.compress(data)
    }

    /// Decompress data.
    pub fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        self.0.decompress(data)
    }
}

impl std::fmt::Debug for BoxedCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BoxedCodec").field(&self.name()).finish()
    }
}

/// Identity codec (no compression).
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl Codec for IdentityCodec {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        Ok(Bytes::copy_from_slice(data))
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        Ok(Bytes::copy_from_slice(data))
    }
}

/// Zstd codec.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    /// Compression level (1-22). Default is 3.
    pub level: i32,
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self { level: 3 }
    }
}

impl ZstdCodec {
    /// Create a new ZstdCodec with the specified compression level.
    ///
    /// Level ranges from 1 (fastest) to 22 (best compression).
    pub fn with_level(level: i32) -> Self {
        Self {
            level: level.clamp(1, 22),
        }
    }
}

impl Codec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        let compressed = zstd::bulk::compress(data, self.level).map_err(io::Error::other)?;
        Ok(Bytes::from(compressed))
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        // Streaming decoder: frames written without a content size still decode.
        let mut decoder = zstd::Decoder::new(data)?;
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(Bytes::from(decompressed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_codec_passthrough() {
        let codec = IdentityCodec;
        assert_eq!(codec.name(), "identity");
        let data = b"unchanged";
        assert_eq!(codec.compress(data).unwrap().as_ref(), data);
        assert_eq!(codec.decompress(data).unwrap().as_ref(), data);
    }

    #[test]
    fn test_zstd_codec_compress_decompress() {
        let codec = ZstdCodec::default();
        assert_eq!(codec.name(), "zstd");

        let original = br#"{"body":{"field":true},"error":null,"metadata":{}}"#;
        let compressed = codec.compress(original).unwrap();
        let decompressed = codec.decompress(&compressed).unwrap();
        assert_eq!(decompressed.as_ref(), original);
    }

    #[test]
    fn test_zstd_codec_shrinks_repetitive_payloads() {
        let codec = ZstdCodec::default();
        let original = "mesh ".repeat(4096);
        let compressed = codec.compress(original.as_bytes()).unwrap();
        assert!(compressed.len() < original.len() / 10);
    }

    #[test]
    fn test_zstd_codec_rejects_garbage() {
        let codec = ZstdCodec::default();
        assert!(codec.decompress(b"definitely not a zstd frame").is_err());
    }

    #[test]
    fn test_zstd_codec_with_level_clamps() {
        assert_eq!(ZstdCodec::with_level(0).level, 1);
        assert_eq!(ZstdCodec::with_level(19).level, 19);
        assert_eq!(ZstdCodec::with_level(99).level, 22);
    }

    #[test]
    fn test_boxed_codec_delegates() {
        let codec = BoxedCodec::new(ZstdCodec::default());
        assert_eq!(codec.name(), "zstd");
        assert_eq!(format!("{codec:?}"), "BoxedCodec(\"zstd\")");

        let compressed = codec.compress(b"boxed").unwrap();
        assert_eq!(codec.decompress(&compressed).unwrap().as_ref(), b"boxed");
    }
}
