//! Compression negotiation and helpers.
//!
//! This module provides the types both peers use to agree on body compression:
//! - [`CompressionEncoding`]: Supported encodings
//! - [`CompressionLevel`]: Compression quality settings
//! - [`compress`] / [`decompress`]: one-shot transcoding helpers
//!
//! A request body is compressed iff the sender declares
//! `content-encoding: zstd`. A response is compressed iff the request
//! advertised `accept-encoding: zstd` and the response has a body.

use bytes::Bytes;

use crate::codec::{BoxedCodec, ZstdCodec};
use crate::error::CompressionError;

/// Supported compression encodings.
///
/// This enum is used for header parsing and negotiation.
/// Use [`CompressionEncoding::codec()`] to get the actual codec implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionEncoding {
    #[default]
    Identity,
    Zstd,
}

impl CompressionEncoding {
    /// Parse from a Content-Encoding header value.
    /// Returns None for unsupported encodings.
    pub fn from_header(value: Option<&str>) -> Option<Self> {
        let value = value.map(|v| v.trim().to_ascii_lowercase());
        match value.as_deref() {
            None | Some("identity") | Some("") => Some(Self::Identity),
            Some("zstd") => Some(Self::Zstd),
            _ => None,
        }
    }

    /// Get the header value string for this encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Zstd => "zstd",
        }
    }

    /// Returns true if this encoding is identity (no compression).
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    /// Get the codec for this encoding.
    ///
    /// Returns `None` for identity, `Some(BoxedCodec)` for others.
    pub fn codec(&self) -> Option<BoxedCodec> {
        self.codec_with_level(CompressionLevel::Default)
    }

    /// Get the codec for this encoding with the specified compression level.
    pub fn codec_with_level(&self, level: CompressionLevel) -> Option<BoxedCodec> {
        match self {
            Self::Identity => None,
            Self::Zstd => Some(BoxedCodec::new(ZstdCodec::with_level(level_to_zstd(level)))),
        }
    }
}

/// Compression level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionLevel {
    /// Fastest compression (lowest ratio).
    Fastest,
    /// Best compression (highest ratio, slowest).
    Best,
    /// Moderate level tuned for many small payloads (zstd level 3).
    #[default]
    Default,
    /// Precise compression level (zstd: 1-22).
    Precise(u32),
}

impl CompressionLevel {
    /// Create a compression level with a precise value.
    pub fn precise(level: u32) -> Self {
        CompressionLevel::Precise(level)
    }
}

/// Convert CompressionLevel to zstd level (1-22).
fn level_to_zstd(level: CompressionLevel) -> i32 {
    match level {
        CompressionLevel::Fastest => 1,
        CompressionLevel::Best => 22,
        CompressionLevel::Default => 3,
        CompressionLevel::Precise(n) => n.min(22) as i32,
    }
}

/// Compress `data` with `encoding` at `level`.
///
/// Identity returns the input unchanged.
pub fn compress(
    data: Bytes,
    encoding: CompressionEncoding,
    level: CompressionLevel,
) -> Result<Bytes, CompressionError> {
    let Some(codec) = encoding.codec_with_level(level) else {
        return Ok(data);
    };
    codec
        .compress(&data)
        .map_err(|e| CompressionError::Compress(e.to_string()))
}

/// Decompress `data` that was encoded with `encoding`.
///
/// Fails with [`CompressionError::Decompress`] when the input is not valid
/// compressed data.
pub fn decompress(data: Bytes, encoding: CompressionEncoding) -> Result<Bytes, CompressionError> {
    let Some(codec) = encoding.codec() else {
        return Ok(data);
    };
    codec
        .decompress(&data)
        .map_err(|e| CompressionError::Decompress(e.to_string()))
}

/// Negotiate response encoding from an Accept-Encoding header.
///
/// First supported encoding wins (client preference order).
/// Respects `q=0` which means "not acceptable" per RFC 7231.
pub fn negotiate_response_encoding(accept: Option<&str>) -> CompressionEncoding {
    let Some(accept) = accept else {
        return CompressionEncoding::Identity;
    };

    for token in accept.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        // Parse "zstd;q=0.5" into encoding="zstd", q_value=Some("0.5")
        let (encoding, q_value) = match token.split_once(';') {
            Some((enc, params)) => {
                let q = params.split(';').find_map(|p| p.trim().strip_prefix("q="));
                (enc.trim(), q)
            }
            None => (token, None),
        };

        if let Some(q) = q_value {
            if q.trim().parse::<f32>().map(|q| q <= 0.0).unwrap_or(false) {
                continue;
            }
        }

        if encoding.eq_ignore_ascii_case("zstd") {
            return CompressionEncoding::Zstd;
        }
        if encoding.eq_ignore_ascii_case("identity") {
            return CompressionEncoding::Identity;
        }
    }

    CompressionEncoding::Identity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_encoding_from_header() {
        assert_eq!(
            CompressionEncoding::from_header(None),
            Some(CompressionEncoding::Identity)
        );
        assert_eq!(
            CompressionEncoding::from_header(Some("")),
            Some(CompressionEncoding::Identity)
        );
        assert_eq!(
            CompressionEncoding::from_header(Some("identity")),
            Some(CompressionEncoding::Identity)
        );
        assert_eq!(
            CompressionEncoding::from_header(Some("zstd")),
            Some(CompressionEncoding::Zstd)
        );
        assert_eq!(
            CompressionEncoding::from_header(Some(" ZSTD ")),
            Some(CompressionEncoding::Zstd)
        );
        assert_eq!(CompressionEncoding::from_header(Some("gzip")), None);
    }

    #[test]
    fn test_compression_encoding_as_str() {
        assert_eq!(CompressionEncoding::Identity.as_str(), "identity");
        assert_eq!(CompressionEncoding::Zstd.as_str(), "zstd");
    }

    #[test]
    fn test_compression_encoding_codec() {
        assert!(CompressionEncoding::Identity.codec().is_none());
        let codec = CompressionEncoding::Zstd.codec();
        assert_eq!(codec.unwrap().name(), "zstd");
    }

    #[test]
    fn test_level_to_zstd() {
        assert_eq!(level_to_zstd(CompressionLevel::Default), 3);
        assert_eq!(level_to_zstd(CompressionLevel::Fastest), 1);
        assert_eq!(level_to_zstd(CompressionLevel::Best), 22);
        assert_eq!(level_to_zstd(CompressionLevel::precise(40)), 22);
    }

    #[test]
    fn test_round_trip() {
        let payloads: [&[u8]; 4] = [
            b"",
            b"x",
            br#"{"body":{"field":true}}"#,
            &[0u8, 255, 17, 42, 0, 0, 0, 9],
        ];
        for payload in payloads {
            let data = Bytes::copy_from_slice(payload);
            let compressed =
                compress(data.clone(), CompressionEncoding::Zstd, CompressionLevel::Default)
                    .unwrap();
            let restored = decompress(compressed, CompressionEncoding::Zstd).unwrap();
            assert_eq!(restored, data);
        }
    }

    #[test]
    fn test_identity_is_passthrough() {
        let data = Bytes::from_static(b"plain");
        let out = compress(data.clone(), CompressionEncoding::Identity, CompressionLevel::Best)
            .unwrap();
        assert_eq!(out, data);
        assert_eq!(decompress(out, CompressionEncoding::Identity).unwrap(), data);
    }

    #[test]
    fn test_decompress_invalid_data() {
        let err = decompress(Bytes::from_static(b"{\"plain\":1}"), CompressionEncoding::Zstd)
            .unwrap_err();
        assert!(matches!(err, CompressionError::Decompress(_)));
    }

    #[test]
    fn test_negotiate_response_encoding() {
        assert_eq!(
            negotiate_response_encoding(None),
            CompressionEncoding::Identity
        );
        assert_eq!(
            negotiate_response_encoding(Some("")),
            CompressionEncoding::Identity
        );
        assert_eq!(
            negotiate_response_encoding(Some("zstd")),
            CompressionEncoding::Zstd
        );
        assert_eq!(
            negotiate_response_encoding(Some("gzip, zstd")),
            CompressionEncoding::Zstd
        );
        assert_eq!(
            negotiate_response_encoding(Some("gzip, br")),
            CompressionEncoding::Identity
        );
    }

    #[test]
    fn test_negotiate_response_encoding_q_values() {
        assert_eq!(
            negotiate_response_encoding(Some("zstd;q=0")),
            CompressionEncoding::Identity
        );
        assert_eq!(
            negotiate_response_encoding(Some("zstd;q=0.000, identity")),
            CompressionEncoding::Identity
        );
        assert_eq!(
            negotiate_response_encoding(Some("zstd;q=0.5")),
            CompressionEncoding::Zstd
        );
    }
}
