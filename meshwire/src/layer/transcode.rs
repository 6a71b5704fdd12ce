//! Compression transcoding layer.

use axum::body::Body;
use axum::http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH};
use axum::http::{HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tower::{Layer, Service, ServiceExt};

use meshwire_core::{
    CompressionEncoding, CompressionLevel, ErrorKind, compress, decompress,
    negotiate_response_encoding,
};

use crate::error::MeshError;
use crate::whitelist::Whitelist;

/// Layer that decompresses zstd request bodies and compresses responses for
/// peers that accept zstd.
///
/// HEAD requests and whitelisted paths pass through untouched. Requests
/// declaring an encoding other than zstd or identity are rejected with 415.
///
/// # Example
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/Ping", any(handler))
///     .layer(TranscodeLayer::new(Whitelist::default()));
/// ```
#[derive(Debug, Clone)]
pub struct TranscodeLayer {
    whitelist: Whitelist,
    level: CompressionLevel,
    /// Maximum request body size in bytes, applied to the received and the
    /// decompressed body. `None` means unlimited.
    receive_max_bytes: Option<usize>,
}

impl TranscodeLayer {
    pub fn new(whitelist: Whitelist) -> Self {
        Self {
            whitelist,
            level: CompressionLevel::Default,
            receive_max_bytes: None,
        }
    }

    /// Compression level used for responses.
    pub fn compression_level(mut self, level: CompressionLevel) -> Self {
        self.level = level;
        self
    }

    /// Reject request bodies larger than `max` bytes, both as received and
    /// after decompression.
    pub fn receive_max_bytes(mut self, max: Option<usize>) -> Self {
        self.receive_max_bytes = max;
        self
    }
}

impl<S> Layer<S> for TranscodeLayer {
    type Service = TranscodeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TranscodeService {
            inner,
            whitelist: self.whitelist.clone(),
            level: self.level,
            receive_max_bytes: self.receive_max_bytes,
        }
    }
}

/// Service produced by [`TranscodeLayer`].
#[derive(Debug, Clone)]
pub struct TranscodeService<S> {
    inner: S,
    whitelist: Whitelist,
    level: CompressionLevel,
    receive_max_bytes: Option<usize>,
}

impl<S> Service<Request<Body>> for TranscodeService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let inner = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, inner);

        if req.method() == Method::HEAD || self.whitelist.contains(req.uri().path()) {
            return Box::pin(async move { inner.oneshot(req).await });
        }

        if let (Some(max), Some(size)) = (self.receive_max_bytes, content_length(&req)) {
            if size > max {
                tracing::warn!(size, max, "rejecting oversized request body");
                let err = MeshError::payload_too_large(size, max);
                return Box::pin(async move { Ok(err.into_response()) });
            }
        }

        let declared = req
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let Some(request_encoding) = CompressionEncoding::from_header(declared.as_deref()) else {
            let declared = declared.unwrap_or_default();
            tracing::warn!(encoding = %declared, "rejecting unsupported content-encoding");
            let err = MeshError::unsupported_encoding(&declared);
            return Box::pin(async move { Ok(err.into_response()) });
        };
        let response_encoding = negotiate_response_encoding(
            req.headers()
                .get(ACCEPT_ENCODING)
                .and_then(|v| v.to_str().ok()),
        );
        let level = self.level;
        let limit = self.receive_max_bytes;

        Box::pin(async move {
            let req = match decode_request(req, request_encoding, limit).await {
                Ok(req) => req,
                Err(err) => return Ok(err.into_response()),
            };

            let response = inner.oneshot(req).await?;
            Ok(encode_response(response, response_encoding, level).await)
        })
    }
}

async fn decode_request(
    req: Request<Body>,
    encoding: CompressionEncoding,
    limit: Option<usize>,
) -> Result<Request<Body>, MeshError> {
    if encoding.is_identity() && limit.is_none() {
        return Ok(req);
    }

    let (mut parts, body) = req.into_parts();
    let max = limit.unwrap_or(usize::MAX);
    let received = axum::body::to_bytes(body, max).await.map_err(|e| {
        tracing::warn!(max, error = %e, "rejecting request body");
        MeshError::new(
            ErrorKind::Validation,
            format!("failed to read request body within {max} bytes: {e}"),
        )
        .with_status(StatusCode::PAYLOAD_TOO_LARGE)
    })?;

    let body = if encoding.is_identity() {
        received
    } else {
        let decompressed = decompress(received.clone(), encoding).map_err(|e| {
            MeshError::new(
                ErrorKind::Compression,
                format!("failed to decompress zstd data: {e}"),
            )
        })?;
        tracing::debug!(
            compressed_size = received.len(),
            decompressed_size = decompressed.len(),
            "decompressed request body"
        );
        if decompressed.len() > max {
            tracing::warn!(
                size = decompressed.len(),
                max,
                "rejecting oversized decompressed body"
            );
            return Err(MeshError::payload_too_large(decompressed.len(), max));
        }
        parts.headers.remove(CONTENT_ENCODING);
        decompressed
    };

    parts.headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    Ok(Request::from_parts(parts, Body::from(body)))
}

async fn encode_response(
    response: Response,
    encoding: CompressionEncoding,
    level: CompressionLevel,
) -> Response {
    if encoding.is_identity() || response.headers().contains_key(CONTENT_ENCODING) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "failed to read response body for compression");
            return MeshError::internal(format!("failed to read response body: {e}"))
                .into_response();
        }
    };
    if bytes.is_empty() {
        return Response::from_parts(parts, Body::empty());
    }

    let original_size = bytes.len();
    let compressed: Bytes = match compress(bytes, encoding, level) {
        Ok(compressed) => compressed,
        Err(e) => {
            tracing::error!(error = %e, "failed to compress response body");
            return MeshError::from(e)
                .with_status(StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    };
    tracing::debug!(
        original_size,
        compressed_size = compressed.len(),
        "compressed response body"
    );

    parts
        .headers
        .insert(CONTENT_ENCODING, HeaderValue::from_static(encoding.as_str()));
    parts
        .headers
        .insert(CONTENT_LENGTH, HeaderValue::from(compressed.len()));
    Response::from_parts(parts, Body::from(compressed))
}

/// Get Content-Length header value as usize.
fn content_length<B>(req: &Request<B>) -> Option<usize> {
    req.headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}
