//! Server-side error type and envelope response encoding.
//!
//! [`MeshError`] is what handlers return on failure. Every error becomes a
//! `{body, error, metadata}` envelope whose status is the explicitly attached
//! one, or the [`ErrorKind`]'s mapping otherwise.

use axum::{
    body::Body,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

pub use meshwire_core::ErrorKind;
use meshwire_core::{CompressionError, EnvelopeError, Metadata, encode};

/// Envelope sent when a response envelope itself cannot be encoded.
const ENCODE_FAILURE_ENVELOPE: &[u8] =
    br#"{"body":{},"error":"failed to encode response envelope","metadata":{}}"#;

/// A failure surfaced to the peer as an envelope.
#[derive(Clone, Debug)]
pub struct MeshError {
    kind: ErrorKind,
    message: String,
    status: Option<StatusCode>,
    body: Option<Value>,
}

impl MeshError {
    /// Create a new error with a kind and message.
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            body: None,
        }
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Create a validation error.
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a decode error.
    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Decode, message)
    }

    /// Rejection for a request lacking identity headers.
    pub fn missing_credentials(missing: &[&str]) -> Self {
        Self::new(
            ErrorKind::MissingCredentials,
            format!("Bad Request, missing headers: {}", missing.join(", ")),
        )
    }

    /// Rejection for a signature the verifier did not accept.
    pub fn invalid_signature() -> Self {
        Self::new(
            ErrorKind::InvalidSignature,
            "Forbidden due to invalid signature",
        )
    }

    pub fn not_found(path: &str) -> Self {
        Self::new(ErrorKind::Validation, format!("no route for {path}"))
            .with_status(StatusCode::NOT_FOUND)
    }

    pub fn method_not_allowed(method: &Method) -> Self {
        Self::new(ErrorKind::Validation, format!("method {method} not allowed"))
            .with_status(StatusCode::METHOD_NOT_ALLOWED)
    }

    pub fn payload_too_large(size: usize, max: usize) -> Self {
        Self::new(
            ErrorKind::Validation,
            format!("request body size {size} exceeds maximum allowed size of {max} bytes"),
        )
        .with_status(StatusCode::PAYLOAD_TOO_LARGE)
    }

    pub fn unsupported_encoding(encoding: &str) -> Self {
        Self::new(
            ErrorKind::Compression,
            format!("unsupported content-encoding: {encoding}"),
        )
        .with_status(StatusCode::UNSUPPORTED_MEDIA_TYPE)
    }

    /// Attach an explicit status, overriding the kind's mapping.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach a body to return instead of `{}`.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The status this error is answered with.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or_else(|| self.kind.http_status())
    }
}

impl std::fmt::Display for MeshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for MeshError {}

impl From<EnvelopeError> for MeshError {
    fn from(err: EnvelopeError) -> Self {
        MeshError::new(err.kind(), err.to_string())
    }
}

impl From<CompressionError> for MeshError {
    fn from(err: CompressionError) -> Self {
        match err {
            CompressionError::Unsupported(encoding) => MeshError::unsupported_encoding(&encoding),
            other => MeshError::new(ErrorKind::Compression, other.to_string()),
        }
    }
}

impl IntoResponse for MeshError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self.body {
            Some(body) => envelope_response(status, body, Some(&self.message)),
            None => envelope_response(status, &Metadata::new(), Some(&self.message)),
        }
    }
}

/// Build a JSON envelope response.
///
/// Falls back to a fixed 500 envelope if `body` cannot be serialized.
pub fn envelope_response<B>(status: StatusCode, body: &B, error: Option<&str>) -> Response
where
    B: Serialize + ?Sized,
{
    match encode(body, error, None) {
        Ok(bytes) => json_response(status, bytes),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode response envelope");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                Bytes::from_static(ENCODE_FAILURE_ENVELOPE),
            )
        }
    }
}

fn json_response(status: StatusCode, bytes: Bytes) -> Response {
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn read_envelope(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_response_is_envelope() {
        let response = MeshError::internal("boom").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(
            read_envelope(response).await,
            json!({"body": {}, "error": "boom", "metadata": {}})
        );
    }

    #[tokio::test]
    async fn test_explicit_status_wins() {
        let err = MeshError::internal("teapot").with_status(StatusCode::IM_A_TEAPOT);
        assert_eq!(err.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(err.into_response().status(), StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn test_validation_error_carries_body() {
        let response = MeshError::validation("validation error: missing field")
            .with_body(json!({"wrong": 1}))
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let envelope = read_envelope(response).await;
        assert_eq!(envelope["body"], json!({"wrong": 1}));
    }

    #[test]
    fn test_missing_credentials_names_headers() {
        let err = MeshError::missing_credentials(&["x-hotkey", "x-message"]);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.message().contains("x-hotkey, x-message"));
    }

    #[test]
    fn test_invalid_signature_is_forbidden() {
        let err = MeshError::invalid_signature();
        assert_eq!(err.kind(), ErrorKind::InvalidSignature);
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_from_compression_error() {
        let err: MeshError = CompressionError::Unsupported("gzip".into()).into();
        assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let err: MeshError = CompressionError::Decompress("bad frame".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
