//! Error taxonomy shared by both sides of an exchange.
//!
//! - [`ErrorKind`]: the tagged failure classes and their single status mapping
//! - [`CompressionError`]: body compression/decompression failures
//! - [`EnvelopeError`]: envelope encoding/decoding failures
//! - [`SignError`]: failures of the external signer capability

use std::str::FromStr;

use http::StatusCode;
use serde::Serialize;

/// Failure classes of the exchange protocol.
///
/// Every failure either side can observe maps to exactly one kind, and every
/// kind maps to exactly one HTTP status through [`ErrorKind::http_status`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// One or more identity headers were absent or empty.
    MissingCredentials,
    /// The verifier rejected the identity/message/signature triple.
    InvalidSignature,
    /// A body could not be compressed or decompressed.
    Compression,
    /// A body was not valid JSON, or the envelope was empty.
    Decode,
    /// A payload did not match the expected shape.
    Validation,
    /// Connection, timeout, or non-success transport status.
    Transport,
    /// The caller abandoned the exchange mid-flight.
    Canceled,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Get the string representation of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MissingCredentials => "missing_credentials",
            ErrorKind::InvalidSignature => "invalid_signature",
            ErrorKind::Compression => "compression",
            ErrorKind::Decode => "decode",
            ErrorKind::Validation => "validation",
            ErrorKind::Transport => "transport",
            ErrorKind::Canceled => "canceled",
            ErrorKind::Internal => "internal",
        }
    }

    /// The HTTP status a server answers with for this kind.
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorKind::MissingCredentials => StatusCode::BAD_REQUEST,
            ErrorKind::InvalidSignature => StatusCode::FORBIDDEN,
            ErrorKind::Compression => StatusCode::BAD_REQUEST,
            ErrorKind::Decode => StatusCode::BAD_REQUEST,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Transport => StatusCode::BAD_GATEWAY,
            ErrorKind::Canceled => StatusCode::REQUEST_TIMEOUT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns whether a failure of this kind may succeed when retried
    /// without caller action.
    ///
    /// Authentication and validation failures are certain to fail again, so
    /// only transport and decode-class failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Transport | ErrorKind::Decode | ErrorKind::Compression
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an [`ErrorKind`] from a string fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseErrorKindError(());

impl std::fmt::Display for ParseErrorKindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown error kind")
    }
}

impl std::error::Error for ParseErrorKindError {}

impl FromStr for ErrorKind {
    type Err = ParseErrorKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "missing_credentials" => Ok(ErrorKind::MissingCredentials),
            "invalid_signature" => Ok(ErrorKind::InvalidSignature),
            "compression" => Ok(ErrorKind::Compression),
            "decode" => Ok(ErrorKind::Decode),
            "validation" => Ok(ErrorKind::Validation),
            "transport" => Ok(ErrorKind::Transport),
            "canceled" | "cancelled" => Ok(ErrorKind::Canceled),
            "internal" => Ok(ErrorKind::Internal),
            _ => Err(ParseErrorKindError(())),
        }
    }
}

/// Compression failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CompressionError {
    /// Compressing a body failed.
    #[error("compression failed: {0}")]
    Compress(String),

    /// The input was not valid compressed data.
    #[error("decompression failed: {0}")]
    Decompress(String),

    /// The peer declared an encoding this side does not speak.
    #[error("unsupported content-encoding: {0}")]
    Unsupported(String),
}

/// Envelope encoding and decoding failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    /// The bytes were not a JSON object.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// The JSON carried no envelope fields at all.
    #[error("empty envelope")]
    Empty,

    /// The body or metadata could not be serialized.
    #[error("failed to encode envelope: {0}")]
    Encode(String),
}

impl EnvelopeError {
    /// The failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EnvelopeError::Malformed(_) | EnvelopeError::Empty => ErrorKind::Decode,
            EnvelopeError::Encode(_) => ErrorKind::Internal,
        }
    }
}

/// Failure of the external signing capability.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("signing failed: {0}")]
pub struct SignError(pub String);

impl SignError {
    /// Create a new signing error.
    pub fn new<S: Into<String>>(message: S) -> Self {
        SignError(message.into())
    }
}
