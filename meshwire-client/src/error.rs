//! Client-side error types.
//!
//! This module provides [`ClientError`], the error type for meshwire client
//! operations. Every variant maps to one [`ErrorKind`] and is classified as
//! retryable or not.

use std::time::Duration;

use http::StatusCode;
use meshwire_core::{CompressionError, EnvelopeError, ErrorKind, SignError};

/// Client-side error variants.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    /// The peer answered with a non-success status.
    #[error("server returned {status}{}", message_suffix(.message))]
    Status {
        status: StatusCode,
        /// The `error` string of the peer's envelope, when it was readable.
        message: Option<String>,
    },

    /// Connection-level failure (refused, reset, DNS, TLS).
    #[error("transport error: {0}")]
    Transport(String),

    /// An attempt did not complete within the per-attempt timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The payload could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),

    /// The response was not a decodable envelope.
    #[error("decode error: {0}")]
    Decode(String),

    /// A body could not be compressed or decompressed.
    #[error("compression error: {0}")]
    Compression(String),

    /// The signer failed to sign the request message.
    #[error("signing error: {0}")]
    Signing(String),

    /// The client or a retry policy was misconfigured.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The caller canceled the exchange.
    #[error("request canceled")]
    Canceled,

    /// Every permitted attempt failed.
    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ClientError>,
    },
}

impl ClientError {
    /// Create a status error.
    pub fn status(status: StatusCode, message: Option<String>) -> Self {
        ClientError::Status { status, message }
    }

    /// The failure class of this error.
    ///
    /// Status errors are classified by their code: 403 is an invalid
    /// signature, other 4xx are validation failures, everything else is a
    /// transport failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Status { status, .. } => {
                if *status == StatusCode::FORBIDDEN {
                    ErrorKind::InvalidSignature
                } else if status.is_client_error() && !is_transient_status(*status) {
                    ErrorKind::Validation
                } else {
                    ErrorKind::Transport
                }
            }
            ClientError::Transport(_) | ClientError::Timeout(_) => ErrorKind::Transport,
            ClientError::RetriesExhausted { .. } => ErrorKind::Transport,
            ClientError::Encode(_) | ClientError::Signing(_) | ClientError::Config(_) => {
                ErrorKind::Internal
            }
            ClientError::Decode(_) => ErrorKind::Decode,
            ClientError::Compression(_) => ErrorKind::Compression,
            ClientError::Canceled => ErrorKind::Canceled,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> Option<&str> {
        match self {
            ClientError::Status { message, .. } => message.as_deref(),
            ClientError::Transport(msg)
            | ClientError::Encode(msg)
            | ClientError::Decode(msg)
            | ClientError::Compression(msg)
            | ClientError::Signing(msg)
            | ClientError::Config(msg) => Some(msg),
            ClientError::RetriesExhausted { last, .. } => last.message(),
            ClientError::Timeout(_) | ClientError::Canceled => None,
        }
    }

    /// The HTTP status the peer answered with, if any.
    pub fn http_status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::RetriesExhausted { last, .. } => last.http_status(),
            _ => None,
        }
    }

    /// Returns whether this error indicates a transient condition that may
    /// be resolved by retrying.
    ///
    /// Transport failures, timeouts, undecodable responses, and the statuses
    /// 408, 425, 429 and 5xx are retryable. Authentication and validation
    /// rejections, encode and signing failures, and cancellation are not.
    ///
    /// # Example
    ///
    /// ```
    /// use meshwire_client::ClientError;
    /// use http::StatusCode;
    ///
    /// let err = ClientError::status(StatusCode::SERVICE_UNAVAILABLE, None);
    /// assert!(err.is_retryable());
    ///
    /// let err = ClientError::status(StatusCode::FORBIDDEN, None);
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Status { status, .. } => is_transient_status(*status),
            ClientError::RetriesExhausted { .. } => false,
            other => other.kind().is_retryable(),
        }
    }
}

fn message_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

fn is_transient_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 425 | 429) || status.is_server_error()
}

impl From<EnvelopeError> for ClientError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Malformed(msg) => {
                ClientError::Decode(format!("malformed envelope: {msg}"))
            }
            EnvelopeError::Empty => ClientError::Decode("empty envelope".to_string()),
            EnvelopeError::Encode(msg) => ClientError::Encode(msg),
        }
    }
}

impl From<CompressionError> for ClientError {
    fn from(err: CompressionError) -> Self {
        ClientError::Compression(err.to_string())
    }
}

impl From<SignError> for ClientError {
    fn from(err: SignError) -> Self {
        ClientError::Signing(err.0)
    }
}
