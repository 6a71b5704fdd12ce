//! Response resolution.
//!
//! Turns a raw HTTP response into an [`Envelope`] whose body is validated
//! against the expected payload type. Bodies that fail validation are kept
//! as raw JSON rather than failing the exchange.

use bytes::Bytes;
use http::{HeaderMap, StatusCode, header};
use meshwire_core::{
    Body, CompressionEncoding, Envelope, EnvelopeError, Payload, decode, decompress,
};

use crate::ClientError;
use crate::outcome::ResponseInfo;

/// A fully collected HTTP response.
#[derive(Clone, Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub url: String,
    pub body: Bytes,
}

impl RawResponse {
    /// Status, headers and URL without the body.
    pub fn info(&self) -> ResponseInfo {
        ResponseInfo {
            status: self.status,
            headers: self.headers.clone(),
            url: self.url.clone(),
        }
    }

    /// The body, decompressed when tagged `zstd`. Any other encoding is
    /// passed through for the JSON parser.
    pub fn decoded_body(&self) -> Result<Bytes, ClientError> {
        let content_encoding = self
            .headers
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok());
        match CompressionEncoding::from_header(content_encoding) {
            Some(CompressionEncoding::Zstd) => {
                Ok(decompress(self.body.clone(), CompressionEncoding::Zstd)?)
            }
            Some(CompressionEncoding::Identity) => Ok(self.body.clone()),
            None => {
                tracing::debug!(
                    url = %self.url,
                    content_encoding = content_encoding.unwrap_or_default(),
                    "parsing body with unrecognized content-encoding as-is"
                );
                Ok(self.body.clone())
            }
        }
    }
}

/// Resolve a successful response into a typed envelope.
///
/// # Errors
///
/// - [`ClientError::Compression`] when a zstd-tagged body does not decompress.
/// - [`ClientError::Decode`] when the body is not a JSON object.
///
/// An empty envelope is not an error: it resolves to [`Body::Empty`] with a
/// descriptive `error`.
pub fn resolve<T: Payload>(raw: &RawResponse) -> Result<Envelope<Body<T>>, ClientError> {
    let bytes = raw.decoded_body()?;

    let envelope = match decode(&bytes) {
        Ok(envelope) => envelope,
        Err(EnvelopeError::Empty) => {
            tracing::warn!(payload = T::NAME, url = %raw.url, "empty response envelope");
            return Ok(Envelope::new(Body::Empty).with_error(format!(
                "empty response envelope received for {}",
                T::NAME
            )));
        }
        Err(e) => return Err(e.into()),
    };

    let body = match envelope.body {
        Some(value) => match serde_json::from_value::<T>(value.clone()) {
            Ok(typed) => Body::Typed(typed),
            Err(e) => {
                tracing::warn!(
                    payload = T::NAME,
                    url = %raw.url,
                    error = %e,
                    "response body does not match the expected payload, keeping raw JSON"
                );
                Body::Raw(value)
            }
        },
        None => Body::Empty,
    };

    Ok(Envelope {
        body,
        error: envelope.error,
        metadata: envelope.metadata,
    })
}

/// Build the error for a non-success response, carrying the peer's envelope
/// error string when the body is readable.
pub fn status_error(raw: &RawResponse) -> ClientError {
    let message = raw
        .decoded_body()
        .ok()
        .and_then(|bytes| decode(&bytes).ok())
        .and_then(|envelope| envelope.error);
    ClientError::status(raw.status, message)
}
