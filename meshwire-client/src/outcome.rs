//! The result of one send.

use http::{HeaderMap, StatusCode};
use meshwire_core::{Body, Envelope};

use crate::ClientError;

/// Status, headers and URL of a transport response.
#[derive(Clone, Debug)]
pub struct ResponseInfo {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub url: String,
}

/// What a send produced.
///
/// A send never fails outright: local failures are reported in `exception`,
/// and the envelope always carries a body, if only [`Body::Empty`].
/// `exception` and `envelope.error` are independent; the first describes
/// this side of the exchange, the second is whatever the peer reported.
#[derive(Clone, Debug)]
pub struct ClientOutcome<T> {
    pub envelope: Envelope<Body<T>>,
    pub exception: Option<ClientError>,
    /// The last transport response seen, if any attempt got that far.
    pub response: Option<ResponseInfo>,
}

impl<T> ClientOutcome<T> {
    pub(crate) fn resolved(envelope: Envelope<Body<T>>, response: Option<ResponseInfo>) -> Self {
        Self {
            envelope,
            exception: None,
            response,
        }
    }

    pub(crate) fn failed(exception: ClientError, response: Option<ResponseInfo>) -> Self {
        Self {
            envelope: Envelope::new(Body::Empty),
            exception: Some(exception),
            response,
        }
    }

    /// No exception and no peer error.
    pub fn is_success(&self) -> bool {
        self.exception.is_none() && self.envelope.error.is_none()
    }

    pub fn body(&self) -> &Body<T> {
        &self.envelope.body
    }

    pub fn into_body(self) -> Body<T> {
        self.envelope.body
    }

    /// The peer's error string.
    pub fn error(&self) -> Option<&str> {
        self.envelope.error.as_deref()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.response.as_ref().map(|r| r.status)
    }

    /// Emit one log event describing this outcome for `target`.
    pub fn log_context(&self, target: &str) {
        let status = self.status().map(|s| s.as_u16());
        match (&self.exception, &self.envelope.error) {
            (Some(exception), _) => tracing::warn!(
                target_url = target,
                status,
                kind = %exception.kind(),
                error = %exception,
                "exchange failed"
            ),
            (None, Some(error)) => tracing::warn!(
                target_url = target,
                status,
                peer_error = %error,
                "peer reported an error"
            ),
            (None, None) => tracing::info!(
                target_url = target,
                status,
                empty_body = self.envelope.body.is_empty(),
                "exchange succeeded"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_outcome_has_empty_body() {
        let outcome = ClientOutcome::<()>::failed(ClientError::Canceled, None);
        assert!(outcome.body().is_empty());
        assert!(outcome.error().is_none());
        assert!(!outcome.is_success());
        assert!(outcome.status().is_none());
        outcome.log_context("http://127.0.0.1:1");
    }

    #[test]
    fn test_peer_error_is_independent_of_exception() {
        let envelope = Envelope::new(Body::Typed(1u8)).with_error("degraded");
        let info = ResponseInfo {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            url: "http://127.0.0.1:1/Count".into(),
        };
        let outcome = ClientOutcome::resolved(envelope, Some(info));
        assert!(outcome.exception.is_none());
        assert_eq!(outcome.error(), Some("degraded"));
        assert!(!outcome.is_success());
        assert_eq!(outcome.status(), Some(StatusCode::OK));
        assert_eq!(outcome.into_body().into_typed(), Some(1));
    }
}
