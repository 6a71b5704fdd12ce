//! Identity headers and the signing/verification capabilities.
//!
//! Every authenticated request carries three headers: the signer's
//! identity, the message that was signed, and the signature over it. The
//! algorithm behind [`Signer`] and [`Verifier`] is supplied by the embedding
//! application.

use std::sync::Arc;

use futures::future::BoxFuture;
use http::{HeaderMap, HeaderValue};

use crate::error::SignError;

/// Header carrying the signature over the message.
pub const SIGNATURE_HEADER: &str = "x-signature";
/// Header carrying the signer's identity.
pub const HOTKEY_HEADER: &str = "x-hotkey";
/// Header carrying the signed message.
pub const MESSAGE_HEADER: &str = "x-message";

/// The signed message used when the caller supplies none.
pub fn default_message(identity: &str) -> String {
    format!("I solemnly swear that I am up to some good. Hotkey: {identity}")
}

/// The identity/message/signature triple.
///
/// Absent headers are represented as empty strings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityHeaders {
    pub signature: String,
    pub identity: String,
    pub message: String,
}

impl IdentityHeaders {
    pub fn new(
        signature: impl Into<String>,
        identity: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            signature: signature.into(),
            identity: identity.into(),
            message: message.into(),
        }
    }

    /// Read the triple from request headers.
    ///
    /// Values that are not valid visible ASCII are treated as absent.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_owned())
                .unwrap_or_default()
        };
        Self {
            signature: read(SIGNATURE_HEADER),
            identity: read(HOTKEY_HEADER),
            message: read(MESSAGE_HEADER),
        }
    }

    /// Header names whose values are absent or empty, in wire order.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            (SIGNATURE_HEADER, &self.signature),
            (HOTKEY_HEADER, &self.identity),
            (MESSAGE_HEADER, &self.message),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    /// Returns true when all three values are present.
    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Write the triple into `headers`, replacing existing values.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<(), SignError> {
        for (name, value) in [
            (SIGNATURE_HEADER, &self.signature),
            (HOTKEY_HEADER, &self.identity),
            (MESSAGE_HEADER, &self.message),
        ] {
            let value = HeaderValue::from_str(value)
                .map_err(|_| SignError::new(format!("{name} is not a valid header value")))?;
            headers.insert(name, value);
        }
        Ok(())
    }
}

/// Produces signatures on behalf of one identity.
pub trait Signer: Send + Sync + 'static {
    /// The identity this signer signs as.
    fn identity(&self) -> &str;

    /// Sign `message`.
    fn sign<'a>(&'a self, message: &'a str) -> BoxFuture<'a, Result<String, SignError>>;
}

/// Checks signatures produced by a [`Signer`].
pub trait Verifier: Send + Sync + 'static {
    /// Returns true when `signature` is a valid signature of `message` by
    /// `identity`.
    fn verify<'a>(
        &'a self,
        identity: &'a str,
        message: &'a str,
        signature: &'a str,
    ) -> BoxFuture<'a, bool>;
}

impl<S: Signer + ?Sized> Signer for Arc<S> {
    fn identity(&self) -> &str {
        (**self).identity()
    }

    fn sign<'a>(&'a self, message: &'a str) -> BoxFuture<'a, Result<String, SignError>> {
        (**self).sign(message)
    }
}

impl<V: Verifier + ?Sized> Verifier for Arc<V> {
    fn verify<'a>(
        &'a self,
        identity: &'a str,
        message: &'a str,
        signature: &'a str,
    ) -> BoxFuture<'a, bool> {
        (**self).verify(identity, message, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    struct Reversing(String);

    impl Signer for Reversing {
        fn identity(&self) -> &str {
            &self.0
        }

        fn sign<'a>(&'a self, message: &'a str) -> BoxFuture<'a, Result<String, SignError>> {
            async move { Ok(message.chars().rev().collect()) }.boxed()
        }
    }

    impl Verifier for Reversing {
        fn verify<'a>(
            &'a self,
            _identity: &'a str,
            message: &'a str,
            signature: &'a str,
        ) -> BoxFuture<'a, bool> {
            async move { signature.chars().rev().eq(message.chars()) }.boxed()
        }
    }

    #[test]
    fn test_default_message() {
        assert_eq!(
            default_message("5Fabc"),
            "I solemnly swear that I am up to some good. Hotkey: 5Fabc"
        );
    }

    #[test]
    fn test_missing_lists_empty_headers() {
        let headers = IdentityHeaders::new("sig", "", "");
        assert_eq!(headers.missing(), vec![HOTKEY_HEADER, MESSAGE_HEADER]);
        assert!(!headers.is_complete());
        assert!(IdentityHeaders::new("s", "i", "m").is_complete());
    }

    #[test]
    fn test_apply_then_read() {
        let triple = IdentityHeaders::new("sig", "alice", "hello");
        let mut map = HeaderMap::new();
        triple.apply(&mut map).unwrap();
        assert_eq!(map.get(HOTKEY_HEADER).unwrap(), "alice");
        assert_eq!(IdentityHeaders::from_headers(&map), triple);
    }

    #[test]
    fn test_from_headers_treats_absent_as_empty() {
        let mut map = HeaderMap::new();
        map.insert(SIGNATURE_HEADER, HeaderValue::from_static("sig"));
        let triple = IdentityHeaders::from_headers(&map);
        assert_eq!(triple.missing(), vec![HOTKEY_HEADER, MESSAGE_HEADER]);
    }

    #[test]
    fn test_apply_rejects_invalid_values() {
        let triple = IdentityHeaders::new("sig\n", "alice", "hello");
        let mut map = HeaderMap::new();
        assert!(triple.apply(&mut map).is_err());
    }

    #[tokio::test]
    async fn test_signer_verifier_through_arc() {
        let signer: Arc<dyn Signer> = Arc::new(Reversing("alice".into()));
        let verifier: Arc<dyn Verifier> = Arc::new(Reversing("alice".into()));

        let signature = signer.sign("hello").await.unwrap();
        assert_eq!(signature, "olleh");
        assert!(verifier.verify(signer.identity(), "hello", &signature).await);
        assert!(!verifier.verify("alice", "hello", "hello").await);
    }
}
