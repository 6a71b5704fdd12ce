//! Authentication gate.
//!
//! Requests to non-whitelisted paths must carry the identity/message/
//! signature triple, and the verifier must accept it, before they reach
//! transcoding or a handler.

use axum::body::Body;
use axum::http::{HeaderMap, Request};
use axum::response::{IntoResponse, Response};
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service, ServiceExt};

use meshwire_core::{IdentityHeaders, Verifier};

use crate::error::MeshError;
use crate::whitelist::Whitelist;

/// Outcome of the authentication gate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthDecision {
    /// Continue. Carries the verified identity, or `None` on a whitelisted path.
    Allow(Option<String>),
    /// Reject with 400; lists the absent or empty headers.
    MissingCredentials(Vec<&'static str>),
    /// Reject with 403.
    InvalidSignature,
}

impl AuthDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AuthDecision::Allow(_))
    }
}

/// The identity that signed the current request.
///
/// Inserted into request extensions when the gate allows a signed request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedIdentity(pub String);

impl VerifiedIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Decide whether a request may proceed.
pub async fn authenticate(
    path: &str,
    headers: &HeaderMap,
    whitelist: &Whitelist,
    verifier: &dyn Verifier,
) -> AuthDecision {
    if whitelist.contains(path) {
        return AuthDecision::Allow(None);
    }

    let triple = IdentityHeaders::from_headers(headers);
    let missing = triple.missing();
    if !missing.is_empty() {
        return AuthDecision::MissingCredentials(missing);
    }

    if verifier
        .verify(&triple.identity, &triple.message, &triple.signature)
        .await
    {
        AuthDecision::Allow(Some(triple.identity))
    } else {
        AuthDecision::InvalidSignature
    }
}

/// Layer applying [`authenticate`] to every request.
#[derive(Clone)]
pub struct AuthLayer {
    verifier: Arc<dyn Verifier>,
    whitelist: Whitelist,
}

impl AuthLayer {
    pub fn new(verifier: Arc<dyn Verifier>, whitelist: Whitelist) -> Self {
        Self {
            verifier,
            whitelist,
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            verifier: self.verifier.clone(),
            whitelist: self.whitelist.clone(),
        }
    }
}

/// Service produced by [`AuthLayer`].
#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    verifier: Arc<dyn Verifier>,
    whitelist: Whitelist,
}

impl<S> Service<Request<Body>> for AuthService<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let inner = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, inner);
        let verifier = self.verifier.clone();
        let whitelist = self.whitelist.clone();

        Box::pin(async move {
            let path = req.uri().path().to_owned();
            match authenticate(&path, req.headers(), &whitelist, verifier.as_ref()).await {
                AuthDecision::Allow(identity) => {
                    if let Some(identity) = identity {
                        tracing::debug!(%path, %identity, "request authenticated");
                        req.extensions_mut().insert(VerifiedIdentity(identity));
                    }
                    inner.oneshot(req).await
                }
                AuthDecision::MissingCredentials(missing) => {
                    tracing::warn!(%path, ?missing, "rejecting request with missing identity headers");
                    Ok(MeshError::missing_credentials(&missing).into_response())
                }
                AuthDecision::InvalidSignature => {
                    tracing::warn!(%path, "rejecting request with invalid signature");
                    Ok(MeshError::invalid_signature().into_response())
                }
            }
        })
    }
}
