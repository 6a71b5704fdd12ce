//! Route table entries.
//!
//! A [`Route`] binds a [`Payload`] type to a handler. The wrapper around the
//! handler answers HEAD preflights, parses and validates the body, and wraps
//! whatever the handler returns in an envelope.

use std::future::Future;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, any};
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use meshwire_core::{Metadata, Payload};

use crate::auth::VerifiedIdentity;
use crate::error::{MeshError, envelope_response};

/// Methods every route answers.
pub const ROUTE_METHODS: [&str; 2] = ["POST", "HEAD"];

type BoxedHandler = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// Request details handed to handlers registered with [`Route::with_context`].
#[derive(Clone, Debug)]
pub struct RequestContext {
    /// `None` only on whitelisted paths.
    pub identity: Option<VerifiedIdentity>,
    pub headers: HeaderMap,
}

/// One entry of the route table.
#[derive(Clone)]
pub struct Route {
    name: &'static str,
    path: String,
    description: String,
    handler: BoxedHandler,
}

impl Route {
    /// Serve `P` at `/<P::NAME>` with a handler that only needs the payload.
    pub fn new<P, R, F, Fut>(handler: F) -> Self
    where
        P: Payload,
        R: Serialize + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, MeshError>> + Send + 'static,
    {
        Self::with_context(move |_ctx: RequestContext, payload: P| handler(payload))
    }

    /// Serve `P` at `/<P::NAME>` with a handler that also receives the
    /// verified identity and request headers.
    pub fn with_context<P, R, F, Fut>(handler: F) -> Self
    where
        P: Payload,
        R: Serialize + Send + 'static,
        F: Fn(RequestContext, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, MeshError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let boxed: BoxedHandler = Arc::new(move |req: Request| {
            let handler = handler.clone();
            Box::pin(dispatch::<P, R, F, Fut>(handler, req)) as BoxFuture<'static, Response>
        });
        Route {
            name: P::NAME,
            path: P::path(),
            description: String::new(),
            handler: boxed,
        }
    }

    /// Set the description shown in the route listing.
    pub fn describe<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub(crate) fn into_method_router(self) -> MethodRouter {
        let handler = self.handler;
        any(move |req: Request| handler(req))
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

async fn dispatch<P, R, F, Fut>(handler: Arc<F>, req: Request) -> Response
where
    P: Payload,
    R: Serialize + Send + 'static,
    F: Fn(RequestContext, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, MeshError>> + Send + 'static,
{
    if req.method() == Method::HEAD {
        return envelope_response(StatusCode::OK, &Metadata::new(), None);
    }
    if req.method() != Method::POST {
        return MeshError::method_not_allowed(req.method()).into_response();
    }

    let (parts, body) = req.into_parts();
    let ctx = RequestContext {
        identity: parts.extensions.get::<VerifiedIdentity>().cloned(),
        headers: parts.headers,
    };

    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return MeshError::decode(format!("failed to read request body: {e}")).into_response();
        }
    };

    let value: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(route = P::NAME, error = %e, "invalid JSON in request body");
            return MeshError::decode(format!("invalid JSON: {e}")).into_response();
        }
    };

    let payload: P = match serde_json::from_value(value.clone()) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(route = P::NAME, error = %e, "request payload failed validation");
            return MeshError::validation(format!("validation error: {e}"))
                .with_body(value)
                .into_response();
        }
    };

    match handler(ctx, payload).await {
        Ok(result) => {
            tracing::debug!(route = P::NAME, "handler succeeded");
            envelope_response(StatusCode::OK, &result, None)
        }
        Err(err) => {
            tracing::error!(route = P::NAME, error = %err, "handler failed");
            err.into_response()
        }
    }
}
