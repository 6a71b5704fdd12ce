//! Outermost failure boundary.
//!
//! Handler failures returned as [`MeshError`] already become envelopes through
//! `IntoResponse`. Panics are caught here and answered with a 500 envelope.

use std::any::Any;

use axum::response::{IntoResponse, Response};
use tower_http::catch_panic::CatchPanicLayer;

use crate::error::MeshError;

pub type PanicHandler = fn(Box<dyn Any + Send + 'static>) -> Response;

/// Layer catching panics anywhere below it.
pub fn normalize_layer() -> CatchPanicLayer<PanicHandler> {
    CatchPanicLayer::custom(handle_panic as PanicHandler)
}

/// Convert a caught panic payload into a 500 envelope.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "handler panicked");
    MeshError::internal(format!("internal server error: {detail}")).into_response()
}
