//! # meshwire
//!
//! axum server side of the meshwire exchange: peers post JSON payloads signed
//! with their identity, optionally zstd-compressed, and always get a
//! `{body, error, metadata}` envelope back.
//!
//! ## Pipeline
//!
//! Every request passes through the stages of [`PIPELINE`], outermost first:
//!
//! - **Normalize**: panics become 500 envelopes ([`normalize`]).
//! - **Authenticate**: the identity/message/signature headers are checked by
//!   the configured [`Verifier`](meshwire_core::Verifier) ([`auth`]).
//! - **Transcode**: zstd bodies are decompressed, responses compressed for
//!   peers that accept it ([`layer`]).
//!
//! Whitelisted paths, including `/docs`, skip authentication and transcoding.
//!
//! ## Getting Started
//!
//! ```rust,ignore
//! use meshwire::prelude::*;
//!
//! let server = Server::builder(verifier)
//!     .route(Route::new(|ping: Ping| async move { Ok::<_, MeshError>(ping) }))
//!     .build();
//! server.serve(tokio::net::TcpListener::bind("0.0.0.0:8091").await?).await?;
//! ```

pub mod auth;
pub mod error;
pub mod layer;
pub mod normalize;
pub mod route;
pub mod server;
pub mod whitelist;

pub use auth::{AuthDecision, AuthLayer, VerifiedIdentity, authenticate};
pub use error::{MeshError, envelope_response};
pub use layer::TranscodeLayer;
pub use route::{RequestContext, Route};
pub use server::{PIPELINE, Server, ServerBuilder, Stage};
pub use whitelist::{DOCS_PATH, Whitelist};

// Re-export the core crate
pub use meshwire_core;

pub mod prelude {
    //! A prelude for `meshwire` providing the most common types.
    pub use crate::error::{ErrorKind, MeshError};
    pub use crate::route::{RequestContext, Route};
    pub use crate::server::Server;
    pub use meshwire_core::{Payload, Verifier};
}
