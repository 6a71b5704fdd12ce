//! Client for the meshwire envelope exchange.
//!
//! This crate sends signed, optionally zstd-compressed JSON payloads to
//! servers built with `meshwire` and resolves their `{body, error, metadata}`
//! envelopes into typed results.
//!
//! ## Features
//!
//! - HEAD preflight before each POST
//! - Request signing through a pluggable [`Signer`](meshwire_core::Signer)
//! - Retries with exponential backoff for transient failures
//! - Per-attempt timeouts and per-send cancellation
//! - Concurrent batch sends with an optional concurrency limit
//! - Graceful degrade: bodies that do not match the expected type are kept
//!   as raw JSON
//!
//! ## Example
//!
//! ```ignore
//! use meshwire_client::{MeshClient, RetryPolicy, SendOptions};
//!
//! let client = MeshClient::builder(signer).build()?;
//!
//! let options = SendOptions::new().retry(RetryPolicy::new().max_attempts(3));
//! let outcome = client.send("10.0.0.5:8091", &Ping { seq: 1 }, &options).await;
//!
//! match (&outcome.exception, outcome.body().typed()) {
//!     (None, Some(pong)) => println!("pong: {pong:?}"),
//!     (Some(e), _) => eprintln!("send failed: {e}"),
//!     (None, None) => eprintln!("unexpected body: {:?}", outcome.body().fields()),
//! }
//! ```

mod cancel;
mod client;
pub mod config;
mod error;
mod outcome;
pub mod resolver;
pub mod transport;

pub use cancel::{CancelHandle, CancelToken, cancel_pair};
pub use client::{ClientBuilder, MeshClient};
pub use config::{ExponentialBackoff, RetryPolicy, SendOptions, retry_with_policy};
pub use error::ClientError;
pub use outcome::{ClientOutcome, ResponseInfo};
pub use resolver::{RawResponse, resolve};
pub use transport::{HyperTransport, HyperTransportBuilder};

// Re-export core types for convenience
pub use meshwire_core::{
    Body, CompressionEncoding, CompressionLevel, Envelope, Metadata, Payload, SignError, Signer,
};
