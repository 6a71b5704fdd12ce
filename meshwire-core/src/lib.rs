//! Core wire types for meshwire.
//!
//! This crate provides shared types and functions used by both the server
//! (`meshwire`) and client (`meshwire-client`) crates.
//!
//! ## Modules
//!
//! - `error`: Error taxonomy shared by both sides of an exchange
//! - `codec`: Compression codec trait and implementations
//! - `compression`: Encoding negotiation and compression helpers
//! - `envelope`: The `{body, error, metadata}` wire envelope
//! - `identity`: Identity headers and the signer/verifier capabilities
//! - `payload`: The [`Payload`] trait naming each exchanged type

mod codec;
mod compression;
mod envelope;
mod error;
mod identity;
mod payload;

pub use codec::*;
pub use compression::*;
pub use envelope::*;
pub use error::*;
pub use identity::*;
pub use payload::*;
