//! Middleware layers of the server pipeline.
//!
//! - [`AuthLayer`](crate::auth::AuthLayer): the authentication gate, see [`crate::auth`].
//! - [`TranscodeLayer`]: zstd request decompression and response compression.
//!
//! Layers are composed by [`Server::into_router`](crate::Server::into_router)
//! in the order given by [`PIPELINE`](crate::PIPELINE).

mod transcode;

pub use transcode::{TranscodeLayer, TranscodeService};
