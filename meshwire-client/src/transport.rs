//! HTTP transport layer for the meshwire client.
//!
//! This module provides the [`HyperTransport`] type, which handles HTTP communication
//! using hyper_util's legacy client. It supports:
//!
//! - HTTP/1.1 to `http://` and `https://` targets
//! - TLS with rustls (ring provider, system root certificates)
//! - Connection pooling shared by every send of a client
//!
//! # Example
//!
//! ```ignore
//! use meshwire_client::transport::HyperTransportBuilder;
//! use std::time::Duration;
//!
//! let transport = HyperTransportBuilder::new()
//!     .pool_max_idle_per_host(4)
//!     .connect_timeout(Duration::from_secs(2))
//!     .build()?;
//! ```

mod connector;
mod hyper;

pub use connector::{build_https_connector, default_tls_config};
pub use hyper::{HyperTransport, HyperTransportBuilder, defaults};

// Re-export rustls types that users might need for TLS configuration
pub use rustls::ClientConfig as TlsClientConfig;
