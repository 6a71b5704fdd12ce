//! TLS connector setup for the hyper HTTP client.
//!
//! Connections use the ring crypto provider and the system's root
//! certificates. Plain `http://` targets go through the same connector.

use std::sync::Arc;
use std::time::Duration;

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::ClientConfig;

use crate::ClientError;

/// Build the default TLS configuration: ring provider, native roots, no
/// client authentication.
pub fn default_tls_config() -> Result<ClientConfig, ClientError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ClientError::Config(format!("invalid TLS protocol versions: {e}")))?;

    Ok(builder
        .with_root_certificates(native_root_store())
        .with_no_client_auth())
}

fn native_root_store() -> rustls::RootCertStore {
    let mut roots = rustls::RootCertStore::empty();
    let native_certs = rustls_native_certs::load_native_certs();
    if !native_certs.errors.is_empty() {
        // Some certs may still have loaded
        tracing::debug!("errors loading native certs: {:?}", native_certs.errors);
    }
    let (added, ignored) = roots.add_parsable_certificates(native_certs.certs);
    tracing::debug!(added, ignored, "loaded native root certificates");
    roots
}

/// Build a connector that speaks HTTP/1.1 over TLS or plain TCP, depending
/// on the target scheme.
pub fn build_https_connector(
    tls_config: ClientConfig,
    connect_timeout: Option<Duration>,
) -> HttpsConnector<HttpConnector> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_connect_timeout(connect_timeout);

    HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .wrap_connector(http)
}
