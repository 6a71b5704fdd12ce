//! Hyper-based HTTP transport for the meshwire client.
//!
//! This module provides [`HyperTransport`], the HTTP transport implementation
//! using hyper_util's legacy client.

use std::error::Error as StdError;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::ClientConfig;

use super::connector::{build_https_connector, default_tls_config};
use crate::ClientError;
use crate::resolver::RawResponse;

/// Type alias for the hyper client with HTTPS connector.
type HyperClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Default configuration values.
pub mod defaults {
    use std::time::Duration;

    /// Idle pooled connections are closed after this long.
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Idle connections kept per host.
    pub const POOL_MAX_IDLE_PER_HOST: usize = 10;
}

/// HTTP transport using hyper_util's legacy client.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport").finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// Create a new transport builder.
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::new()
    }

    /// Create a new transport with default settings.
    pub fn new() -> Result<Self, ClientError> {
        Self::builder().build()
    }

    /// Send a request and collect the whole response body.
    pub async fn execute(&self, request: http::Request<Full<Bytes>>) -> Result<RawResponse, ClientError> {
        let url = request.uri().to_string();
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| ClientError::Transport(format!("request failed: {}", error_chain(&e))))?;

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| ClientError::Transport(format!("failed to read response body: {e}")))?
            .to_bytes();

        tracing::debug!(
            status = %parts.status,
            url = %url,
            body_len = body.len(),
            "received response"
        );

        Ok(RawResponse {
            status: parts.status,
            headers: parts.headers,
            url,
            body,
        })
    }
}

/// Join an error with its sources. hyper's client errors keep the useful
/// detail (refused, reset, DNS) in the source chain.
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

/// Builder for [`HyperTransport`].
///
/// # Example
///
/// ```ignore
/// use meshwire_client::transport::HyperTransportBuilder;
/// use std::time::Duration;
///
/// let transport = HyperTransportBuilder::new()
///     .pool_idle_timeout(Duration::from_secs(30))
///     .build()?;
/// ```
pub struct HyperTransportBuilder {
    /// Custom TLS configuration.
    tls_config: Option<ClientConfig>,
    /// Connection pool idle timeout.
    pool_idle_timeout: Option<Duration>,
    /// Maximum idle connections per host.
    pool_max_idle_per_host: usize,
    /// TCP connect timeout.
    connect_timeout: Option<Duration>,
}

impl Default for HyperTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperTransportBuilder {
    /// Create a new transport builder with default settings.
    pub fn new() -> Self {
        Self {
            tls_config: None,
            pool_idle_timeout: Some(defaults::POOL_IDLE_TIMEOUT),
            pool_max_idle_per_host: defaults::POOL_MAX_IDLE_PER_HOST,
            connect_timeout: None,
        }
    }

    /// Set a custom TLS configuration.
    ///
    /// Use this to configure custom root certificates, client certificates for mTLS,
    /// or other TLS settings.
    pub fn tls_config(mut self, config: ClientConfig) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Set the connection pool idle timeout.
    ///
    /// Default: 90 seconds.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Disable connection pool idle timeout.
    ///
    /// Connections will not be closed due to inactivity.
    pub fn pool_idle_timeout_none(mut self) -> Self {
        self.pool_idle_timeout = None;
        self
    }

    /// Set the maximum number of idle connections per host.
    ///
    /// Default: 10.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// Bound the TCP connect phase. Unbounded by default; the per-attempt
    /// send timeout still applies.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Build the transport.
    pub fn build(self) -> Result<HyperTransport, ClientError> {
        let tls_config = match self.tls_config {
            Some(config) => config,
            None => default_tls_config()?,
        };

        let https_connector = build_https_connector(tls_config, self.connect_timeout);

        let mut builder = Client::builder(TokioExecutor::new());

        // Configure connection pool timer (required for pool_idle_timeout to work)
        builder.pool_timer(TokioTimer::new());

        if let Some(timeout) = self.pool_idle_timeout {
            builder.pool_idle_timeout(timeout);
        }
        builder.pool_max_idle_per_host(self.pool_max_idle_per_host);

        Ok(HyperTransport {
            client: builder.build(https_connector),
        })
    }
}

impl std::fmt::Debug for HyperTransportBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransportBuilder")
            .field("tls_config", &self.tls_config.is_some())
            .field("pool_idle_timeout", &self.pool_idle_timeout)
            .field("pool_max_idle_per_host", &self.pool_max_idle_per_host)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = HyperTransportBuilder::new();
        assert_eq!(builder.pool_max_idle_per_host, 10);
        assert_eq!(builder.pool_idle_timeout, Some(Duration::from_secs(90)));
        assert!(builder.connect_timeout.is_none());
    }

    #[test]
    fn test_builder_pool_settings() {
        let builder = HyperTransportBuilder::new()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(4)
            .connect_timeout(Duration::from_secs(2));
        assert_eq!(builder.pool_idle_timeout, Some(Duration::from_secs(60)));
        assert_eq!(builder.pool_max_idle_per_host, 4);
        assert_eq!(builder.connect_timeout, Some(Duration::from_secs(2)));

        let builder = builder.pool_idle_timeout_none();
        assert!(builder.pool_idle_timeout.is_none());
    }

    #[tokio::test]
    async fn test_build_transport() {
        let result = HyperTransportBuilder::new().build();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HyperTransport::new().unwrap();
        let request = http::Request::post(format!("http://{addr}/Ping"))
            .body(Full::new(Bytes::new()))
            .unwrap();
        let err = transport.execute(request).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)), "{err:?}");
        assert!(err.is_retryable());
    }
}
