//! The retrying dispatcher.
//!
//! [`MeshClient::send`] drives one exchange: optional HEAD preflight, a
//! signed and possibly compressed POST, and resolution of the reply, retried
//! under the send's [`RetryPolicy`](crate::RetryPolicy). It never returns an
//! error; failures land in [`ClientOutcome::exception`].

use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use futures::future::join_all;
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method, Uri};
use http_body_util::Full;
use meshwire_core::{
    Body, CompressionEncoding, CompressionLevel, Envelope, IdentityHeaders, Payload, Signer,
    compress, default_message,
};
use tokio::sync::Semaphore;
use tracing::Instrument;

use crate::config::{SendOptions, retry_with_policy};
use crate::outcome::{ClientOutcome, ResponseInfo};
use crate::resolver::{resolve, status_error};
use crate::transport::HyperTransport;
use crate::ClientError;

/// Default configuration values.
pub mod defaults {
    use meshwire_core::CompressionEncoding;

    /// Request bodies are zstd-compressed unless configured otherwise.
    pub const REQUEST_ENCODING: CompressionEncoding = CompressionEncoding::Zstd;

    /// zstd responses are accepted unless configured otherwise.
    pub const ACCEPT_ENCODING: Option<CompressionEncoding> = Some(CompressionEncoding::Zstd);
}

/// Sends signed envelopes to meshwire peers.
///
/// Cloning is cheap: clones share the signer and the connection pool.
///
/// # Example
///
/// ```ignore
/// use meshwire_client::MeshClient;
///
/// let client = MeshClient::builder(signer).build()?;
/// let outcome = client
///     .send("127.0.0.1:8091", &Ping { seq: 1 }, client.options())
///     .await;
/// if let Some(pong) = outcome.body().typed() {
///     println!("{pong:?}");
/// }
/// ```
#[derive(Clone)]
pub struct MeshClient {
    transport: HyperTransport,
    signer: Arc<dyn Signer>,
    request_encoding: CompressionEncoding,
    accept_encoding: Option<CompressionEncoding>,
    compression_level: CompressionLevel,
    options: SendOptions,
}

impl std::fmt::Debug for MeshClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshClient")
            .field("identity", &self.signer.identity())
            .field("request_encoding", &self.request_encoding)
            .field("accept_encoding", &self.accept_encoding)
            .field("compression_level", &self.compression_level)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl MeshClient {
    /// Start configuring a client that signs with `signer`.
    pub fn builder<S: Signer>(signer: S) -> ClientBuilder {
        ClientBuilder::new(signer)
    }

    /// The identity requests are signed as.
    pub fn identity(&self) -> &str {
        self.signer.identity()
    }

    /// The options configured on the builder.
    pub fn options(&self) -> &SendOptions {
        &self.options
    }

    /// Send `payload` to `<target>/<P::NAME>`.
    ///
    /// `target` may omit the scheme, in which case `http://` is assumed.
    pub async fn send<P: Payload>(
        &self,
        target: &str,
        payload: &P,
        options: &SendOptions,
    ) -> ClientOutcome<P> {
        let url = build_url(target, P::NAME);
        let span = tracing::info_span!(
            "meshwire.send",
            url = %url,
            payload = P::NAME,
            max_attempts = options.policy.max_attempts,
        );
        self.dispatch(url, payload, options).instrument(span).await
    }

    /// Send each payload to the target at the same position, concurrently.
    ///
    /// Outcomes are returned in input order. When `limiter` is given, each
    /// send holds one of its permits. Targets and payloads are paired up to
    /// the shorter of the two slices. Every send uses `options`, including
    /// its cancel token; use [`batch_send_each`](Self::batch_send_each) to
    /// cancel members individually.
    pub async fn batch_send<P, S>(
        &self,
        targets: &[S],
        payloads: &[P],
        options: &SendOptions,
        limiter: Option<&Semaphore>,
    ) -> Vec<ClientOutcome<P>>
    where
        P: Payload,
        S: AsRef<str>,
    {
        if targets.len() != payloads.len() {
            tracing::warn!(
                targets = targets.len(),
                payloads = payloads.len(),
                "batch lengths differ, extra entries are ignored"
            );
        }
        let members = targets
            .iter()
            .zip(payloads)
            .map(|(target, payload)| (target.as_ref(), payload, options))
            .collect();
        self.run_batch(members, limiter).await
    }

    /// Like [`batch_send`](Self::batch_send), with options per member.
    ///
    /// Canceling one member's token only stops that member.
    pub async fn batch_send_each<P, S>(
        &self,
        members: &[(S, P, SendOptions)],
        limiter: Option<&Semaphore>,
    ) -> Vec<ClientOutcome<P>>
    where
        P: Payload,
        S: AsRef<str>,
    {
        let members = members
            .iter()
            .map(|(target, payload, options)| (target.as_ref(), payload, options))
            .collect();
        self.run_batch(members, limiter).await
    }

    async fn run_batch<P: Payload>(
        &self,
        members: Vec<(&str, &P, &SendOptions)>,
        limiter: Option<&Semaphore>,
    ) -> Vec<ClientOutcome<P>> {
        if limiter.is_none() {
            tracing::info!(
                count = members.len(),
                "batch sending without a concurrency limit"
            );
        }

        let sends = members.iter().map(|&(target, payload, options)| async move {
            let _permit = match limiter {
                Some(limiter) => match limiter.acquire().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return ClientOutcome::failed(ClientError::Canceled, None),
                },
                None => None,
            };
            self.send(target, payload, options).await
        });
        let outcomes = join_all(sends).await;

        for ((target, _, _), outcome) in members.iter().zip(&outcomes) {
            outcome.log_context(target);
        }
        outcomes
    }

    async fn dispatch<P: Payload>(
        &self,
        url: String,
        payload: &P,
        options: &SendOptions,
    ) -> ClientOutcome<P> {
        let uri: Uri = match url.parse() {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(error = %e, "invalid target URL");
                return ClientOutcome::failed(
                    ClientError::Config(format!("invalid target URL {url}: {e}")),
                    None,
                );
            }
        };

        let last_response: Mutex<Option<ResponseInfo>> = Mutex::new(None);
        let exchange = retry_with_policy(&options.policy, |attempt| {
            let uri = uri.clone();
            let last_response = &last_response;
            async move {
                tracing::debug!(attempt, "starting attempt");
                match tokio::time::timeout(
                    options.timeout,
                    self.attempt(uri, payload, options, last_response),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ClientError::Timeout(options.timeout)),
                }
            }
        });

        let result = match &options.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.canceled() => Err(ClientError::Canceled),
                    result = exchange => result,
                }
            }
            None => exchange.await,
        };

        let response = last_response
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        match result {
            Ok(envelope) => {
                tracing::info!(
                    status = response.as_ref().map(|r| r.status.as_u16()),
                    "received response"
                );
                ClientOutcome::resolved(envelope, response)
            }
            Err(e) => {
                tracing::warn!(kind = %e.kind(), error = %e, "send failed");
                ClientOutcome::failed(e, response)
            }
        }
    }

    async fn attempt<P: Payload>(
        &self,
        uri: Uri,
        payload: &P,
        options: &SendOptions,
        last_response: &Mutex<Option<ResponseInfo>>,
    ) -> Result<Envelope<Body<P>>, ClientError> {
        let message = match &options.message {
            Some(message) => message.clone(),
            None => default_message(self.signer.identity()),
        };

        if options.enable_preflight {
            let headers = self.signed_headers(&message).await?;
            let request = build_request(Method::HEAD, uri.clone(), headers, Bytes::new())?;
            let raw = self.transport.execute(request).await?;
            record(last_response, raw.info());
            if !raw.status.is_success() {
                return Err(status_error(&raw));
            }
            tracing::debug!("HEAD preflight successful");
        }

        let mut headers = self.signed_headers(&message).await?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !self.request_encoding.is_identity() {
            headers.insert(
                CONTENT_ENCODING,
                HeaderValue::from_static(self.request_encoding.as_str()),
            );
        }
        if let Some(accept) = self.accept_encoding {
            headers.insert(ACCEPT_ENCODING, HeaderValue::from_static(accept.as_str()));
        }

        let body = serde_json::to_vec(payload)
            .map_err(|e| ClientError::Encode(format!("failed to serialize {}: {e}", P::NAME)))?;
        let plain_len = body.len();
        let body = compress(
            Bytes::from(body),
            self.request_encoding,
            self.compression_level,
        )?;
        tracing::debug!(
            plain_len,
            wire_len = body.len(),
            encoding = self.request_encoding.as_str(),
            "sending payload"
        );

        let request = build_request(Method::POST, uri, headers, body)?;
        let raw = self.transport.execute(request).await?;
        record(last_response, raw.info());
        if !raw.status.is_success() {
            return Err(status_error(&raw));
        }

        resolve::<P>(&raw)
    }

    async fn signed_headers(&self, message: &str) -> Result<HeaderMap, ClientError> {
        let signature = self.signer.sign(message).await?;
        let mut headers = HeaderMap::new();
        IdentityHeaders::new(signature, self.signer.identity(), message).apply(&mut headers)?;
        Ok(headers)
    }
}

fn record(slot: &Mutex<Option<ResponseInfo>>, info: ResponseInfo) {
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(info);
}

fn build_request(
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<http::Request<Full<Bytes>>, ClientError> {
    let mut request = http::Request::builder()
        .method(method)
        .uri(uri)
        .body(Full::new(body))
        .map_err(|e| ClientError::Config(format!("failed to build request: {e}")))?;
    *request.headers_mut() = headers;
    Ok(request)
}

/// `<target>/<name>`, assuming `http://` when `target` has no scheme.
pub(crate) fn build_url(target: &str, name: &str) -> String {
    let target = target.trim().trim_end_matches('/');
    if target.starts_with("http://") || target.starts_with("https://") {
        format!("{target}/{name}")
    } else {
        format!("http://{target}/{name}")
    }
}

/// Builder for [`MeshClient`].
///
/// # Example
///
/// ```ignore
/// use meshwire_client::{MeshClient, RetryPolicy, SendOptions};
/// use meshwire_core::CompressionEncoding;
///
/// let client = MeshClient::builder(signer)
///     .request_encoding(CompressionEncoding::Identity)
///     .options(SendOptions::new().retry(RetryPolicy::aggressive()))
///     .build()?;
/// ```
pub struct ClientBuilder {
    signer: Arc<dyn Signer>,
    /// Pre-built transport. Built with defaults when unset.
    transport: Option<HyperTransport>,
    /// Compression encoding for outgoing request bodies.
    request_encoding: CompressionEncoding,
    /// Accepted compression encoding for responses.
    accept_encoding: Option<CompressionEncoding>,
    compression_level: CompressionLevel,
    options: SendOptions,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("identity", &self.signer.identity())
            .field("transport", &self.transport.is_some())
            .field("request_encoding", &self.request_encoding)
            .field("accept_encoding", &self.accept_encoding)
            .field("compression_level", &self.compression_level)
            .field("options", &self.options)
            .finish()
    }
}

impl ClientBuilder {
    pub fn new<S: Signer>(signer: S) -> Self {
        Self {
            signer: Arc::new(signer),
            transport: None,
            request_encoding: defaults::REQUEST_ENCODING,
            accept_encoding: defaults::ACCEPT_ENCODING,
            compression_level: CompressionLevel::default(),
            options: SendOptions::default(),
        }
    }

    /// Use a pre-configured transport, e.g. one with a custom TLS config or
    /// pool size.
    pub fn transport(mut self, transport: HyperTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the encoding for request bodies.
    ///
    /// Default: zstd.
    pub fn request_encoding(mut self, encoding: CompressionEncoding) -> Self {
        self.request_encoding = encoding;
        self
    }

    /// Set the encoding advertised in `accept-encoding`.
    ///
    /// Default: zstd.
    pub fn accept_encoding(mut self, encoding: CompressionEncoding) -> Self {
        self.accept_encoding = Some(encoding);
        self
    }

    /// Do not send `accept-encoding`; responses arrive uncompressed.
    pub fn no_accept_encoding(mut self) -> Self {
        self.accept_encoding = None;
        self
    }

    pub fn compression_level(mut self, level: CompressionLevel) -> Self {
        self.compression_level = level;
        self
    }

    /// Options returned by [`MeshClient::options`].
    pub fn options(mut self, options: SendOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the client.
    ///
    /// Fails when the default retry policy is invalid or the default
    /// transport cannot be created.
    pub fn build(self) -> Result<MeshClient, ClientError> {
        self.options
            .policy
            .validate()
            .map_err(|msg| ClientError::Config(msg.to_string()))?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => HyperTransport::new()?,
        };

        Ok(MeshClient {
            transport,
            signer: self.signer,
            request_encoding: self.request_encoding,
            accept_encoding: self.accept_encoding,
            compression_level: self.compression_level,
            options: self.options,
        })
    }
}
