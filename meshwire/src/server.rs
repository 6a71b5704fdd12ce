//! Server assembly.
//!
//! [`Server`] owns the route table and the shared read-only configuration
//! (verifier, whitelist, limits) and composes them into an axum [`Router`]:
//!
//! ```text
//! Normalize ─▶ Authenticate ─▶ Transcode ─▶ route handler
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let server = Server::builder(verifier)
//!     .whitelist("/health")
//!     .route(Route::new(ping).describe("liveness probe"))
//!     .build();
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8091").await?;
//! server.serve(listener).await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use serde::Serialize;
use tokio::net::TcpListener;

use meshwire_core::{CompressionLevel, Verifier};

use crate::auth::AuthLayer;
use crate::error::{MeshError, envelope_response};
use crate::layer::TranscodeLayer;
use crate::normalize::normalize_layer;
use crate::route::{ROUTE_METHODS, Route};
use crate::whitelist::{DOCS_PATH, Whitelist};

/// A stage of the server middleware pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Catch panics and turn them into 500 envelopes.
    Normalize,
    /// Apply the authentication gate.
    Authenticate,
    /// Decompress requests and compress responses.
    Transcode,
}

/// Middleware order, outermost first.
pub const PIPELINE: [Stage; 3] = [Stage::Normalize, Stage::Authenticate, Stage::Transcode];

/// A configured server.
pub struct Server {
    verifier: Arc<dyn Verifier>,
    whitelist: Whitelist,
    routes: Vec<Route>,
    receive_max_bytes: Option<usize>,
    compression_level: CompressionLevel,
}

impl Server {
    /// Start building a server that verifies signatures with `verifier`.
    pub fn builder<V: Verifier>(verifier: V) -> ServerBuilder {
        ServerBuilder::new(Arc::new(verifier))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    /// Compose the route table and pipeline into a router.
    pub fn into_router(self) -> Router {
        let listing = Arc::new(RouteListing::new(&self.routes));

        let mut router = Router::new();
        for route in self.routes {
            let path = route.path().to_owned();
            router = router.route(&path, route.into_method_router());
        }
        router = router
            .route(
                DOCS_PATH,
                any(move |req: Request| docs(req.method().clone(), listing.clone())),
            )
            .fallback(|req: Request| async move {
                MeshError::not_found(req.uri().path()).into_response()
            });

        // Router::layer wraps everything added so far, so the innermost stage
        // must be applied first.
        for stage in PIPELINE.iter().rev() {
            router = match stage {
                Stage::Transcode => router.layer(
                    TranscodeLayer::new(self.whitelist.clone())
                        .compression_level(self.compression_level)
                        .receive_max_bytes(self.receive_max_bytes),
                ),
                Stage::Authenticate => router.layer(AuthLayer::new(
                    self.verifier.clone(),
                    self.whitelist.clone(),
                )),
                Stage::Normalize => router.layer(normalize_layer()),
            };
        }
        router
    }

    /// Serve on `listener` until the process exits.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        log_listening(&listener, &self.routes);
        axum::serve(listener, self.into_router()).await
    }

    /// Serve on `listener` until `signal` resolves, then drain in-flight
    /// requests.
    pub async fn serve_with_shutdown<F>(
        self,
        listener: TcpListener,
        signal: F,
    ) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        log_listening(&listener, &self.routes);
        axum::serve(listener, self.into_router())
            .with_graceful_shutdown(signal)
            .await
    }
}

fn log_listening(listener: &TcpListener, routes: &[Route]) {
    let paths: Vec<&str> = routes.iter().map(Route::path).collect();
    match listener.local_addr() {
        Ok(addr) => tracing::info!(%addr, ?paths, "meshwire server listening"),
        Err(e) => tracing::warn!(error = %e, ?paths, "meshwire server listening"),
    }
}

/// Builder for [`Server`].
pub struct ServerBuilder {
    verifier: Arc<dyn Verifier>,
    whitelist: Vec<String>,
    routes: Vec<Route>,
    receive_max_bytes: Option<usize>,
    compression_level: CompressionLevel,
}

impl ServerBuilder {
    fn new(verifier: Arc<dyn Verifier>) -> Self {
        Self {
            verifier,
            whitelist: Vec::new(),
            routes: Vec::new(),
            receive_max_bytes: None,
            compression_level: CompressionLevel::Default,
        }
    }

    /// Exempt `path` from authentication and compression.
    pub fn whitelist<S: Into<String>>(mut self, path: S) -> Self {
        self.whitelist.push(path.into());
        self
    }

    /// Register a route. A later route for the same path replaces the
    /// earlier one.
    pub fn route(mut self, route: Route) -> Self {
        if route.path() == DOCS_PATH {
            tracing::warn!(path = DOCS_PATH, "ignoring route shadowing the route listing");
            return self;
        }
        if let Some(existing) = self.routes.iter_mut().find(|r| r.path() == route.path()) {
            tracing::warn!(path = route.path(), "replacing previously registered route");
            *existing = route;
        } else {
            self.routes.push(route);
        }
        self
    }

    /// Reject request bodies larger than `max` bytes before decompression.
    pub fn receive_max_bytes(mut self, max: usize) -> Self {
        self.receive_max_bytes = Some(max);
        self
    }

    /// Compression level for responses.
    pub fn compression_level(mut self, level: CompressionLevel) -> Self {
        self.compression_level = level;
        self
    }

    pub fn build(self) -> Server {
        Server {
            verifier: self.verifier,
            whitelist: Whitelist::new(self.whitelist),
            routes: self.routes,
            receive_max_bytes: self.receive_max_bytes,
            compression_level: self.compression_level,
        }
    }
}

#[derive(Debug, Serialize)]
struct RouteListing {
    routes: Vec<RouteEntry>,
}

#[derive(Debug, Serialize)]
struct RouteEntry {
    path: String,
    methods: [&'static str; 2],
    description: String,
}

impl RouteListing {
    fn new(routes: &[Route]) -> Self {
        Self {
            routes: routes
                .iter()
                .map(|route| RouteEntry {
                    path: route.path().to_owned(),
                    methods: ROUTE_METHODS,
                    description: route.description().to_owned(),
                })
                .collect(),
        }
    }
}

async fn docs(method: Method, listing: Arc<RouteListing>) -> Response {
    if method == Method::GET || method == Method::HEAD {
        envelope_response(StatusCode::OK, listing.as_ref(), None)
    } else {
        MeshError::method_not_allowed(&method).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::header::{ACCEPT_ENCODING, CONTENT_ENCODING};
    use bytes::Bytes;
    use futures::FutureExt;
    use futures::future::BoxFuture;
    use meshwire_core::{
        CompressionEncoding, IdentityHeaders, Payload, compress, decompress,
    };
    use serde::Deserialize;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct AcceptGood;

    impl Verifier for AcceptGood {
        fn verify<'a>(
            &'a self,
            _identity: &'a str,
            _message: &'a str,
            signature: &'a str,
        ) -> BoxFuture<'a, bool> {
            async move { signature == "good" }.boxed()
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Ping {
        field: bool,
    }

    impl Payload for Ping {
        const NAME: &'static str = "Ping";
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Boom;

    impl Payload for Boom {
        const NAME: &'static str = "Boom";
    }

    fn server(calls: Arc<AtomicUsize>) -> Server {
        Server::builder(AcceptGood)
            .route(
                Route::new(move |ping: Ping| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, MeshError>(ping)
                    }
                })
                .describe("echo"),
            )
            .route(Route::new(explode))
            .build()
    }

    async fn explode(_: Boom) -> Result<Boom, MeshError> {
        panic!("boom handler")
    }

    fn request(method: Method, uri: &str, signature: Option<&str>, body: Body) -> Request {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .body(body)
            .unwrap();
        if let Some(signature) = signature {
            IdentityHeaders::new(signature, "alice", "hello")
                .apply(req.headers_mut())
                .unwrap();
        }
        req
    }

    async fn envelope(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_pipeline_order() {
        assert_eq!(
            PIPELINE,
            [Stage::Normalize, Stage::Authenticate, Stage::Transcode]
        );
    }

    #[tokio::test]
    async fn test_signed_request_reaches_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = server(calls.clone()).into_router();

        let req = request(
            Method::POST,
            "/Ping",
            Some("good"),
            Body::from(r#"{"field":true}"#),
        );
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            envelope(resp).await,
            json!({"body": {"field": true}, "error": null, "metadata": {}})
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_auth_short_circuits_before_handler() {
        let calls = Arc::new(AtomicUsize::new(0));

        let req = request(Method::POST, "/Ping", None, Body::from(r#"{"field":true}"#));
        let resp = server(calls.clone()).into_router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let env = envelope(resp).await;
        assert!(env["error"].as_str().unwrap().contains("x-signature"));
        assert_eq!(env["body"], json!({}));

        let req = request(
            Method::POST,
            "/Ping",
            Some("forged"),
            Body::from(r#"{"field":true}"#),
        );
        let resp = server(calls.clone()).into_router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_compressed_round_trip() {
        let router = server(Arc::new(AtomicUsize::new(0))).into_router();

        let body = compress(
            Bytes::from_static(br#"{"field":true}"#),
            CompressionEncoding::Zstd,
            CompressionLevel::Default,
        )
        .unwrap();
        let mut req = request(Method::POST, "/Ping", Some("good"), Body::from(body));
        req.headers_mut()
            .insert(CONTENT_ENCODING, "zstd".parse().unwrap());
        req.headers_mut()
            .insert(ACCEPT_ENCODING, "zstd".parse().unwrap());

        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(CONTENT_ENCODING).unwrap(), "zstd");
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let plain = decompress(bytes, CompressionEncoding::Zstd).unwrap();
        let env: Value = serde_json::from_slice(&plain).unwrap();
        assert_eq!(env["body"]["field"], true);
    }

    #[tokio::test]
    async fn test_preflight_head() {
        let router = server(Arc::new(AtomicUsize::new(0))).into_router();
        let req = request(Method::HEAD, "/Ping", Some("good"), Body::empty());
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_docs_bypasses_auth() {
        let router = server(Arc::new(AtomicUsize::new(0))).into_router();
        let req = request(Method::GET, "/docs", None, Body::empty());
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let env = envelope(resp).await;
        let routes = env["body"]["routes"].as_array().unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0]["path"], "/Ping");
        assert_eq!(routes[0]["methods"], json!(["POST", "HEAD"]));
        assert_eq!(routes[0]["description"], "echo");
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let router = server(Arc::new(AtomicUsize::new(0))).into_router();
        let req = request(Method::POST, "/Nope", Some("good"), Body::from("{}"));
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(envelope(resp).await["body"], json!({}));
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let router = server(Arc::new(AtomicUsize::new(0))).into_router();
        let req = request(Method::DELETE, "/Ping", Some("good"), Body::empty());
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_panic_is_normalized() {
        let router = server(Arc::new(AtomicUsize::new(0))).into_router();
        let req = request(Method::POST, "/Boom", Some("good"), Body::from("null"));
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let env = envelope(resp).await;
        assert_eq!(env["body"], json!({}));
        assert!(env["error"].as_str().unwrap().contains("boom handler"));
    }

    #[tokio::test]
    async fn test_receive_limit_keeps_oversized_bodies_from_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let router = Server::builder(AcceptGood)
            .route(Route::new(move |ping: Ping| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, MeshError>(ping)
                }
            }))
            .receive_max_bytes(64)
            .build()
            .into_router();

        let padded = format!(r#"{{"field":true,"pad":"{}"}}"#, "x".repeat(2000));

        let req = request(
            Method::POST,
            "/Ping",
            Some("good"),
            Body::from(padded.clone()),
        );
        let resp = router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let compressed = compress(
            Bytes::from(padded),
            CompressionEncoding::Zstd,
            CompressionLevel::Default,
        )
        .unwrap();
        assert!(compressed.len() < 64);
        let mut req = request(Method::POST, "/Ping", Some("good"), Body::from(compressed));
        req.headers_mut()
            .insert(CONTENT_ENCODING, "zstd".parse().unwrap());
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(envelope(resp).await["body"], json!({}));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_builder_replaces_duplicate_routes() {
        let server = Server::builder(AcceptGood)
            .route(Route::new(|p: Ping| async move { Ok::<_, MeshError>(p) }).describe("first"))
            .route(Route::new(|p: Ping| async move { Ok::<_, MeshError>(p) }).describe("second"))
            .whitelist("/health")
            .build();
        assert_eq!(server.routes().len(), 1);
        assert_eq!(server.routes()[0].description(), "second");
        assert!(server.whitelist().contains("/health"));
        assert!(server.whitelist().contains("/docs"));
    }
}
