//! Shared pieces of the meshwire example binaries: payload types, a demo
//! keyring implementing [`Signer`] and [`Verifier`], and environment helpers.
//!
//! The keyring signs with a blake3 keyed hash derived from a shared secret.
//! It stands in for a real key-management service and is not meant for
//! production use.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use futures::future::BoxFuture;
use meshwire_core::{Payload, SignError, Signer, Verifier};
use serde::{Deserialize, Serialize};

const KEY_CONTEXT: &str = "meshwire example keyring 2026-01 signing key";

/// Liveness probe answered with the same sequence number.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    pub seq: u64,
    #[serde(default)]
    pub note: String,
}

impl Payload for Ping {
    const NAME: &'static str = "Ping";
}

/// A unit of work; the server fills in `score`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub prompt: String,
    #[serde(default)]
    pub score: Option<f64>,
}

impl Payload for Task {
    const NAME: &'static str = "Task";
}

fn derive_key(secret: &str) -> [u8; 32] {
    blake3::derive_key(KEY_CONTEXT, secret.as_bytes())
}

fn signature_for(key: &[u8; 32], identity: &str, message: &str) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new_keyed(key);
    hasher.update(identity.as_bytes());
    hasher.update(b"\n");
    hasher.update(message.as_bytes());
    hasher.finalize()
}

/// Signs as one identity with a key derived from a shared secret.
pub struct Keyring {
    identity: String,
    key: [u8; 32],
}

impl Keyring {
    pub fn new(identity: impl Into<String>, secret: &str) -> Self {
        Self {
            identity: identity.into(),
            key: derive_key(secret),
        }
    }
}

impl Signer for Keyring {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn sign<'a>(&'a self, message: &'a str) -> BoxFuture<'a, Result<String, SignError>> {
        Box::pin(async move {
            if self.identity.is_empty() {
                return Err(SignError::new("keyring has no identity"));
            }
            Ok(signature_for(&self.key, &self.identity, message)
                .to_hex()
                .to_string())
        })
    }
}

/// Verifies signatures of a fixed set of trusted identities.
#[derive(Default)]
pub struct TrustedKeys {
    keys: BTreeMap<String, [u8; 32]>,
}

impl TrustedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust `identity`, whose key derives from `secret`.
    pub fn trust(mut self, identity: impl Into<String>, secret: &str) -> Self {
        self.keys.insert(identity.into(), derive_key(secret));
        self
    }
}

impl Verifier for TrustedKeys {
    fn verify<'a>(
        &'a self,
        identity: &'a str,
        message: &'a str,
        signature: &'a str,
    ) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let Some(key) = self.keys.get(identity) else {
                tracing::debug!(identity, "unknown identity");
                return false;
            };
            match blake3::Hash::from_hex(signature) {
                // Hash equality is constant-time
                Ok(given) => given == signature_for(key, identity, message),
                Err(_) => false,
            }
        })
    }
}

/// Read `name`, falling back to `default`.
pub fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// The address from `MESH_ADDR`, defaulting to `127.0.0.1:8091`.
pub fn mesh_addr() -> anyhow::Result<SocketAddr> {
    let addr = env_or("MESH_ADDR", "127.0.0.1:8091");
    addr.parse()
        .map_err(|e| anyhow::anyhow!("invalid MESH_ADDR {addr:?}: {e}"))
}

/// Install a `tracing-subscriber` formatter filtered by `RUST_LOG`, default
/// `info`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
