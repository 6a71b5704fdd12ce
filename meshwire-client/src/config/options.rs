//! Per-send options.

use std::time::Duration;

use super::retry::RetryPolicy;
use crate::cancel::CancelToken;

/// Default configuration values.
pub mod defaults {
    use std::time::Duration;

    /// Default per-attempt timeout.
    pub const TIMEOUT: Duration = Duration::from_secs(10);

    /// Whether a HEAD preflight precedes each POST by default.
    pub const ENABLE_PREFLIGHT: bool = true;
}

/// Options for one [`send`](crate::MeshClient::send).
///
/// # Example
///
/// ```
/// use meshwire_client::{RetryPolicy, SendOptions};
/// use std::time::Duration;
///
/// let options = SendOptions::new()
///     .timeout(Duration::from_secs(3))
///     .preflight(false)
///     .retry(RetryPolicy::no_retry());
/// assert_eq!(options.policy.max_attempts, 1);
/// ```
#[derive(Clone, Debug)]
pub struct SendOptions {
    /// Bound on each attempt, preflight included.
    pub timeout: Duration,
    /// Send HEAD before each POST.
    pub enable_preflight: bool,
    /// Message to sign instead of the identity's default message.
    pub message: Option<String>,
    pub policy: RetryPolicy,
    pub cancel: Option<CancelToken>,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            timeout: defaults::TIMEOUT,
            enable_preflight: defaults::ENABLE_PREFLIGHT,
            message: None,
            policy: RetryPolicy::default(),
            cancel: None,
        }
    }
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn preflight(mut self, enabled: bool) -> Self {
        self.enable_preflight = enabled;
        self
    }

    pub fn message<S: Into<String>>(mut self, message: S) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Abort the send when `token` is canceled.
    pub fn cancel_with(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}
