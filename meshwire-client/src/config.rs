//! Configuration modules for the meshwire client.
//!
//! This module contains send-level configuration:
//! - [`SendOptions`]: Per-send timeout, preflight, signed message and cancellation
//! - [`RetryPolicy`]: Retry behavior with exponential backoff

mod options;
mod retry;

pub use options::{SendOptions, defaults as send_defaults};
pub use retry::{ExponentialBackoff, RetryPolicy, defaults, retry_with_policy};
