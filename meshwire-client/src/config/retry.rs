//! Retry logic with exponential backoff.
//!
//! # Overview
//!
//! The retry system consists of:
//! - [`RetryPolicy`]: Configuration for retry behavior (attempt ceiling, backoff settings)
//! - [`ExponentialBackoff`]: Iterator-like state that yields sleep durations
//! - [`retry_with_policy`]: Helper that drives an attempt factory under a policy
//!
//! The delay before the retry following attempt *n* is
//! `min(max_delay, base_delay * multiplier^(n-1))`, optionally jittered.
//!
//! # Example
//!
//! ```ignore
//! use meshwire_client::{RetryPolicy, retry_with_policy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new()
//!     .max_attempts(3)
//!     .base_delay(Duration::from_millis(100));
//!
//! let value = retry_with_policy(&policy, |attempt| async move {
//!     fetch(attempt).await
//! }).await?;
//! ```
//!
//! # Retryable Errors
//!
//! Only errors for which [`ClientError::is_retryable`] holds are retried:
//! transport failures, timeouts, undecodable responses and transient statuses.
//! Everything else is returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::ClientError;

/// Default configuration values.
pub mod defaults {
    use std::time::Duration;

    /// Default delay before the first retry.
    pub const BASE_DELAY: Duration = Duration::from_secs(2);

    /// Default multiplier for exponential backoff.
    pub const MULTIPLIER: f64 = 2.0;

    /// Default jitter factor. Zero keeps the delay schedule exact.
    pub const JITTER: f64 = 0.0;

    /// Default maximum delay between retries.
    pub const MAX_DELAY: Duration = Duration::from_secs(4);

    /// Default total number of attempts, including the first.
    pub const MAX_ATTEMPTS: u32 = 2;
}

/// Configuration for retry behavior.
///
/// # Default Values
///
/// - `max_attempts`: 2
/// - `base_delay`: 2 seconds
/// - `multiplier`: 2.0
/// - `max_delay`: 4 seconds
/// - `jitter`: 0.0
///
/// # Example
///
/// ```
/// use meshwire_client::RetryPolicy;
/// use std::time::Duration;
///
/// // Use defaults
/// let policy = RetryPolicy::default();
///
/// // Custom configuration
/// let policy = RetryPolicy::new()
///     .max_attempts(5)
///     .base_delay(Duration::from_millis(100))
///     .max_delay(Duration::from_secs(30));
/// assert!(policy.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. Must be >= 1.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Multiplier for exponential backoff. Should be >= 1.0.
    pub multiplier: f64,

    /// Jitter factor for randomizing delays. Value between 0.0 and 1.0.
    /// A value of 0.2 means the actual delay will be within +/- 20% of the calculated delay.
    pub jitter: f64,

    /// Maximum delay between retries. The delay will never exceed this value.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            base_delay: defaults::BASE_DELAY,
            multiplier: defaults::MULTIPLIER,
            jitter: defaults::JITTER,
            max_delay: defaults::MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Create a new RetryPolicy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Short delays for latency-sensitive exchanges.
    /// - Base delay: 50ms
    /// - Max delay: 1 second
    /// - Max attempts: 5
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            ..Default::default()
        }
    }

    /// Long delays for background exchanges.
    /// - Base delay: 2 seconds
    /// - Max delay: 5 minutes
    /// - Max attempts: 10
    pub fn patient() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(300),
            ..Default::default()
        }
    }

    /// Set the total number of attempts.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the delay before the first retry.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    ///
    /// # Panics
    ///
    /// Panics if `multiplier` is less than 1.0.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        assert!(multiplier >= 1.0, "multiplier must be >= 1.0");
        self.multiplier = multiplier;
        self
    }

    /// Set the jitter factor.
    ///
    /// # Panics
    ///
    /// Panics if `jitter` is not between 0.0 and 1.0.
    pub fn jitter(mut self, jitter: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&jitter),
            "jitter must be between 0.0 and 1.0"
        );
        self.jitter = jitter;
        self
    }

    /// Validate the policy configuration.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be >= 1");
        }
        if self.multiplier < 1.0 {
            return Err("multiplier must be >= 1.0");
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err("jitter must be between 0.0 and 1.0");
        }
        Ok(())
    }

    /// The un-jittered delay before the retry that follows attempt `attempt`
    /// (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()).max(0.0))
    }

    /// Create an ExponentialBackoff from this policy.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.clone())
    }
}

/// Exponential backoff with jitter.
///
/// Yields increasing sleep durations with randomized jitter.
/// The sequence follows: base * multiplier^retry with +/- jitter.
///
/// # Example
///
/// ```
/// use meshwire_client::RetryPolicy;
/// use std::time::Duration;
///
/// let mut backoff = RetryPolicy::default().backoff();
///
/// assert_eq!(backoff.next_delay(), Duration::from_secs(2));
/// assert_eq!(backoff.next_delay(), Duration::from_secs(4));
/// assert_eq!(backoff.next_delay(), Duration::from_secs(4));
/// ```
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    policy: RetryPolicy,
    /// Current delay without jitter, stored as f64 to avoid rounding errors.
    current_delay_secs: f64,
    /// Number of delays handed out so far.
    retries: u32,
}

impl ExponentialBackoff {
    /// Create a new ExponentialBackoff from a RetryPolicy.
    pub fn new(policy: RetryPolicy) -> Self {
        let current_delay_secs = policy.base_delay.min(policy.max_delay).as_secs_f64();
        Self {
            policy,
            current_delay_secs,
            retries: 0,
        }
    }

    /// Get the number of retries handed out so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Check if another attempt is allowed.
    pub fn can_retry(&self) -> bool {
        self.retries.saturating_add(1) < self.policy.max_attempts
    }

    /// Get the next delay duration, applying jitter.
    ///
    /// Returns the delay to wait before the next attempt.
    /// Advances the internal state for the next call.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_delay_secs;

        // Apply jitter: delay * (1 + jitter * random(-1, 1))
        let jittered = if self.policy.jitter > 0.0 {
            let jitter_range = self.policy.jitter * 2.0;
            let random_factor = rand::random::<f64>() * jitter_range - self.policy.jitter;
            delay * (1.0 + random_factor)
        } else {
            delay
        };

        // Clamp to max_delay
        let clamped = jittered.min(self.policy.max_delay.as_secs_f64());

        // Update for next iteration
        self.current_delay_secs = (self.current_delay_secs * self.policy.multiplier)
            .min(self.policy.max_delay.as_secs_f64());
        self.retries += 1;

        Duration::from_secs_f64(clamped.max(0.0))
    }
}

/// Drive `f` under `policy`.
///
/// `f` receives the 1-based attempt number. Retryable errors are retried
/// after the backoff delay until the policy's attempt ceiling is reached, at
/// which point [`ClientError::RetriesExhausted`] wraps the last error.
/// Non-retryable errors are returned immediately.
pub async fn retry_with_policy<F, Fut, T>(policy: &RetryPolicy, mut f: F) -> Result<T, ClientError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    if let Err(msg) = policy.validate() {
        return Err(ClientError::Config(msg.to_string()));
    }

    let mut backoff = policy.backoff();

    loop {
        let attempt = backoff.retries() + 1;
        match f(attempt).await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() => {
                if !backoff.can_retry() {
                    tracing::warn!(error = %e, attempts = attempt, "retries exhausted");
                    return Err(ClientError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                let delay = backoff.next_delay();
                tracing::debug!(
                    error = %e,
                    attempt,
                    delay_ms = delay.as_millis(),
                    "retrying after transient error"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.base_delay, Duration::from_secs(2));
        assert!((policy.multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(policy.jitter, 0.0);
        assert_eq!(policy.max_delay, Duration::from_secs(4));
    }

    #[test]
    fn test_retry_policy_presets() {
        assert_eq!(RetryPolicy::no_retry().max_attempts, 1);

        let policy = RetryPolicy::aggressive();
        assert_eq!(policy.base_delay, Duration::from_millis(50));
        assert_eq!(policy.max_delay, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 5);

        let policy = RetryPolicy::patient();
        assert_eq!(policy.base_delay, Duration::from_secs(2));
        assert_eq!(policy.max_delay, Duration::from_secs(300));
        assert_eq!(policy.max_attempts, 10);

        for policy in [
            RetryPolicy::no_retry(),
            RetryPolicy::aggressive(),
            RetryPolicy::patient(),
        ] {
            assert!(policy.validate().is_ok());
        }
    }

    #[test]
    fn test_retry_policy_builder() {
        let policy = RetryPolicy::new()
            .max_attempts(5)
            .base_delay(Duration::from_millis(100))
            .max_delay(Duration::from_secs(10))
            .multiplier(3.0)
            .jitter(0.1);

        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert!((policy.multiplier - 3.0).abs() < f64::EPSILON);
        assert!((policy.jitter - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_retry_policy_validate() {
        assert!(RetryPolicy::default().validate().is_ok());

        // base above max is clamped, not rejected
        let clamped = RetryPolicy::new().base_delay(Duration::from_secs(5));
        assert!(clamped.validate().is_ok());
        assert_eq!(clamped.delay_for_attempt(1), Duration::from_secs(4));
        assert_eq!(clamped.backoff().next_delay(), Duration::from_secs(4));

        assert_eq!(
            RetryPolicy::new().max_attempts(0).validate(),
            Err("max_attempts must be >= 1")
        );
    }

    #[test]
    #[should_panic(expected = "multiplier must be >= 1.0")]
    fn test_retry_policy_invalid_multiplier() {
        RetryPolicy::new().multiplier(0.5);
    }

    #[test]
    #[should_panic(expected = "jitter must be between 0.0 and 1.0")]
    fn test_retry_policy_invalid_jitter() {
        RetryPolicy::new().jitter(1.5);
    }

    #[test]
    fn test_delay_for_attempt_is_bounded_and_monotonic() {
        let policy = RetryPolicy::new()
            .base_delay(Duration::from_millis(100))
            .multiplier(3.0)
            .max_delay(Duration::from_secs(2));

        let delays: Vec<_> = (1..=8).map(|n| policy.delay_for_attempt(n)).collect();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(300));
        for pair in delays.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert!(delays.iter().all(|d| *d <= policy.max_delay));
        assert_eq!(delays[7], Duration::from_secs(2));
    }

    #[test]
    fn test_exponential_backoff_matches_delay_for_attempt() {
        let policy = RetryPolicy::new()
            .base_delay(Duration::from_secs(1))
            .multiplier(2.0)
            .max_delay(Duration::from_secs(100));

        let mut backoff = policy.backoff();
        for attempt in 1..=5 {
            assert_eq!(backoff.next_delay(), policy.delay_for_attempt(attempt));
        }
        assert_eq!(backoff.retries(), 5);
    }

    #[test]
    fn test_exponential_backoff_with_jitter() {
        let policy = RetryPolicy::new()
            .base_delay(Duration::from_secs(1))
            .multiplier(2.0)
            .max_delay(Duration::from_secs(100))
            .jitter(0.2);

        let mut backoff = policy.backoff();

        // With 20% jitter, delay should be between 0.8s and 1.2s
        let delay = backoff.next_delay();
        assert!(delay >= Duration::from_millis(800));
        assert!(delay <= Duration::from_millis(1200));
    }

    #[test]
    fn test_exponential_backoff_can_retry() {
        let mut backoff = RetryPolicy::new().max_attempts(3).backoff();

        assert!(backoff.can_retry()); // after attempt 1
        backoff.next_delay();
        assert!(backoff.can_retry()); // after attempt 2
        backoff.next_delay();
        assert!(!backoff.can_retry()); // attempt 3 was the last

        assert!(!RetryPolicy::no_retry().backoff().can_retry());
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let result = retry_with_policy(&RetryPolicy::default(), |_| async {
            Ok::<_, ClientError>(42)
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_non_retryable_error() {
        let attempts = Arc::new(AtomicU32::new(0));
        let result = retry_with_policy(&RetryPolicy::default(), |_| {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(ClientError::status(StatusCode::FORBIDDEN, None))
            }
        })
        .await;

        assert!(matches!(result, Err(ClientError::Status { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_with_policy_eventual_success() {
        let attempts = Arc::new(AtomicU32::new(0));

        let policy = RetryPolicy::new()
            .max_attempts(4)
            .base_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(5));

        let result = retry_with_policy(&policy, |attempt| {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                if attempt < 3 {
                    Err(ClientError::Transport("temporary failure".into()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let attempts = Arc::new(AtomicU32::new(0));

        let policy = RetryPolicy::new()
            .max_attempts(3)
            .base_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(5));

        let result = retry_with_policy(&policy, |_| {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(ClientError::status(StatusCode::SERVICE_UNAVAILABLE, None))
            }
        })
        .await;

        match result {
            Err(ClientError::RetriesExhausted { attempts: n, last }) => {
                assert_eq!(n, 3);
                assert_eq!(last.http_status(), Some(StatusCode::SERVICE_UNAVAILABLE));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_rejects_invalid_policy() {
        let result = retry_with_policy(&RetryPolicy::new().max_attempts(0), |_| async {
            Ok::<_, ClientError>(1)
        })
        .await;
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[tokio::test]
    async fn test_base_delay_above_max_waits_max_delay() {
        let attempts = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new()
            .max_attempts(2)
            .base_delay(Duration::from_secs(5))
            .max_delay(Duration::from_millis(50));

        let started = std::time::Instant::now();
        let result = retry_with_policy(&policy, |attempt| {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                if attempt == 1 {
                    Err(ClientError::Timeout(Duration::from_millis(10)))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        let elapsed = started.elapsed();

        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(5));
    }
}
