//! Retry policy and transport fault classification.
//!
//! When an attempt fails, the executor first classifies the fault with
//! [`classify_fault`]:
//! - [`FaultClass::Fatal`] - never retried; carries the fixed classification
//!   string delivered to the sink
//! - [`FaultClass::Retryable`] - handed to the configured [`RetryPolicy`]
//!   together with the attempt count
//!
//! [`BackoffPolicy`] is the default policy: exponential backoff with a delay
//! cap and random jitter. Callers plug in their own [`RetryPolicy`] to change
//! the retry schedule without touching the execution loop.
//!
//! # Example
//!
//! ```
//! use reqtask::{BackoffPolicy, RetryDecision, RetryPolicy, TransportError};
//!
//! let policy = BackoffPolicy::with_max_retries(2);
//! let cause = TransportError::Io("connection reset".to_string());
//!
//! match policy.should_retry(&cause, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::transport::TransportError;

/// Default number of retries permitted after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (32 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Maximum jitter added to delays (500ms).
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Classification of a transport fault for the retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Never retried; the execution fails immediately.
    Fatal {
        /// Fixed human-readable classification passed to the sink.
        message: &'static str,
    },

    /// Eligible for retry, subject to the configured [`RetryPolicy`].
    Retryable,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (the first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why no further attempt is made.
        reason: String,
    },
}

/// Pluggable retry decision function.
///
/// Consulted only for retryable faults; fatal faults never reach the policy.
/// `attempt` is the number of failures observed so far (1 on the first
/// failure).
pub trait RetryPolicy: Send + Sync {
    /// Decides whether to retry given the fault and attempt count.
    fn should_retry(&self, cause: &TransportError, attempt: u32) -> RetryDecision;
}

/// Exponential backoff with jitter, the default [`RetryPolicy`].
///
/// # Default Values
///
/// - `max_retries`: 3
/// - `base_delay`: 1 second
/// - `max_delay`: 32 seconds
/// - `backoff_multiplier`: 2.0
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * multiplier^(attempt - 1), max_delay) + jitter
/// ```
///
/// With defaults, delays are approximately 1s, 2s, 4s before retries run out.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Retries permitted after the initial attempt.
    max_retries: u32,

    /// Base delay for the first retry.
    base_delay: Duration,

    /// Maximum delay cap.
    max_delay: Duration,

    /// Multiplier applied each attempt (typically 2.0 for doubling).
    backoff_multiplier: f32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl BackoffPolicy {
    /// Creates a policy with custom settings.
    ///
    /// `max_retries` of 0 means every retryable fault is terminal after the
    /// initial attempt.
    #[must_use]
    pub fn new(
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Creates a policy with a custom retry budget, defaults otherwise.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Returns the number of retries permitted.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Calculates the delay for a retry with exponential backoff and jitter.
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);

        // attempt is 1-indexed: the first retry waits 1x the base delay
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * multiplier.powf(exponent);

        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + calculate_jitter()
    }
}

impl RetryPolicy for BackoffPolicy {
    fn should_retry(&self, cause: &TransportError, attempt: u32) -> RetryDecision {
        if attempt > self.max_retries {
            debug!(attempt, max_retries = self.max_retries, "retry budget exhausted");
            return RetryDecision::DoNotRetry {
                reason: format!("max retries ({}) exhausted", self.max_retries),
            };
        }

        let delay = self.calculate_delay(attempt);
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            cause = %cause,
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }
}

/// Generates random jitter between 0 and [`MAX_JITTER`].
///
/// Prevents thundering herd when many requests fail and retry together.
fn calculate_jitter() -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_ms = rng.gen_range(0..=MAX_JITTER.as_millis() as u64);
    Duration::from_millis(jitter_ms)
}

/// Classifies a transport fault as fatal or retryable.
///
/// | Fault | Class | Classification message |
/// |-------|-------|------------------------|
/// | `Protocol` | Fatal | "cannot repeat the request" |
/// | `Resolve` | Fatal | "can't resolve host" |
/// | `Socket` | Fatal | "can't resolve host" (host unreachable) |
/// | `ReadTimeout` | Fatal | "socket time out" |
/// | `ConnectTimeout` | Retryable | - |
/// | `Io` | Retryable | - |
/// | `Defect` | Retryable | normalized to `Io` before the policy |
#[must_use]
pub fn classify_fault(error: &TransportError) -> FaultClass {
    match error {
        TransportError::Protocol(_) => FaultClass::Fatal {
            message: "cannot repeat the request",
        },
        TransportError::Resolve(_) | TransportError::Socket(_) => FaultClass::Fatal {
            message: "can't resolve host",
        },
        TransportError::ReadTimeout(_) => FaultClass::Fatal {
            message: "socket time out",
        },
        TransportError::ConnectTimeout(_) | TransportError::Io(_) | TransportError::Defect(_) => {
            FaultClass::Retryable
        }
    }
}
