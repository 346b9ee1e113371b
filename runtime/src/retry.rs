//! Bounded retry for transient arbitration outcomes.
//!
//! Lock conflicts and serialization conflicts are contention: a later attempt
//! may not meet them. Every other outcome is final on first occurrence.
//!
//! # Example
//!
//! ```rust
//! use seat_arbiter_runtime::retry::{RetryPolicy, retry_outcome};
//! use seat_arbiter_core::{AttemptOutcome, SeatId};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let policy = RetryPolicy::builder()
//!     .max_attempts(5)
//!     .delay(Duration::from_millis(50))
//!     .jitter(Duration::from_millis(20))
//!     .build();
//!
//! let report = retry_outcome(&policy, |_attempt| async {
//!     AttemptOutcome::Reserved(SeatId::new(1))
//! }).await;
//! assert_eq!(report.attempts, 1);
//! # }
//! ```

use crate::arbiter::{AttemptRequest, ReservationArbiter};
use crate::metrics::RetryMetrics;
use rand::Rng;
use seat_arbiter_core::AttemptOutcome;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy for transient outcomes.
///
/// # Default Values
///
/// - `max_attempts`: 3 (total arbiter invocations, first one included)
/// - `delay`: 100ms
/// - `multiplier`: 1.0 (fixed delay)
/// - `max_delay`: 5 seconds
/// - `jitter`: none
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of arbiter invocations, the first one included
    pub max_attempts: u32,
    /// Delay before the first retry
    pub delay: Duration,
    /// Growth factor applied per retry (1.0 keeps the delay fixed)
    pub multiplier: f64,
    /// Cap on the computed delay
    pub max_delay: Duration,
    /// Upper bound of a uniformly random extra delay
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(100),
            multiplier: 1.0,
            max_delay: Duration::from_secs(5),
            jitter: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_attempts: None,
            delay: None,
            multiplier: None,
            max_delay: None,
            jitter: None,
        }
    }

    /// Policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Deterministic part of the delay before retry number `retry` (0-based).
    ///
    /// delay = delay * (multiplier ^ retry), capped at `max_delay`.
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return self.delay.min(self.max_delay);
        }

        #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
        let delay_ms = self.delay.as_millis() as f64 * self.multiplier.powi(retry as i32);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = Duration::from_millis(delay_ms as u64);

        delay.min(self.max_delay)
    }

    /// Delay before retry number `retry` with jitter applied.
    #[must_use]
    pub fn jittered_delay(&self, retry: u32) -> Duration {
        let base = self.delay_for_retry(retry);
        if self.jitter.is_zero() {
            return base;
        }
        #[allow(clippy::cast_possible_truncation)] // jitter is configured in milliseconds
        let extra = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        base + Duration::from_millis(extra)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_attempts: Option<u32>,
    delay: Option<Duration>,
    multiplier: Option<f64>,
    max_delay: Option<Duration>,
    jitter: Option<Duration>,
}

impl RetryPolicyBuilder {
    /// Set the maximum number of arbiter invocations (at least 1).
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Set the delay before the first retry.
    #[must_use]
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set the growth factor applied per retry.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Set the delay cap.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set the jitter bound.
    #[must_use]
    pub const fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            delay: self.delay.unwrap_or(defaults.delay),
            multiplier: self.multiplier.unwrap_or(defaults.multiplier),
            max_delay: self.max_delay.unwrap_or(defaults.max_delay),
            jitter: self.jitter.unwrap_or(defaults.jitter),
        }
    }
}

/// Terminal outcome of a retried execution plus what happened on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryReport {
    /// Last outcome produced
    pub outcome: AttemptOutcome,
    /// Invocations made
    pub attempts: u32,
    /// Lock conflicts seen, the final one included
    pub lock_conflicts: u32,
    /// Serialization conflicts seen, the final one included
    pub serialization_conflicts: u32,
    /// The budget ran out while the outcome was still transient
    pub exhausted: bool,
}

/// Run `operation` until it yields a terminal outcome or the attempt budget
/// runs out.
///
/// `operation` receives the 1-based attempt number. After exhaustion the last
/// transient outcome is returned as-is with `exhausted` set.
pub async fn retry_outcome<F, Fut>(policy: &RetryPolicy, mut operation: F) -> RetryReport
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AttemptOutcome>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut lock_conflicts = 0;
    let mut serialization_conflicts = 0;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let outcome = operation(attempt).await;

        match outcome {
            AttemptOutcome::LockConflict => lock_conflicts += 1,
            AttemptOutcome::SerializationConflict => serialization_conflicts += 1,
            _ => {}
        }

        if !outcome.is_transient() {
            if attempt > 1 {
                tracing::debug!(attempt, outcome = %outcome, "Attempt settled after retry");
                if outcome.is_success() {
                    RetryMetrics::record_success();
                }
            }
            return RetryReport {
                outcome,
                attempts: attempt,
                lock_conflicts,
                serialization_conflicts,
                exhausted: false,
            };
        }

        if attempt >= max_attempts {
            tracing::warn!(attempt, outcome = %outcome, "Retry budget exhausted");
            RetryMetrics::record_exhausted();
            return RetryReport {
                outcome,
                attempts: attempt,
                lock_conflicts,
                serialization_conflicts,
                exhausted: true,
            };
        }

        let delay = policy.jittered_delay(attempt - 1);
        tracing::debug!(
            attempt,
            delay_ms = delay.as_millis(),
            outcome = %outcome,
            "Transient conflict, retrying"
        );
        RetryMetrics::record_attempt();
        sleep(delay).await;
    }
}

/// Run the arbiter for `request` under `policy`.
pub async fn attempt_with_retry(
    arbiter: &ReservationArbiter,
    request: &AttemptRequest,
    policy: &RetryPolicy,
) -> RetryReport {
    retry_outcome(policy, |_| arbiter.attempt(request)).await
}
