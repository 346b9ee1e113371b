//! Aggregate statistics of one simulation run.
//!
//! A [`RunStatistics`] value is owned by the simulation driver and mutated only
//! through [`RunStatistics::record`], one call per finished requester.

use crate::outcome::AttemptOutcome;
use crate::types::{EventId, IsolationLevel, UserId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Everything one requester produced: its terminal outcome plus retry bookkeeping.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// Who tried
    pub requester: UserId,
    /// Terminal outcome after retries
    pub outcome: AttemptOutcome,
    /// Arbiter invocations made (1 when no retry happened)
    pub attempts: u32,
    /// Lock conflicts seen across all invocations
    pub lock_conflicts: u32,
    /// Serialization conflicts seen across all invocations
    pub serialization_conflicts: u32,
    /// The retry budget ran out on a transient outcome
    pub exhausted: bool,
    /// Wall-clock time of the whole retry execution
    pub latency: Duration,
}

/// Outcome counters and latencies for one (event, isolation level) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Event the run contended for
    pub event_id: EventId,
    /// Isolation level every attempt used
    pub isolation: IsolationLevel,
    /// Requesters launched
    pub population: u32,
    /// Requesters that ended with a reservation
    pub successes: u32,
    /// Requesters that ended without one, for any reason
    pub failures: u32,
    /// Lock conflicts observed, retries included
    pub lock_conflicts: u32,
    /// Serialization conflicts observed, retries included
    pub serialization_conflicts: u32,
    /// Terminal `SeatUnavailable` outcomes
    pub seat_unavailable: u32,
    /// Terminal `RequesterInvalid` outcomes
    pub requester_invalid: u32,
    /// Terminal `Fatal` outcomes
    pub fatal_errors: u32,
    /// Requesters whose retry budget ran out on a conflict
    pub exhausted_retries: u32,
    /// Arbiter invocations across all requesters
    pub attempts: u32,
    /// Per-requester latency in completion order
    pub latencies: Vec<Duration>,
    /// Wall-clock duration of the whole run
    pub elapsed: Duration,
}

impl RunStatistics {
    /// Empty statistics for a run about to start.
    #[must_use]
    pub const fn new(event_id: EventId, isolation: IsolationLevel, population: u32) -> Self {
        Self {
            event_id,
            isolation,
            population,
            successes: 0,
            failures: 0,
            lock_conflicts: 0,
            serialization_conflicts: 0,
            seat_unavailable: 0,
            requester_invalid: 0,
            fatal_errors: 0,
            exhausted_retries: 0,
            attempts: 0,
            latencies: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Fold one requester's record into the aggregate.
    ///
    /// Counters saturate at `u32::MAX` instead of wrapping.
    pub fn record(&mut self, record: &AttemptRecord) {
        self.attempts = self.attempts.saturating_add(record.attempts);
        self.lock_conflicts = self.lock_conflicts.saturating_add(record.lock_conflicts);
        self.serialization_conflicts = self
            .serialization_conflicts
            .saturating_add(record.serialization_conflicts);
        self.latencies.push(record.latency);

        if record.exhausted {
            self.exhausted_retries = self.exhausted_retries.saturating_add(1);
        }

        match &record.outcome {
            AttemptOutcome::Reserved(_) => self.successes = self.successes.saturating_add(1),
            AttemptOutcome::SeatUnavailable => {
                self.failures = self.failures.saturating_add(1);
                self.seat_unavailable = self.seat_unavailable.saturating_add(1);
            }
            AttemptOutcome::RequesterInvalid => {
                self.failures = self.failures.saturating_add(1);
                self.requester_invalid = self.requester_invalid.saturating_add(1);
            }
            AttemptOutcome::Fatal(_) => {
                self.failures = self.failures.saturating_add(1);
                self.fatal_errors = self.fatal_errors.saturating_add(1);
            }
            // Exhausted conflicts are final failures; the conflict itself was
            // already counted above.
            AttemptOutcome::LockConflict | AttemptOutcome::SerializationConflict => {
                self.failures = self.failures.saturating_add(1);
            }
        }
    }

    /// Requesters folded in so far.
    #[must_use]
    pub fn completed(&self) -> u32 {
        self.successes + self.failures
    }

    /// Mean per-requester latency, zero for an empty run.
    #[must_use]
    pub fn average_latency(&self) -> Duration {
        if self.latencies.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.latencies.iter().sum();
        #[allow(clippy::cast_possible_truncation)] // population is clamped far below u32::MAX
        let count = self.latencies.len() as u32;
        total / count
    }

    /// Latency at quantile `q` in `[0, 1]` (nearest rank).
    #[must_use]
    pub fn latency_percentile(&self, q: f64) -> Option<Duration> {
        if self.latencies.is_empty() {
            return None;
        }
        let mut sorted = self.latencies.clone();
        sorted.sort_unstable();
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let rank = (q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64).round() as usize;
        sorted.get(rank).copied()
    }

    /// Longest per-requester latency.
    #[must_use]
    pub fn max_latency(&self) -> Option<Duration> {
        self.latencies.iter().max().copied()
    }

    /// Fraction of requesters that got a seat.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        match self.completed() {
            0 => 0.0,
            n => f64::from(self.successes) / f64::from(n),
        }
    }
}
