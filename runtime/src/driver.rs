//! Concurrency simulation driver.
//!
//! A run launches one tokio task per simulated requester against the same
//! event and isolation level. Each task runs the arbiter under the retry
//! policy, times the whole execution and sends an [`AttemptRecord`] back over
//! a channel. The driver is the only owner of [`RunStatistics`] and folds
//! records in as they arrive, so workers never share mutable state.
//!
//! ```text
//!   requester 1 ─┐
//!   requester 2 ─┼── mpsc ──▶ driver ──▶ RunStatistics
//!   requester N ─┘
//! ```
//!
//! A run completes once every requester has a terminal outcome. There is no
//! run-level timeout: one stuck store call stalls completion.

use crate::arbiter::{AttemptRequest, ReservationArbiter};
use crate::metrics::SimulationMetrics;
use crate::retry::{attempt_with_retry, retry_outcome, RetryPolicy, RetryReport};
use crate::strategy::{SeatStrategy, StrategyError, Target};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use seat_arbiter_core::{
    AttemptOutcome, AttemptRecord, EventId, InventoryAdmin, InventoryStore, IsolationLevel, RunStatistics,
    StoreError, UserId,
};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Errors that abort a whole run.
///
/// Per-requester failures never show up here; they are outcomes.
#[derive(Error, Debug)]
pub enum DriverError {
    /// A requester task panicked or was cancelled.
    #[error("requester {requester} task failed: {reason}")]
    WorkerFailed {
        /// The requester whose task died
        requester: UserId,
        /// Join error text
        reason: String,
    },

    /// Setup or reset through the admin seam failed.
    #[error("store error during run setup: {0}")]
    Store(#[from] StoreError),

    /// The seat strategy has unusable parameters.
    #[error("invalid strategy: {0}")]
    Strategy(#[from] StrategyError),

    /// The sweep was given nothing to run.
    #[error("invalid sweep: {0}")]
    InvalidSweep(String),
}

/// Parameters of one run.
#[derive(Debug, Clone)]
pub struct RunParameters {
    /// Number of concurrent requesters (ids `1..=population`)
    pub population: u32,
    /// Event every requester contends for
    pub event_id: EventId,
    /// Isolation level of every attempt
    pub isolation: IsolationLevel,
    /// Seat targeting
    pub strategy: SeatStrategy,
    /// Retry policy for transient outcomes
    pub retry: RetryPolicy,
    /// Seed for target resolution; `None` draws one from entropy
    pub seed: Option<u64>,
}

impl RunParameters {
    /// Parameters with the default retry policy and no seed.
    #[must_use]
    pub fn new(population: u32, event_id: EventId, isolation: IsolationLevel, strategy: SeatStrategy) -> Self {
        Self {
            population,
            event_id,
            isolation,
            strategy,
            retry: RetryPolicy::default(),
            seed: None,
        }
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fix the targeting seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Launches concurrent requesters and aggregates their outcomes.
#[derive(Clone)]
pub struct SimulationDriver {
    arbiter: ReservationArbiter,
}

impl SimulationDriver {
    /// Create a driver over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self {
            arbiter: ReservationArbiter::new(store),
        }
    }

    /// The arbiter every requester runs.
    #[must_use]
    pub const fn arbiter(&self) -> &ReservationArbiter {
        &self.arbiter
    }

    /// Run one simulation to completion.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Strategy`] before launching anything if the
    /// strategy's parameters are unusable, and [`DriverError::WorkerFailed`]
    /// if a requester task panicked. Every other failure is an outcome folded
    /// into the statistics.
    pub async fn run(&self, params: &RunParameters) -> Result<RunStatistics, DriverError> {
        let mut rng = params
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let targets = params.strategy.plan(&mut rng, params.population)?;

        info!(
            event_id = %params.event_id,
            isolation = %params.isolation,
            population = params.population,
            strategy = %params.strategy,
            "Starting simulation run"
        );

        let started = Instant::now();
        let (sender, mut receiver) = mpsc::unbounded_channel::<AttemptRecord>();
        let mut workers = Vec::with_capacity(targets.len());

        for (index, target) in targets.into_iter().enumerate() {
            #[allow(clippy::cast_possible_wrap)] // population is a u32
            let requester = UserId::new(index as i64 + 1);
            let request = AttemptRequest {
                requester,
                event_id: params.event_id,
                target_seat: None,
                isolation: params.isolation,
            };
            let arbiter = self.arbiter.clone();
            let policy = params.retry.clone();
            let sender = sender.clone();

            let handle = tokio::spawn(async move {
                let record = run_requester(&arbiter, request, target, &policy).await;
                if sender.send(record).is_err() {
                    warn!(requester = %requester, "Driver stopped listening before requester finished");
                }
            });
            workers.push((requester, handle));
        }
        drop(sender);

        let mut stats = RunStatistics::new(params.event_id, params.isolation, params.population);
        while let Some(record) = receiver.recv().await {
            stats.record(&record);
        }

        for (requester, handle) in workers {
            if let Err(join_error) = handle.await {
                error!(requester = %requester, error = %join_error, "Requester task failed");
                return Err(DriverError::WorkerFailed {
                    requester,
                    reason: join_error.to_string(),
                });
            }
        }

        stats.elapsed = started.elapsed();
        SimulationMetrics::record_run(params.isolation);
        info!(
            event_id = %params.event_id,
            isolation = %params.isolation,
            successes = stats.successes,
            failures = stats.failures,
            lock_conflicts = stats.lock_conflicts,
            serialization_conflicts = stats.serialization_conflicts,
            elapsed_ms = stats.elapsed.as_millis(),
            "Simulation run finished"
        );
        Ok(stats)
    }
}

/// One requester: resolve its target, run the retry loop, time it.
async fn run_requester(
    arbiter: &ReservationArbiter,
    request: AttemptRequest,
    target: Target,
    policy: &RetryPolicy,
) -> AttemptRecord {
    let started = Instant::now();

    let report = match target {
        Target::Seat(seat) => {
            let request = AttemptRequest {
                target_seat: Some(seat),
                ..request
            };
            attempt_with_retry(arbiter, &request, policy).await
        }
        Target::AnyAvailable => attempt_with_retry(arbiter, &request, policy).await,
        Target::PreRead { seed } => pre_read_with_retry(arbiter, request, seed, policy).await,
    };

    let latency = started.elapsed();
    SimulationMetrics::record_requester(latency);

    AttemptRecord {
        requester: request.requester,
        outcome: report.outcome,
        attempts: report.attempts,
        lock_conflicts: report.lock_conflicts,
        serialization_conflicts: report.serialization_conflicts,
        exhausted: report.exhausted,
        latency,
    }
}

/// Every attempt re-reads the available seats, picks one and targets it
/// fail-fast. An empty read ends the requester without opening a transaction.
async fn pre_read_with_retry(
    arbiter: &ReservationArbiter,
    request: AttemptRequest,
    seed: u64,
    policy: &RetryPolicy,
) -> RetryReport {
    let mut rng = StdRng::seed_from_u64(seed);
    retry_outcome(policy, |_| {
        let pick: usize = rng.r#gen();
        async move {
            let seats = match arbiter.store().available_seats(request.event_id).await {
                Ok(seats) => seats,
                Err(err) => return AttemptOutcome::Fatal(err),
            };
            if seats.is_empty() {
                return AttemptOutcome::SeatUnavailable;
            }
            let seat = seats[pick % seats.len()];
            let request = AttemptRequest {
                target_seat: Some(seat.seat_number),
                ..request
            };
            arbiter.attempt(&request).await
        }
    })
    .await
}

/// A sequence of runs over every combination of isolation level, population
/// and strategy, in that nesting order.
#[derive(Debug, Clone)]
pub struct Sweep {
    /// Event every run contends for
    pub event_id: EventId,
    /// Isolation levels to compare
    pub isolations: Vec<IsolationLevel>,
    /// Population sizes to compare
    pub populations: Vec<u32>,
    /// Targeting strategies to compare
    pub strategies: Vec<SeatStrategy>,
    /// Retry policy shared by all runs
    pub retry: RetryPolicy,
    /// Base seed; run `i` uses `seed + i`
    pub seed: Option<u64>,
}

/// Result of one run within a sweep.
#[derive(Debug, Clone)]
pub struct RunRecord {
    /// Strategy label of the run
    pub strategy: String,
    /// The run's statistics
    pub stats: RunStatistics,
}

impl Sweep {
    /// Run every combination in order.
    ///
    /// Before each run the event's reservations are cleared, so every run
    /// starts from the same inventory. Requesters `1..=max population` are
    /// created first.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidSweep`] for an empty dimension, a store
    /// error from setup or reset, or the first run-level failure.
    pub async fn run(
        &self,
        driver: &SimulationDriver,
        admin: &dyn InventoryAdmin,
    ) -> Result<Vec<RunRecord>, DriverError> {
        if self.isolations.is_empty() || self.populations.is_empty() || self.strategies.is_empty() {
            return Err(DriverError::InvalidSweep(
                "isolation levels, populations and strategies must all be non-empty".to_string(),
            ));
        }

        for strategy in &self.strategies {
            strategy.validate()?;
        }

        let max_population = self.populations.iter().copied().max().unwrap_or_default();
        admin.ensure_users(max_population).await?;

        let mut records = Vec::new();
        let mut run_index: u64 = 0;
        for &isolation in &self.isolations {
            for &population in &self.populations {
                for strategy in &self.strategies {
                    let cleared = admin.clear_reservations(self.event_id).await?;
                    tracing::debug!(event_id = %self.event_id, cleared, "Reservations reset before run");

                    let mut params = RunParameters::new(population, self.event_id, isolation, strategy.clone())
                        .with_retry(self.retry.clone());
                    if let Some(seed) = self.seed {
                        params = params.with_seed(seed.wrapping_add(run_index));
                    }
                    let stats = driver.run(&params).await?;
                    records.push(RunRecord {
                        strategy: strategy.label(),
                        stats,
                    });
                    run_index += 1;
                }
            }
        }
        Ok(records)
    }
}
