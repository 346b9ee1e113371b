//! # Seat Arbiter Runtime
//!
//! Arbitration, retry and simulation on top of the
//! [`InventoryStore`](seat_arbiter_core::InventoryStore) seam.
//!
//! ## Core Components
//!
//! - **`ReservationArbiter`**: runs the seat-acquisition protocol once per call
//! - **`RetryPolicy`**: bounded retry of lock and serialization conflicts
//! - **`SimulationDriver`**: launches N concurrent requesters and aggregates
//!   their outcomes into `RunStatistics`
//! - **Reporting**: CSV run log and the comparative table across runs
//!
//! ## Example
//!
//! ```ignore
//! use seat_arbiter_runtime::{RunParameters, SeatStrategy, SimulationDriver};
//! use seat_arbiter_core::{EventId, IsolationLevel, SeatNumber};
//!
//! let driver = SimulationDriver::new(store);
//! let params = RunParameters::new(
//!     20,
//!     EventId::new(1),
//!     IsolationLevel::Serializable,
//!     SeatStrategy::FixedTarget { seat: SeatNumber::new(10) },
//! );
//! let stats = driver.run(&params).await?;
//! assert_eq!(stats.successes, 1);
//! ```

/// Seat-acquisition protocol
pub mod arbiter;

/// Retry logic with optional exponential backoff and jitter
pub mod retry;

/// Seat targeting strategies
pub mod strategy;

/// Concurrent requester launch and aggregation
pub mod driver;

/// Run summaries, CSV run log and comparative table
pub mod report;

/// Prometheus metrics for observability
pub mod metrics;

pub use arbiter::{AttemptRequest, ReservationArbiter};
pub use driver::{DriverError, RunParameters, RunRecord, SimulationDriver, Sweep};
pub use report::{ComparisonRow, ComparisonTable, ReportError, RunLog, RunSummary, render_run};
pub use retry::{RetryPolicy, RetryPolicyBuilder, RetryReport, attempt_with_retry, retry_outcome};
pub use strategy::{SeatStrategy, StrategyError, Target, validate_weight};
