//! # Seat Arbiter Core
//!
//! Domain types and the store seam for arbitrating exclusive seat ownership
//! among concurrent requesters.
//!
//! ## Core Concepts
//!
//! - **Event / Seat / Reservation**: the inventory being contended for
//! - **`IsolationLevel`**: transaction isolation chosen per simulation run
//! - **`InventoryStore`**: transactional seam (fail-fast lock, lock-skip,
//!   idempotent insert) implemented by the Postgres adapter and the in-memory
//!   test store
//! - **`AttemptOutcome`**: terminal result of one arbitration attempt
//! - **`RunStatistics`**: aggregate of one simulation run
//!
//! ## Invariant
//!
//! At most one reservation per seat. The core never enforces this with an
//! in-process lock; it is delegated to the store's locking and conflict
//! semantics.
//!
//! ## Example
//!
//! ```
//! use seat_arbiter_core::outcome::AttemptOutcome;
//! use seat_arbiter_core::inventory::StoreError;
//!
//! let outcome = AttemptOutcome::from_store_error(StoreError::lock_not_available("row locked"));
//! assert!(outcome.is_transient());
//! ```

// Re-export commonly used types
pub use chrono::NaiveDate;

/// Identifiers, entities and isolation levels
pub mod types;

/// Transactional store seam and structured store errors
pub mod inventory;

/// Terminal outcome of one arbitration attempt
pub mod outcome;

/// Aggregate statistics of one simulation run
pub mod stats;

pub use inventory::{
    InventoryAdmin, InventoryStore, InventoryTransaction, SeatLockPolicy, StoreError, StoreErrorKind,
    StoreFuture,
};
pub use outcome::{AttemptOutcome, OutcomeClass, OutcomeKind};
pub use stats::{AttemptRecord, RunStatistics};
pub use types::{
    Event, EventId, IsolationLevel, Reservation, ReservationId, Seat, SeatId, SeatNumber, UserId,
};
