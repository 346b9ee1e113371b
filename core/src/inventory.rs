//! Inventory store abstraction: the transactional seam the arbiter runs against.
//!
//! # Design
//!
//! The arbiter never talks SQL. It opens an [`InventoryTransaction`] at a chosen
//! [`IsolationLevel`] and drives the seat-acquisition protocol through a handful
//! of operations:
//!
//! - requester existence check
//! - seat lock, either [`SeatLockPolicy::FailFast`] (targeted seat) or
//!   [`SeatLockPolicy::SkipLocked`] (random available seat)
//! - idempotent reservation insert (`Ok(None)` when the seat is already taken)
//! - commit / rollback
//!
//! Conflicts are reported as a structured [`StoreErrorKind`]. Adapters map their
//! engine's native error codes onto these kinds so callers never match on
//! error text.
//!
//! # Implementations
//!
//! - `PostgresInventoryStore` (in `seat-arbiter-postgres`): production store
//! - `InMemoryInventoryStore` (in `seat-arbiter-testing`): deterministic emulation
//!
//! # Dyn Compatibility
//!
//! Methods return boxed futures instead of using `async fn` so the store can be
//! shared as `Arc<dyn InventoryStore>` across spawned requester tasks.

use crate::types::{Event, EventId, IsolationLevel, Reservation, ReservationId, Seat, SeatId, SeatNumber, UserId};
use chrono::NaiveDate;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by every store operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Structured category of a store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// A row lock could not be acquired without waiting.
    LockNotAvailable,
    /// The transaction could not be serialized against a concurrent one.
    SerializationFailure,
    /// The engine aborted the transaction to break a lock cycle.
    Deadlock,
    /// A uniqueness constraint rejected a plain insert.
    UniqueViolation,
    /// The connection was lost or could not be established.
    Connection,
    /// A pool acquire or statement timed out.
    Timeout,
    /// Any other engine-level failure.
    Database,
}

impl StoreErrorKind {
    /// Whether a fresh attempt of the same work may succeed.
    #[must_use]
    pub const fn is_contention(self) -> bool {
        matches!(self, Self::LockNotAvailable | Self::SerializationFailure | Self::Deadlock)
    }

    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LockNotAvailable => "lock_not_available",
            Self::SerializationFailure => "serialization_failure",
            Self::Deadlock => "deadlock",
            Self::UniqueViolation => "unique_violation",
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::Database => "database",
        }
    }
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by an inventory store operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct StoreError {
    /// Structured category used for outcome classification.
    pub kind: StoreErrorKind,
    /// Human-readable detail from the engine.
    pub message: String,
}

impl StoreError {
    /// Create an error of the given kind.
    #[must_use]
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a [`StoreErrorKind::LockNotAvailable`] error.
    #[must_use]
    pub fn lock_not_available(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::LockNotAvailable, message)
    }

    /// Shorthand for a [`StoreErrorKind::SerializationFailure`] error.
    #[must_use]
    pub fn serialization_failure(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::SerializationFailure, message)
    }

    /// Shorthand for a [`StoreErrorKind::Database`] error.
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Database, message)
    }
}

/// How a seat row is locked during selection.
///
/// The two policies stay distinct on purpose: the simulation compares their
/// contention behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeatLockPolicy {
    /// Exclusive lock that fails immediately if another transaction holds it
    /// (`FOR UPDATE NOWAIT`). Used when a specific seat is targeted.
    FailFast,
    /// Exclusive lock that skips rows held by others and takes the next
    /// candidate (`FOR UPDATE SKIP LOCKED`). Used for random assignment.
    SkipLocked,
}

impl SeatLockPolicy {
    /// Locking clause appended to the selecting statement.
    #[must_use]
    pub const fn sql_clause(self) -> &'static str {
        match self {
            Self::FailFast => "FOR UPDATE NOWAIT",
            Self::SkipLocked => "FOR UPDATE SKIP LOCKED",
        }
    }
}

/// One open store transaction.
///
/// Dropping a transaction without calling [`commit`](Self::commit) rolls it back.
pub trait InventoryTransaction: Send {
    /// Check that the requester exists.
    fn requester_exists(&mut self, user_id: UserId) -> StoreFuture<'_, bool>;

    /// Select the seat with `seat_number` in `event_id` under a
    /// [`SeatLockPolicy::FailFast`] lock.
    ///
    /// Returns `Ok(None)` if no such seat exists. Returns a
    /// [`StoreErrorKind::LockNotAvailable`] error if the row is already locked.
    fn lock_seat(&mut self, event_id: EventId, seat_number: SeatNumber) -> StoreFuture<'_, Option<Seat>>;

    /// Select one seat uniformly at random among the event's unreserved seats
    /// under a [`SeatLockPolicy::SkipLocked`] lock.
    ///
    /// Returns `Ok(None)` if every unreserved seat is gone or locked.
    fn lock_random_available_seat(&mut self, event_id: EventId) -> StoreFuture<'_, Option<Seat>>;

    /// Insert a reservation unless one already exists for the seat.
    ///
    /// Returns `Ok(None)` when the insert affected zero rows.
    fn insert_reservation(&mut self, user_id: UserId, seat_id: SeatId) -> StoreFuture<'_, Option<ReservationId>>;

    /// Commit the transaction.
    fn commit(self: Box<Self>) -> StoreFuture<'static, ()>;

    /// Roll the transaction back.
    fn rollback(self: Box<Self>) -> StoreFuture<'static, ()>;
}

/// Transactional access to seat and reservation state.
pub trait InventoryStore: Send + Sync {
    /// Open a transaction at the given isolation level.
    fn begin(&self, isolation: IsolationLevel) -> StoreFuture<'_, Box<dyn InventoryTransaction>>;

    /// Non-locking read of the event's unreserved seats, ordered by seat number.
    fn available_seats(&self, event_id: EventId) -> StoreFuture<'_, Vec<Seat>>;
}

/// Catalog and bookkeeping operations used to set up and verify simulations.
///
/// These run outside the arbitration protocol, each in its own transaction.
pub trait InventoryAdmin: Send + Sync {
    /// Create an event and return its id.
    fn create_event(&self, name: &str, date: NaiveDate, location: &str) -> StoreFuture<'_, EventId>;

    /// All events ordered by id.
    fn list_events(&self) -> StoreFuture<'_, Vec<Event>>;

    /// Look up one event.
    fn find_event(&self, event_id: EventId) -> StoreFuture<'_, Option<Event>>;

    /// Add `count` seats to the event, numbered after the highest existing number.
    fn add_seats(&self, event_id: EventId, count: u32) -> StoreFuture<'_, Vec<Seat>>;

    /// Make sure requesters `1..=count` exist.
    fn ensure_users(&self, count: u32) -> StoreFuture<'_, ()>;

    /// Number of the event's seats without a reservation.
    fn available_seat_count(&self, event_id: EventId) -> StoreFuture<'_, u64>;

    /// All reservations on the event's seats.
    fn reservations_for_event(&self, event_id: EventId) -> StoreFuture<'_, Vec<Reservation>>;

    /// Plain reservation insert.
    ///
    /// A seat that is already reserved yields [`StoreErrorKind::UniqueViolation`].
    fn create_reservation(&self, user_id: UserId, seat_id: SeatId) -> StoreFuture<'_, ReservationId>;

    /// Delete a reservation. Returns whether a row was removed.
    fn cancel_reservation(&self, reservation_id: ReservationId) -> StoreFuture<'_, bool>;

    /// Delete every reservation on the event's seats. Returns the number removed.
    fn clear_reservations(&self, event_id: EventId) -> StoreFuture<'_, u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contention_kinds_are_the_retryable_ones() {
        assert!(StoreErrorKind::LockNotAvailable.is_contention());
        assert!(StoreErrorKind::SerializationFailure.is_contention());
        assert!(StoreErrorKind::Deadlock.is_contention());
        assert!(!StoreErrorKind::UniqueViolation.is_contention());
        assert!(!StoreErrorKind::Connection.is_contention());
        assert!(!StoreErrorKind::Database.is_contention());
    }

    #[test]
    fn store_error_display_includes_kind() {
        let err = StoreError::lock_not_available("could not obtain lock on row");
        assert_eq!(err.to_string(), "lock_not_available: could not obtain lock on row");
    }

    #[test]
    fn lock_policies_render_distinct_clauses() {
        assert_eq!(SeatLockPolicy::FailFast.sql_clause(), "FOR UPDATE NOWAIT");
        assert_eq!(SeatLockPolicy::SkipLocked.sql_clause(), "FOR UPDATE SKIP LOCKED");
    }
}
