//! Terminal result of one arbitration attempt.

use crate::inventory::{StoreError, StoreErrorKind};
use crate::types::SeatId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of running the seat-acquisition protocol once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The requester now owns the seat.
    Reserved(SeatId),
    /// No seat to take: unknown seat number, nothing available, or the
    /// idempotent insert affected zero rows.
    SeatUnavailable,
    /// The targeted seat row was locked by another in-flight attempt.
    LockConflict,
    /// The store could not serialize this transaction against a concurrent one.
    SerializationConflict,
    /// The requester does not exist.
    RequesterInvalid,
    /// Any other store failure. Never retried.
    Fatal(StoreError),
}

/// Retry classification of an [`AttemptOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeClass {
    /// Contention that a later attempt may not see.
    Transient,
    /// Final answer for this requester.
    Terminal,
}

impl AttemptOutcome {
    /// Map a store error onto an outcome using its structured kind.
    #[must_use]
    pub fn from_store_error(err: StoreError) -> Self {
        match err.kind {
            StoreErrorKind::LockNotAvailable => Self::LockConflict,
            StoreErrorKind::SerializationFailure | StoreErrorKind::Deadlock => Self::SerializationConflict,
            StoreErrorKind::UniqueViolation
            | StoreErrorKind::Connection
            | StoreErrorKind::Timeout
            | StoreErrorKind::Database => Self::Fatal(err),
        }
    }

    /// Transient outcomes are retried; terminal ones end the requester's run.
    #[must_use]
    pub const fn class(&self) -> OutcomeClass {
        match self {
            Self::LockConflict | Self::SerializationConflict => OutcomeClass::Transient,
            Self::Reserved(_) | Self::SeatUnavailable | Self::RequesterInvalid | Self::Fatal(_) => {
                OutcomeClass::Terminal
            }
        }
    }

    /// Whether the outcome should be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.class(), OutcomeClass::Transient)
    }

    /// Whether the requester got a seat.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Reserved(_))
    }

    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> OutcomeKind {
        match self {
            Self::Reserved(_) => OutcomeKind::Reserved,
            Self::SeatUnavailable => OutcomeKind::SeatUnavailable,
            Self::LockConflict => OutcomeKind::LockConflict,
            Self::SerializationConflict => OutcomeKind::SerializationConflict,
            Self::RequesterInvalid => OutcomeKind::RequesterInvalid,
            Self::Fatal(_) => OutcomeKind::Fatal,
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reserved(seat) => write!(f, "reserved seat {seat}"),
            Self::Fatal(err) => write!(f, "fatal: {err}"),
            other => f.write_str(other.kind().as_str()),
        }
    }
}

/// Payload-free tag of an [`AttemptOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// See [`AttemptOutcome::Reserved`]
    Reserved,
    /// See [`AttemptOutcome::SeatUnavailable`]
    SeatUnavailable,
    /// See [`AttemptOutcome::LockConflict`]
    LockConflict,
    /// See [`AttemptOutcome::SerializationConflict`]
    SerializationConflict,
    /// See [`AttemptOutcome::RequesterInvalid`]
    RequesterInvalid,
    /// See [`AttemptOutcome::Fatal`]
    Fatal,
}

impl OutcomeKind {
    /// Stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reserved => "reserved",
            Self::SeatUnavailable => "seat_unavailable",
            Self::LockConflict => "lock_conflict",
            Self::SerializationConflict => "serialization_conflict",
            Self::RequesterInvalid => "requester_invalid",
            Self::Fatal => "fatal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_by_kind() {
        assert_eq!(
            AttemptOutcome::from_store_error(StoreError::lock_not_available("x")),
            AttemptOutcome::LockConflict
        );
        assert_eq!(
            AttemptOutcome::from_store_error(StoreError::serialization_failure("x")),
            AttemptOutcome::SerializationConflict
        );
        assert_eq!(
            AttemptOutcome::from_store_error(StoreError::new(StoreErrorKind::Deadlock, "x")),
            AttemptOutcome::SerializationConflict
        );
        let fatal = StoreError::new(StoreErrorKind::Connection, "connection reset");
        assert_eq!(
            AttemptOutcome::from_store_error(fatal.clone()),
            AttemptOutcome::Fatal(fatal)
        );
    }

    #[test]
    fn only_conflicts_are_transient() {
        assert!(AttemptOutcome::LockConflict.is_transient());
        assert!(AttemptOutcome::SerializationConflict.is_transient());
        assert!(!AttemptOutcome::Reserved(SeatId::new(1)).is_transient());
        assert!(!AttemptOutcome::SeatUnavailable.is_transient());
        assert!(!AttemptOutcome::RequesterInvalid.is_transient());
        assert!(!AttemptOutcome::Fatal(StoreError::database("boom")).is_transient());
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(AttemptOutcome::Reserved(SeatId::new(7)).to_string(), "reserved seat 7");
        assert_eq!(AttemptOutcome::LockConflict.to_string(), "lock_conflict");
    }
}
