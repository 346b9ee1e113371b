//! Domain types shared by every crate in the workspace.
//!
//! Identifiers are thin newtypes over the store's `BIGINT` keys so that an
//! event id can never be passed where a seat id is expected.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Wrap a raw store key.
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// The raw store key.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(
    /// Identifier of an [`Event`].
    EventId
);
id_newtype!(
    /// Identifier of a [`Seat`] row (not its human-facing number).
    SeatId
);
id_newtype!(
    /// Identifier of a [`Reservation`].
    ReservationId
);
id_newtype!(
    /// Identifier of a requester (user).
    UserId
);

/// Human-facing seat number, unique within one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatNumber(pub i32);

impl SeatNumber {
    /// Create a seat number.
    #[must_use]
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// The raw number.
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for SeatNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An event whose seats are being contended for.
///
/// Immutable for the duration of a simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Store key
    pub id: EventId,
    /// Display name
    pub name: String,
    /// Date the event takes place
    pub date: NaiveDate,
    /// Venue
    pub location: String,
}

/// A seat belonging to exactly one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Seat {
    /// Store key
    pub id: SeatId,
    /// Owning event
    pub event_id: EventId,
    /// Number printed on the ticket
    pub seat_number: SeatNumber,
}

/// Exclusive claim of one seat by one requester.
///
/// At most one reservation exists per seat. That uniqueness is the invariant
/// the whole arbitration protocol enforces under concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reservation {
    /// Store key
    pub id: ReservationId,
    /// Reserved seat
    pub seat_id: SeatId,
    /// Owner
    pub user_id: UserId,
}

/// Transaction isolation level used for one arbitration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Each statement sees data committed before it began.
    ReadCommitted,
    /// The whole transaction sees one snapshot; concurrent updates abort it.
    RepeatableRead,
    /// Snapshot isolation plus detection of serialization anomalies.
    Serializable,
}

impl IsolationLevel {
    /// All levels in increasing strength.
    pub const ALL: [Self; 3] = [Self::ReadCommitted, Self::RepeatableRead, Self::Serializable];

    /// SQL spelling, as used in `SET TRANSACTION ISOLATION LEVEL`.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }

    /// Whether the level works from a single transaction-wide snapshot.
    #[must_use]
    pub const fn uses_snapshot(self) -> bool {
        !matches!(self, Self::ReadCommitted)
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Error returned when an isolation level name is not recognised.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown isolation level: {0}")]
pub struct ParseIsolationLevelError(String);

impl FromStr for IsolationLevel {
    type Err = ParseIsolationLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        match normalized.as_str() {
            "read committed" | "rc" => Ok(Self::ReadCommitted),
            "repeatable read" | "rr" => Ok(Self::RepeatableRead),
            "serializable" | "ser" => Ok(Self::Serializable),
            _ => Err(ParseIsolationLevelError(s.to_string())),
        }
    }
}
