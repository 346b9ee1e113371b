//! The reservation arbiter: one seat-acquisition protocol execution per call.
//!
//! # Protocol
//!
//! Everything happens inside a single store transaction opened at the
//! requested isolation level:
//!
//! 1. Requester must exist, otherwise `RequesterInvalid`.
//! 2. Seat selection. A targeted seat is locked fail-fast so contention
//!    surfaces as `LockConflict` instead of a queue; without a target, one
//!    random unreserved seat is taken with lock-skip so random requesters never
//!    serialize on one row.
//! 3. No seat: `SeatUnavailable`.
//! 4. Idempotent insert. Zero rows means someone else got there first
//!    (`SeatUnavailable`); one row commits and yields `Reserved`.
//! 5. Store failures are classified by their structured kind.
//!
//! Exactly one commit or rollback happens per call.

use crate::metrics::ArbiterMetrics;
use seat_arbiter_core::{
    AttemptOutcome, EventId, InventoryStore, InventoryTransaction, IsolationLevel, SeatId, SeatLockPolicy,
    SeatNumber, StoreError, UserId,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Input of one arbitration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptRequest {
    /// Who wants a seat
    pub requester: UserId,
    /// Which event
    pub event_id: EventId,
    /// Specific seat wanted, or `None` for any available seat
    pub target_seat: Option<SeatNumber>,
    /// Isolation level of the attempt's transaction
    pub isolation: IsolationLevel,
}

impl AttemptRequest {
    /// Lock policy implied by the presence of a target seat.
    #[must_use]
    pub const fn lock_policy(&self) -> SeatLockPolicy {
        match self.target_seat {
            Some(_) => SeatLockPolicy::FailFast,
            None => SeatLockPolicy::SkipLocked,
        }
    }
}

/// What the in-transaction part of the protocol decided.
enum Decision {
    /// Reservation row inserted; commit to make it stick.
    Claim(SeatId),
    /// Nothing to keep; roll back and report the outcome.
    Abandon(AttemptOutcome),
}

/// Runs the seat-acquisition protocol against an [`InventoryStore`].
///
/// Cheap to clone; clones share the store.
#[derive(Clone)]
pub struct ReservationArbiter {
    store: Arc<dyn InventoryStore>,
}

impl ReservationArbiter {
    /// Create an arbiter over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn InventoryStore> {
        &self.store
    }

    /// Run the protocol once and return its terminal outcome.
    pub async fn attempt(&self, request: &AttemptRequest) -> AttemptOutcome {
        let started = Instant::now();

        let outcome = match self.store.begin(request.isolation).await {
            Ok(tx) => Self::run_in_transaction(tx, request).await,
            Err(err) => AttemptOutcome::from_store_error(err),
        };

        ArbiterMetrics::record_attempt(&outcome, started.elapsed());
        match &outcome {
            AttemptOutcome::Fatal(err) => warn!(
                requester = %request.requester,
                event_id = %request.event_id,
                isolation = %request.isolation,
                error = %err,
                "Arbitration attempt failed"
            ),
            other => debug!(
                requester = %request.requester,
                event_id = %request.event_id,
                isolation = %request.isolation,
                target_seat = ?request.target_seat.map(SeatNumber::get),
                outcome = %other,
                "Arbitration attempt finished"
            ),
        }
        outcome
    }

    async fn run_in_transaction(
        mut tx: Box<dyn InventoryTransaction>,
        request: &AttemptRequest,
    ) -> AttemptOutcome {
        match Self::decide(tx.as_mut(), request).await {
            Ok(Decision::Claim(seat_id)) => match tx.commit().await {
                Ok(()) => AttemptOutcome::Reserved(seat_id),
                // Commit-time SSI aborts land here as serialization conflicts.
                Err(err) => AttemptOutcome::from_store_error(err),
            },
            Ok(Decision::Abandon(outcome)) => {
                Self::rollback(tx, request).await;
                outcome
            }
            Err(err) => {
                Self::rollback(tx, request).await;
                AttemptOutcome::from_store_error(err)
            }
        }
    }

    async fn decide(
        tx: &mut dyn InventoryTransaction,
        request: &AttemptRequest,
    ) -> Result<Decision, StoreError> {
        if !tx.requester_exists(request.requester).await? {
            return Ok(Decision::Abandon(AttemptOutcome::RequesterInvalid));
        }

        let seat = match request.target_seat {
            Some(seat_number) => tx.lock_seat(request.event_id, seat_number).await?,
            None => tx.lock_random_available_seat(request.event_id).await?,
        };
        let Some(seat) = seat else {
            return Ok(Decision::Abandon(AttemptOutcome::SeatUnavailable));
        };

        match tx.insert_reservation(request.requester, seat.id).await? {
            Some(_) => Ok(Decision::Claim(seat.id)),
            None => Ok(Decision::Abandon(AttemptOutcome::SeatUnavailable)),
        }
    }

    async fn rollback(tx: Box<dyn InventoryTransaction>, request: &AttemptRequest) {
        // The outcome is already decided and nothing was committed.
        if let Err(err) = tx.rollback().await {
            warn!(
                requester = %request.requester,
                error = %err,
                "Rollback failed"
            );
        }
    }
}
