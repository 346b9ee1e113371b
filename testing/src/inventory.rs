//! In-memory inventory store for fast, deterministic arbitration tests.
//!
//! [`InMemoryInventoryStore`] emulates the parts of Postgres behaviour the
//! arbiter depends on:
//!
//! - row locks held until commit or rollback, with fail-fast (`NOWAIT`) and
//!   lock-skip (`SKIP LOCKED`) acquisition
//! - a unique reservation per seat, with `ON CONFLICT DO NOTHING` inserts
//! - snapshot visibility for `REPEATABLE READ` and `SERIALIZABLE`: inserting
//!   over a reservation committed after the snapshot raises a serialization
//!   failure instead of returning zero rows
//!
//! Faults can be injected at each protocol step to exercise retry and error
//! classification paths.
//!
//! An insert racing another transaction's uncommitted insert on the same seat
//! would block in Postgres; here it fails fast with a lock conflict. The
//! arbiter always locks the seat first, so it never reaches that path.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned mutex

use rand::seq::SliceRandom;
use seat_arbiter_core::{
    Event, EventId, InventoryAdmin, InventoryStore, InventoryTransaction, IsolationLevel, NaiveDate,
    Reservation, ReservationId, Seat, SeatId, SeatNumber, StoreError, StoreErrorKind, StoreFuture, UserId,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Protocol step at which an injected fault fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// Opening a transaction
    Begin,
    /// Either seat lock operation
    Lock,
    /// Reservation insert
    Insert,
    /// Commit
    Commit,
}

#[derive(Debug, Clone, Copy)]
struct CommittedReservation {
    id: ReservationId,
    user_id: UserId,
    commit_seq: u64,
}

#[derive(Debug, Default)]
struct State {
    events: BTreeMap<EventId, Event>,
    seats: BTreeMap<SeatId, Seat>,
    users: BTreeSet<UserId>,
    reservations: BTreeMap<SeatId, CommittedReservation>,
    // seat -> transaction holding its row lock
    locks: HashMap<SeatId, u64>,
    // seat -> transaction with an uncommitted insert
    pending: HashMap<SeatId, u64>,
    faults: Vec<(FaultPoint, StoreErrorKind, u32)>,
    commit_seq: u64,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn take_fault(&mut self, point: FaultPoint) -> Result<(), StoreError> {
        let Some(fault) = self
            .faults
            .iter_mut()
            .find(|(at, _, remaining)| *at == point && *remaining > 0)
        else {
            return Ok(());
        };
        fault.2 -= 1;
        Err(StoreError::new(fault.1, format!("injected fault at {point:?}")))
    }

    fn seat_by_number(&self, event_id: EventId, seat_number: SeatNumber) -> Option<Seat> {
        self.seats
            .values()
            .find(|s| s.event_id == event_id && s.seat_number == seat_number)
            .copied()
    }

    fn event_seats(&self, event_id: EventId) -> impl Iterator<Item = &Seat> {
        self.seats.values().filter(move |s| s.event_id == event_id)
    }

    fn release(&mut self, tx_id: u64) {
        self.locks.retain(|_, holder| *holder != tx_id);
        self.pending.retain(|_, holder| *holder != tx_id);
    }

    fn available(&self, event_id: EventId) -> Vec<Seat> {
        let mut seats: Vec<Seat> = self
            .event_seats(event_id)
            .filter(|s| !self.reservations.contains_key(&s.id))
            .copied()
            .collect();
        seats.sort_by_key(|s| s.seat_number);
        seats
    }
}

/// In-memory [`InventoryStore`] and [`InventoryAdmin`].
///
/// Cheap to clone; clones share state.
///
/// # Example
///
/// ```
/// use seat_arbiter_testing::InMemoryInventoryStore;
/// use seat_arbiter_core::{InventoryAdmin, NaiveDate};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryInventoryStore::new();
/// let event = store
///     .create_event("Concierto", NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(), "Lima")
///     .await?;
/// store.add_seats(event, 10).await?;
/// assert_eq!(store.available_seat_count(event).await?, 10);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<Mutex<State>>,
    latency: Duration,
    transactions_begun: Arc<AtomicU64>,
    next_tx: Arc<AtomicU64>,
}

impl InMemoryInventoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sleep to every transactional operation, so that locks are held
    /// long enough for concurrent requesters to collide.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make the next `times` operations at `point` fail with `kind`.
    pub fn inject_fault(&self, point: FaultPoint, kind: StoreErrorKind, times: u32) {
        self.state.lock().unwrap().faults.push((point, kind, times));
    }

    /// Drop any faults not yet fired.
    pub fn clear_faults(&self) {
        self.state.lock().unwrap().faults.clear();
    }

    /// Number of transactions opened so far.
    #[must_use]
    pub fn transactions_begun(&self) -> u64 {
        self.transactions_begun.load(Ordering::SeqCst)
    }

    /// Number of row locks currently held. Zero once every transaction ended.
    #[must_use]
    pub fn locks_held(&self) -> usize {
        self.state.lock().unwrap().locks.len()
    }

    /// Committed reservations on the seats of `event_id`.
    #[must_use]
    pub fn reservation_count(&self, event_id: EventId) -> usize {
        let state = self.state.lock().unwrap();
        state
            .event_seats(event_id)
            .filter(|s| state.reservations.contains_key(&s.id))
            .count()
    }

    /// Create an event with `seats` seats numbered `1..=seats` and users
    /// `1..=users`.
    #[must_use]
    pub fn seeded(seats: u32, users: u32) -> (Self, EventId) {
        let store = Self::new();
        let event_id = {
            let mut state = store.state.lock().unwrap();
            let event_id = EventId::new(state.next_id());
            state.events.insert(
                event_id,
                Event {
                    id: event_id,
                    name: "Test Event".to_string(),
                    date: NaiveDate::default(),
                    location: "Test Venue".to_string(),
                },
            );
            for number in 1..=seats {
                let id = SeatId::new(state.next_id());
                #[allow(clippy::cast_possible_wrap)]
                let seat_number = SeatNumber::new(number as i32);
                state.seats.insert(
                    id,
                    Seat {
                        id,
                        event_id,
                        seat_number,
                    },
                );
            }
            state.users.extend((1..=users).map(|u| UserId::new(i64::from(u))));
            event_id
        };
        (store, event_id)
    }

    async fn pause(&self) {
        if self.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl InventoryStore for InMemoryInventoryStore {
    fn begin(&self, isolation: IsolationLevel) -> StoreFuture<'_, Box<dyn InventoryTransaction>> {
        Box::pin(async move {
            self.pause().await;
            let snapshot = {
                let mut state = self.state.lock().unwrap();
                state.take_fault(FaultPoint::Begin)?;
                state.commit_seq
            };
            self.transactions_begun.fetch_add(1, Ordering::SeqCst);
            let tx: Box<dyn InventoryTransaction> = Box::new(InMemoryTransaction {
                store: self.clone(),
                id: self.next_tx.fetch_add(1, Ordering::SeqCst) + 1,
                isolation,
                snapshot,
                pending: None,
            });
            Ok(tx)
        })
    }

    fn available_seats(&self, event_id: EventId) -> StoreFuture<'_, Vec<Seat>> {
        Box::pin(async move {
            self.pause().await;
            Ok(self.state.lock().unwrap().available(event_id))
        })
    }
}

/// Transaction over an [`InMemoryInventoryStore`]. Dropping it releases its
/// locks and discards its insert.
struct InMemoryTransaction {
    store: InMemoryInventoryStore,
    id: u64,
    isolation: IsolationLevel,
    snapshot: u64,
    pending: Option<(ReservationId, UserId, SeatId)>,
}

impl InMemoryTransaction {
    fn visible(&self, reservation: &CommittedReservation) -> bool {
        !self.isolation.uses_snapshot() || reservation.commit_seq <= self.snapshot
    }
}

impl InMemoryTransaction {
    fn apply_commit(&mut self) -> Result<(), StoreError> {
        let mut state = self.store.state.lock().unwrap();
        if let Err(err) = state.take_fault(FaultPoint::Commit) {
            state.release(self.id);
            return Err(err);
        }
        if let Some((id, user_id, seat_id)) = self.pending.take() {
            state.commit_seq += 1;
            let commit_seq = state.commit_seq;
            state.reservations.insert(
                seat_id,
                CommittedReservation {
                    id,
                    user_id,
                    commit_seq,
                },
            );
        }
        state.release(self.id);
        Ok(())
    }
}

impl InventoryTransaction for InMemoryTransaction {
    fn requester_exists(&mut self, user_id: UserId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            self.store.pause().await;
            Ok(self.store.state.lock().unwrap().users.contains(&user_id))
        })
    }

    fn lock_seat(&mut self, event_id: EventId, seat_number: SeatNumber) -> StoreFuture<'_, Option<Seat>> {
        Box::pin(async move {
            self.store.pause().await;
            let mut state = self.store.state.lock().unwrap();
            state.take_fault(FaultPoint::Lock)?;
            let Some(seat) = state.seat_by_number(event_id, seat_number) else {
                return Ok(None);
            };
            match state.locks.get(&seat.id) {
                Some(holder) if *holder != self.id => Err(StoreError::lock_not_available(format!(
                    "could not obtain lock on row for seat {seat_number}"
                ))),
                _ => {
                    state.locks.insert(seat.id, self.id);
                    Ok(Some(seat))
                }
            }
        })
    }

    fn lock_random_available_seat(&mut self, event_id: EventId) -> StoreFuture<'_, Option<Seat>> {
        Box::pin(async move {
            self.store.pause().await;
            let mut state = self.store.state.lock().unwrap();
            state.take_fault(FaultPoint::Lock)?;
            let candidates: Vec<Seat> = state
                .event_seats(event_id)
                .filter(|s| {
                    state
                        .reservations
                        .get(&s.id)
                        .is_none_or(|r| !self.visible(r))
                })
                .filter(|s| state.locks.get(&s.id).is_none_or(|holder| *holder == self.id))
                .copied()
                .collect();
            let Some(seat) = candidates.choose(&mut rand::thread_rng()).copied() else {
                return Ok(None);
            };
            state.locks.insert(seat.id, self.id);
            Ok(Some(seat))
        })
    }

    fn insert_reservation(&mut self, user_id: UserId, seat_id: SeatId) -> StoreFuture<'_, Option<ReservationId>> {
        Box::pin(async move {
            self.store.pause().await;
            let mut state = self.store.state.lock().unwrap();
            state.take_fault(FaultPoint::Insert)?;

            if !state.seats.contains_key(&seat_id) {
                return Err(StoreError::database(format!(
                    "insert violates foreign key: seat {seat_id} does not exist"
                )));
            }
            if let Some(existing) = state.reservations.get(&seat_id) {
                if !self.visible(existing) {
                    return Err(StoreError::serialization_failure(
                        "could not serialize access due to concurrent update",
                    ));
                }
                return Ok(None);
            }
            match state.pending.get(&seat_id) {
                Some(holder) if *holder == self.id => return Ok(None),
                Some(_) => {
                    return Err(StoreError::lock_not_available(format!(
                        "seat {seat_id} has an uncommitted reservation"
                    )));
                }
                None => {}
            }

            let id = ReservationId::new(state.next_id());
            state.pending.insert(seat_id, self.id);
            self.pending = Some((id, user_id, seat_id));
            Ok(Some(id))
        })
    }

    fn commit(mut self: Box<Self>) -> StoreFuture<'static, ()> {
        Box::pin(async move {
            self.store.pause().await;
            self.apply_commit()
        })
    }

    fn rollback(self: Box<Self>) -> StoreFuture<'static, ()> {
        Box::pin(async move {
            self.store.state.lock().unwrap().release(self.id);
            Ok(())
        })
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if let Ok(mut state) = self.store.state.lock() {
            state.release(self.id);
        }
    }
}

impl InventoryAdmin for InMemoryInventoryStore {
    fn create_event(&self, name: &str, date: NaiveDate, location: &str) -> StoreFuture<'_, EventId> {
        let name = name.to_string();
        let location = location.to_string();
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            let id = EventId::new(state.next_id());
            state.events.insert(
                id,
                Event {
                    id,
                    name,
                    date,
                    location,
                },
            );
            Ok(id)
        })
    }

    fn list_events(&self) -> StoreFuture<'_, Vec<Event>> {
        Box::pin(async move { Ok(self.state.lock().unwrap().events.values().cloned().collect()) })
    }

    fn find_event(&self, event_id: EventId) -> StoreFuture<'_, Option<Event>> {
        Box::pin(async move { Ok(self.state.lock().unwrap().events.get(&event_id).cloned()) })
    }

    fn add_seats(&self, event_id: EventId, count: u32) -> StoreFuture<'_, Vec<Seat>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if !state.events.contains_key(&event_id) {
                return Err(StoreError::database(format!("event {event_id} does not exist")));
            }
            let highest = state
                .event_seats(event_id)
                .map(|s| s.seat_number.get())
                .max()
                .unwrap_or(0);
            let mut added = Vec::new();
            for offset in 1..=count {
                let id = SeatId::new(state.next_id());
                #[allow(clippy::cast_possible_wrap)]
                let seat = Seat {
                    id,
                    event_id,
                    seat_number: SeatNumber::new(highest + offset as i32),
                };
                state.seats.insert(id, seat);
                added.push(seat);
            }
            Ok(added)
        })
    }

    fn ensure_users(&self, count: u32) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.state
                .lock()
                .unwrap()
                .users
                .extend((1..=count).map(|u| UserId::new(i64::from(u))));
            Ok(())
        })
    }

    fn available_seat_count(&self, event_id: EventId) -> StoreFuture<'_, u64> {
        Box::pin(async move { Ok(self.state.lock().unwrap().available(event_id).len() as u64) })
    }

    fn reservations_for_event(&self, event_id: EventId) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            let mut reservations: Vec<Reservation> = state
                .event_seats(event_id)
                .filter_map(|seat| {
                    state.reservations.get(&seat.id).map(|r| Reservation {
                        id: r.id,
                        seat_id: seat.id,
                        user_id: r.user_id,
                    })
                })
                .collect();
            reservations.sort_by_key(|r| r.id);
            Ok(reservations)
        })
    }

    fn create_reservation(&self, user_id: UserId, seat_id: SeatId) -> StoreFuture<'_, ReservationId> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if !state.seats.contains_key(&seat_id) || !state.users.contains(&user_id) {
                return Err(StoreError::database(format!(
                    "insert violates foreign key: seat {seat_id} or user {user_id} does not exist"
                )));
            }
            if state.reservations.contains_key(&seat_id) || state.pending.contains_key(&seat_id) {
                return Err(StoreError::new(
                    StoreErrorKind::UniqueViolation,
                    format!("seat {seat_id} is already reserved"),
                ));
            }
            let id = ReservationId::new(state.next_id());
            state.commit_seq += 1;
            let commit_seq = state.commit_seq;
            state.reservations.insert(
                seat_id,
                CommittedReservation {
                    id,
                    user_id,
                    commit_seq,
                },
            );
            Ok(id)
        })
    }

    fn cancel_reservation(&self, reservation_id: ReservationId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            let before = state.reservations.len();
            state.reservations.retain(|_, r| r.id != reservation_id);
            Ok(state.reservations.len() < before)
        })
    }

    fn clear_reservations(&self, event_id: EventId) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            let seats: BTreeSet<SeatId> = state.event_seats(event_id).map(|s| s.id).collect();
            let before = state.reservations.len();
            state.reservations.retain(|seat_id, _| !seats.contains(seat_id));
            Ok((before - state.reservations.len()) as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fail_fast_lock_conflicts_while_held() {
        let (store, event) = InMemoryInventoryStore::seeded(3, 2);
        let mut first = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        let mut second = store.begin(IsolationLevel::ReadCommitted).await.unwrap();

        assert!(first.lock_seat(event, SeatNumber::new(1)).await.unwrap().is_some());
        let err = second.lock_seat(event, SeatNumber::new(1)).await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::LockNotAvailable);

        first.rollback().await.unwrap();
        assert!(second.lock_seat(event, SeatNumber::new(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_lock_skip_never_returns_locked_seat() {
        let (store, event) = InMemoryInventoryStore::seeded(2, 2);
        let mut first = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        let mut second = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        let mut third = store.begin(IsolationLevel::ReadCommitted).await.unwrap();

        let a = first.lock_random_available_seat(event).await.unwrap().unwrap();
        let b = second.lock_random_available_seat(event).await.unwrap().unwrap();
        assert_ne!(a.id, b.id);
        assert!(third.lock_random_available_seat(event).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_over_committed_reservation_depends_on_snapshot() {
        let (store, event) = InMemoryInventoryStore::seeded(1, 3);
        let seat = store.available_seats(event).await.unwrap()[0];

        let mut read_committed = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        let mut repeatable = store.begin(IsolationLevel::RepeatableRead).await.unwrap();

        store.create_reservation(UserId::new(1), seat.id).await.unwrap();

        assert_eq!(read_committed.insert_reservation(UserId::new(2), seat.id).await.unwrap(), None);
        let err = repeatable.insert_reservation(UserId::new(3), seat.id).await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::SerializationFailure);
    }

    #[tokio::test]
    async fn test_dropped_transaction_releases_locks_and_insert() {
        let (store, event) = InMemoryInventoryStore::seeded(1, 1);
        {
            let mut tx = store.begin(IsolationLevel::Serializable).await.unwrap();
            let seat = tx.lock_seat(event, SeatNumber::new(1)).await.unwrap().unwrap();
            tx.insert_reservation(UserId::new(1), seat.id).await.unwrap();
            assert_eq!(store.locks_held(), 1);
        }
        assert_eq!(store.locks_held(), 0);
        assert_eq!(store.available_seat_count(event).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_injected_faults_fire_the_requested_number_of_times() {
        let (store, event) = InMemoryInventoryStore::seeded(1, 1);
        store.inject_fault(FaultPoint::Lock, StoreErrorKind::Deadlock, 2);

        for _ in 0..2 {
            let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
            let err = tx.lock_seat(event, SeatNumber::new(1)).await.unwrap_err();
            assert_eq!(err.kind, StoreErrorKind::Deadlock);
        }
        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        assert!(tx.lock_seat(event, SeatNumber::new(1)).await.unwrap().is_some());
        assert_eq!(store.transactions_begun(), 3);
    }

    #[tokio::test]
    async fn test_admin_operations() {
        let store = InMemoryInventoryStore::new();
        let event = store
            .create_event("Concierto", NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(), "Lima")
            .await
            .unwrap();
        let first = store.add_seats(event, 3).await.unwrap();
        let more = store.add_seats(event, 2).await.unwrap();
        assert_eq!(first[0].seat_number, SeatNumber::new(1));
        assert_eq!(more[1].seat_number, SeatNumber::new(5));

        store.ensure_users(2).await.unwrap();
        let reservation = store.create_reservation(UserId::new(1), first[0].id).await.unwrap();
        let duplicate = store.create_reservation(UserId::new(2), first[0].id).await.unwrap_err();
        assert_eq!(duplicate.kind, StoreErrorKind::UniqueViolation);
        assert_eq!(store.available_seat_count(event).await.unwrap(), 4);

        assert!(store.cancel_reservation(reservation).await.unwrap());
        assert!(!store.cancel_reservation(reservation).await.unwrap());

        store.create_reservation(UserId::new(2), first[1].id).await.unwrap();
        assert_eq!(store.clear_reservations(event).await.unwrap(), 1);
        assert_eq!(store.list_events().await.unwrap().len(), 1);
        assert!(store.find_event(EventId::new(999)).await.unwrap().is_none());
    }
}
