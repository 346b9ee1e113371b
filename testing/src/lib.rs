//! # Seat Arbiter Testing
//!
//! Testing utilities for the seat arbiter workspace.
//!
//! This crate provides:
//! - [`InMemoryInventoryStore`]: deterministic emulation of the Postgres
//!   locking and snapshot behaviour the arbiter relies on
//! - Fault injection at every protocol step
//! - Tracing setup for tests
//!
//! ## Example
//!
//! ```ignore
//! use seat_arbiter_testing::InMemoryInventoryStore;
//! use seat_arbiter_runtime::{RunParameters, SeatStrategy, SimulationDriver};
//!
//! #[tokio::test]
//! async fn test_one_winner() {
//!     let (store, event) = InMemoryInventoryStore::seeded(10, 20);
//!     let driver = SimulationDriver::new(Arc::new(store));
//!     let stats = driver.run(&params).await.unwrap();
//!     assert_eq!(stats.successes, 1);
//! }
//! ```

/// In-memory inventory store with fault injection
pub mod inventory;

pub use inventory::{FaultPoint, InMemoryInventoryStore};

/// Install a test tracing subscriber honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
