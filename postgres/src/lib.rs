//! `PostgreSQL` inventory store for the seat arbiter.
//!
//! This crate implements the `InventoryStore`, `InventoryTransaction` and
//! `InventoryAdmin` seams from `seat-arbiter-core` on top of sqlx:
//!
//! - `SET TRANSACTION ISOLATION LEVEL` per attempt
//! - `FOR UPDATE NOWAIT` for targeted seats, `FOR UPDATE SKIP LOCKED` for
//!   random seats
//! - `ON CONFLICT (seat_id) DO NOTHING` reservation inserts
//! - SQLSTATE-based error classification
//! - Connection pooling and embedded migrations
//!
//! # Example
//!
//! ```ignore
//! use seat_arbiter_postgres::{PoolSettings, PostgresInventoryStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresInventoryStore::connect_with(&PoolSettings::default()).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// SQLSTATE classification
pub mod error;

/// Store, transaction and admin implementations
pub mod store;

pub use error::{classify, kind_for_sqlstate, store_error};
pub use store::{PoolSettings, PostgresInventoryStore};
