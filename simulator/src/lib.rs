//! # Seat Arbiter Simulator
//!
//! Command-line driver for seat reservation contention experiments against
//! `PostgreSQL`.
//!
//! ## Usage
//!
//! ```bash
//! # Start the database and create an event with ten seats
//! seat-arbiter setup --seats 10
//!
//! # Twenty requesters on seat 10 under SERIALIZABLE
//! seat-arbiter run --event 1 --users 20 --isolation serializable --seat 10 --reset
//!
//! # Every isolation level, population and strategy, then the comparison
//! seat-arbiter sweep --event 1
//! seat-arbiter report --output comparativa.csv
//! ```
//!
//! Configuration comes from the environment (and a `.env` file), see
//! [`config::Config`].

pub mod cli;
pub mod commands;
pub mod config;

pub use cli::{Cli, Command};
pub use config::{Config, ConfigError};
