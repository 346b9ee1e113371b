//! Command-line interface.

use clap::{Args, Parser, Subcommand, ValueEnum};
use seat_arbiter_core::{EventId, IsolationLevel, NaiveDate, SeatNumber};
use seat_arbiter_runtime::{SeatStrategy, validate_weight};
use std::path::PathBuf;

/// Largest population a single run accepts.
pub const MAX_POPULATION: u32 = 1000;

/// Largest per-requester attempt budget accepted.
pub const MAX_ATTEMPTS: u32 = 100;

/// Seat reservation concurrency simulator.
#[derive(Parser, Debug)]
#[command(author, version, about = "Seat reservation concurrency simulator")]
pub struct Cli {
    /// Overrides `DATABASE_URL`
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Simulator subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check the database connection and report the number of events
    Check,
    /// Create an event with numbered seats and a block of requester users
    Setup(SetupArgs),
    /// List events, or show one event with its available seats
    Events {
        /// Show only this event
        #[arg(long)]
        id: Option<i64>,
    },
    /// Run one simulation and append its summary to the run log
    Run(RunArgs),
    /// Run every combination of isolation levels, populations and strategies
    Sweep(SweepArgs),
    /// Print the comparative table of the run log
    Report(ReportArgs),
}

/// Arguments of `setup`.
#[derive(Args, Debug)]
pub struct SetupArgs {
    /// Event name
    #[arg(long, default_value = "Concierto")]
    pub name: String,
    /// Event date (YYYY-MM-DD)
    #[arg(long, default_value = "2025-12-01")]
    pub date: NaiveDate,
    /// Venue
    #[arg(long, default_value = "Estadio Nacional")]
    pub location: String,
    /// Seats to create, numbered from 1
    #[arg(long, default_value_t = 10)]
    pub seats: u32,
    /// Requester users to create, ids 1..=users
    #[arg(long, default_value_t = MAX_POPULATION)]
    pub users: u32,
}

/// Seat strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Everyone targets `--seat`
    Fixed,
    /// Everyone takes any available seat
    Random,
    /// `--popular-weight` chance of a `--popular` seat, otherwise random
    Mixed,
    /// Read available seats first, then target one
    PreRead,
}

/// Seat targeting options shared by `run` and `sweep`.
#[derive(Args, Debug, Clone)]
pub struct TargetingArgs {
    /// Seat number for the fixed strategy
    #[arg(long, default_value_t = 10)]
    pub seat: i32,
    /// Popular seat numbers for the mixed strategy
    #[arg(long, value_delimiter = ',', default_value = "1,2,3")]
    pub popular: Vec<i32>,
    /// Chance of targeting a popular seat, in [0, 1]
    #[arg(long, default_value_t = 0.8, value_parser = parse_weight)]
    pub popular_weight: f64,
}

impl TargetingArgs {
    /// Build the runtime strategy for `kind`.
    #[must_use]
    pub fn strategy(&self, kind: StrategyArg) -> SeatStrategy {
        match kind {
            StrategyArg::Fixed => SeatStrategy::FixedTarget {
                seat: SeatNumber::new(self.seat),
            },
            StrategyArg::Random => SeatStrategy::Random,
            StrategyArg::Mixed => SeatStrategy::Mixed {
                popular: self.popular.iter().copied().map(SeatNumber::new).collect(),
                popular_weight: self.popular_weight,
            },
            StrategyArg::PreRead => SeatStrategy::PreReadRandom,
        }
    }
}

/// Retry and logging options shared by `run` and `sweep`.
#[derive(Args, Debug, Clone)]
pub struct ExecutionArgs {
    /// Overrides `SIM_MAX_ATTEMPTS`, in 1..=100
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_ATTEMPTS)))]
    pub max_attempts: Option<u32>,
    /// Overrides `SIM_RETRY_DELAY_MS`
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,
    /// Overrides `SIM_SEED`
    #[arg(long)]
    pub seed: Option<u64>,
    /// Overrides `SIM_RESULTS_PATH`
    #[arg(long)]
    pub results: Option<PathBuf>,
    /// Do not append to the run log
    #[arg(long)]
    pub no_log: bool,
}

/// Arguments of `run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Event to contend for
    #[arg(long)]
    pub event: i64,
    /// Concurrent requesters, clamped to 1..=1000
    #[arg(long, default_value_t = 10)]
    pub users: u32,
    /// Isolation level (read-committed, repeatable-read, serializable)
    #[arg(long, default_value = "read-committed")]
    pub isolation: IsolationLevel,
    /// Seat strategy
    #[arg(long, value_enum, default_value_t = StrategyArg::Fixed)]
    pub strategy: StrategyArg,
    /// Delete the event's reservations before running
    #[arg(long)]
    pub reset: bool,
    /// Targeting options
    #[command(flatten)]
    pub targeting: TargetingArgs,
    /// Retry and logging options
    #[command(flatten)]
    pub execution: ExecutionArgs,
}

impl RunArgs {
    /// Target event.
    #[must_use]
    pub const fn event_id(&self) -> EventId {
        EventId::new(self.event)
    }
}

/// Arguments of `sweep`.
#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Event to contend for
    #[arg(long)]
    pub event: i64,
    /// Isolation levels, comma-separated
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "read-committed,repeatable-read,serializable"
    )]
    pub isolations: Vec<IsolationLevel>,
    /// Populations, comma-separated, each clamped to 1..=1000
    #[arg(long, value_delimiter = ',', default_value = "10,50,100")]
    pub populations: Vec<u32>,
    /// Strategies, comma-separated
    #[arg(long, value_enum, value_delimiter = ',', default_value = "fixed,random")]
    pub strategies: Vec<StrategyArg>,
    /// Targeting options
    #[command(flatten)]
    pub targeting: TargetingArgs,
    /// Retry and logging options
    #[command(flatten)]
    pub execution: ExecutionArgs,
}

/// Arguments of `report`.
#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Run log to read; defaults to `SIM_RESULTS_PATH`
    #[arg(long)]
    pub input: Option<PathBuf>,
    /// Also write the comparative table as CSV here
    #[arg(long)]
    pub output: Option<PathBuf>,
}

fn parse_weight(raw: &str) -> Result<f64, String> {
    let weight: f64 = raw.trim().parse().map_err(|e| format!("{raw}: {e}"))?;
    validate_weight(weight).map_err(|e| e.to_string())
}

/// Clamp a requested population to `1..=MAX_POPULATION`.
#[must_use]
pub fn clamp_population(requested: u32) -> u32 {
    let clamped = requested.clamp(1, MAX_POPULATION);
    if clamped != requested {
        tracing::warn!(requested, clamped, "Population out of range, clamped");
    }
    clamped
}
