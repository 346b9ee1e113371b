//! Run reporting: per-run summaries, the append-only CSV run log and the
//! comparative table across runs.
//!
//! # CSV Format
//!
//! One row per run, no header, append-only:
//!
//! ```text
//! event_id,isolation,population,successes,failures,errors,lock_conflicts,serialization_conflicts,avg_latency_ms
//! 1,SERIALIZABLE,20,1,19,0,57,0,112.48
//! ```
//!
//! `failures` excludes fatal errors, which are counted in `errors`.

use seat_arbiter_core::{EventId, IsolationLevel, RunStatistics};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use thiserror::Error;

/// Errors from reading or writing run reports.
#[derive(Error, Debug)]
pub enum ReportError {
    /// File could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A CSV row did not match the run summary layout.
    #[error("malformed run summary at line {line}: {reason}")]
    Malformed {
        /// 1-based line number
        line: usize,
        /// What was wrong
        reason: String,
    },
}

/// Flat summary of one run, as persisted in the CSV run log.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Event of the run
    pub event_id: EventId,
    /// Isolation level of the run
    pub isolation: IsolationLevel,
    /// Requesters launched
    pub population: u32,
    /// Requesters that got a seat
    pub successes: u32,
    /// Requesters that did not, fatal errors excluded
    pub failures: u32,
    /// Requesters that hit a fatal store error
    pub errors: u32,
    /// Lock conflicts seen, retries included
    pub lock_conflicts: u32,
    /// Serialization conflicts seen, retries included
    pub serialization_conflicts: u32,
    /// Mean per-requester latency in milliseconds
    pub avg_latency_ms: f64,
}

impl From<&RunStatistics> for RunSummary {
    fn from(stats: &RunStatistics) -> Self {
        Self {
            event_id: stats.event_id,
            isolation: stats.isolation,
            population: stats.population,
            successes: stats.successes,
            failures: stats.failures - stats.fatal_errors,
            errors: stats.fatal_errors,
            lock_conflicts: stats.lock_conflicts,
            serialization_conflicts: stats.serialization_conflicts,
            avg_latency_ms: stats.average_latency().as_secs_f64() * 1000.0,
        }
    }
}

impl RunSummary {
    /// Render as one CSV row (no trailing newline).
    #[must_use]
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{:.2}",
            self.event_id,
            self.isolation,
            self.population,
            self.successes,
            self.failures,
            self.errors,
            self.lock_conflicts,
            self.serialization_conflicts,
            self.avg_latency_ms
        )
    }

    /// Parse one CSV row.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Malformed`] if the row has the wrong shape.
    pub fn parse_csv_row(row: &str, line: usize) -> Result<Self, ReportError> {
        let malformed = |reason: String| ReportError::Malformed { line, reason };
        let fields: Vec<&str> = row.trim().split(',').map(str::trim).collect();
        if fields.len() != 9 {
            return Err(malformed(format!("expected 9 fields, found {}", fields.len())));
        }

        let int = |index: usize| -> Result<u32, ReportError> {
            fields[index]
                .parse()
                .map_err(|e| malformed(format!("field {index} ({}): {e}", fields[index])))
        };

        Ok(Self {
            event_id: EventId::new(
                fields[0]
                    .parse()
                    .map_err(|e| malformed(format!("event id: {e}")))?,
            ),
            isolation: fields[1]
                .parse()
                .map_err(|e| malformed(format!("{e}")))?,
            population: int(2)?,
            successes: int(3)?,
            failures: int(4)?,
            errors: int(5)?,
            lock_conflicts: int(6)?,
            serialization_conflicts: int(7)?,
            avg_latency_ms: fields[8]
                .parse()
                .map_err(|e| malformed(format!("average latency: {e}")))?,
        })
    }
}

/// Append-only CSV log of run summaries.
#[derive(Debug, Clone)]
pub struct RunLog<P> {
    path: P,
}

impl<P: AsRef<Path>> RunLog<P> {
    /// Log stored at `path`; the file is created on first append.
    pub const fn new(path: P) -> Self {
        Self { path }
    }

    /// Append one row.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Io`] if the file cannot be opened or written.
    pub fn append(&self, summary: &RunSummary) -> Result<(), ReportError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_ref())?;
        writeln!(file, "{}", summary.to_csv_row())?;
        Ok(())
    }

    /// Read every row. Blank lines are skipped; a missing file is an empty log.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`] on I/O failure or a malformed row.
    pub fn read_all(&self) -> Result<Vec<RunSummary>, ReportError> {
        let file = match std::fs::File::open(self.path.as_ref()) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            summaries.push(RunSummary::parse_csv_row(&line, index + 1)?);
        }
        Ok(summaries)
    }
}

/// Mean figures for one (isolation level, population) group.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    /// Group isolation level
    pub isolation: IsolationLevel,
    /// Group population
    pub population: u32,
    /// Runs in the group
    pub runs: usize,
    /// Mean successes
    pub successes: f64,
    /// Mean failures
    pub failures: f64,
    /// Mean fatal errors
    pub errors: f64,
    /// Mean lock conflicts
    pub lock_conflicts: f64,
    /// Mean serialization conflicts
    pub serialization_conflicts: f64,
    /// Mean of the runs' average latency
    pub avg_latency_ms: f64,
}

/// Run summaries grouped by (isolation level, population) with every numeric
/// column averaged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComparisonTable {
    /// Rows ordered by isolation level, then population
    pub rows: Vec<ComparisonRow>,
}

impl ComparisonTable {
    /// Group and average `summaries`.
    #[must_use]
    pub fn from_summaries(summaries: &[RunSummary]) -> Self {
        let mut groups: BTreeMap<(IsolationLevel, u32), Vec<&RunSummary>> = BTreeMap::new();
        for summary in summaries {
            groups
                .entry((summary.isolation, summary.population))
                .or_default()
                .push(summary);
        }

        let rows = groups
            .into_iter()
            .map(|((isolation, population), group)| {
                #[allow(clippy::cast_precision_loss)]
                let n = group.len() as f64;
                let mean = |f: fn(&RunSummary) -> f64| group.iter().map(|s| f(s)).sum::<f64>() / n;
                ComparisonRow {
                    isolation,
                    population,
                    runs: group.len(),
                    successes: mean(|s| f64::from(s.successes)),
                    failures: mean(|s| f64::from(s.failures)),
                    errors: mean(|s| f64::from(s.errors)),
                    lock_conflicts: mean(|s| f64::from(s.lock_conflicts)),
                    serialization_conflicts: mean(|s| f64::from(s.serialization_conflicts)),
                    avg_latency_ms: mean(|s| s.avg_latency_ms),
                }
            })
            .collect();

        Self { rows }
    }

    /// Render as an aligned text table.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<16} {:>10} {:>5} {:>10} {:>10} {:>8} {:>10} {:>10} {:>12}",
            "isolation", "population", "runs", "successes", "failures", "errors", "locks", "serial", "latency_ms"
        );
        for row in &self.rows {
            let _ = writeln!(
                out,
                "{:<16} {:>10} {:>5} {:>10.2} {:>10.2} {:>8.2} {:>10.2} {:>10.2} {:>12.2}",
                row.isolation.as_sql(),
                row.population,
                row.runs,
                row.successes,
                row.failures,
                row.errors,
                row.lock_conflicts,
                row.serialization_conflicts,
                row.avg_latency_ms
            );
        }
        out
    }

    /// Write the table as CSV with a header row, replacing `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Io`] if the file cannot be written.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let mut out = String::from(
            "isolation,population,runs,successes,failures,errors,lock_conflicts,serialization_conflicts,avg_latency_ms\n",
        );
        for row in &self.rows {
            let _ = writeln!(
                out,
                "{},{},{},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2}",
                row.isolation,
                row.population,
                row.runs,
                row.successes,
                row.failures,
                row.errors,
                row.lock_conflicts,
                row.serialization_conflicts,
                row.avg_latency_ms
            );
        }
        std::fs::write(path, out)?;
        Ok(())
    }
}

/// Human-readable report of one run.
#[must_use]
pub fn render_run(stats: &RunStatistics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Results ({}, event {}, {} requesters):", stats.isolation, stats.event_id, stats.population);
    let _ = writeln!(out, "  reserved:                {}", stats.successes);
    let _ = writeln!(out, "  failed:                  {}", stats.failures);
    let _ = writeln!(out, "    seat unavailable:      {}", stats.seat_unavailable);
    let _ = writeln!(out, "    requester invalid:     {}", stats.requester_invalid);
    let _ = writeln!(out, "    retries exhausted:     {}", stats.exhausted_retries);
    let _ = writeln!(out, "    errors:                {}", stats.fatal_errors);
    let _ = writeln!(out, "  lock conflicts:          {}", stats.lock_conflicts);
    let _ = writeln!(out, "  serialization conflicts: {}", stats.serialization_conflicts);
    let _ = writeln!(out, "  attempts:                {}", stats.attempts);
    let _ = writeln!(out, "  total time:              {:.2} s", stats.elapsed.as_secs_f64());
    let _ = writeln!(
        out,
        "  average latency:         {:.2} ms",
        stats.average_latency().as_secs_f64() * 1000.0
    );
    if let Some(p95) = stats.latency_percentile(0.95) {
        let _ = writeln!(out, "  p95 latency:             {:.2} ms", p95.as_secs_f64() * 1000.0);
    }
    out
}
