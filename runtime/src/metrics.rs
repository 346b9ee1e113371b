//! Prometheus metrics for arbitration and simulation runs.
//!
//! Recording is always on; the numbers only leave the process once a
//! [`MetricsServer`] has installed the Prometheus recorder.
//!
//! # Example
//!
//! ```rust,no_run
//! use seat_arbiter_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use seat_arbiter_core::{AttemptOutcome, IsolationLevel};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
}

/// Prometheus metrics endpoint.
///
/// Serves the scrape endpoint on its own listener at `addr`.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions, install the recorder and spawn the
    /// HTTP exporter.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g. in tests) this logs a warning
    /// and returns `Ok(())` without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let (recorder, exporter) = builder
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;
        let handle = recorder.handle();

        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        tokio::spawn(async move {
            if exporter.await.is_err() {
                tracing::error!("Metrics exporter stopped");
            }
        });
        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder was not installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "arbiter_attempts_total",
        "Arbitration attempts by outcome"
    );
    describe_histogram!(
        "arbiter_attempt_duration_seconds",
        "Time taken by one arbitration attempt"
    );

    describe_counter!(
        "retry_attempts_total",
        "Retries scheduled after a transient conflict"
    );
    describe_counter!(
        "retry_successes_total",
        "Requesters that got a seat after at least one retry"
    );
    describe_counter!(
        "retry_exhausted_total",
        "Requesters whose retry budget ran out"
    );

    describe_counter!(
        "simulation_runs_total",
        "Completed simulation runs by isolation level"
    );
    describe_histogram!(
        "simulation_requester_latency_duration_seconds",
        "Wall-clock time of one requester, retries included"
    );
}

/// Arbiter metrics recorder.
pub struct ArbiterMetrics;

impl ArbiterMetrics {
    /// Record one attempt and its duration.
    pub fn record_attempt(outcome: &AttemptOutcome, duration: Duration) {
        counter!("arbiter_attempts_total", "outcome" => outcome.kind().as_str()).increment(1);
        histogram!("arbiter_attempt_duration_seconds").record(duration.as_secs_f64());
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}

/// Simulation metrics recorder.
pub struct SimulationMetrics;

impl SimulationMetrics {
    /// Record one requester's latency.
    pub fn record_requester(latency: Duration) {
        histogram!("simulation_requester_latency_duration_seconds").record(latency.as_secs_f64());
    }

    /// Record a completed run.
    pub fn record_run(isolation: IsolationLevel) {
        counter!("simulation_runs_total", "isolation" => isolation.as_sql()).increment(1);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[tokio::test]
    async fn test_metrics_server_render() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        ArbiterMetrics::record_attempt(&AttemptOutcome::LockConflict, Duration::from_millis(3));
        RetryMetrics::record_attempt();
        SimulationMetrics::record_run(IsolationLevel::Serializable);

        // Another test may have installed the recorder first; metrics are
        // still recorded, just not renderable from this handle.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("arbiter_attempts_total"));
            assert!(rendered.contains("retry_attempts_total"));
            assert!(rendered.contains("simulation_runs_total"));
        }
    }
}
