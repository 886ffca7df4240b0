//! Prometheus metrics for reachability passes.

use endpoint_check::{AggregateOutcome, SyncError};
use prometheus::{IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Metrics exported on `/metrics`
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    syncs: IntCounterVec,
    probe_failures: IntCounterVec,
    degraded: IntGauge,
    targets: IntGauge,
}

impl Metrics {
    /// Create and register all metrics in a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let syncs = IntCounterVec::new(
            Opts::new("endpoint_sync_total", "Reachability passes by result"),
            &["result"],
        )?;
        let probe_failures = IntCounterVec::new(
            Opts::new(
                "endpoint_probe_failures_total",
                "Failed endpoint probes by failure kind",
            ),
            &["kind"],
        )?;
        let degraded = IntGauge::new(
            "endpoint_degraded",
            "1 when the last pass found an unreachable endpoint",
        )?;
        let targets = IntGauge::new("endpoint_targets", "Endpoints probed in the last pass")?;

        registry.register(Box::new(syncs.clone()))?;
        registry.register(Box::new(probe_failures.clone()))?;
        registry.register(Box::new(degraded.clone()))?;
        registry.register(Box::new(targets.clone()))?;

        Ok(Self {
            registry,
            syncs,
            probe_failures,
            degraded,
            targets,
        })
    }

    /// Record one reachability pass
    pub fn observe(&self, pass: &Result<AggregateOutcome, SyncError>) {
        let result = match pass {
            Ok(outcome) if outcome.is_healthy() => "success",
            Ok(_) => "unhealthy",
            Err(SyncError::Cancelled) => "cancelled",
            Err(_) => "source_error",
        };
        self.syncs.with_label_values(&[result]).inc();

        if let Ok(outcome) = pass {
            for failure in outcome.failures() {
                self.probe_failures.with_label_values(&[failure.kind()]).inc();
            }
            self.targets.set(i64::try_from(outcome.len()).unwrap_or(i64::MAX));
        }
        self.degraded.set(i64::from(result != "success"));
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("degraded", &self.degraded.get())
            .field("targets", &self.targets.get())
            .finish_non_exhaustive()
    }
}
