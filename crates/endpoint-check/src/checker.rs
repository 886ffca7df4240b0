//! Endpoint reachability checker
//!
//! One call to [`EndpointAccessibleChecker::sync`] is one reconciliation pass:
//! list endpoints, derive probe URLs, probe every URL, decide. The checker
//! never retries; the next scheduled pass is the retry.

use crate::error::SyncError;
use crate::healthz::probe_target;
use crate::outcome::{AggregateOutcome, ProbeResult};
use crate::probe::Prober;
use crate::source::EndpointSource;
use chrono::Utc;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default number of probes in flight at once
pub const DEFAULT_MAX_CONCURRENT_PROBES: usize = 8;

/// Verifies that every endpoint of a source answers its health check.
///
/// Holds no mutable state, so one instance can serve concurrent passes.
#[derive(Debug)]
pub struct EndpointAccessibleChecker<S, P> {
    name: String,
    source: S,
    prober: P,
    max_concurrent_probes: usize,
}

impl<S, P> EndpointAccessibleChecker<S, P>
where
    S: EndpointSource,
    P: Prober,
{
    /// Creates a new checker.
    ///
    /// # Arguments
    /// * `name` - label used in logs (e.g. the component whose endpoints are checked)
    /// * `source` - produces the endpoint list on every pass
    /// * `prober` - performs the individual probes
    pub fn new(name: impl Into<String>, source: S, prober: P) -> Self {
        Self {
            name: name.into(),
            source,
            prober,
            max_concurrent_probes: DEFAULT_MAX_CONCURRENT_PROBES,
        }
    }

    /// Bound the probe fan-out (values below 1 are treated as 1)
    #[must_use]
    pub fn with_max_concurrent_probes(mut self, max: usize) -> Self {
        self.max_concurrent_probes = max.max(1);
        self
    }

    /// Name used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run one pass and reduce it to pass/fail.
    ///
    /// Returns `Ok(())` when every endpoint is healthy, including when the
    /// source returned no endpoints.
    pub async fn sync(&self, cancel: &CancellationToken) -> Result<(), SyncError> {
        self.check(cancel).await?.into_result()
    }

    /// Run one pass and keep every per-endpoint result.
    ///
    /// Errors only when the pass could not be carried out at all (source
    /// failure or cancellation); unhealthy endpoints are reported inside the
    /// returned [`AggregateOutcome`].
    pub async fn check(&self, cancel: &CancellationToken) -> Result<AggregateOutcome, SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let endpoints = tokio::select! {
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            listed = self.source.endpoints() => listed.map_err(|e| {
                warn!("{}: unable to list endpoints: {}", self.name, e);
                SyncError::SourceUnavailable(e)
            })?,
        };

        let targets: Vec<String> = endpoints.iter().map(|e| probe_target(e)).collect();
        debug!("{}: probing {} endpoints", self.name, targets.len());

        // buffered() keeps source order; collect() is the join barrier
        let probes = futures::stream::iter(targets)
            .map(|url| async move {
                let outcome = self.prober.probe(&url).await;
                if let Err(e) = &outcome {
                    debug!("{}: probe failed: {}", self.name, e);
                }
                ProbeResult { url, outcome }
            })
            .buffered(self.max_concurrent_probes)
            .collect::<Vec<_>>();

        let results = tokio::select! {
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            results = probes => results,
        };

        let outcome = AggregateOutcome::new(results, Utc::now());
        if outcome.is_healthy() {
            debug!("{}: all {} endpoints healthy", self.name, outcome.len());
        } else {
            info!(
                "{}: {} of {} endpoints unhealthy",
                self.name,
                outcome.failures().count(),
                outcome.len()
            );
        }

        Ok(outcome)
    }
}
