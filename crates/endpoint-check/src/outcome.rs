//! Probe results and their aggregation
//!
//! The checker keeps one [`ProbeResult`] per probed URL, in source order, and
//! only flattens them into a single error at the very end. Callers that want
//! per-endpoint detail (status pages, metrics) use [`AggregateOutcome`]
//! directly; callers that only need pass/fail use [`AggregateOutcome::into_result`].

use crate::error::{ProbeError, SyncError};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Result of probing one URL
#[derive(Debug)]
pub struct ProbeResult {
    /// URL that was probed
    pub url: String,
    /// `Ok(())` on a 2xx response
    pub outcome: Result<(), ProbeError>,
}

impl ProbeResult {
    /// Whether this probe succeeded
    pub fn is_healthy(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Serializable view of a [`ProbeResult`]
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeSummary {
    /// Probed URL
    pub url: String,
    /// Whether the probe succeeded
    pub healthy: bool,
    /// Failure label from [`ProbeError::kind`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    /// Failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Every probe result of one reachability pass
#[derive(Debug)]
pub struct AggregateOutcome {
    results: Vec<ProbeResult>,
    checked_at: DateTime<Utc>,
}

impl AggregateOutcome {
    /// Aggregate results collected at `checked_at`
    pub fn new(results: Vec<ProbeResult>, checked_at: DateTime<Utc>) -> Self {
        Self {
            results,
            checked_at,
        }
    }

    /// All results, in probe order
    pub fn results(&self) -> &[ProbeResult] {
        &self.results
    }

    /// When the pass finished
    pub fn checked_at(&self) -> DateTime<Utc> {
        self.checked_at
    }

    /// Number of probed URLs
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether nothing was probed (vacuously healthy)
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// True when every probe succeeded, including when there were none
    pub fn is_healthy(&self) -> bool {
        self.results.iter().all(ProbeResult::is_healthy)
    }

    /// Failed probes, in probe order
    pub fn failures(&self) -> impl Iterator<Item = &ProbeError> {
        self.results.iter().filter_map(|r| r.outcome.as_ref().err())
    }

    /// Serializable per-endpoint summary
    pub fn summaries(&self) -> Vec<ProbeSummary> {
        self.results
            .iter()
            .map(|r| ProbeSummary {
                url: r.url.clone(),
                healthy: r.is_healthy(),
                kind: r.outcome.as_ref().err().map(ProbeError::kind),
                error: r.outcome.as_ref().err().map(ToString::to_string),
            })
            .collect()
    }

    /// Reduce to a single pass/fail result
    pub fn into_result(self) -> Result<(), SyncError> {
        let probed = self.results.len();
        let failures: Vec<ProbeError> = self
            .results
            .into_iter()
            .filter_map(|r| r.outcome.err())
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(SyncError::Unhealthy { failures, probed })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(url: &str) -> ProbeResult {
        ProbeResult {
            url: url.to_string(),
            outcome: Ok(()),
        }
    }

    fn unreachable(url: &str) -> ProbeResult {
        ProbeResult {
            url: url.to_string(),
            outcome: Err(ProbeError::Unreachable {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }

    #[test]
    fn test_empty_outcome_is_healthy() {
        let outcome = AggregateOutcome::new(Vec::new(), Utc::now());
        assert!(outcome.is_empty());
        assert!(outcome.is_healthy());
        assert!(outcome.into_result().is_ok());
    }

    #[test]
    fn test_single_failure_fails_aggregate() {
        let outcome = AggregateOutcome::new(
            vec![ok("https://a/healthz"), unreachable("https://b/healthz"), ok("https://c/healthz")],
            Utc::now(),
        );
        assert!(!outcome.is_healthy());
        assert_eq!(outcome.failures().count(), 1);

        let err = outcome.into_result().expect_err("aggregate must fail");
        match err {
            SyncError::Unhealthy { failures, probed } => {
                assert_eq!(probed, 3);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].url(), Some("https://b/healthz"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_summaries_keep_order() {
        let outcome = AggregateOutcome::new(
            vec![unreachable("https://b/healthz"), ok("https://a/healthz")],
            Utc::now(),
        );
        let summaries = outcome.summaries();

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].url, "https://b/healthz");
        assert!(!summaries[0].healthy);
        assert_eq!(summaries[0].kind, Some("unreachable"));
        assert_eq!(summaries[1].url, "https://a/healthz");
        assert!(summaries[1].healthy);
        assert_eq!(summaries[1].error, None);
    }

    #[test]
    fn test_summary_json_omits_empty_fields() {
        let outcome = AggregateOutcome::new(
            vec![ok("https://a/healthz"), unreachable("https://b/healthz")],
            Utc::now(),
        );
        let json = serde_json::to_value(outcome.summaries()).expect("summaries serialize");

        assert_eq!(json[0], serde_json::json!({ "url": "https://a/healthz", "healthy": true }));
        assert_eq!(json[1]["kind"], "unreachable");
        assert!(
            json[1]["error"]
                .as_str()
                .is_some_and(|e| e.contains("connection refused"))
        );
    }
}
