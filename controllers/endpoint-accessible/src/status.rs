//! Reduction of reachability passes into a published status.
//!
//! `SyncStatus` is the controller's condition: degraded or not, a short
//! machine-readable reason, the aggregate message and one summary per probed
//! endpoint. `last_transition` only moves when `degraded` flips.

use chrono::{DateTime, Utc};
use endpoint_check::{AggregateOutcome, ProbeSummary, SyncError};
use serde::Serialize;

/// Reason when every endpoint answered
pub const REASON_AS_EXPECTED: &str = "AsExpected";
/// Reason when at least one endpoint failed
pub const REASON_UNREACHABLE: &str = "EndpointUnreachable";
/// Reason when the endpoint list could not be obtained
pub const REASON_SOURCE_UNAVAILABLE: &str = "EndpointSourceUnavailable";

/// Result of the latest reachability pass
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// At least one endpoint failed, or the list could not be obtained
    pub degraded: bool,
    /// Machine-readable cause, one of the `REASON_*` constants
    pub reason: String,
    /// Aggregate failure message, absent when healthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// One summary per probed endpoint, in source order
    pub endpoints: Vec<ProbeSummary>,
    /// When this pass completed
    pub last_sync: DateTime<Utc>,
    /// When `degraded` last changed
    pub last_transition: DateTime<Utc>,
}

impl SyncStatus {
    /// Reduce a pass into a status.
    ///
    /// `previous` carries `last_transition` forward when the degraded state
    /// did not change.
    pub fn from_pass(
        pass: Result<AggregateOutcome, SyncError>,
        now: DateTime<Utc>,
        previous: Option<&SyncStatus>,
    ) -> Self {
        let (degraded, reason, message, endpoints) = match pass {
            Ok(outcome) => {
                let endpoints = outcome.summaries();
                match outcome.into_result() {
                    Ok(()) => (false, REASON_AS_EXPECTED, None, endpoints),
                    Err(err) => (true, REASON_UNREACHABLE, Some(err.to_string()), endpoints),
                }
            }
            Err(err) if err.is_source_unavailable() => {
                (true, REASON_SOURCE_UNAVAILABLE, Some(err.to_string()), Vec::new())
            }
            Err(err) => (true, REASON_UNREACHABLE, Some(err.to_string()), Vec::new()),
        };

        let last_transition = match previous {
            Some(prev) if prev.degraded == degraded => prev.last_transition,
            _ => now,
        };

        Self {
            degraded,
            reason: reason.to_string(),
            message,
            endpoints,
            last_sync: now,
            last_transition,
        }
    }

    /// Whether this status flips the degraded state relative to `previous`.
    ///
    /// The first status counts as a transition only when degraded.
    pub fn is_transition_from(&self, previous: Option<&SyncStatus>) -> bool {
        match previous {
            Some(prev) => prev.degraded != self.degraded,
            None => self.degraded,
        }
    }

    /// Number of failed endpoint probes
    pub fn failed_endpoints(&self) -> usize {
        self.endpoints.iter().filter(|e| !e.healthy).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use endpoint_check::{ProbeError, ProbeResult};

    fn outcome(results: &[(&str, bool)], at: DateTime<Utc>) -> AggregateOutcome {
        let results = results
            .iter()
            .map(|(url, healthy)| ProbeResult {
                url: (*url).to_string(),
                outcome: if *healthy {
                    Ok(())
                } else {
                    Err(ProbeError::Unreachable {
                        url: (*url).to_string(),
                        reason: "connection refused".to_string(),
                    })
                },
            })
            .collect();
        AggregateOutcome::new(results, at)
    }

    #[test]
    fn test_healthy_pass() {
        let now = Utc::now();
        let status = SyncStatus::from_pass(Ok(outcome(&[("https://a/healthz", true)], now)), now, None);

        assert!(!status.degraded);
        assert_eq!(status.reason, REASON_AS_EXPECTED);
        assert_eq!(status.message, None);
        assert_eq!(status.endpoints.len(), 1);
        assert_eq!(status.failed_endpoints(), 0);
        assert_eq!(status.last_sync, now);
        assert_eq!(status.last_transition, now);
        assert!(!status.is_transition_from(None));
    }

    #[test]
    fn test_unhealthy_pass_names_failing_endpoint() {
        let now = Utc::now();
        let pass = Ok(outcome(
            &[("https://a/healthz", true), ("https://b/healthz", false)],
            now,
        ));
        let status = SyncStatus::from_pass(pass, now, None);

        assert!(status.degraded);
        assert_eq!(status.reason, REASON_UNREACHABLE);
        let message = status.message.as_deref().unwrap_or_default();
        assert!(message.contains("https://b/healthz"), "{message}");
        assert_eq!(status.failed_endpoints(), 1);
        assert!(status.is_transition_from(None));
    }

    #[test]
    fn test_source_failure() {
        let now = Utc::now();
        let pass = Err(SyncError::SourceUnavailable("ingress lister down".into()));
        let status = SyncStatus::from_pass(pass, now, None);

        assert!(status.degraded);
        assert_eq!(status.reason, REASON_SOURCE_UNAVAILABLE);
        assert!(status.endpoints.is_empty());
        assert!(
            status.message.as_deref().unwrap_or_default().contains("ingress lister down")
        );
    }

    #[test]
    fn test_last_transition_only_moves_on_flip() {
        let t0 = Utc::now();
        let t1 = t0 + TimeDelta::seconds(60);
        let t2 = t1 + TimeDelta::seconds(60);

        let first = SyncStatus::from_pass(Ok(outcome(&[("https://a/healthz", true)], t0)), t0, None);
        let second =
            SyncStatus::from_pass(Ok(outcome(&[("https://a/healthz", true)], t1)), t1, Some(&first));
        assert_eq!(second.last_sync, t1);
        assert_eq!(second.last_transition, t0);
        assert!(!second.is_transition_from(Some(&first)));

        let third =
            SyncStatus::from_pass(Ok(outcome(&[("https://a/healthz", false)], t2)), t2, Some(&second));
        assert_eq!(third.last_transition, t2);
        assert!(third.is_transition_from(Some(&second)));
    }

    #[test]
    fn test_serializes_camel_case() {
        let now = Utc::now();
        let status = SyncStatus::from_pass(Ok(outcome(&[("https://a/healthz", false)], now)), now, None);
        let json = serde_json::to_value(&status).expect("status serializes");

        assert_eq!(json["degraded"], true);
        assert!(json.get("lastTransition").is_some());
        assert!(json.get("lastSync").is_some());
        assert_eq!(json["endpoints"][0]["url"], "https://a/healthz");
        assert_eq!(json["endpoints"][0]["healthy"], false);
    }
}
