//! Endpoint Reachability Checks
//!
//! Building blocks for control-plane reconcilers that need to answer two
//! questions under partial and transient failure:
//!
//! - **Is everything reachable?** [`EndpointAccessibleChecker`] asks an
//!   [`EndpointSource`] for the current endpoints, derives a `/healthz` URL
//!   for each, probes them all and reduces the results into one outcome.
//! - **Has this write converged?** [`Poller`] evaluates a predicate
//!   immediately and then on a fixed interval until it succeeds, the time
//!   budget runs out, or a non-transient error is reported.
//!
//! # Example
//!
//! ```no_run
//! use endpoint_check::{EndpointAccessibleChecker, FnSource, HttpProber, ProbeConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = FnSource::new(|| Ok(vec!["oauth.apps.example.com".to_string()]));
//! let prober = HttpProber::new(ProbeConfig::default())?;
//! let checker = EndpointAccessibleChecker::new("oauth-server", source, prober);
//!
//! // Probes https://oauth.apps.example.com/healthz
//! checker.sync(&CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Fail-closed aggregation**: one malformed or unreachable endpoint fails the pass
//! - **Per-endpoint diagnosis**: every failing URL is reported with its reason
//! - **Cancellation**: all long-running operations honour a `CancellationToken`
//! - **Explicit retry classification**: callers decide which predicate errors are transient

pub mod certificate;
pub mod checker;
pub mod error;
pub mod healthz;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod outcome;
pub mod poll;
pub mod probe;
pub mod source;

pub use certificate::ServingCertificateCheck;
pub use checker::{EndpointAccessibleChecker, DEFAULT_MAX_CONCURRENT_PROBES};
pub use error::{CertificateError, PollError, ProbeError, SourceError, SyncError};
pub use healthz::{probe_target, to_healthz_url, to_healthz_urls};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{CountingSource, MockProber};
pub use outcome::{AggregateOutcome, ProbeResult, ProbeSummary};
pub use poll::{
    poll_until_converged, Converged, ErrorClass, ErrorClassifier, FatalErrors, PollSchedule,
    Poller, TransientErrors,
};
pub use probe::{validate_probe_url, HttpProber, ProbeConfig, Prober};
pub use source::{EndpointSource, FnSource};
