//! Endpoint check errors

use std::time::Duration;
use thiserror::Error;

/// Error produced by an [`EndpointSource`](crate::EndpointSource).
///
/// Sources are backed by arbitrary stores (Kubernetes, static config, tests),
/// so their errors are carried opaquely and surfaced verbatim.
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a single probe failed
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The probe URL could not be parsed or dispatched
    #[error("{url}: malformed URL: {reason}")]
    MalformedTarget { url: String, reason: String },

    /// The request could not be completed (DNS, connect, TLS, ...)
    #[error("{url}: unreachable: {reason}")]
    Unreachable { url: String, reason: String },

    /// The endpoint answered with a non-2xx status
    #[error("{url}: unhealthy status {status}")]
    UnhealthyStatus { url: String, status: u16 },

    /// The request did not complete within the per-request timeout
    #[error("{url}: timed out after {timeout:?}")]
    TimedOut { url: String, timeout: Duration },

    /// The HTTP client itself could not be constructed
    #[error("failed to build probe client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ProbeError {
    /// URL the failure refers to, if any
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::MalformedTarget { url, .. }
            | Self::Unreachable { url, .. }
            | Self::UnhealthyStatus { url, .. }
            | Self::TimedOut { url, .. } => Some(url),
            Self::Client(_) => None,
        }
    }

    /// Whether the failure is a malformed target rather than a network failure
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedTarget { .. })
    }

    /// Short, stable label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedTarget { .. } => "malformed",
            Self::Unreachable { .. } => "unreachable",
            Self::UnhealthyStatus { .. } => "status",
            Self::TimedOut { .. } => "timeout",
            Self::Client(_) => "client",
        }
    }
}

/// Outcome of a failed reachability pass
#[derive(Debug, Error)]
pub enum SyncError {
    /// The endpoint list itself could not be obtained; nothing was probed
    #[error("unable to list endpoints: {0}")]
    SourceUnavailable(#[source] SourceError),

    /// At least one endpoint failed its probe
    #[error("{} of {probed} endpoints failed: [{}]", .failures.len(), join_failures(.failures))]
    Unhealthy {
        failures: Vec<ProbeError>,
        probed: usize,
    },

    /// The caller cancelled the pass before it completed
    #[error("endpoint sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Per-endpoint failures, empty unless this is [`SyncError::Unhealthy`]
    pub fn failures(&self) -> &[ProbeError] {
        match self {
            Self::Unhealthy { failures, .. } => failures,
            _ => &[],
        }
    }

    /// Whether the endpoint source failed
    pub fn is_source_unavailable(&self) -> bool {
        matches!(self, Self::SourceUnavailable(_))
    }
}

fn join_failures(failures: &[ProbeError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Why a convergence poll stopped without converging
#[derive(Debug, Error)]
pub enum PollError<E> {
    /// The time budget elapsed before the predicate reported convergence
    #[error(
        "timed out after {elapsed:?} and {attempts} attempts waiting for the condition{}",
        .last_error.as_deref().map(|e| format!(" (last error: {e})")).unwrap_or_default()
    )]
    Timeout {
        attempts: u32,
        elapsed: Duration,
        last_error: Option<String>,
    },

    /// The predicate reported an error classified as fatal
    #[error("condition check failed on attempt {attempt}: {source}")]
    Predicate {
        attempt: u32,
        #[source]
        source: E,
    },

    /// The caller cancelled the poll
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl<E> PollError<E> {
    /// Whether the poll gave up waiting, as opposed to observing a hard failure
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the poll was cancelled by the caller
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Number of predicate evaluations performed before stopping
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Timeout { attempts, .. } | Self::Cancelled { attempts } => *attempts,
            Self::Predicate { attempt, .. } => *attempt,
        }
    }
}

/// Errors from a serving-certificate check
#[derive(Debug, Error)]
pub enum CertificateError {
    /// The TLS-inspecting client could not be constructed
    #[error("failed to build TLS client: {0}")]
    Client(#[source] reqwest::Error),

    /// The target URL is malformed
    #[error(transparent)]
    Target(#[from] ProbeError),

    /// The request failed before a certificate could be observed
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },
}

/// Render an error and all of its sources on one line.
///
/// reqwest wraps the interesting cause (DNS, refused, TLS) several levels
/// deep; the top-level message alone is rarely useful to an operator.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_message = cause.to_string();
        if !message.contains(&cause_message) {
            message.push_str(": ");
            message.push_str(&cause_message);
        }
        source = cause.source();
    }
    message
}
