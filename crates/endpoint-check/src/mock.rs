//! Mock source and prober for unit testing
//!
//! These stand in for Kubernetes lookups and real HTTP probes so reconcilers
//! can be tested without a cluster or a network. Both are cheap to clone and
//! share their counters between clones, so a test can keep a handle after
//! moving the mock into a checker.

use crate::error::{ProbeError, SourceError};
use crate::probe::Prober;
use crate::source::EndpointSource;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Canned failure for one URL
#[derive(Debug, Clone)]
enum MockFailure {
    Malformed,
    Unreachable,
    Status(u16),
}

/// Mock [`Prober`] that records every URL it was asked to probe.
///
/// URLs without a configured failure succeed.
#[derive(Debug, Clone, Default)]
pub struct MockProber {
    failures: Arc<Mutex<HashMap<String, MockFailure>>>,
    probed: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
}

impl MockProber {
    /// A prober for which every URL is healthy
    pub fn healthy() -> Self {
        Self::default()
    }

    /// Make `url` fail as unreachable
    #[must_use]
    pub fn with_unreachable(self, url: impl Into<String>) -> Self {
        self.with_failure(url, MockFailure::Unreachable)
    }

    /// Make `url` fail as malformed
    #[must_use]
    pub fn with_malformed(self, url: impl Into<String>) -> Self {
        self.with_failure(url, MockFailure::Malformed)
    }

    /// Make `url` answer with `status`
    #[must_use]
    pub fn with_status(self, url: impl Into<String>, status: u16) -> Self {
        self.with_failure(url, MockFailure::Status(status))
    }

    /// Sleep for `delay` inside every probe
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn with_failure(self, url: impl Into<String>, failure: MockFailure) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(url.into(), failure);
        }
        self
    }

    /// URLs probed so far, in call order
    pub fn probed_urls(&self) -> Vec<String> {
        self.probed.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Number of probes performed so far
    pub fn probe_count(&self) -> usize {
        self.probed.lock().map(|p| p.len()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Prober for MockProber {
    async fn probe(&self, url: &str) -> Result<(), ProbeError> {
        if let Ok(mut probed) = self.probed.lock() {
            probed.push(url.to_string());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self
            .failures
            .lock()
            .ok()
            .and_then(|failures| failures.get(url).cloned());

        match failure {
            None => Ok(()),
            Some(MockFailure::Malformed) => Err(ProbeError::MalformedTarget {
                url: url.to_string(),
                reason: "mock malformed URL".to_string(),
            }),
            Some(MockFailure::Unreachable) => Err(ProbeError::Unreachable {
                url: url.to_string(),
                reason: "mock connection refused".to_string(),
            }),
            Some(MockFailure::Status(status)) => Err(ProbeError::UnhealthyStatus {
                url: url.to_string(),
                status,
            }),
        }
    }
}

/// Mock [`EndpointSource`] that counts how often it was listed.
#[derive(Debug, Clone)]
pub struct CountingSource {
    response: Result<Vec<String>, String>,
    calls: Arc<AtomicUsize>,
}

impl CountingSource {
    /// A source returning `endpoints` on every call
    pub fn ok<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            response: Ok(endpoints.into_iter().map(Into::into).collect()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A source failing with `message` on every call
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            response: Err(message.into()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of times the source was listed
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl EndpointSource for CountingSource {
    async fn endpoints(&self) -> Result<Vec<String>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone().map_err(SourceError::from)
    }
}
