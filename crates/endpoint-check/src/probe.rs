//! HTTP probes
//!
//! A probe is a single bounded GET against one health-check URL. The
//! [`Prober`] trait is the seam that lets the checker be tested without a
//! network; [`HttpProber`] is the reqwest-backed implementation.

use crate::error::{error_chain, ProbeError};
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::debug;

/// Characters that may never appear literally in a URL (RFC 3986 section 2).
const DISALLOWED_URL_CHARS: &[char] = &['"', '<', '>', '\\', '^', '`', '{', '|', '}'];

/// Probe client settings
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Upper bound for one request, connect included
    pub timeout: Duration,
    /// Skip TLS certificate verification (self-signed cluster endpoints)
    pub accept_invalid_certs: bool,
    /// User-Agent header sent with every probe
    pub user_agent: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            accept_invalid_certs: false,
            user_agent: concat!("endpoint-check/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Performs one reachability check.
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    /// Probe `url`, succeeding only on a 2xx response
    async fn probe(&self, url: &str) -> Result<(), ProbeError>;
}

#[async_trait::async_trait]
impl<P: Prober + ?Sized> Prober for std::sync::Arc<P> {
    async fn probe(&self, url: &str) -> Result<(), ProbeError> {
        (**self).probe(url).await
    }
}

/// reqwest-backed [`Prober`]
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
    timeout: Duration,
}

impl HttpProber {
    /// Create a new prober
    ///
    /// # Arguments
    /// * `config` - request timeout, TLS verification and User-Agent settings
    pub fn new(config: ProbeConfig) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .user_agent(config.user_agent)
            .build()
            .map_err(ProbeError::Client)?;

        Ok(Self {
            client,
            timeout: config.timeout,
        })
    }

    /// Per-request timeout this prober was built with
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait::async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str) -> Result<(), ProbeError> {
        let target = validate_probe_url(url)?;
        debug!("GET {}", target);

        let response = self.client.get(target).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::TimedOut {
                    url: url.to_string(),
                    timeout: self.timeout,
                }
            } else if e.is_builder() {
                ProbeError::MalformedTarget {
                    url: url.to_string(),
                    reason: error_chain(&e),
                }
            } else {
                ProbeError::Unreachable {
                    url: url.to_string(),
                    reason: error_chain(&e),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::UnhealthyStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        debug!("{} returned {}", url, status);
        Ok(())
    }
}

/// Parse and sanity-check a probe URL.
///
/// Rejects characters that are never valid in a URL (the WHATWG parser would
/// silently percent-encode them), non-HTTP schemes, URLs without a host and
/// URLs with a fragment. A fragment is never sent, so `https://a#b/healthz`
/// would check `https://a/` instead of the health endpoint.
pub fn validate_probe_url(raw: &str) -> Result<Url, ProbeError> {
    let malformed = |reason: String| ProbeError::MalformedTarget {
        url: raw.to_string(),
        reason,
    };

    if let Some((position, c)) = raw
        .char_indices()
        .find(|(_, c)| c.is_whitespace() || c.is_control() || DISALLOWED_URL_CHARS.contains(c))
    {
        return Err(malformed(format!("invalid character {c:?} at position {position}")));
    }

    let url = Url::parse(raw).map_err(|e| malformed(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(malformed(format!("unsupported scheme {:?}", url.scheme())));
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(malformed("missing host".to_string()));
    }

    if let Some(fragment) = url.fragment() {
        return Err(malformed(format!("unexpected fragment {fragment:?}")));
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_healthz_urls() {
        let url = validate_probe_url("https://oauth.example.com/healthz").expect("valid URL");
        assert_eq!(url.host_str(), Some("oauth.example.com"));
        assert_eq!(url.path(), "/healthz");

        let url = validate_probe_url("http://127.0.0.1:8080/healthz").expect("valid URL");
        assert_eq!(url.port(), Some(8080));
    }

    #[test]
    fn test_validate_rejects_backtick() {
        let err = validate_probe_url("https://htt//bad`string/healthz").expect_err("must reject");
        assert!(err.is_malformed());
        assert!(err.to_string().contains("invalid character '`'"), "{err}");
    }

    #[test]
    fn test_validate_rejects_missing_scheme() {
        let err = validate_probe_url("htt//bad-string").expect_err("must reject");
        assert!(err.is_malformed());
    }

    #[test]
    fn test_validate_rejects_non_http_scheme() {
        let err = validate_probe_url("ftp://files.example.com/healthz").expect_err("must reject");
        assert!(err.to_string().contains("unsupported scheme"), "{err}");
    }

    #[test]
    fn test_validate_rejects_whitespace() {
        let err = validate_probe_url("https://a b/healthz").expect_err("must reject");
        assert!(err.is_malformed());
    }

    #[test]
    fn test_validate_rejects_fragment() {
        let err = validate_probe_url("https://a#b/healthz").expect_err("must reject");
        assert!(err.is_malformed());
        assert!(err.to_string().contains("unexpected fragment \"b/healthz\""), "{err}");

        let err = validate_probe_url("https://a/healthz#").expect_err("must reject empty fragment");
        assert!(err.is_malformed());
    }

    #[tokio::test]
    async fn test_probe_malformed_never_dispatches() {
        let prober = HttpProber::new(ProbeConfig::default()).expect("client should build");
        let err = prober
            .probe("https://htt//bad`string/healthz")
            .await
            .expect_err("must fail");
        assert!(err.is_malformed(), "expected malformed, got {err}");
    }

    #[test]
    fn test_default_config() {
        let config = ProbeConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(!config.accept_invalid_certs);
        assert!(config.user_agent.starts_with("endpoint-check/"));
    }
}
