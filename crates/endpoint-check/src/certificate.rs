//! Serving-certificate convergence check
//!
//! After rotating a serving certificate, the new one only becomes observable
//! once the router has reloaded. [`ServingCertificateCheck::is_served`] is a
//! convergence predicate for [`Poller`](crate::Poller): it connects without
//! verifying the chain, reads the leaf certificate the server presented and
//! compares it with the expected one.

use crate::error::{error_chain, CertificateError, ProbeError};
use crate::probe::validate_probe_url;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::debug;

/// Checks whether an HTTPS endpoint serves an expected leaf certificate.
#[derive(Debug, Clone)]
pub struct ServingCertificateCheck {
    client: Client,
    url: Url,
    expected_der: Vec<u8>,
}

impl ServingCertificateCheck {
    /// Create a check for `url`.
    ///
    /// # Arguments
    /// * `url` - `https` URL of the endpoint
    /// * `expected_der` - DER encoding of the certificate that should be served
    /// * `timeout` - per-request timeout
    pub fn new(
        url: &str,
        expected_der: impl Into<Vec<u8>>,
        timeout: Duration,
    ) -> Result<Self, CertificateError> {
        let url = validate_probe_url(url)?;
        if url.scheme() != "https" {
            return Err(ProbeError::MalformedTarget {
                url: url.to_string(),
                reason: "certificate checks require https".to_string(),
            }
            .into());
        }

        // The point is to observe whatever is served, trusted or not
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .tls_info(true)
            .build()
            .map_err(CertificateError::Client)?;

        Ok(Self {
            client,
            url,
            expected_der: expected_der.into(),
        })
    }

    /// URL being checked
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// `Ok(true)` once the expected certificate is served.
    ///
    /// A different or missing certificate is "not yet" (`Ok(false)`); request
    /// failures are returned so the caller's classifier can decide.
    pub async fn is_served(&self) -> Result<bool, CertificateError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| CertificateError::Request {
                url: self.url.to_string(),
                reason: error_chain(&e),
            })?;

        let peer = response
            .extensions()
            .get::<reqwest::tls::TlsInfo>()
            .and_then(|info| info.peer_certificate());

        let served = leaf_matches(peer, &self.expected_der);
        if !served {
            debug!(
                "{} is not serving the expected certificate yet (peer certificate present: {})",
                self.url,
                peer.is_some()
            );
        }
        Ok(served)
    }
}

/// Compare the presented leaf certificate with the expected one.
pub fn leaf_matches(peer: Option<&[u8]>, expected: &[u8]) -> bool {
    peer.is_some_and(|der| der == expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_matches() {
        let expected: &[u8] = &[0x30, 0x82, 0x01, 0x0a];
        assert!(leaf_matches(Some(expected), expected));
        assert!(!leaf_matches(Some(&[0x30, 0x82][..]), expected));
        assert!(!leaf_matches(None, expected));
    }

    #[test]
    fn test_new_rejects_plain_http() {
        let err = ServingCertificateCheck::new("http://oauth.example.com", vec![1, 2, 3], Duration::from_secs(5))
            .expect_err("plain http must be rejected");
        assert!(err.to_string().contains("require https"), "{err}");
    }

    #[test]
    fn test_new_rejects_malformed_url() {
        let err = ServingCertificateCheck::new("https://bad`host", vec![1], Duration::from_secs(5))
            .expect_err("malformed URL must be rejected");
        assert!(matches!(err, CertificateError::Target(ProbeError::MalformedTarget { .. })));
    }

    #[tokio::test]
    async fn test_is_served_reports_request_errors() {
        // Nothing listens on port 1
        let check = ServingCertificateCheck::new("https://127.0.0.1:1/", vec![1], Duration::from_secs(2))
            .expect("check should build");
        assert_eq!(check.url(), "https://127.0.0.1:1/");

        let err = check.is_served().await.expect_err("connection must fail");
        assert!(matches!(err, CertificateError::Request { .. }), "{err}");
    }
}
