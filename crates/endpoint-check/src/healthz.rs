//! Health-check URL derivation
//!
//! Endpoint sources hand out authorities (hostnames, optionally with a port),
//! not URLs. These helpers turn them into the canonical `/healthz` probe URL.
//! They concatenate only: validating the result is the prober's job.

/// Canonical probe URL for one endpoint authority.
pub fn to_healthz_url(endpoint: &str) -> String {
    format!("https://{endpoint}/healthz")
}

/// Derive probe URLs element-wise.
///
/// The output has the same length and order as the input; duplicates are kept
/// so callers can rely on index correspondence for diagnostics.
pub fn to_healthz_urls<S: AsRef<str>>(endpoints: &[S]) -> Vec<String> {
    endpoints
        .iter()
        .map(|endpoint| to_healthz_url(endpoint.as_ref()))
        .collect()
}

/// Resolve what the checker actually probes for one source entry.
///
/// Entries that are already absolute `http`/`https` URLs are probed as given;
/// everything else is treated as an authority and derived with
/// [`to_healthz_url`].
pub fn probe_target(endpoint: &str) -> String {
    if has_http_scheme(endpoint) {
        endpoint.to_string()
    } else {
        to_healthz_url(endpoint)
    }
}

fn has_http_scheme(endpoint: &str) -> bool {
    let lower = endpoint.to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://")
}
