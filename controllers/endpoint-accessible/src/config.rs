//! Controller configuration.
//!
//! All settings come from environment variables and are read once at startup.

use crate::error::ControllerError;
use endpoint_check::{DEFAULT_MAX_CONCURRENT_PROBES, ProbeConfig};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_NAMESPACE: &str = "default";

/// Upper bound for every `*_SECONDS` setting (one week)
const MAX_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Which Ingress objects publish the endpoints to check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressSelection {
    /// Named Ingresses, checked in this order
    Names(Vec<String>),
    /// Every Ingress matching a label selector
    LabelSelector(String),
}

impl std::fmt::Display for IngressSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Names(names) => write!(f, "names [{}]", names.join(", ")),
            Self::LabelSelector(selector) => write!(f, "selector '{selector}'"),
        }
    }
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Namespace of the Ingress objects
    pub namespace: String,
    /// Which Ingresses publish the endpoints
    pub selection: IngressSelection,
    /// Time between reachability passes
    pub sync_interval: Duration,
    /// Per-request probe timeout
    pub probe_timeout: Duration,
    /// Probe fan-out bound, at least 1
    pub max_concurrent_probes: usize,
    /// Skip TLS verification for probes
    pub accept_invalid_certs: bool,
    /// Zero disables the startup wait
    pub startup_wait: Duration,
    /// Poll interval of the startup wait
    pub startup_poll_interval: Duration,
    /// Status and metrics listener
    pub listen_addr: SocketAddr,
    /// Pod that Events are recorded against
    pub pod_name: Option<String>,
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, treating blank values as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let selection = match (get("INGRESS_NAMES"), get("INGRESS_LABEL_SELECTOR")) {
            (Some(names), None) => {
                let names: Vec<String> = names
                    .split(',')
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(String::from)
                    .collect();
                if names.is_empty() {
                    return Err(ControllerError::InvalidConfig(
                        "INGRESS_NAMES must name at least one Ingress".to_string(),
                    ));
                }
                IngressSelection::Names(names)
            }
            (None, Some(selector)) => IngressSelection::LabelSelector(selector),
            (Some(_), Some(_)) => {
                return Err(ControllerError::InvalidConfig(
                    "INGRESS_NAMES and INGRESS_LABEL_SELECTOR are mutually exclusive".to_string(),
                ));
            }
            (None, None) => {
                return Err(ControllerError::InvalidConfig(
                    "one of INGRESS_NAMES or INGRESS_LABEL_SELECTOR is required".to_string(),
                ));
            }
        };

        let max_concurrent_probes = parse_or(
            "MAX_CONCURRENT_PROBES",
            get("MAX_CONCURRENT_PROBES"),
            DEFAULT_MAX_CONCURRENT_PROBES,
        )?;
        if max_concurrent_probes == 0 {
            return Err(ControllerError::InvalidConfig(
                "MAX_CONCURRENT_PROBES must be at least 1".to_string(),
            ));
        }

        let sync_interval = seconds("SYNC_INTERVAL_SECONDS", get("SYNC_INTERVAL_SECONDS"), 60)?;
        let probe_timeout = seconds("PROBE_TIMEOUT_SECONDS", get("PROBE_TIMEOUT_SECONDS"), 10)?;
        let startup_poll_interval = seconds(
            "STARTUP_POLL_INTERVAL_SECONDS",
            get("STARTUP_POLL_INTERVAL_SECONDS"),
            5,
        )?;
        for (key, value) in [
            ("SYNC_INTERVAL_SECONDS", sync_interval),
            ("PROBE_TIMEOUT_SECONDS", probe_timeout),
            ("STARTUP_POLL_INTERVAL_SECONDS", startup_poll_interval),
        ] {
            if value.is_zero() {
                return Err(ControllerError::InvalidConfig(format!(
                    "{key} must be greater than zero"
                )));
            }
        }

        Ok(Self {
            namespace: get("WATCH_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            selection,
            sync_interval,
            probe_timeout,
            max_concurrent_probes,
            accept_invalid_certs: parse_or(
                "PROBE_ACCEPT_INVALID_CERTS",
                get("PROBE_ACCEPT_INVALID_CERTS"),
                false,
            )?,
            startup_wait: seconds("STARTUP_WAIT_SECONDS", get("STARTUP_WAIT_SECONDS"), 300)?,
            startup_poll_interval,
            listen_addr: parse_or(
                "LISTEN_ADDR",
                get("LISTEN_ADDR"),
                SocketAddr::from(([0, 0, 0, 0], 8080)),
            )?,
            pod_name: get("POD_NAME"),
        })
    }

    /// Settings for the HTTP prober
    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            timeout: self.probe_timeout,
            accept_invalid_certs: self.accept_invalid_certs,
            ..ProbeConfig::default()
        }
    }

    /// Log the effective configuration
    pub fn log(&self) {
        tracing::info!("Configuration:");
        tracing::info!("  Namespace: {}", self.namespace);
        tracing::info!("  Ingresses: {}", self.selection);
        tracing::info!("  Sync interval: {:?}", self.sync_interval);
        tracing::info!("  Probe timeout: {:?}", self.probe_timeout);
        tracing::info!("  Max concurrent probes: {}", self.max_concurrent_probes);
        tracing::info!("  Accept invalid certificates: {}", self.accept_invalid_certs);
        tracing::info!("  Startup wait: {:?}", self.startup_wait);
        tracing::info!("  Listen address: {}", self.listen_addr);
        tracing::info!(
            "  Event target pod: {}",
            self.pod_name.as_deref().unwrap_or("none (events disabled)")
        );
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e| {
            ControllerError::InvalidConfig(format!("{key}='{raw}' is invalid: {e}"))
        }),
    }
}

fn seconds(key: &str, raw: Option<String>, default: u64) -> Result<Duration, ControllerError> {
    let secs: u64 = parse_or(key, raw, default)?;
    if secs > MAX_SECONDS {
        return Err(ControllerError::InvalidConfig(format!(
            "{key}={secs} exceeds the maximum of {MAX_SECONDS} seconds"
        )));
    }
    Ok(Duration::from_secs(secs))
}
