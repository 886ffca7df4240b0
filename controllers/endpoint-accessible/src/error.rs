//! Controller-specific error types.
//!
//! This module defines the errors of the endpoint accessibility controller
//! that are not covered by the `endpoint-check` library.

use endpoint_check::{PollError, ProbeError};
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the endpoint accessibility controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// The probe client could not be built
    #[error("Probe client error: {0}")]
    Probe(#[from] ProbeError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured Ingresses never became available
    #[error("Startup wait failed: {0}")]
    Startup(#[from] PollError<KubeError>),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Status server failed to bind or exited abnormally
    #[error("Status server error: {0}")]
    Server(#[from] std::io::Error),

    /// Status server task panicked or was aborted
    #[error("Status server task failed: {0}")]
    ServerTask(#[from] tokio::task::JoinError),

    /// Status server returned before shutdown was requested
    #[error("Status server stopped before shutdown was requested")]
    ServerStopped,
}

/// Whether a Kubernetes error means the object does not exist (yet)
pub fn is_not_found(err: &KubeError) -> bool {
    matches!(err, KubeError::Api(resp) if resp.code == 404)
}
