//! Startup wait for the configured Ingresses.
//!
//! The controller may start before the objects it watches have been created.
//! Instead of failing the first passes, it polls until every selected Ingress
//! exists and publishes at least one host.

use crate::error::{ControllerError, is_not_found};
use crate::source::{IngressEndpointSource, ingress_hosts};
use endpoint_check::{Converged, ErrorClass, PollSchedule, Poller};
use k8s_openapi::api::networking::v1::Ingress;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Classify Kubernetes errors for the startup wait: absent objects are retried
pub fn classify_kube_error(err: &kube::Error) -> ErrorClass {
    if is_not_found(err) {
        ErrorClass::Transient
    } else {
        ErrorClass::Fatal
    }
}

/// Whether the listed Ingresses are ready to be probed
pub fn ingresses_ready(ingresses: &[Ingress]) -> bool {
    !ingresses.is_empty()
        && ingresses
            .iter()
            .all(|ingress| !ingress_hosts(ingress).is_empty())
}

/// Wait until the source's Ingresses are ready.
///
/// A zero `budget` skips the wait.
pub async fn wait_for_ingresses(
    source: &IngressEndpointSource,
    interval: Duration,
    budget: Duration,
    cancel: &CancellationToken,
) -> Result<Option<Converged>, ControllerError> {
    wait_until_ready(move || source.ingresses(), interval, budget, cancel).await
}

/// Poll `list` until the Ingresses it returns are ready
async fn wait_until_ready<F, Fut>(
    mut list: F,
    interval: Duration,
    budget: Duration,
    cancel: &CancellationToken,
) -> Result<Option<Converged>, ControllerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<Ingress>, kube::Error>>,
{
    if budget.is_zero() {
        info!("Startup wait disabled");
        return Ok(None);
    }

    info!("Waiting up to {:?} for Ingresses to publish hosts", budget);
    let poller = Poller::new(PollSchedule::new(interval, budget)).with_classifier(classify_kube_error);
    let converged = poller
        .poll_until(cancel, || {
            let listed = list();
            async move { listed.await.map(|ingresses| ingresses_ready(&ingresses)) }
        })
        .await?;

    info!(
        "Ingresses ready after {} attempts ({:?})",
        converged.attempts, converged.elapsed
    );
    Ok(Some(converged))
}
