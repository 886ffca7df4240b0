//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the Ingress source,
//! the HTTP prober and the status server together and drives the reconcile
//! loop until shutdown.

use crate::config::Config;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::server::{self, ServerState};
use crate::source::IngressEndpointSource;
use crate::startup::wait_for_ingresses;
use crate::status::SyncStatus;
use crate::trigger::{IntervalTrigger, ReconcileTrigger};
use chrono::Utc;
use endpoint_check::{EndpointAccessibleChecker, EndpointSource, HttpProber, Prober, SyncError};
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::api::networking::v1::Ingress;
use kube::{Api, Client};
use kube_runtime::events::{Event, EventType, Recorder, Reporter};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Name reported by the checker and as the Event reporter
pub const CONTROLLER_NAME: &str = "endpoint-accessible-controller";

/// Kubernetes limits Event notes to 1 KiB
const MAX_EVENT_NOTE_BYTES: usize = 1024;

/// Receives degraded-state transitions
#[async_trait::async_trait]
pub trait TransitionNotifier: Send + Sync {
    /// Called when `current` flips the degraded state
    async fn notify(&self, current: &SyncStatus);
}

/// Records transitions as Kubernetes Events against the controller's Pod
pub struct EventNotifier {
    recorder: Recorder,
    reference: ObjectReference,
}

impl EventNotifier {
    /// Creates a notifier recording against `pod_name` in `namespace`.
    pub fn new(client: Client, namespace: &str, pod_name: &str) -> Self {
        let reporter = Reporter {
            controller: CONTROLLER_NAME.to_string(),
            instance: Some(pod_name.to_string()),
        };
        let reference = ObjectReference {
            api_version: Some("v1".to_string()),
            kind: Some("Pod".to_string()),
            name: Some(pod_name.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectReference::default()
        };
        Self {
            recorder: Recorder::new(client, reporter),
            reference,
        }
    }
}

#[async_trait::async_trait]
impl TransitionNotifier for EventNotifier {
    async fn notify(&self, current: &SyncStatus) {
        let (type_, note) = if current.degraded {
            (
                EventType::Warning,
                current.message.clone().unwrap_or_else(|| current.reason.clone()),
            )
        } else {
            (
                EventType::Normal,
                format!("all {} endpoints are reachable", current.endpoints.len()),
            )
        };

        let event = Event {
            type_,
            reason: current.reason.clone(),
            note: Some(truncate_note(note)),
            action: "ProbeEndpoints".to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, &self.reference).await {
            warn!("Failed to record {} event: {}", current.reason, e);
        }
    }
}

impl std::fmt::Debug for EventNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventNotifier")
            .field("reference", &self.reference)
            .finish_non_exhaustive()
    }
}

fn truncate_note(mut note: String) -> String {
    if note.len() > MAX_EVENT_NOTE_BYTES {
        let mut end = MAX_EVENT_NOTE_BYTES;
        while !note.is_char_boundary(end) {
            end -= 1;
        }
        note.truncate(end);
    }
    note
}

/// Run one reachability pass and publish its status.
///
/// Returns `false` when the pass was cancelled; nothing is published then.
pub async fn reconcile_once<S, P>(
    checker: &EndpointAccessibleChecker<S, P>,
    status_tx: &watch::Sender<Option<SyncStatus>>,
    metrics: &Metrics,
    notifier: Option<&dyn TransitionNotifier>,
    cancel: &CancellationToken,
) -> bool
where
    S: EndpointSource,
    P: Prober,
{
    let pass = checker.check(cancel).await;
    if matches!(pass, Err(SyncError::Cancelled)) {
        debug!("Reachability pass cancelled");
        return false;
    }

    metrics.observe(&pass);

    let previous = status_tx.borrow().clone();
    let status = SyncStatus::from_pass(pass, Utc::now(), previous.as_ref());
    let transitioned = status.is_transition_from(previous.as_ref());

    if status.degraded {
        warn!(
            "{} degraded ({}, {} of {} endpoints failing): {}",
            checker.name(),
            status.reason,
            status.failed_endpoints(),
            status.endpoints.len(),
            status.message.as_deref().unwrap_or_default()
        );
    } else {
        info!(
            "{}: all {} endpoints reachable",
            checker.name(),
            status.endpoints.len()
        );
    }

    if transitioned {
        info!(
            "{} transitioned to {}",
            checker.name(),
            if status.degraded { "degraded" } else { "available" }
        );
        if let Some(notifier) = notifier {
            notifier.notify(&status).await;
        }
    }

    status_tx.send_replace(Some(status));
    true
}

/// Run passes on every trigger until cancelled
pub async fn reconcile_loop<S, P, T>(
    checker: &EndpointAccessibleChecker<S, P>,
    trigger: &mut T,
    status_tx: &watch::Sender<Option<SyncStatus>>,
    metrics: &Metrics,
    notifier: Option<&dyn TransitionNotifier>,
    cancel: &CancellationToken,
) where
    S: EndpointSource,
    P: Prober,
    T: ReconcileTrigger,
{
    while trigger.next(cancel).await {
        if !reconcile_once(checker, status_tx, metrics, notifier, cancel).await {
            break;
        }
    }
    info!("Reconcile loop stopped");
}

/// Main controller for endpoint accessibility.
pub struct Controller {
    config: Config,
    client: Client,
    metrics: Metrics,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing endpoint accessibility controller");

        let client = Client::try_default().await?;
        let metrics = Metrics::new()?;

        Ok(Self {
            config,
            client,
            metrics,
        })
    }

    /// Runs the controller until a shutdown signal is received.
    pub async fn run(self) -> Result<(), ControllerError> {
        let Self {
            config,
            client,
            metrics,
        } = self;

        let cancel = CancellationToken::new();
        tokio::spawn(shutdown_on_signal(cancel.clone()));

        let (status_tx, status_rx) = watch::channel(None);
        let server = tokio::spawn(server::serve(
            config.listen_addr,
            ServerState {
                status: status_rx,
                metrics: metrics.clone(),
            },
            cancel.clone(),
        ));

        let work = reconcile_until_shutdown(&config, client, &status_tx, &metrics, &cancel);
        supervise(server, work, &cancel).await
    }
}

/// Wait for the Ingresses, then reconcile until `cancel` fires
async fn reconcile_until_shutdown(
    config: &Config,
    client: Client,
    status_tx: &watch::Sender<Option<SyncStatus>>,
    metrics: &Metrics,
    cancel: &CancellationToken,
) -> Result<(), ControllerError> {
    let api: Api<Ingress> = Api::namespaced(client.clone(), &config.namespace);
    let source = IngressEndpointSource::new(api, config.selection.clone());

    match wait_for_ingresses(
        &source,
        config.startup_poll_interval,
        config.startup_wait,
        cancel,
    )
    .await
    {
        Ok(_) => {}
        Err(ControllerError::Startup(e)) if e.is_cancelled() => {
            info!("Shutdown requested during startup wait");
            return Ok(());
        }
        Err(e) => {
            error!("Configured Ingresses never became available: {}", e);
            return Err(e);
        }
    }

    let prober = HttpProber::new(config.probe_config())?;
    let checker = EndpointAccessibleChecker::new(CONTROLLER_NAME, source, prober)
        .with_max_concurrent_probes(config.max_concurrent_probes);

    let notifier = config
        .pod_name
        .as_deref()
        .map(|pod| EventNotifier::new(client.clone(), &config.namespace, pod));

    let mut trigger = IntervalTrigger::new(config.sync_interval);
    info!("Starting reconcile loop every {:?}", config.sync_interval);
    reconcile_loop(
        &checker,
        &mut trigger,
        status_tx,
        metrics,
        notifier.as_ref().map(|n| n as &dyn TransitionNotifier),
        cancel,
    )
    .await;

    Ok(())
}

/// Drive `work` alongside the status server task.
///
/// Whichever side finishes first requests shutdown and the other is awaited.
/// A server that exits before shutdown was requested fails the run.
async fn supervise<W>(
    mut server: JoinHandle<Result<(), ControllerError>>,
    work: W,
    cancel: &CancellationToken,
) -> Result<(), ControllerError>
where
    W: Future<Output = Result<(), ControllerError>>,
{
    tokio::pin!(work);

    tokio::select! {
        joined = &mut server => {
            let stopped_early = !cancel.is_cancelled();
            cancel.cancel();
            let served = server_outcome(joined);
            if !stopped_early {
                return work.await.and(served);
            }

            let err = served.err().unwrap_or(ControllerError::ServerStopped);
            error!("Status server exited, shutting down: {}", err);
            if let Err(e) = work.await {
                warn!("Reconcile loop failed during shutdown: {}", e);
            }
            Err(err)
        }
        worked = &mut work => {
            cancel.cancel();
            let served = server_outcome(server.await);
            if let Err(e) = &served {
                error!("Status server failed: {}", e);
            }
            worked.and(served)
        }
    }
}

fn server_outcome(joined: Result<Result<(), ControllerError>, JoinError>) -> Result<(), ControllerError> {
    joined?
}

async fn shutdown_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        () = terminate => {}
        () = cancel.cancelled() => return,
    }

    info!("Shutdown signal received");
    cancel.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use endpoint_check::{CountingSource, MockProber};
    use std::sync::Mutex;

    /// Fires a fixed number of times
    struct CountedTrigger(usize);

    #[async_trait::async_trait]
    impl ReconcileTrigger for CountedTrigger {
        async fn next(&mut self, _cancel: &CancellationToken) -> bool {
            if self.0 == 0 {
                return false;
            }
            self.0 -= 1;
            true
        }
    }

    #[derive(Default)]
    struct RecordingNotifier(Mutex<Vec<(bool, String)>>);

    #[async_trait::async_trait]
    impl TransitionNotifier for RecordingNotifier {
        async fn notify(&self, current: &SyncStatus) {
            if let Ok(mut seen) = self.0.lock() {
                seen.push((current.degraded, current.reason.clone()));
            }
        }
    }

    impl RecordingNotifier {
        fn seen(&self) -> Vec<(bool, String)> {
            self.0.lock().map(|s| s.clone()).unwrap_or_default()
        }
    }

    #[tokio::test]
    async fn test_healthy_pass_publishes_status() {
        let checker = EndpointAccessibleChecker::new(
            "test",
            CountingSource::ok(["a.example.com"]),
            MockProber::healthy(),
        );
        let (tx, rx) = watch::channel(None);
        let metrics = Metrics::new().expect("metrics register");
        let notifier = RecordingNotifier::default();

        assert!(reconcile_once(&checker, &tx, &metrics, Some(&notifier), &CancellationToken::new()).await);

        let status = rx.borrow().clone().expect("status published");
        assert!(!status.degraded);
        assert_eq!(status.endpoints.len(), 1);
        assert_eq!(status.endpoints[0].url, "https://a.example.com/healthz");
        // Starting healthy is not a transition
        assert!(notifier.seen().is_empty());
    }

    #[tokio::test]
    async fn test_transitions_are_notified_once() {
        let prober = MockProber::healthy().with_unreachable("https://b.example.com/healthz");
        let checker = EndpointAccessibleChecker::new(
            "test",
            CountingSource::ok(["a.example.com", "b.example.com"]),
            prober,
        );
        let (tx, rx) = watch::channel(None);
        let metrics = Metrics::new().expect("metrics register");
        let notifier = RecordingNotifier::default();
        let mut trigger = CountedTrigger(3);

        reconcile_loop(
            &checker,
            &mut trigger,
            &tx,
            &metrics,
            Some(&notifier),
            &CancellationToken::new(),
        )
        .await;

        let status = rx.borrow().clone().expect("status published");
        assert!(status.degraded);
        assert_eq!(status.failed_endpoints(), 1);
        assert!(
            status
                .message
                .as_deref()
                .unwrap_or_default()
                .contains("https://b.example.com/healthz")
        );
        assert_eq!(notifier.seen(), vec![(true, "EndpointUnreachable".to_string())]);
    }

    #[tokio::test]
    async fn test_source_failure_degrades() {
        let source = CountingSource::failing("ingress lister unavailable");
        let prober = MockProber::healthy();
        let checker = EndpointAccessibleChecker::new("test", source.clone(), prober.clone());
        let (tx, rx) = watch::channel(None);
        let metrics = Metrics::new().expect("metrics register");

        assert!(reconcile_once(&checker, &tx, &metrics, None, &CancellationToken::new()).await);

        let status = rx.borrow().clone().expect("status published");
        assert!(status.degraded);
        assert_eq!(status.reason, "EndpointSourceUnavailable");
        assert_eq!(source.calls(), 1);
        assert_eq!(prober.probe_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_pass_publishes_nothing() {
        let checker = EndpointAccessibleChecker::new(
            "test",
            CountingSource::ok(["a.example.com"]),
            MockProber::healthy(),
        );
        let (tx, rx) = watch::channel(None);
        let metrics = Metrics::new().expect("metrics register");
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(!reconcile_once(&checker, &tx, &metrics, None, &cancel).await);
        assert!(rx.borrow().is_none());
    }

    #[tokio::test]
    async fn test_loop_runs_once_per_trigger() {
        let source = CountingSource::ok(["a.example.com"]);
        let checker = EndpointAccessibleChecker::new("test", source.clone(), MockProber::healthy());
        let (tx, _rx) = watch::channel(None);
        let metrics = Metrics::new().expect("metrics register");
        let mut trigger = CountedTrigger(4);

        reconcile_loop(&checker, &mut trigger, &tx, &metrics, None, &CancellationToken::new()).await;

        assert_eq!(source.calls(), 4);
    }

    #[test]
    fn test_truncate_note_respects_char_boundaries() {
        let short = "endpoint down".to_string();
        assert_eq!(truncate_note(short.clone()), short);

        let long = "é".repeat(MAX_EVENT_NOTE_BYTES);
        let truncated = truncate_note(long);
        assert!(truncated.len() <= MAX_EVENT_NOTE_BYTES);
        assert!(truncated.chars().all(|c| c == 'é'));
    }

    fn until_cancelled(
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(), ControllerError>> + Send + 'static {
        let cancel = cancel.clone();
        async move {
            cancel.cancelled().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_bind_failure_stops_run_immediately() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = taken.local_addr().expect("local addr");
        let cancel = CancellationToken::new();
        let (_tx, rx) = watch::channel(None);
        let state = ServerState {
            status: rx,
            metrics: Metrics::new().expect("metrics register"),
        };
        let server = tokio::spawn(server::serve(addr, state, cancel.clone()));

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            supervise(server, until_cancelled(&cancel), &cancel),
        )
        .await
        .expect("run ends without an external shutdown");

        assert!(matches!(result, Err(ControllerError::Server(_))), "{result:?}");
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_aborted_server_task_is_an_error() {
        let cancel = CancellationToken::new();
        let server = tokio::spawn(std::future::pending::<Result<(), ControllerError>>());
        server.abort();

        let result = supervise(server, until_cancelled(&cancel), &cancel).await;

        assert!(matches!(result, Err(ControllerError::ServerTask(_))), "{result:?}");
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_server_returning_early_is_an_error() {
        let cancel = CancellationToken::new();
        let server = tokio::spawn(async { Ok::<(), ControllerError>(()) });

        let result = supervise(server, until_cancelled(&cancel), &cancel).await;

        assert!(matches!(result, Err(ControllerError::ServerStopped)), "{result:?}");
    }

    #[tokio::test]
    async fn test_finished_work_shuts_server_down() {
        let cancel = CancellationToken::new();
        let server = tokio::spawn(until_cancelled(&cancel));

        let result = supervise(server, async { Ok(()) }, &cancel).await;

        assert!(result.is_ok(), "{result:?}");
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_work_error_is_returned() {
        let cancel = CancellationToken::new();
        let server = tokio::spawn(until_cancelled(&cancel));

        let result = supervise(
            server,
            async { Err(ControllerError::InvalidConfig("no ingress".to_string())) },
            &cancel,
        )
        .await;

        assert!(matches!(result, Err(ControllerError::InvalidConfig(_))), "{result:?}");
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_requested_shutdown_is_clean() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let server = tokio::spawn(until_cancelled(&cancel));

        let result = supervise(server, until_cancelled(&cancel), &cancel).await;

        assert!(result.is_ok(), "{result:?}");
    }
}
