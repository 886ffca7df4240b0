//! Bounded convergence polling
//!
//! Control-plane writes are not immediately visible to every reader. After
//! making a write, callers verify it with a predicate ("does the Ingress carry
//! the new host?", "is the new certificate being served?") and poll it until it
//! holds or a time budget runs out.
//!
//! Schedule: the first evaluation happens immediately, subsequent ones one
//! `interval` apart. The sleep before the last evaluation is clamped to the
//! remaining budget, so a poll never overruns its timeout by more than one
//! predicate evaluation. A predicate already in flight is not preempted by the
//! timeout, only by cancellation.
//!
//! Which predicate errors mean "not observable yet" and which mean "give up"
//! is decided by an explicit [`ErrorClassifier`] per call site.

use crate::error::PollError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Interval and time budget for one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Wait between evaluations
    pub interval: Duration,
    /// Total budget, measured from the first evaluation
    pub timeout: Duration,
}

impl PollSchedule {
    /// Create a schedule
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// How the poller treats a predicate error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Not converged yet: retry on the next tick
    Transient,
    /// Authoritative failure: abort immediately
    Fatal,
}

/// Decides whether a predicate error is transient or fatal.
pub trait ErrorClassifier<E>: Send + Sync {
    /// Classify `err`
    fn classify(&self, err: &E) -> ErrorClass;
}

impl<E, F> ErrorClassifier<E> for F
where
    F: Fn(&E) -> ErrorClass + Send + Sync,
{
    fn classify(&self, err: &E) -> ErrorClass {
        self(err)
    }
}

/// Every predicate error aborts the poll.
#[derive(Debug, Clone, Copy, Default)]
pub struct FatalErrors;

impl<E> ErrorClassifier<E> for FatalErrors {
    fn classify(&self, _err: &E) -> ErrorClass {
        ErrorClass::Fatal
    }
}

/// Every predicate error is retried until the budget runs out.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransientErrors;

impl<E> ErrorClassifier<E> for TransientErrors {
    fn classify(&self, _err: &E) -> ErrorClass {
        ErrorClass::Transient
    }
}

/// Successful poll statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Converged {
    /// Number of predicate evaluations, including the successful one
    pub attempts: u32,
    /// Time from the first evaluation to convergence
    pub elapsed: Duration,
}

/// Reusable poll loop, parameterized by its error classification.
#[derive(Debug, Clone)]
pub struct Poller<C = FatalErrors> {
    schedule: PollSchedule,
    classifier: C,
}

impl Poller<FatalErrors> {
    /// Poller that treats every predicate error as fatal
    pub fn new(schedule: PollSchedule) -> Self {
        Self {
            schedule,
            classifier: FatalErrors,
        }
    }
}

impl<C> Poller<C> {
    /// Replace the error classification
    pub fn with_classifier<C2>(self, classifier: C2) -> Poller<C2> {
        Poller {
            schedule: self.schedule,
            classifier,
        }
    }

    /// Schedule this poller runs on
    pub fn schedule(&self) -> PollSchedule {
        self.schedule
    }

    /// Evaluate `predicate` until it returns `Ok(true)`.
    ///
    /// Returns [`PollError::Timeout`] once the budget is spent,
    /// [`PollError::Predicate`] on the first fatal error and
    /// [`PollError::Cancelled`] when `cancel` fires (an in-flight evaluation
    /// is dropped).
    pub async fn poll_until<F, Fut, E>(
        &self,
        cancel: &CancellationToken,
        mut predicate: F,
    ) -> Result<Converged, PollError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, E>>,
        E: std::fmt::Display,
        C: ErrorClassifier<E>,
    {
        let PollSchedule { interval, timeout } = self.schedule;
        let started = Instant::now();
        // None: the budget is past the clock's range, so never time out
        let deadline = started.checked_add(timeout);
        let mut attempts: u32 = 0;
        let mut last_error: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(PollError::Cancelled { attempts });
            }

            attempts = attempts.saturating_add(1);
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(PollError::Cancelled { attempts }),
                result = predicate() => result,
            };

            match result {
                Ok(true) => {
                    let elapsed = started.elapsed();
                    debug!("Condition met after {} attempts ({:?})", attempts, elapsed);
                    return Ok(Converged { attempts, elapsed });
                }
                Ok(false) => {
                    debug!("Condition not met yet (attempt {})", attempts);
                }
                Err(e) => match self.classifier.classify(&e) {
                    ErrorClass::Transient => {
                        debug!("Transient error on attempt {}, retrying: {}", attempts, e);
                        last_error = Some(e.to_string());
                    }
                    ErrorClass::Fatal => {
                        return Err(PollError::Predicate {
                            attempt: attempts,
                            source: e,
                        });
                    }
                },
            }

            let now = Instant::now();
            if deadline.is_some_and(|deadline| now >= deadline) {
                return Err(PollError::Timeout {
                    attempts,
                    elapsed: now.saturating_duration_since(started),
                    last_error,
                });
            }

            let wait = deadline.map_or(interval, |deadline| {
                interval.min(deadline.saturating_duration_since(now))
            });
            tokio::select! {
                _ = cancel.cancelled() => return Err(PollError::Cancelled { attempts }),
                _ = tokio::time::sleep(wait) => {}
            }

            if wait < interval {
                // Slept up to the deadline; another evaluation would overrun it
                return Err(PollError::Timeout {
                    attempts,
                    elapsed: started.elapsed(),
                    last_error,
                });
            }
        }
    }
}

/// Poll `predicate` on `schedule`, treating every error as fatal.
///
/// Shorthand for `Poller::new(schedule).poll_until(cancel, predicate)`.
pub async fn poll_until_converged<F, Fut, E>(
    schedule: PollSchedule,
    cancel: &CancellationToken,
    predicate: F,
) -> Result<Converged, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::fmt::Display,
{
    Poller::new(schedule).poll_until(cancel, predicate).await
}
