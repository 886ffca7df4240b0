//! Reconcile triggers.
//!
//! A trigger decides when the next reachability pass runs. The controller
//! only needs a fixed cadence today; the trait keeps the loop independent of
//! where wake-ups come from.

use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Source of reconcile wake-ups
#[async_trait::async_trait]
pub trait ReconcileTrigger: Send {
    /// Wait for the next wake-up.
    ///
    /// Returns `false` once `cancel` fires.
    async fn next(&mut self, cancel: &CancellationToken) -> bool;
}

/// Fires immediately, then once per interval
#[derive(Debug)]
pub struct IntervalTrigger {
    interval: Interval,
}

impl IntervalTrigger {
    /// Creates a trigger with the given period. The first tick is immediate.
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        // A slow pass pushes the schedule back instead of bursting
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait::async_trait]
impl ReconcileTrigger for IntervalTrigger {
    async fn next(&mut self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            _ = self.interval.tick() => true,
        }
    }
}
