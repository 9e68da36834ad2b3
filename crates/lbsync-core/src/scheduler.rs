// ── Scheduler ──
//
// Drives reconciliation on a fixed period with single-flight semantics:
// a tick that fires while a cycle is still running is dropped, not
// queued. Cycles run on their own task so a long cycle never blocks
// tick handling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::CoreError;
use crate::metrics::MetricsSink;

/// One reconciliation attempt.
#[async_trait]
pub trait Reconcile: Send + Sync {
    async fn reconcile(&self) -> Result<(), CoreError>;
}

/// Periodic single-flight driver for a [`Reconcile`].
pub struct Scheduler {
    target: Arc<dyn Reconcile>,
    period: Duration,
    metrics: Arc<dyn MetricsSink>,
    in_progress: Arc<AtomicBool>,
}

/// Clears the in-progress flag when the cycle task ends, even on panic.
struct Flight(Arc<AtomicBool>);

impl Drop for Flight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Scheduler {
    pub fn new(
        target: Arc<dyn Reconcile>,
        period: Duration,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            target,
            period,
            metrics,
            in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Tick until `cancel` fires. The first cycle starts immediately.
    ///
    /// On cancellation, a cycle already in flight is awaited before
    /// returning.
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut current: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Some(handle) = self.try_start() {
                        current = Some(handle);
                    }
                }
            }
        }

        if let Some(handle) = current {
            debug!("waiting for in-flight reconciliation cycle");
            if let Err(e) = handle.await {
                error!(error = %e, "reconciliation task failed");
            }
        }
    }

    /// Start a cycle unless one is running.
    fn try_start(&self) -> Option<JoinHandle<()>> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("reconciliation still running, tick skipped");
            self.metrics.tick_skipped();
            return None;
        }

        let flight = Flight(Arc::clone(&self.in_progress));
        let target = Arc::clone(&self.target);
        let metrics = Arc::clone(&self.metrics);
        Some(tokio::spawn(async move {
            let _flight = flight;
            let started = Instant::now();
            let result = target.reconcile().await;
            metrics.cycle_finished(started.elapsed(), result.is_ok());
            if let Err(e) = result {
                warn!(error = %e, "reconciliation cycle failed");
            }
        }))
    }
}
