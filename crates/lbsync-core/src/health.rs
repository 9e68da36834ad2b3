// ── Backend health poller ──
//
// Read-only side channel: polls the cloud's view of backend health on
// its own period and publishes one gauge per backend. Never writes to the
// listener store or enters the reconciliation path.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cloud::CloudAdapter;
use crate::error::CoreError;
use crate::metrics::MetricsSink;

pub struct HealthPoller {
    adapter: Arc<dyn CloudAdapter>,
    lb_id: String,
    period: Duration,
    metrics: Arc<dyn MetricsSink>,
    first_cycle: Option<watch::Receiver<Option<DateTime<Utc>>>>,
}

impl HealthPoller {
    pub fn new(
        adapter: Arc<dyn CloudAdapter>,
        lb_id: impl Into<String>,
        period: Duration,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            adapter,
            lb_id: lb_id.into(),
            period,
            metrics,
            first_cycle: None,
        }
    }

    /// Hold off polling until `cycles` reports a finished reconciliation
    /// cycle. Fed from [`ListenerStore::subscribe_last_cycle`].
    ///
    /// [`ListenerStore::subscribe_last_cycle`]: crate::ListenerStore::subscribe_last_cycle
    #[must_use]
    pub fn with_cycle_signal(mut self, cycles: watch::Receiver<Option<DateTime<Utc>>>) -> Self {
        self.first_cycle = Some(cycles);
        self
    }

    /// Poll once and publish the results. Returns the number of
    /// unhealthy backends.
    pub async fn poll(&self) -> Result<usize, CoreError> {
        let report = self.adapter.describe_backend_health(&self.lb_id).await?;
        let mut unhealthy = 0;
        for entry in &report {
            if !entry.healthy {
                unhealthy += 1;
            }
            self.metrics
                .backend_health(&entry.listener_label(), &entry.backend_label(), entry.healthy);
        }
        debug!(backends = report.len(), unhealthy, "backend health polled");
        Ok(unhealthy)
    }

    /// Poll until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        if let Some(mut cycles) = self.first_cycle.take() {
            let first = async { cycles.wait_for(Option::is_some).await.is_ok() };
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                ready = first => {
                    if !ready {
                        debug!("listener store closed before the first cycle");
                        return;
                    }
                }
            }
            debug!("first cycle finished, starting backend health polls");
        }

        let mut interval = tokio::time::interval(self.period);
        interval.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.poll().await {
                        warn!(error = %e, "backend health poll failed");
                    }
                }
            }
        }
    }
}
