// ── Metrics sink ──
//
// Components report through an injected `MetricsSink` instead of a
// process-wide registry. `PrometheusMetrics` forwards to the `metrics`
// facade (the binary installs the Prometheus recorder); `NoopMetrics`
// discards everything.

use std::time::Duration;

use metrics::{counter, gauge, histogram};
use strum::{Display, IntoStaticStr};

/// What a reconciliation step did to one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ApplyAction {
    Add,
    Update,
    Delete,
}

/// Receives observations from the updater, adapters, scheduler and
/// health poller.
pub trait MetricsSink: Send + Sync {
    /// One cloud API call finished (after retries).
    fn cloud_call(&self, operation: &str, ok: bool);

    /// A cloud call was rejected and will be retried; `reason` is the
    /// retry class (`rate_limited`, `busy`).
    fn cloud_retry(&self, operation: &str, reason: &'static str);

    /// One listener was added, updated or deleted.
    fn listener_applied(&self, action: ApplyAction, ok: bool);

    /// A reconciliation cycle finished.
    fn cycle_finished(&self, elapsed: Duration, ok: bool);

    /// A tick fired while the previous cycle was still running.
    fn tick_skipped(&self);

    /// Latest health of one backend behind one listener.
    fn backend_health(&self, listener: &str, backend: &str, healthy: bool);
}

/// Discards all observations.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn cloud_call(&self, _operation: &str, _ok: bool) {}
    fn cloud_retry(&self, _operation: &str, _reason: &'static str) {}
    fn listener_applied(&self, _action: ApplyAction, _ok: bool) {}
    fn cycle_finished(&self, _elapsed: Duration, _ok: bool) {}
    fn tick_skipped(&self) {}
    fn backend_health(&self, _listener: &str, _backend: &str, _healthy: bool) {}
}

fn result_label(ok: bool) -> &'static str {
    if ok { "success" } else { "error" }
}

/// Emits through the global `metrics` recorder.
///
/// - `lbsync_cloud_calls_total{operation, result}`
/// - `lbsync_cloud_retries_total{operation, reason}`
/// - `lbsync_listener_operations_total{action, result}`
/// - `lbsync_reconcile_cycles_total{result}` and
///   `lbsync_reconcile_duration_seconds`
/// - `lbsync_ticks_skipped_total`
/// - `lbsync_backend_healthy{listener, backend}` (1 healthy, 0 not)
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl MetricsSink for PrometheusMetrics {
    fn cloud_call(&self, operation: &str, ok: bool) {
        counter!(
            "lbsync_cloud_calls_total",
            "operation" => operation.to_owned(),
            "result" => result_label(ok)
        )
        .increment(1);
    }

    fn cloud_retry(&self, operation: &str, reason: &'static str) {
        counter!(
            "lbsync_cloud_retries_total",
            "operation" => operation.to_owned(),
            "reason" => reason
        )
        .increment(1);
    }

    fn listener_applied(&self, action: ApplyAction, ok: bool) {
        let action: &'static str = action.into();
        counter!(
            "lbsync_listener_operations_total",
            "action" => action,
            "result" => result_label(ok)
        )
        .increment(1);
    }

    fn cycle_finished(&self, elapsed: Duration, ok: bool) {
        counter!("lbsync_reconcile_cycles_total", "result" => result_label(ok)).increment(1);
        histogram!("lbsync_reconcile_duration_seconds").record(elapsed.as_secs_f64());
    }

    fn tick_skipped(&self) {
        counter!("lbsync_ticks_skipped_total").increment(1);
    }

    fn backend_health(&self, listener: &str, backend: &str, healthy: bool) {
        gauge!(
            "lbsync_backend_healthy",
            "listener" => listener.to_owned(),
            "backend" => backend.to_owned()
        )
        .set(if healthy { 1.0 } else { 0.0 });
    }
}
