// ── Updater ──
//
// One reconciliation cycle: list ingresses, validate, generate the
// desired listeners, diff them against the cached previous cycle and
// apply deletes, adds and updates to the cloud. Each listener is applied
// on its own; a failure is logged and metered and the cycle moves on.
// The cache is replaced at the end with what the cloud acknowledged.

mod apply;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::cloud::CloudAdapter;
use crate::config::{ControllerConfig, LoadBalancerConfig};
use crate::diff::{diff_listeners, update_listeners};
use crate::error::CoreError;
use crate::generator::ListenerGenerator;
use crate::metrics::{ApplyAction, MetricsSink};
use crate::model::{CloudListener, CloudLoadBalancer, Ingress, IngressStatus};
use crate::scheduler::Reconcile;
use crate::source::{BackendResolver, IngressSource};
use crate::store::ListenerStore;
use crate::validate::validate;

use self::apply::Applied;

/// Counts of listener operations in one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl CycleReport {
    pub fn total(&self) -> usize {
        self.added + self.updated + self.deleted + self.failed
    }

    /// Every attempted operation succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    fn succeeded(&mut self, action: ApplyAction) {
        match action {
            ApplyAction::Add => self.added += 1,
            ApplyAction::Update => self.updated += 1,
            ApplyAction::Delete => self.deleted += 1,
        }
    }
}

/// Reconciles the managed load balancer onto the ingress rules.
pub struct Updater {
    adapter: Arc<dyn CloudAdapter>,
    source: Arc<dyn IngressSource>,
    generator: ListenerGenerator,
    store: Arc<ListenerStore>,
    metrics: Arc<dyn MetricsSink>,
    lb_config: LoadBalancerConfig,
    max_backends_per_bind: usize,
    load_balancer: ArcSwapOption<CloudLoadBalancer>,
}

impl Updater {
    pub fn new(
        config: &ControllerConfig,
        adapter: Arc<dyn CloudAdapter>,
        source: Arc<dyn IngressSource>,
        resolver: Arc<dyn BackendResolver>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            adapter,
            source,
            generator: ListenerGenerator::new(
                resolver,
                config.namespace.clone(),
                config.backend_mode,
            ),
            store: Arc::new(ListenerStore::new()),
            metrics,
            lb_config: config.load_balancer.clone(),
            max_backends_per_bind: config.retry.max_backends_per_bind,
            load_balancer: ArcSwapOption::empty(),
        }
    }

    pub fn store(&self) -> &Arc<ListenerStore> {
        &self.store
    }

    /// The load balancer adopted by [`ensure_load_balancer`](Self::ensure_load_balancer).
    pub fn load_balancer(&self) -> Option<Arc<CloudLoadBalancer>> {
        self.load_balancer.load_full()
    }

    /// Adopt the configured load balancer, creating it when absent.
    ///
    /// An existing instance of the wrong network type is a permanent
    /// error. Safe to call again; the adopted VIPs are refreshed.
    pub async fn ensure_load_balancer(&self) -> Result<Arc<CloudLoadBalancer>, CoreError> {
        let name = &self.lb_config.name;
        let lb = match self.adapter.describe_load_balancer(name).await? {
            Some(existing) => {
                if existing.network_type != self.lb_config.network_type {
                    return Err(CoreError::NetworkTypeMismatch {
                        name: name.clone(),
                        expected: self.lb_config.network_type,
                        actual: existing.network_type,
                    });
                }
                info!(lb_id = %existing.id, name = %name, "adopted existing load balancer");
                existing
            }
            None => {
                info!(
                    name = %name,
                    network_type = %self.lb_config.network_type,
                    "creating load balancer"
                );
                let created = self.adapter.create_load_balancer(&self.lb_config).await?;
                info!(lb_id = %created.id, vips = ?created.vips, "load balancer created");
                created
            }
        };
        let lb = Arc::new(lb);
        self.load_balancer.store(Some(Arc::clone(&lb)));
        Ok(lb)
    }

    /// Listeners on the managed load balancer that no cached listener
    /// accounts for, matched by port.
    pub async fn unmanaged_listeners(&self) -> Result<Vec<CloudListener>, CoreError> {
        let lb = self.load_balancer().ok_or(CoreError::LoadBalancerNotReady)?;
        let managed: HashSet<u16> = self.store.listeners().iter().map(|l| l.listen_port).collect();
        let mut unmanaged: Vec<CloudListener> = self
            .adapter
            .list_listeners(&lb.id)
            .await?
            .into_iter()
            .filter(|l| !managed.contains(&l.listen_port))
            .collect();
        unmanaged.sort_by_key(|l| l.listen_port);
        Ok(unmanaged)
    }

    /// Run one reconciliation cycle.
    ///
    /// Returns `Err` only when the cycle aborted before touching the
    /// cloud. Per-listener failures are counted in the report.
    pub async fn update(&self) -> Result<CycleReport, CoreError> {
        let lb = self.load_balancer().ok_or(CoreError::LoadBalancerNotReady)?;
        let ingresses = self.source.list().await?;

        if let Err(conflict) = validate(&ingresses) {
            warn!(
                namespace = %conflict.namespace,
                ingress = %conflict.name,
                reason = %conflict.message,
                "ingress rules conflict, cycle aborted"
            );
            let status = IngressStatus::Abnormal(conflict.message.clone());
            if let Err(e) = self
                .source
                .set_status(&conflict.namespace, &conflict.name, status)
                .await
            {
                warn!(error = %e, "failed to record ingress status");
            }
            return Err(conflict.into());
        }
        self.clear_abnormal(&ingresses).await;

        let desired = self.generator.generate(&lb, &ingresses).await;
        let cached = self.store.listeners();
        let (to_delete, to_add) = diff_listeners(&cached, &desired);
        let (update_old, update_new) = update_listeners(&cached, &desired);
        debug!(
            desired = desired.len(),
            cached = cached.len(),
            delete = to_delete.len(),
            add = to_add.len(),
            update = update_new.len(),
            "listener diff computed"
        );

        let mut next: BTreeMap<String, CloudListener> =
            cached.into_iter().map(|l| (l.key(), l)).collect();
        let mut report = CycleReport::default();

        for listener in &to_delete {
            let applied = self.delete_listener(&lb, listener).await;
            self.record(ApplyAction::Delete, listener.key(), applied, &mut next, &mut report);
        }
        for listener in &to_add {
            let applied = self.add_listener(&lb, listener).await;
            self.record(ApplyAction::Add, listener.key(), applied, &mut next, &mut report);
        }
        for (old, new) in update_old.iter().zip(&update_new) {
            let applied = self.update_listener(&lb, old, new).await;
            self.record(ApplyAction::Update, new.key(), applied, &mut next, &mut report);
        }

        self.store.replace_all(next.into_values().collect());
        self.store.mark_cycle();
        info!(
            added = report.added,
            updated = report.updated,
            deleted = report.deleted,
            failed = report.failed,
            "reconciliation cycle finished"
        );
        Ok(report)
    }

    async fn clear_abnormal(&self, ingresses: &[Ingress]) {
        for ingress in ingresses {
            if !matches!(ingress.status, Some(IngressStatus::Abnormal(_))) {
                continue;
            }
            if let Err(e) = self
                .source
                .set_status(&ingress.namespace, &ingress.name, IngressStatus::Normal)
                .await
            {
                warn!(ingress = %ingress.key(), error = %e, "failed to clear ingress status");
            }
        }
    }

    fn record(
        &self,
        action: ApplyAction,
        key: String,
        applied: Applied,
        next: &mut BTreeMap<String, CloudListener>,
        report: &mut CycleReport,
    ) {
        self.metrics.listener_applied(action, applied.result.is_ok());
        match applied.result {
            Ok(()) => {
                info!(listener = %key, %action, "listener applied");
                report.succeeded(action);
            }
            Err(e) => {
                warn!(
                    listener = %key,
                    %action,
                    code = e.cloud_code(),
                    error = %e,
                    "listener apply failed"
                );
                report.failed += 1;
            }
        }
        match applied.state {
            Some(state) => {
                next.insert(key, state);
            }
            None => {
                next.remove(&key);
            }
        }
    }
}

#[async_trait]
impl Reconcile for Updater {
    async fn reconcile(&self) -> Result<(), CoreError> {
        let report = self.update().await?;
        if report.is_clean() {
            Ok(())
        } else {
            Err(CoreError::PartialApply {
                failed: report.failed,
                total: report.total(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts() {
        let mut report = CycleReport::default();
        report.succeeded(ApplyAction::Add);
        report.succeeded(ApplyAction::Delete);
        assert!(report.is_clean());
        report.failed += 1;
        assert_eq!(report.total(), 3);
        assert!(!report.is_clean());
    }
}
