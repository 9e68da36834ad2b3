// ── Listener apply routines ──
//
// Every routine returns the listener state the cloud acknowledged
// alongside the outcome. A failure part way through leaves the state at
// the last acknowledged step, so a chunk of backends that was never
// bound is never cached as bound.

use tracing::{debug, warn};

use super::Updater;
use crate::cloud::{ListenerLookup, retry::apply_in_segments};
use crate::error::CoreError;
use crate::model::{
    Backend, CloudListener, CloudLoadBalancer, Forwarding, Rule, TargetGroup, diff_backends,
    diff_rules, update_rules, weight_updates,
};

/// Acknowledged state of one listener after an apply step.
///
/// `state` is `None` when the listener does not exist on the cloud.
#[derive(Debug)]
pub(crate) struct Applied {
    pub state: Option<CloudListener>,
    pub result: Result<(), CoreError>,
}

impl Applied {
    fn ok(state: Option<CloudListener>) -> Self {
        Self {
            state,
            result: Ok(()),
        }
    }

    fn failed(state: Option<CloudListener>, err: CoreError) -> Self {
        Self {
            state,
            result: Err(err),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Bind {
    Register,
    Deregister,
    Weights,
}

/// Keep the first error, log the rest.
fn note(first: &mut Option<CoreError>, listener: &CloudListener, err: CoreError) {
    if first.is_none() {
        *first = Some(err);
    } else {
        warn!(
            listener = %listener.key(),
            code = err.cloud_code(),
            error = %err,
            "additional listener apply failure"
        );
    }
}

/// Same protocol and forwarding kind, so the listener can be updated in
/// place.
fn compatible(current: &CloudListener, desired: &CloudListener) -> bool {
    let same_kind = matches!(
        (&current.forwarding, &desired.forwarding),
        (Forwarding::TargetGroup(_), Forwarding::TargetGroup(_))
            | (Forwarding::Rules(_), Forwarding::Rules(_))
    );
    current.protocol == desired.protocol && same_kind
}

fn finish(state: CloudListener, first: Option<CoreError>) -> Applied {
    match first {
        None => Applied::ok(Some(state)),
        Some(err) => Applied::failed(Some(state), err),
    }
}

impl Updater {
    // ── Top-level steps ──────────────────────────────────────────────

    /// Delete a cached listener. Already gone counts as deleted.
    pub(super) async fn delete_listener(
        &self,
        lb: &CloudLoadBalancer,
        cached: &CloudListener,
    ) -> Applied {
        let lookup = match cached.listener_id.as_deref() {
            Some(id) => ListenerLookup::Id(id),
            None => ListenerLookup::Port(cached.listen_port),
        };
        let existing = match self.adapter.describe_listener(&lb.id, lookup).await {
            Ok(Some(existing)) => existing,
            Ok(None) => {
                debug!(listener = %cached.key(), %lookup, "listener already absent");
                return Applied::ok(None);
            }
            Err(e) => return Applied::failed(Some(cached.clone()), e),
        };
        let Some(id) = existing.listener_id.as_deref() else {
            return Applied::failed(
                Some(cached.clone()),
                CoreError::MissingListenerId {
                    listener: cached.key(),
                },
            );
        };
        match self.adapter.delete_listener(&lb.id, id).await {
            Ok(()) => Applied::ok(None),
            Err(e) => Applied::failed(Some(cached.clone()), e),
        }
    }

    /// Add a desired listener, adopting one already on its port. A
    /// listener of another protocol or forwarding kind is replaced.
    pub(super) async fn add_listener(
        &self,
        lb: &CloudLoadBalancer,
        desired: &CloudListener,
    ) -> Applied {
        let lookup = ListenerLookup::Port(desired.listen_port);
        match self.adapter.describe_listener(&lb.id, lookup).await {
            Ok(Some(existing)) => {
                if compatible(&existing, desired) {
                    debug!(
                        listener = %desired.key(),
                        listener_id = ?existing.listener_id,
                        "adopting existing listener"
                    );
                } else {
                    warn!(
                        listener = %desired.key(),
                        listener_id = ?existing.listener_id,
                        port = desired.listen_port,
                        found = %existing.protocol,
                        wanted = %desired.protocol,
                        "port is held by an incompatible listener, replacing it"
                    );
                }
                self.reconcile_existing(lb, adopt(existing, desired), desired).await
            }
            Ok(None) => self.create_listener(desired).await,
            Err(e) => Applied::failed(None, e),
        }
    }

    /// Move a cached listener to its desired form, reading the cloud
    /// first. A listener that vanished is added again.
    pub(super) async fn update_listener(
        &self,
        lb: &CloudLoadBalancer,
        cached: &CloudListener,
        desired: &CloudListener,
    ) -> Applied {
        let lookup = match cached.listener_id.as_deref() {
            Some(id) => ListenerLookup::Id(id),
            None => ListenerLookup::Port(cached.listen_port),
        };
        match self.adapter.describe_listener(&lb.id, lookup).await {
            Ok(Some(existing)) => {
                self.reconcile_existing(lb, adopt(existing, desired), desired).await
            }
            Ok(None) => {
                debug!(listener = %desired.key(), "cached listener missing on cloud, adding");
                self.add_listener(lb, desired).await
            }
            Err(e) => Applied::failed(Some(cached.clone()), e),
        }
    }

    // ── Listener level ───────────────────────────────────────────────

    async fn create_listener(&self, desired: &CloudListener) -> Applied {
        let id = match self.adapter.create_listener(desired).await {
            Ok(id) => id,
            Err(e) => return Applied::failed(None, e),
        };
        debug!(listener = %desired.key(), listener_id = %id, "listener created");

        let mut created = desired.clone();
        created.listener_id = Some(id);
        match &desired.forwarding {
            Forwarding::TargetGroup(tg) => {
                let empty = TargetGroup {
                    backends: Vec::new(),
                    ..tg.clone()
                };
                created.forwarding = Forwarding::TargetGroup(empty);
                self.reconcile_target_group(created, desired).await
            }
            Forwarding::Rules(_) => {
                created.forwarding = Forwarding::Rules(Vec::new());
                self.reconcile_rules(created, desired).await
            }
        }
    }

    async fn reconcile_existing(
        &self,
        lb: &CloudLoadBalancer,
        current: CloudListener,
        desired: &CloudListener,
    ) -> Applied {
        if !compatible(&current, desired) {
            return self.recreate(lb, current, desired).await;
        }
        match desired.forwarding {
            Forwarding::TargetGroup(_) => self.reconcile_target_group(current, desired).await,
            Forwarding::Rules(_) => self.reconcile_rules(current, desired).await,
        }
    }

    async fn recreate(
        &self,
        lb: &CloudLoadBalancer,
        current: CloudListener,
        desired: &CloudListener,
    ) -> Applied {
        debug!(
            listener = %desired.key(),
            from = %current.protocol,
            to = %desired.protocol,
            "protocol changed, recreating listener"
        );
        let Some(id) = current.listener_id.as_deref() else {
            let err = CoreError::MissingListenerId {
                listener: current.key(),
            };
            return Applied::failed(Some(current), err);
        };
        if let Err(e) = self.adapter.delete_listener(&lb.id, id).await {
            return Applied::failed(Some(current), e);
        }
        self.create_listener(desired).await
    }

    // ── Four-layer ───────────────────────────────────────────────────

    async fn reconcile_target_group(
        &self,
        mut state: CloudListener,
        desired: &CloudListener,
    ) -> Applied {
        let (Some(current), Some(wanted)) =
            (state.target_group().cloned(), desired.target_group())
        else {
            return Applied::ok(Some(state));
        };

        let mut tg = current;
        if !tg.is_attr_equal(wanted) {
            let mut target = desired.clone();
            target.listener_id.clone_from(&state.listener_id);
            if let Err(e) = self.adapter.modify_listener_attribute(&target).await {
                return Applied::failed(Some(state), e);
            }
            tg = TargetGroup {
                backends: tg.backends,
                ..wanted.clone()
            };
        }

        let (tg, result) = self.sync_backends(&state, None, tg, &wanted.backends).await;
        state.forwarding = Forwarding::TargetGroup(tg);
        Applied { state: Some(state), result }
    }

    // ── Seven-layer ──────────────────────────────────────────────────

    async fn reconcile_rules(&self, mut state: CloudListener, desired: &CloudListener) -> Applied {
        if desired.tls.is_some() && state.tls != desired.tls {
            let mut target = state.clone();
            target.tls.clone_from(&desired.tls);
            if let Err(e) = self.adapter.modify_listener_attribute(&target).await {
                return Applied::failed(Some(state), e);
            }
            state.tls.clone_from(&desired.tls);
        }

        let current = state.rules().to_vec();
        let diff = diff_rules(&current, desired.rules());
        let updates = update_rules(&current, desired.rules());
        let mut rules = current;
        let mut first_err = None;

        for rule in &diff.del {
            match self.adapter.delete_rule(&state, rule).await {
                Ok(()) => rules.retain(|r| r.key() != rule.key()),
                Err(e) => note(&mut first_err, &state, e),
            }
        }

        if !diff.add.is_empty() {
            match self.adapter.create_rules(&state, &diff.add).await {
                Ok(()) => {
                    for rule in &diff.add {
                        match self.adopt_created_rule(&state, rule).await {
                            Ok((applied, result)) => {
                                rules.push(applied);
                                if let Err(e) = result {
                                    note(&mut first_err, &state, e);
                                }
                            }
                            Err(e) => note(&mut first_err, &state, e),
                        }
                    }
                }
                Err(e) => note(&mut first_err, &state, e),
            }
        }

        for (old, new) in &updates {
            let (applied, result) = self.update_rule(&state, old, new).await;
            if let Some(slot) = rules.iter_mut().find(|r| r.key() == applied.key()) {
                *slot = applied;
            }
            if let Err(e) = result {
                note(&mut first_err, &state, e);
            }
        }

        state.forwarding = Forwarding::Rules(rules);
        finish(state, first_err)
    }

    /// Look up the id of a rule just created and bind its backends.
    async fn adopt_created_rule(
        &self,
        listener: &CloudListener,
        wanted: &Rule,
    ) -> Result<(Rule, Result<(), CoreError>), CoreError> {
        let described = self
            .adapter
            .describe_rule_by_domain_and_url(listener, &wanted.domain, &wanted.url)
            .await?
            .ok_or_else(|| CoreError::MissingRuleId {
                listener: listener.key(),
                domain: wanted.domain.clone(),
                url: wanted.url.clone(),
            })?;

        let mut rule = wanted.clone();
        rule.id = described.id;
        let current = TargetGroup {
            backends: described.target_group.backends,
            ..wanted.target_group.clone()
        };
        let (tg, result) = self
            .sync_backends(listener, Some(&rule), current, &wanted.target_group.backends)
            .await;
        rule.target_group = tg;
        Ok((rule, result))
    }

    async fn update_rule(
        &self,
        listener: &CloudListener,
        old: &Rule,
        new: &Rule,
    ) -> (Rule, Result<(), CoreError>) {
        let mut rule = old.clone();
        if !old.target_group.is_attr_equal(&new.target_group) {
            let target = Rule {
                id: old.id.clone(),
                ..new.clone()
            };
            if let Err(e) = self.adapter.modify_rule_attribute(listener, &target).await {
                return (rule, Err(e));
            }
            rule.target_group = TargetGroup {
                backends: rule.target_group.backends,
                ..new.target_group.clone()
            };
        }
        let current = rule.target_group.clone();
        let (tg, result) = self
            .sync_backends(listener, Some(&rule), current, &new.target_group.backends)
            .await;
        rule.target_group = tg;
        (rule, result)
    }

    // ── Backends ─────────────────────────────────────────────────────

    /// Converge the bound backends of a listener or rule onto `desired`.
    ///
    /// Deregisters, registers, then updates weights, each in chunks. The
    /// returned group reflects only the chunks that succeeded.
    async fn sync_backends(
        &self,
        listener: &CloudListener,
        rule: Option<&Rule>,
        current: TargetGroup,
        desired: &[Backend],
    ) -> (TargetGroup, Result<(), CoreError>) {
        let diff = diff_backends(&current.backends, desired);
        let mut tg = current;
        let limit = self.max_backends_per_bind;

        if !diff.del.is_empty() {
            let outcome = apply_in_segments(&diff.del, limit, move |chunk| async move {
                self.bind(Bind::Deregister, listener, rule, &chunk).await
            })
            .await;
            tg = tg.with_backends_removed(&diff.del[..outcome.applied]);
            if let Some(err) = outcome.error {
                return (tg, Err(err));
            }
        }

        if !diff.add.is_empty() {
            let outcome = apply_in_segments(&diff.add, limit, move |chunk| async move {
                self.bind(Bind::Register, listener, rule, &chunk).await
            })
            .await;
            tg = tg.with_backends_added(&diff.add[..outcome.applied]);
            if let Some(err) = outcome.error {
                return (tg, Err(err));
            }
        }

        let reweigh = weight_updates(&tg.backends, desired);
        if !reweigh.is_empty() {
            let outcome = apply_in_segments(&reweigh, limit, move |chunk| async move {
                self.bind(Bind::Weights, listener, rule, &chunk).await
            })
            .await;
            tg = tg.with_weights(&reweigh[..outcome.applied]);
            if let Some(err) = outcome.error {
                return (tg, Err(err));
            }
        }

        debug!(
            listener = %listener.key(),
            rule = ?rule.map(Rule::key),
            removed = diff.del.len(),
            added = diff.add.len(),
            reweighed = reweigh.len(),
            "backends synced"
        );
        (tg, Ok(()))
    }

    async fn bind(
        &self,
        op: Bind,
        listener: &CloudListener,
        rule: Option<&Rule>,
        backends: &[Backend],
    ) -> Result<(), CoreError> {
        let adapter = self.adapter.as_ref();
        match (op, rule) {
            (Bind::Register, None) => {
                adapter.register_4layer_backends(listener, backends).await
            }
            (Bind::Deregister, None) => {
                adapter.deregister_4layer_backends(listener, backends).await
            }
            (Bind::Weights, None) => {
                adapter.modify_4layer_backend_weights(listener, backends).await
            }
            (Bind::Register, Some(rule)) => {
                adapter.register_7layer_backends(listener, rule, backends).await
            }
            (Bind::Deregister, Some(rule)) => {
                adapter.deregister_7layer_backends(listener, rule, backends).await
            }
            (Bind::Weights, Some(rule)) => {
                adapter.modify_7layer_backend_weights(listener, rule, backends).await
            }
        }
    }
}

/// Carry the cache identity of `desired` onto a listener read from the
/// cloud.
fn adopt(mut existing: CloudListener, desired: &CloudListener) -> CloudListener {
    existing.namespace.clone_from(&desired.namespace);
    existing.name.clone_from(&desired.name);
    existing.load_balancer_id.clone_from(&desired.load_balancer_id);
    existing
}
