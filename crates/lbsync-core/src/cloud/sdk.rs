// ── SDK API adapter ──
//
// Implements `CloudAdapter` over `SdkClient`. Requests are typed structs;
// weights are set one value at a time, so weight updates are grouped by
// target weight.

use std::collections::BTreeMap;
use std::future::Future;

use async_trait::async_trait;
use lbsync_api::SdkClient;
use lbsync_api::sdk::types::{
    self, CertificateInput, CreateListenerRequest, CreateLoadBalancerRequest, CreateRuleRequest,
    DeleteRuleRequest, DescribeListenersRequest, LB_TYPE_INTERNAL, LB_TYPE_OPEN, ListenerBackend,
    ModifyListenerRequest, ModifyRuleRequest, ModifyTargetWeightRequest, RuleInput, Target,
    TargetsRequest,
};
use tracing::{debug, warn};

use super::retry::RetryPolicy;
use super::{BackendHealth, CloudAdapter, ListenerLookup, listener_id, rule_id};
use crate::config::LoadBalancerConfig;
use crate::error::CoreError;
use crate::model::{
    Backend, CloudListener, CloudLoadBalancer, Forwarding, HealthCheck, LbPolicy, NetworkType,
    Protocol, Rule, TargetGroup, TlsConfig, TlsMode,
};

/// Error codes meaning the requested resource does not exist.
fn is_not_found(err: &lbsync_api::Error) -> bool {
    err.code().is_some_and(|code| {
        code.starts_with("ResourceNotFound")
            || (code.starts_with("InvalidParameter") && code.ends_with("NotFound"))
    })
}

/// [`CloudAdapter`] for the JSON SDK API.
pub struct SdkAdapter {
    client: SdkClient,
    retry: RetryPolicy,
}

impl SdkAdapter {
    pub fn new(client: SdkClient, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    async fn run_task<F, Fut>(&self, operation: &'static str, call: F) -> Result<(), CoreError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<Option<String>, lbsync_api::Error>> + Send,
    {
        let task = self.retry.call(operation, call).await?;
        if let Some(task_id) = task {
            self.wait(operation, &task_id).await?;
        }
        Ok(())
    }

    async fn wait(&self, operation: &'static str, task_id: &str) -> Result<(), lbsync_api::Error> {
        let client = &self.client;
        self.retry
            .wait_task(operation, task_id, move || client.describe_task(task_id))
            .await
    }

    async fn targets_of(
        &self,
        lb_id: &str,
        listener_id: &str,
    ) -> Result<Option<ListenerBackend>, CoreError> {
        let client = &self.client;
        let all = self
            .retry
            .call("DescribeTargets", move || {
                client.describe_targets(lb_id, listener_id)
            })
            .await?;
        Ok(all.into_iter().find(|l| l.listener_id == listener_id))
    }

    async fn describe(
        &self,
        req: &DescribeListenersRequest,
    ) -> Result<Vec<types::Listener>, CoreError> {
        let client = &self.client;
        match self
            .retry
            .call("DescribeListeners", move || client.describe_listeners(req))
            .await
        {
            Ok(listeners) => Ok(listeners),
            Err(err) if is_not_found(&err) => {
                debug!(code = ?err.code(), "listener not found");
                Ok(Vec::new())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn bind_targets(
        &self,
        operation: &'static str,
        listener: &CloudListener,
        rule: Option<&Rule>,
        backends: &[Backend],
        register: bool,
    ) -> Result<(), CoreError> {
        let req = TargetsRequest {
            load_balancer_id: listener.load_balancer_id.clone(),
            listener_id: listener_id(listener)?.to_owned(),
            location_id: rule
                .map(|r| rule_id(listener, r).map(str::to_owned))
                .transpose()?,
            targets: targets(backends, register),
        };
        let client = &self.client;
        if register {
            self.run_task(operation, || client.register_targets(&req)).await
        } else {
            self.run_task(operation, || client.deregister_targets(&req)).await
        }
    }

    async fn modify_weights(
        &self,
        listener: &CloudListener,
        rule: Option<&Rule>,
        backends: &[Backend],
    ) -> Result<(), CoreError> {
        let lb_id = listener.load_balancer_id.clone();
        let id = listener_id(listener)?.to_owned();
        let location_id = rule
            .map(|r| rule_id(listener, r).map(str::to_owned))
            .transpose()?;

        let mut by_weight: BTreeMap<u32, Vec<Target>> = BTreeMap::new();
        for backend in backends {
            by_weight.entry(backend.weight).or_default().push(Target {
                eni_ip: backend.ip.clone(),
                port: backend.port,
                weight: None,
            });
        }

        let client = &self.client;
        for (weight, targets) in by_weight {
            let req = ModifyTargetWeightRequest {
                load_balancer_id: lb_id.clone(),
                listener_id: id.clone(),
                location_id: location_id.clone(),
                targets,
                weight,
            };
            self.run_task("ModifyTargetWeight", || client.modify_target_weight(&req))
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CloudAdapter for SdkAdapter {
    async fn create_load_balancer(
        &self,
        config: &LoadBalancerConfig,
    ) -> Result<CloudLoadBalancer, CoreError> {
        let req = CreateLoadBalancerRequest {
            load_balancer_type: match config.network_type {
                NetworkType::Public => LB_TYPE_OPEN,
                NetworkType::Private => LB_TYPE_INTERNAL,
            }
            .to_owned(),
            load_balancer_name: config.name.clone(),
            forward: 1,
            vpc_id: config.vpc_id.clone(),
            subnet_id: config.subnet_id.clone(),
        };
        let client = &self.client;
        let created = self
            .retry
            .call("CreateLoadBalancer", || client.create_load_balancer(&req))
            .await?;
        if let Some(task_id) = &created.task_id {
            self.wait("CreateLoadBalancer", task_id).await?;
        }

        let vips = self
            .describe_load_balancer(&config.name)
            .await?
            .filter(|lb| lb.id == created.id)
            .map(|lb| lb.vips)
            .unwrap_or_default();
        Ok(CloudLoadBalancer {
            id: created.id,
            name: config.name.clone(),
            network_type: config.network_type,
            vips,
        })
    }

    async fn describe_load_balancer(
        &self,
        name: &str,
    ) -> Result<Option<CloudLoadBalancer>, CoreError> {
        let client = &self.client;
        let found = self
            .retry
            .call("DescribeLoadBalancers", move || {
                client.describe_load_balancers_by_name(name)
            })
            .await?;
        Ok(found.into_iter().next().map(|lb| CloudLoadBalancer {
            id: lb.load_balancer_id,
            name: lb.load_balancer_name,
            network_type: if lb.load_balancer_type == LB_TYPE_INTERNAL {
                NetworkType::Private
            } else {
                NetworkType::Public
            },
            vips: lb.load_balancer_vips,
        }))
    }

    async fn create_listener(&self, listener: &CloudListener) -> Result<String, CoreError> {
        let tg = listener.target_group();
        let req = CreateListenerRequest {
            load_balancer_id: listener.load_balancer_id.clone(),
            ports: vec![listener.listen_port],
            protocol: protocol_name(listener.protocol),
            listener_names: vec![listener.name.clone()],
            health_check: tg.map(|tg| health_check(&tg.health_check, tg.protocol)),
            certificate: certificate(listener),
            session_expire_time: tg.map(|tg| tg.session_expire),
            scheduler: tg.map(|tg| scheduler(tg.lb_policy)),
        };
        let client = &self.client;
        let created = self
            .retry
            .call("CreateListener", || client.create_listener(&req))
            .await?;
        if let Some(task_id) = &created.task_id {
            self.wait("CreateListener", task_id).await?;
        }
        Ok(created.id)
    }

    async fn describe_listener(
        &self,
        lb_id: &str,
        lookup: ListenerLookup<'_>,
    ) -> Result<Option<CloudListener>, CoreError> {
        let req = match lookup {
            ListenerLookup::Id(id) => DescribeListenersRequest {
                load_balancer_id: lb_id.to_owned(),
                listener_ids: vec![id.to_owned()],
                port: None,
            },
            ListenerLookup::Port(port) => DescribeListenersRequest {
                load_balancer_id: lb_id.to_owned(),
                listener_ids: Vec::new(),
                port: Some(port),
            },
        };
        let listeners = self.describe(&req).await?;
        let Some(wire) = listeners.into_iter().find(|l| match lookup {
            ListenerLookup::Id(id) => l.listener_id == id,
            ListenerLookup::Port(port) => l.port == port,
        }) else {
            return Ok(None);
        };

        let targets = self.targets_of(lb_id, &wire.listener_id).await?;
        Ok(listener_from_wire(lb_id, wire, targets.as_ref()))
    }

    async fn delete_listener(&self, lb_id: &str, listener_id: &str) -> Result<(), CoreError> {
        let client = &self.client;
        self.run_task("DeleteListener", move || {
            client.delete_listener(lb_id, listener_id)
        })
        .await
    }

    async fn modify_listener_attribute(&self, listener: &CloudListener) -> Result<(), CoreError> {
        let id = listener_id(listener)?;
        let mut req = ModifyListenerRequest {
            load_balancer_id: listener.load_balancer_id.clone(),
            listener_id: id.to_owned(),
            listener_name: Some(listener.name.clone()),
            ..ModifyListenerRequest::default()
        };
        match listener.target_group() {
            Some(tg) => {
                req.session_expire_time = Some(tg.session_expire);
                req.health_check = Some(health_check(&tg.health_check, tg.protocol));
                req.scheduler = Some(scheduler(tg.lb_policy));
            }
            None => {
                req.certificate = certificate(listener);
                if req.certificate.is_none() {
                    return Ok(());
                }
            }
        }
        let client = &self.client;
        self.run_task("ModifyListener", || client.modify_listener(&req))
            .await
    }

    async fn list_listeners(&self, lb_id: &str) -> Result<Vec<CloudListener>, CoreError> {
        let req = DescribeListenersRequest {
            load_balancer_id: lb_id.to_owned(),
            ..DescribeListenersRequest::default()
        };
        let listeners = self.describe(&req).await?;

        let mut out = Vec::with_capacity(listeners.len());
        for wire in listeners {
            let targets = self.targets_of(lb_id, &wire.listener_id).await?;
            out.extend(listener_from_wire(lb_id, wire, targets.as_ref()));
        }
        Ok(out)
    }

    async fn create_rules(
        &self,
        listener: &CloudListener,
        rules: &[Rule],
    ) -> Result<(), CoreError> {
        let req = CreateRuleRequest {
            load_balancer_id: listener.load_balancer_id.clone(),
            listener_id: listener_id(listener)?.to_owned(),
            rules: rules
                .iter()
                .map(|r| {
                    let tg = &r.target_group;
                    RuleInput {
                        domain: r.domain.clone(),
                        url: r.url.clone(),
                        session_expire_time: tg.session_expire,
                        health_check: health_check(&tg.health_check, listener.protocol),
                        scheduler: scheduler(tg.lb_policy),
                    }
                })
                .collect(),
        };
        let client = &self.client;
        self.run_task("CreateRule", || client.create_rules(&req)).await
    }

    async fn describe_rule_by_domain_and_url(
        &self,
        listener: &CloudListener,
        domain: &str,
        url: &str,
    ) -> Result<Option<Rule>, CoreError> {
        let id = listener_id(listener)?;
        let described = self
            .describe_listener(&listener.load_balancer_id, ListenerLookup::Id(id))
            .await?;
        Ok(described.and_then(|l| {
            l.rules()
                .iter()
                .find(|r| r.domain == domain && r.url == url)
                .cloned()
        }))
    }

    async fn modify_rule_attribute(
        &self,
        listener: &CloudListener,
        rule: &Rule,
    ) -> Result<(), CoreError> {
        let tg = &rule.target_group;
        let req = ModifyRuleRequest {
            load_balancer_id: listener.load_balancer_id.clone(),
            listener_id: listener_id(listener)?.to_owned(),
            location_id: rule_id(listener, rule)?.to_owned(),
            session_expire_time: tg.session_expire,
            health_check: health_check(&tg.health_check, listener.protocol),
            scheduler: scheduler(tg.lb_policy),
        };
        let client = &self.client;
        self.run_task("ModifyRule", || client.modify_rule(&req)).await
    }

    async fn delete_rule(&self, listener: &CloudListener, rule: &Rule) -> Result<(), CoreError> {
        let req = DeleteRuleRequest {
            load_balancer_id: listener.load_balancer_id.clone(),
            listener_id: listener_id(listener)?.to_owned(),
            location_ids: vec![rule_id(listener, rule)?.to_owned()],
        };
        let client = &self.client;
        self.run_task("DeleteRule", || client.delete_rules(&req)).await
    }

    async fn register_4layer_backends(
        &self,
        listener: &CloudListener,
        backends: &[Backend],
    ) -> Result<(), CoreError> {
        self.bind_targets("RegisterTargets", listener, None, backends, true)
            .await
    }

    async fn deregister_4layer_backends(
        &self,
        listener: &CloudListener,
        backends: &[Backend],
    ) -> Result<(), CoreError> {
        self.bind_targets("DeregisterTargets", listener, None, backends, false)
            .await
    }

    async fn modify_4layer_backend_weights(
        &self,
        listener: &CloudListener,
        backends: &[Backend],
    ) -> Result<(), CoreError> {
        self.modify_weights(listener, None, backends).await
    }

    async fn register_7layer_backends(
        &self,
        listener: &CloudListener,
        rule: &Rule,
        backends: &[Backend],
    ) -> Result<(), CoreError> {
        self.bind_targets("RegisterTargets", listener, Some(rule), backends, true)
            .await
    }

    async fn deregister_7layer_backends(
        &self,
        listener: &CloudListener,
        rule: &Rule,
        backends: &[Backend],
    ) -> Result<(), CoreError> {
        self.bind_targets("DeregisterTargets", listener, Some(rule), backends, false)
            .await
    }

    async fn modify_7layer_backend_weights(
        &self,
        listener: &CloudListener,
        rule: &Rule,
        backends: &[Backend],
    ) -> Result<(), CoreError> {
        self.modify_weights(listener, Some(rule), backends).await
    }

    async fn describe_backend_health(&self, lb_id: &str) -> Result<Vec<BackendHealth>, CoreError> {
        let client = &self.client;
        let load_balancers = self
            .retry
            .call("DescribeTargetHealth", move || {
                client.describe_target_health(lb_id)
            })
            .await?;

        let mut out = Vec::new();
        for lb in load_balancers.into_iter().filter(|lb| lb.load_balancer_id == lb_id) {
            for listener in lb.listeners {
                let layer7 =
                    protocol_from_name(&listener.protocol).is_some_and(Protocol::is_layer7);
                for rule in listener.rules {
                    let scope = (layer7 && !rule.domain.is_empty())
                        .then(|| (rule.domain.clone(), rule.url.clone()));
                    out.extend(rule.targets.into_iter().map(|t| BackendHealth {
                        listener_id: listener.listener_id.clone(),
                        listen_port: listener.port,
                        rule: scope.clone(),
                        ip: t.ip,
                        port: t.port,
                        healthy: t.health_status,
                    }));
                }
            }
        }
        Ok(out)
    }
}

// ── Model → wire ─────────────────────────────────────────────────────

fn protocol_name(protocol: Protocol) -> String {
    protocol.to_string().to_ascii_uppercase()
}

fn scheduler(policy: LbPolicy) -> String {
    policy.to_string().to_ascii_uppercase()
}

fn health_check(health: &HealthCheck, protocol: Protocol) -> types::HealthCheck {
    let layer7 = protocol.is_layer7();
    types::HealthCheck {
        health_switch: i64::from(health.enabled),
        time_out: health.timeout,
        interval_time: health.interval,
        health_num: health.healthy_threshold,
        un_health_num: health.unhealthy_threshold,
        http_code: layer7.then_some(health.http_code),
        http_check_path: layer7.then(|| health.http_check_path.clone()),
    }
}

fn certificate(listener: &CloudListener) -> Option<CertificateInput> {
    if listener.protocol != Protocol::Https {
        return None;
    }
    listener.tls.as_ref().map(|tls| CertificateInput {
        ssl_mode: tls.mode.to_string(),
        cert_id: tls.cert_id.clone(),
        cert_ca_id: tls.cert_ca_id.clone(),
        cert_name: tls.cert_server_name.clone(),
        cert_key: tls.cert_server_key.clone(),
        cert_content: tls.cert_server_content.clone(),
        cert_ca_name: tls.cert_client_ca_name.clone(),
        cert_ca_content: tls.cert_client_ca_content.clone(),
    })
}

/// Deregistration identifies targets by address only.
fn targets(backends: &[Backend], with_weight: bool) -> Vec<Target> {
    backends
        .iter()
        .map(|b| Target {
            eni_ip: b.ip.clone(),
            port: b.port,
            weight: with_weight.then_some(b.weight),
        })
        .collect()
}

// ── Wire → model ─────────────────────────────────────────────────────

fn protocol_from_name(name: &str) -> Option<Protocol> {
    name.to_ascii_lowercase().parse().ok()
}

fn policy(scheduler: Option<&str>) -> LbPolicy {
    scheduler
        .and_then(|s| s.to_ascii_lowercase().parse().ok())
        .unwrap_or_default()
}

fn health_from_wire(wire: Option<&types::HealthCheck>) -> HealthCheck {
    let defaults = HealthCheck::default();
    let Some(wire) = wire else {
        return defaults;
    };
    HealthCheck {
        enabled: wire.health_switch == 1,
        timeout: wire.time_out,
        interval: wire.interval_time,
        healthy_threshold: wire.health_num,
        unhealthy_threshold: wire.un_health_num,
        http_code: wire.http_code.unwrap_or(defaults.http_code),
        http_check_path: wire
            .http_check_path
            .clone()
            .unwrap_or(defaults.http_check_path),
    }
}

fn backends_from_wire(targets: &[types::Backend]) -> Vec<Backend> {
    targets
        .iter()
        .filter_map(|t| Some(Backend::new(t.ip()?, t.port).with_weight(t.weight)))
        .collect()
}

fn listener_from_wire(
    lb_id: &str,
    wire: types::Listener,
    targets: Option<&ListenerBackend>,
) -> Option<CloudListener> {
    let Some(protocol) = protocol_from_name(&wire.protocol) else {
        warn!(
            listener_id = %wire.listener_id,
            protocol = %wire.protocol,
            "skipping listener with unknown protocol"
        );
        return None;
    };

    let forwarding = if protocol.is_layer7() {
        let rules = wire
            .rules
            .iter()
            .map(|r| {
                let bound = targets
                    .and_then(|l| l.rules.iter().find(|rt| rt.location_id == r.location_id))
                    .map(|rt| backends_from_wire(&rt.targets))
                    .unwrap_or_default();
                Rule {
                    id: Some(r.location_id.clone()),
                    domain: r.domain.clone(),
                    url: r.url.clone(),
                    target_group: TargetGroup {
                        session_expire: r.session_expire_time,
                        lb_policy: policy(r.scheduler.as_deref()),
                        health_check: health_from_wire(r.health_check.as_ref()),
                        backends: bound,
                        ..TargetGroup::new(wire.listener_name.clone(), protocol, wire.port)
                    },
                }
            })
            .collect();
        Forwarding::Rules(rules)
    } else {
        Forwarding::TargetGroup(TargetGroup {
            session_expire: wire.session_expire_time,
            lb_policy: policy(wire.scheduler.as_deref()),
            health_check: health_from_wire(wire.health_check.as_ref()),
            backends: targets
                .map(|l| backends_from_wire(&l.targets))
                .unwrap_or_default(),
            ..TargetGroup::new(wire.listener_name.clone(), protocol, wire.port)
        })
    };

    let tls = wire.certificate.as_ref().map(|cert| TlsConfig {
        mode: cert.ssl_mode.parse().unwrap_or(TlsMode::Unidirectional),
        cert_id: cert.cert_id.clone(),
        cert_ca_id: cert.cert_ca_id.clone(),
        ..TlsConfig::default()
    });

    Some(CloudListener {
        namespace: String::new(),
        name: wire.listener_name,
        listener_id: Some(wire.listener_id),
        load_balancer_id: lb_id.to_owned(),
        protocol,
        listen_port: wire.port,
        tls,
        forwarding,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use lbsync_api::sdk::types::{RuleOutput, RuleTargets};
    use pretty_assertions::assert_eq;

    use super::*;

    fn api(code: &str) -> lbsync_api::Error {
        lbsync_api::Error::Api {
            code: code.into(),
            message: String::new(),
            request_id: None,
        }
    }

    #[test]
    fn not_found_codes() {
        assert!(is_not_found(&api("ResourceNotFound")));
        assert!(is_not_found(&api("InvalidParameter.ListenerIdNotFound")));
        assert!(!is_not_found(&api("InvalidParameter.FormatError")));
        assert!(!is_not_found(&api(lbsync_api::sdk::CODE_LB_BUSY)));
    }

    #[test]
    fn health_check_omits_http_fields_for_layer4() {
        let hc = health_check(&HealthCheck::default(), Protocol::Tcp);
        assert_eq!(hc.health_switch, 1);
        assert!(hc.http_code.is_none());
        assert!(hc.http_check_path.is_none());

        let hc = health_check(&HealthCheck::default(), Protocol::Http);
        assert_eq!(hc.http_code, Some(31));
        assert_eq!(hc.http_check_path.as_deref(), Some("/"));
    }

    #[test]
    fn deregistration_targets_have_no_weight() {
        let backends = [Backend::new("10.0.0.1", 80).with_weight(3)];
        assert_eq!(targets(&backends, true)[0].weight, Some(3));
        assert_eq!(targets(&backends, false)[0].weight, None);
    }

    #[test]
    fn layer7_listener_from_wire() {
        let wire = types::Listener {
            listener_id: "lbl-1".into(),
            listener_name: "edge-80".into(),
            protocol: "HTTP".into(),
            port: 80,
            rules: vec![RuleOutput {
                location_id: "loc-1".into(),
                domain: "a.com".into(),
                url: "/x".into(),
                scheduler: Some("LEAST_CONN".into()),
                ..RuleOutput::default()
            }],
            ..types::Listener::default()
        };
        let targets = ListenerBackend {
            listener_id: "lbl-1".into(),
            rules: vec![RuleTargets {
                location_id: "loc-1".into(),
                targets: vec![
                    types::Backend {
                        private_ip_addresses: vec!["10.0.0.1".into()],
                        port: 8080,
                        weight: 10,
                    },
                    types::Backend::default(),
                ],
                ..RuleTargets::default()
            }],
            ..ListenerBackend::default()
        };

        let listener = listener_from_wire("lb-1", wire, Some(&targets)).unwrap();
        assert_eq!(listener.protocol, Protocol::Http);
        let rule = &listener.rules()[0];
        assert_eq!(rule.id.as_deref(), Some("loc-1"));
        assert_eq!(rule.target_group.lb_policy, LbPolicy::LeastConnections);
        // Targets without an address are dropped.
        assert_eq!(rule.target_group.backends, vec![Backend::new("10.0.0.1", 8080)]);
        assert!(rule.target_group.health_check.enabled);
    }

    #[test]
    fn layer4_listener_from_wire_uses_health_check() {
        let wire = types::Listener {
            listener_id: "lbl-2".into(),
            listener_name: "edge-9000".into(),
            protocol: "TCP".into(),
            port: 9000,
            health_check: Some(types::HealthCheck {
                health_switch: 0,
                time_out: 4,
                interval_time: 10,
                health_num: 2,
                un_health_num: 2,
                ..types::HealthCheck::default()
            }),
            ..types::Listener::default()
        };
        let listener = listener_from_wire("lb-1", wire, None).unwrap();
        let tg = listener.target_group().unwrap();
        assert!(!tg.health_check.enabled);
        assert_eq!(tg.health_check.timeout, 4);
        assert!(tg.backends.is_empty());
    }
}
