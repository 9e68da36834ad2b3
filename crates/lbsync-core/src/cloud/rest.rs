// ── Query API adapter ──
//
// Implements `CloudAdapter` over `RestClient`. Protocols, load balancer
// types and health switches travel as integers on this API.

use std::future::Future;

use async_trait::async_trait;
use lbsync_api::RestClient;
use lbsync_api::rest::models::{
    self, BackendTarget, HEALTH_STATUS_HEALTHY, HealthParams, LB_TYPE_PRIVATE, LB_TYPE_PUBLIC,
    ListenerBackends, ListenerRequest, PROTOCOL_HTTP, PROTOCOL_HTTPS, PROTOCOL_TCP, PROTOCOL_UDP,
    RuleRequest, SslParams,
};
use tracing::warn;

use super::retry::RetryPolicy;
use super::{BackendHealth, CloudAdapter, ListenerLookup, listener_id, rule_id};
use crate::config::LoadBalancerConfig;
use crate::error::CoreError;
use crate::model::{
    Backend, CloudListener, CloudLoadBalancer, Forwarding, HealthCheck, LbPolicy, NetworkType,
    Protocol, Rule, TargetGroup, TlsConfig, TlsMode,
};

/// [`CloudAdapter`] for the signed query-string API.
pub struct RestAdapter {
    client: RestClient,
    retry: RetryPolicy,
}

impl RestAdapter {
    pub fn new(client: RestClient, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Run a task-returning call and wait for the task to settle.
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

    async fn backends_of(
        &self,
        lb_id: &str,
        listener_id: &str,
    ) -> Result<Option<ListenerBackends>, CoreError> {
        let client = &self.client;
        let all = self
            .retry
            .call("DescribeForwardLBBackends", move || {
                client.describe_backends(lb_id, listener_id)
            })
            .await?;
        Ok(all.into_iter().find(|l| l.listener_id == listener_id))
    }
}

#[async_trait]
impl CloudAdapter for RestAdapter {
    async fn create_load_balancer(
        &self,
        config: &LoadBalancerConfig,
    ) -> Result<CloudLoadBalancer, CoreError> {
        let lb_type = match config.network_type {
            NetworkType::Public => LB_TYPE_PUBLIC,
            NetworkType::Private => LB_TYPE_PRIVATE,
        };
        let client = &self.client;
        let created = self
            .retry
            .call("CreateLoadBalancer", || {
                client.create_load_balancer(
                    &config.name,
                    lb_type,
                    config.vpc_id.as_deref(),
                    config.subnet_id.as_deref(),
                )
            })
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
        Ok(found.into_iter().next().map(load_balancer_from_wire))
    }

    async fn create_listener(&self, listener: &CloudListener) -> Result<String, CoreError> {
        let client = &self.client;
        let lb_id = listener.load_balancer_id.as_str();
        let req = listener_request(listener);
        let (operation, created) = if listener.protocol.is_layer7() {
            let op = "CreateForwardLBSeventhLayerListeners";
            (op, self.retry.call(op, || client.create_7layer_listener(lb_id, &req)).await?)
        } else {
            let op = "CreateForwardLBFourthLayerListeners";
            (op, self.retry.call(op, || client.create_4layer_listener(lb_id, &req)).await?)
        };
        if let Some(task_id) = &created.task_id {
            self.wait(operation, task_id).await?;
        }
        Ok(created.id)
    }

    async fn describe_listener(
        &self,
        lb_id: &str,
        lookup: ListenerLookup<'_>,
    ) -> Result<Option<CloudListener>, CoreError> {
        let (id, port) = match lookup {
            ListenerLookup::Id(id) => (Some(id), None),
            ListenerLookup::Port(port) => (None, Some(port)),
        };
        let client = &self.client;
        let listeners = self
            .retry
            .call("DescribeForwardLBListeners", move || {
                client.describe_listeners(lb_id, id, port)
            })
            .await?;
        let Some(wire) = listeners.into_iter().find(|l| match lookup {
            ListenerLookup::Id(id) => l.listener_id == id,
            ListenerLookup::Port(port) => l.load_balancer_port == port,
        }) else {
            return Ok(None);
        };

        let backends = self.backends_of(lb_id, &wire.listener_id).await?;
        Ok(listener_from_wire(lb_id, wire, backends.as_ref()))
    }

    async fn delete_listener(&self, lb_id: &str, listener_id: &str) -> Result<(), CoreError> {
        let client = &self.client;
        self.run_task("DeleteForwardLBListener", move || {
            client.delete_listener(lb_id, listener_id)
        })
        .await
    }

    async fn modify_listener_attribute(&self, listener: &CloudListener) -> Result<(), CoreError> {
        let id = listener_id(listener)?;
        let lb_id = listener.load_balancer_id.as_str();
        let req = listener_request(listener);
        let client = &self.client;
        if listener.protocol.is_layer7() {
            if req.ssl.is_none() {
                return Ok(());
            }
            self.run_task("ModifyForwardSeventhListener", || {
                client.modify_7layer_listener(lb_id, id, &req)
            })
            .await
        } else {
            self.run_task("ModifyForwardFourthListener", || {
                client.modify_4layer_listener(lb_id, id, &req)
            })
            .await
        }
    }

    async fn list_listeners(&self, lb_id: &str) -> Result<Vec<CloudListener>, CoreError> {
        let client = &self.client;
        let listeners = self
            .retry
            .call("DescribeForwardLBListeners", move || {
                client.describe_listeners(lb_id, None, None)
            })
            .await?;

        let mut out = Vec::with_capacity(listeners.len());
        for wire in listeners {
            let backends = self.backends_of(lb_id, &wire.listener_id).await?;
            out.extend(listener_from_wire(lb_id, wire, backends.as_ref()));
        }
        Ok(out)
    }

    async fn create_rules(
        &self,
        listener: &CloudListener,
        rules: &[Rule],
    ) -> Result<(), CoreError> {
        let id = listener_id(listener)?;
        let lb_id = listener.load_balancer_id.as_str();
        let reqs: Vec<RuleRequest> = rules.iter().map(rule_request).collect();
        let client = &self.client;
        self.run_task("CreateForwardLBListenerRules", || {
            client.create_rules(lb_id, id, &reqs)
        })
        .await
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
        let id = listener_id(listener)?;
        let location_id = rule_id(listener, rule)?;
        let lb_id = listener.load_balancer_id.as_str();
        let req = rule_request(rule);
        let client = &self.client;
        self.run_task("ModifyLoadBalancerRulesProbe", || {
            client.modify_rule(lb_id, id, location_id, &req)
        })
        .await
    }

    async fn delete_rule(&self, listener: &CloudListener, rule: &Rule) -> Result<(), CoreError> {
        let id = listener_id(listener)?;
        let location_id = rule_id(listener, rule)?;
        let lb_id = listener.load_balancer_id.as_str();
        let location_ids = [location_id];
        let client = &self.client;
        self.run_task("DeleteForwardLBListenerRules", || {
            client.delete_rules(lb_id, id, &location_ids)
        })
        .await
    }

    async fn register_4layer_backends(
        &self,
        listener: &CloudListener,
        backends: &[Backend],
    ) -> Result<(), CoreError> {
        let id = listener_id(listener)?;
        let lb_id = listener.load_balancer_id.as_str();
        let targets = targets(backends);
        let client = &self.client;
        self.run_task("RegisterInstancesWithForwardLBFourthListener", || {
            client.register_4layer_backends(lb_id, id, &targets)
        })
        .await
    }

    async fn deregister_4layer_backends(
        &self,
        listener: &CloudListener,
        backends: &[Backend],
    ) -> Result<(), CoreError> {
        let id = listener_id(listener)?;
        let lb_id = listener.load_balancer_id.as_str();
        let targets = targets(backends);
        let client = &self.client;
        self.run_task("DeregisterInstancesFromForwardLBFourthListener", || {
            client.deregister_4layer_backends(lb_id, id, &targets)
        })
        .await
    }

    async fn modify_4layer_backend_weights(
        &self,
        listener: &CloudListener,
        backends: &[Backend],
    ) -> Result<(), CoreError> {
        let id = listener_id(listener)?;
        let lb_id = listener.load_balancer_id.as_str();
        let targets = targets(backends);
        let client = &self.client;
        self.run_task("ModifyForwardFourthBackendsWeight", || {
            client.modify_4layer_backend_weights(lb_id, id, &targets)
        })
        .await
    }

    async fn register_7layer_backends(
        &self,
        listener: &CloudListener,
        rule: &Rule,
        backends: &[Backend],
    ) -> Result<(), CoreError> {
        let id = listener_id(listener)?;
        let location_id = rule_id(listener, rule)?;
        let lb_id = listener.load_balancer_id.as_str();
        let targets = targets(backends);
        let client = &self.client;
        self.run_task("RegisterInstancesWithForwardLBSeventhListener", || {
            client.register_7layer_backends(lb_id, id, location_id, &targets)
        })
        .await
    }

    async fn deregister_7layer_backends(
        &self,
        listener: &CloudListener,
        rule: &Rule,
        backends: &[Backend],
    ) -> Result<(), CoreError> {
        let id = listener_id(listener)?;
        let location_id = rule_id(listener, rule)?;
        let lb_id = listener.load_balancer_id.as_str();
        let targets = targets(backends);
        let client = &self.client;
        self.run_task("DeregisterInstancesFromForwardLB", || {
            client.deregister_7layer_backends(lb_id, id, location_id, &targets)
        })
        .await
    }

    async fn modify_7layer_backend_weights(
        &self,
        listener: &CloudListener,
        rule: &Rule,
        backends: &[Backend],
    ) -> Result<(), CoreError> {
        let id = listener_id(listener)?;
        let location_id = rule_id(listener, rule)?;
        let lb_id = listener.load_balancer_id.as_str();
        let targets = targets(backends);
        let client = &self.client;
        self.run_task("ModifyForwardSeventhBackends", || {
            client.modify_7layer_backend_weights(lb_id, id, location_id, &targets)
        })
        .await
    }

    async fn describe_backend_health(&self, lb_id: &str) -> Result<Vec<BackendHealth>, CoreError> {
        let client = &self.client;
        let listeners = self
            .retry
            .call("DescribeForwardLBHealthStatus", move || {
                client.describe_health(lb_id)
            })
            .await?;

        let mut out = Vec::new();
        for listener in listeners {
            let layer7 = protocol_from_code(listener.protocol).is_some_and(Protocol::is_layer7);
            for rule in listener.rules {
                let scope = match (layer7, rule.domain, rule.url) {
                    (true, Some(domain), url) => Some((domain, url.unwrap_or_default())),
                    _ => None,
                };
                out.extend(rule.backends.into_iter().map(|b| BackendHealth {
                    listener_id: listener.listener_id.clone(),
                    listen_port: listener.load_balancer_port,
                    rule: scope.clone(),
                    ip: b.ip,
                    port: b.port,
                    healthy: b.health_status == HEALTH_STATUS_HEALTHY,
                }));
            }
        }
        Ok(out)
    }
}

// ── Model → wire ─────────────────────────────────────────────────────

fn protocol_code(protocol: Protocol) -> i64 {
    match protocol {
        Protocol::Http => PROTOCOL_HTTP,
        Protocol::Tcp => PROTOCOL_TCP,
        Protocol::Udp => PROTOCOL_UDP,
        Protocol::Https => PROTOCOL_HTTPS,
    }
}

/// Scheduler names travel upper-case (`WRR`, `LEAST_CONN`, `IP_HASH`).
fn scheduler(policy: LbPolicy) -> String {
    policy.to_string().to_ascii_uppercase()
}

fn health_params(health: &HealthCheck) -> HealthParams {
    HealthParams {
        switch: health.enabled,
        timeout: health.timeout,
        interval: health.interval,
        healthy: health.healthy_threshold,
        unhealthy: health.unhealthy_threshold,
        http_code: health.http_code,
        http_check_path: health.http_check_path.clone(),
    }
}

fn ssl_params(tls: &TlsConfig) -> SslParams {
    SslParams {
        mode: tls.mode.to_string(),
        cert_id: tls.cert_id.clone(),
        cert_ca_id: tls.cert_ca_id.clone(),
        cert_name: tls.cert_server_name.clone(),
        cert_key: tls.cert_server_key.clone(),
        cert_content: tls.cert_server_content.clone(),
        cert_ca_name: tls.cert_client_ca_name.clone(),
        cert_ca_content: tls.cert_client_ca_content.clone(),
    }
}

fn listener_request(listener: &CloudListener) -> ListenerRequest {
    let mut req = ListenerRequest {
        name: listener.name.clone(),
        port: listener.listen_port,
        protocol: protocol_code(listener.protocol),
        ..ListenerRequest::default()
    };
    if let Some(tg) = listener.target_group() {
        req.session_expire = tg.session_expire;
        req.scheduler = scheduler(tg.lb_policy);
        req.health = health_params(&tg.health_check);
    }
    if listener.protocol == Protocol::Https {
        req.ssl = listener.tls.as_ref().map(ssl_params);
    }
    req
}

fn rule_request(rule: &Rule) -> RuleRequest {
    let tg = &rule.target_group;
    RuleRequest {
        domain: rule.domain.clone(),
        url: rule.url.clone(),
        session_expire: tg.session_expire,
        scheduler: scheduler(tg.lb_policy),
        health: health_params(&tg.health_check),
    }
}

fn targets(backends: &[Backend]) -> Vec<BackendTarget> {
    backends
        .iter()
        .map(|b| BackendTarget {
            ip: b.ip.clone(),
            port: b.port,
            weight: b.weight,
        })
        .collect()
}

// ── Wire → model ─────────────────────────────────────────────────────

fn protocol_from_code(code: i64) -> Option<Protocol> {
    match code {
        PROTOCOL_HTTP => Some(Protocol::Http),
        PROTOCOL_TCP => Some(Protocol::Tcp),
        PROTOCOL_UDP => Some(Protocol::Udp),
        PROTOCOL_HTTPS => Some(Protocol::Https),
        _ => None,
    }
}

fn policy(scheduler: Option<&str>) -> LbPolicy {
    scheduler
        .and_then(|s| s.to_ascii_lowercase().parse().ok())
        .unwrap_or_default()
}

fn load_balancer_from_wire(lb: models::LoadBalancer) -> CloudLoadBalancer {
    CloudLoadBalancer {
        id: lb.id,
        name: lb.load_balancer_name,
        network_type: if lb.load_balancer_type == LB_TYPE_PRIVATE {
            NetworkType::Private
        } else {
            NetworkType::Public
        },
        vips: lb.load_balancer_vips,
    }
}

fn backends_from_wire(backends: &[models::Backend]) -> Vec<Backend> {
    backends
        .iter()
        .map(|b| Backend::new(b.lan_ip.clone(), b.port).with_weight(b.weight))
        .collect()
}

fn listener_from_wire(
    lb_id: &str,
    wire: models::Listener,
    backends: Option<&ListenerBackends>,
) -> Option<CloudListener> {
    let Some(protocol) = protocol_from_code(wire.protocol) else {
        warn!(
            listener_id = %wire.listener_id,
            protocol = wire.protocol,
            "skipping listener with unknown protocol"
        );
        return None;
    };

    let forwarding = if protocol.is_layer7() {
        let rules = wire
            .rules
            .iter()
            .map(|r| {
                let bound = backends
                    .and_then(|l| l.rules.iter().find(|rb| rb.location_id == r.location_id))
                    .map(|rb| backends_from_wire(&rb.backends))
                    .unwrap_or_default();
                Rule {
                    id: Some(r.location_id.clone()),
                    domain: r.domain.clone(),
                    url: r.url.clone(),
                    target_group: TargetGroup {
                        session_expire: r.session_expire,
                        lb_policy: policy(r.scheduler.as_deref()),
                        health_check: HealthCheck {
                            enabled: r.health_switch == 1,
                            interval: r.interval_time,
                            healthy_threshold: r.health_num,
                            unhealthy_threshold: r.unhealth_num,
                            http_code: r.http_code,
                            http_check_path: r.http_check_path.clone(),
                            ..HealthCheck::default()
                        },
                        backends: bound,
                        ..TargetGroup::new(
                            wire.listener_name.clone(),
                            protocol,
                            wire.load_balancer_port,
                        )
                    },
                }
            })
            .collect();
        Forwarding::Rules(rules)
    } else {
        Forwarding::TargetGroup(TargetGroup {
            id: None,
            name: wire.listener_name.clone(),
            protocol,
            port: wire.load_balancer_port,
            session_expire: wire.session_expire,
            health_check: HealthCheck {
                enabled: wire.health_switch == 1,
                timeout: wire.time_out,
                interval: wire.interval_time,
                healthy_threshold: wire.health_num,
                unhealthy_threshold: wire.unhealth_num,
                http_code: wire.http_code,
                http_check_path: wire.http_check_path.clone(),
            },
            lb_policy: policy(wire.scheduler.as_deref()),
            backends: backends
                .map(|l| backends_from_wire(&l.backends))
                .unwrap_or_default(),
        })
    };

    let tls = wire.ssl_mode.as_deref().map(|mode| TlsConfig {
        mode: mode.parse().unwrap_or(TlsMode::Unidirectional),
        cert_id: wire.cert_id.clone(),
        cert_ca_id: wire.cert_ca_id.clone(),
        ..TlsConfig::default()
    });

    Some(CloudListener {
        namespace: String::new(),
        name: wire.listener_name,
        listener_id: Some(wire.listener_id),
        load_balancer_id: lb_id.to_owned(),
        protocol,
        listen_port: wire.load_balancer_port,
        tls,
        forwarding,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use lbsync_api::rest::models::{RuleBackends, Rule as WireRule};
    use pretty_assertions::assert_eq;

    use super::*;

    fn wire_tcp() -> models::Listener {
        models::Listener {
            listener_id: "lbl-1".into(),
            listener_name: "edge-9000".into(),
            protocol: PROTOCOL_TCP,
            load_balancer_port: 9000,
            health_switch: 1,
            time_out: 2,
            interval_time: 5,
            health_num: 3,
            unhealth_num: 3,
            scheduler: Some("WRR".into()),
            ..models::Listener::default()
        }
    }

    #[test]
    fn layer4_listener_with_backends() {
        let backends = ListenerBackends {
            listener_id: "lbl-1".into(),
            backends: vec![models::Backend {
                lan_ip: "10.0.0.1".into(),
                port: 8080,
                weight: 10,
            }],
            ..ListenerBackends::default()
        };
        let listener = listener_from_wire("lb-1", wire_tcp(), Some(&backends)).unwrap();

        assert_eq!(listener.listener_id.as_deref(), Some("lbl-1"));
        assert_eq!(listener.protocol, Protocol::Tcp);
        let tg = listener.target_group().unwrap();
        assert_eq!(tg.lb_policy, LbPolicy::RoundRobin);
        assert!(tg.health_check.enabled);
        assert_eq!(tg.backends, vec![Backend::new("10.0.0.1", 8080)]);
    }

    #[test]
    fn layer7_rules_pick_up_their_backends() {
        let wire = models::Listener {
            protocol: PROTOCOL_HTTPS,
            load_balancer_port: 443,
            ssl_mode: Some("MUTUAL".into()),
            cert_id: Some("cert-1".into()),
            rules: vec![
                WireRule {
                    location_id: "loc-1".into(),
                    domain: "a.com".into(),
                    url: "/x".into(),
                    ..WireRule::default()
                },
                WireRule {
                    location_id: "loc-2".into(),
                    domain: "a.com".into(),
                    url: "/y".into(),
                    ..WireRule::default()
                },
            ],
            ..wire_tcp()
        };
        let backends = ListenerBackends {
            listener_id: "lbl-1".into(),
            rules: vec![RuleBackends {
                location_id: "loc-2".into(),
                backends: vec![models::Backend {
                    lan_ip: "10.0.0.9".into(),
                    port: 80,
                    weight: 5,
                }],
                ..RuleBackends::default()
            }],
            ..ListenerBackends::default()
        };

        let listener = listener_from_wire("lb-1", wire, Some(&backends)).unwrap();
        let rules = listener.rules();
        assert_eq!(rules.len(), 2);
        assert!(rules[0].target_group.backends.is_empty());
        assert_eq!(
            rules[1].target_group.backends,
            vec![Backend::new("10.0.0.9", 80).with_weight(5)]
        );
        assert_eq!(rules[1].id.as_deref(), Some("loc-2"));
        let tls = listener.tls.unwrap();
        assert_eq!(tls.mode, TlsMode::Mutual);
        assert_eq!(tls.cert_id.as_deref(), Some("cert-1"));
    }

    #[test]
    fn unknown_protocol_is_skipped() {
        let wire = models::Listener {
            protocol: 99,
            ..wire_tcp()
        };
        assert!(listener_from_wire("lb-1", wire, None).is_none());
    }

    #[test]
    fn layer4_request_carries_target_group_attributes() {
        let mut tg = TargetGroup::new("default-svc-80", Protocol::Udp, 53);
        tg.session_expire = 30;
        tg.lb_policy = LbPolicy::IpHash;
        let listener = CloudListener {
            namespace: "kube-system".into(),
            name: "edge-53".into(),
            listener_id: None,
            load_balancer_id: "lb-1".into(),
            protocol: Protocol::Udp,
            listen_port: 53,
            tls: Some(TlsConfig::default()),
            forwarding: Forwarding::TargetGroup(tg),
        };
        let req = listener_request(&listener);
        assert_eq!(req.protocol, PROTOCOL_UDP);
        assert_eq!(req.session_expire, 30);
        assert_eq!(req.scheduler, "IP_HASH");
        assert!(req.ssl.is_none());
    }

    #[test]
    fn private_load_balancer_type() {
        let lb = load_balancer_from_wire(models::LoadBalancer {
            id: "lb-1".into(),
            load_balancer_type: LB_TYPE_PRIVATE,
            ..models::LoadBalancer::default()
        });
        assert_eq!(lb.network_type, NetworkType::Private);
    }
}
