// ── Listener generator ──
//
// Turns the validated ingress set into the desired listener set: one
// listener per load balancer port. Four-layer rules own their port;
// seven-layer rules on one port merge into a single listener's rule
// list; stateful rules expand into one listener (or rule) per ordinal.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::model::{
    Backend, BackendMode, CloudListener, CloudLoadBalancer, Forwarding, Ingress, Layer7Rule,
    Protocol, Rule, RuleAttributes, ServiceEndpoints, ServiceRef, TargetGroup, TlsConfig,
};
use crate::source::BackendResolver;

/// Builds desired [`CloudListener`]s from ingress rules.
pub struct ListenerGenerator {
    resolver: Arc<dyn BackendResolver>,
    namespace: String,
    mode: BackendMode,
}

impl ListenerGenerator {
    /// `namespace` is the cache namespace every generated listener gets.
    pub fn new(
        resolver: Arc<dyn BackendResolver>,
        namespace: impl Into<String>,
        mode: BackendMode,
    ) -> Self {
        Self {
            resolver,
            namespace: namespace.into(),
            mode,
        }
    }

    /// Desired listeners for `lb`, sorted by port.
    ///
    /// Backend resolution failures are logged and produce an empty
    /// backend list; they never drop a listener.
    pub async fn generate(
        &self,
        lb: &CloudLoadBalancer,
        ingresses: &[Ingress],
    ) -> Vec<CloudListener> {
        let mut endpoints = EndpointCache::new(self.resolver.as_ref(), self.mode);
        let mut listeners: BTreeMap<u16, CloudListener> = BTreeMap::new();

        for ingress in ingresses {
            let spec = &ingress.spec;
            let ns = ingress.namespace.as_str();

            for (protocol, rules) in [(Protocol::Tcp, &spec.tcp), (Protocol::Udp, &spec.udp)] {
                for rule in rules {
                    let backends = endpoints.backends(ns, &rule.service).await;
                    let tg = target_group(
                        ns,
                        &rule.service,
                        &rule.attributes,
                        protocol,
                        rule.clb_port,
                        backends,
                        None,
                    );
                    self.insert_layer4(&mut listeners, lb, protocol, rule.clb_port, tg);
                }
            }

            let layer7 = [(Protocol::Http, &spec.http), (Protocol::Https, &spec.https)];
            for (protocol, rules) in layer7 {
                for rule in rules {
                    let backends = endpoints.backends(ns, &rule.service).await;
                    self.merge_layer7(&mut listeners, lb, protocol, ns, rule, backends);
                }
            }

            let stateful = &spec.statefulset;
            let layer4 = [(Protocol::Tcp, &stateful.tcp), (Protocol::Udp, &stateful.udp)];
            for (protocol, rules) in layer4 {
                for rule in rules {
                    let Some(ports) = rule.range.ports() else {
                        warn!(
                            ingress = %ingress.key(),
                            "skipping stateful rule with invalid range"
                        );
                        continue;
                    };
                    for (ordinal, port) in ports {
                        let backends = endpoints.ordinal_backends(ns, &rule.service, ordinal).await;
                        let tg = target_group(
                            ns,
                            &rule.service,
                            &rule.attributes,
                            protocol,
                            port,
                            backends,
                            Some(ordinal),
                        );
                        self.insert_layer4(&mut listeners, lb, protocol, port, tg);
                    }
                }
            }

            let layer7 = [(Protocol::Http, &stateful.http), (Protocol::Https, &stateful.https)];
            for (protocol, rules) in layer7 {
                for rule in rules {
                    let Some(ports) = rule.range.ports() else {
                        warn!(
                            ingress = %ingress.key(),
                            "skipping stateful rule with invalid range"
                        );
                        continue;
                    };
                    for (ordinal, port) in ports {
                        let backends = endpoints.ordinal_backends(ns, &rule.service, ordinal).await;
                        let expanded = Layer7Rule {
                            clb_port: port,
                            host: rule.host.clone(),
                            path: rule.path.clone(),
                            service: rule.service.clone(),
                            attributes: rule.attributes.clone(),
                            tls: rule.tls.clone(),
                        };
                        self.merge_layer7(&mut listeners, lb, protocol, ns, &expanded, backends);
                    }
                }
            }
        }

        debug!(count = listeners.len(), "generated listeners");
        listeners.into_values().collect()
    }

    fn listener(
        &self,
        lb: &CloudLoadBalancer,
        protocol: Protocol,
        port: u16,
        tls: Option<TlsConfig>,
        forwarding: Forwarding,
    ) -> CloudListener {
        CloudListener {
            namespace: self.namespace.clone(),
            name: format!("{}-{port}", lb.name),
            listener_id: None,
            load_balancer_id: lb.id.clone(),
            protocol,
            listen_port: port,
            tls,
            forwarding,
        }
    }

    fn insert_layer4(
        &self,
        listeners: &mut BTreeMap<u16, CloudListener>,
        lb: &CloudLoadBalancer,
        protocol: Protocol,
        port: u16,
        tg: TargetGroup,
    ) {
        if listeners.contains_key(&port) {
            warn!(port, "port already claimed, skipping four-layer rule");
            return;
        }
        let listener = self.listener(lb, protocol, port, None, Forwarding::TargetGroup(tg));
        listeners.insert(port, listener);
    }

    fn merge_layer7(
        &self,
        listeners: &mut BTreeMap<u16, CloudListener>,
        lb: &CloudLoadBalancer,
        protocol: Protocol,
        ns: &str,
        rule: &Layer7Rule,
        backends: Vec<Backend>,
    ) {
        let port = rule.clb_port;
        let tg = target_group(ns, &rule.service, &rule.attributes, protocol, port, backends, None);
        let new_rule = Rule {
            id: None,
            domain: rule.host.clone(),
            url: rule.path.clone(),
            target_group: tg,
        };

        let listener = listeners.entry(port).or_insert_with(|| {
            let tls = (protocol == Protocol::Https)
                .then(|| rule.tls.as_ref().map(TlsConfig::from))
                .flatten();
            self.listener(lb, protocol, port, tls, Forwarding::Rules(Vec::new()))
        });
        if listener.protocol != protocol {
            warn!(
                port,
                existing = %listener.protocol,
                wanted = %protocol,
                "port already claimed, skipping rule"
            );
            return;
        }
        if listener.tls.is_none() && protocol == Protocol::Https {
            listener.tls = rule.tls.as_ref().map(TlsConfig::from);
        }
        if let Forwarding::Rules(rules) = &mut listener.forwarding {
            if rules.iter().any(|r| r.key() == new_rule.key()) {
                warn!(
                    port,
                    domain = %new_rule.domain,
                    url = %new_rule.url,
                    "duplicate rule, skipping"
                );
            } else {
                rules.push(new_rule);
            }
        }
    }
}

/// Target group for one rule. Stateful rules get the ordinal appended to
/// the name.
fn target_group(
    ns: &str,
    service: &ServiceRef,
    attributes: &RuleAttributes,
    protocol: Protocol,
    port: u16,
    backends: Vec<Backend>,
    ordinal: Option<u32>,
) -> TargetGroup {
    let svc_ns = service.namespace.as_deref().unwrap_or(ns);
    let mut name = format!("{svc_ns}-{}-{}", service.service_name, service.service_port);
    if let Some(ordinal) = ordinal {
        name = format!("{name}-{ordinal}");
    }
    TargetGroup {
        session_expire: attributes.session_time.unwrap_or(0),
        lb_policy: attributes
            .lb_policy
            .as_ref()
            .map(|p| p.strategy)
            .unwrap_or_default(),
        health_check: attributes
            .health_check
            .as_ref()
            .map(|h| h.to_health_check())
            .unwrap_or_default(),
        backends,
        ..TargetGroup::new(name, protocol, port)
    }
}

// ── Endpoint resolution ──────────────────────────────────────────────

/// Per-cycle memo of resolved services.
struct EndpointCache<'a> {
    resolver: &'a dyn BackendResolver,
    mode: BackendMode,
    resolved: HashMap<(String, String), Option<ServiceEndpoints>>,
}

impl<'a> EndpointCache<'a> {
    fn new(resolver: &'a dyn BackendResolver, mode: BackendMode) -> Self {
        Self {
            resolver,
            mode,
            resolved: HashMap::new(),
        }
    }

    async fn lookup(&mut self, namespace: &str, name: &str) -> Option<&ServiceEndpoints> {
        let key = (namespace.to_owned(), name.to_owned());
        if !self.resolved.contains_key(&key) {
            let endpoints = match self.resolver.service_endpoints(namespace, name).await {
                Ok(Some(endpoints)) => Some(endpoints),
                Ok(None) => {
                    warn!(namespace, service = name, "service not found, using no backends");
                    None
                }
                Err(err) => {
                    warn!(
                        namespace,
                        service = name,
                        error = %err,
                        "backend resolution failed, using no backends"
                    );
                    None
                }
            };
            self.resolved.insert(key.clone(), endpoints);
        }
        self.resolved.get(&key).and_then(Option::as_ref)
    }

    async fn backends(&mut self, ns: &str, service: &ServiceRef) -> Vec<Backend> {
        let namespace = service.namespace.as_deref().unwrap_or(ns);
        let mode = self.mode;
        let Some(endpoints) = self.lookup(namespace, &service.service_name).await else {
            return Vec::new();
        };
        endpoints
            .backends(service.service_port, mode)
            .unwrap_or_else(|| {
                warn!(
                    namespace,
                    service = %service.service_name,
                    port = service.service_port,
                    "service does not expose port"
                );
                Vec::new()
            })
    }

    /// The backend of the pod with `ordinal`, or nothing if that pod is absent.
    async fn ordinal_backends(
        &mut self,
        ns: &str,
        service: &ServiceRef,
        ordinal: u32,
    ) -> Vec<Backend> {
        let namespace = service.namespace.as_deref().unwrap_or(ns);
        let mode = self.mode;
        let Some(endpoints) = self.lookup(namespace, &service.service_name).await else {
            return Vec::new();
        };
        let Some(port_name) = endpoints.port_name(service.service_port) else {
            warn!(
                namespace,
                service = %service.service_name,
                port = service.service_port,
                "service does not expose port"
            );
            return Vec::new();
        };
        endpoints
            .nodes_by_ordinal()
            .into_iter()
            .find(|(o, _)| *o == ordinal)
            .and_then(|(_, node)| node.backend(port_name, mode))
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::CoreError;
    use crate::model::{
        EndpointNode, IngressSpec, Layer4Rule, NetworkType, NodePort, OrdinalRange, ServicePort,
        StatefulSetLayer4Rule, StatefulSetRules,
    };

    /// Serves fixed endpoints; `broken` services fail resolution.
    #[derive(Default)]
    pub(crate) struct StaticResolver {
        pub services: Vec<ServiceEndpoints>,
        pub broken: Vec<String>,
    }

    #[async_trait]
    impl BackendResolver for StaticResolver {
        async fn service_endpoints(
            &self,
            namespace: &str,
            name: &str,
        ) -> Result<Option<ServiceEndpoints>, CoreError> {
            if self.broken.iter().any(|b| b == name) {
                return Err(CoreError::Source {
                    message: "endpoints unavailable".into(),
                });
            }
            Ok(self
                .services
                .iter()
                .find(|s| s.namespace == namespace && s.name == name)
                .cloned())
        }
    }

    pub(crate) fn service(name: &str, pods: &[(&str, &str)]) -> ServiceEndpoints {
        ServiceEndpoints {
            namespace: "default".into(),
            name: name.into(),
            ports: vec![ServicePort {
                name: "main".into(),
                port: 80,
                protocol: None,
            }],
            nodes: pods
                .iter()
                .map(|(pod, ip)| EndpointNode {
                    name: (*pod).into(),
                    node_ip: "192.168.0.1".into(),
                    proxy_ip: (*ip).into(),
                    ports: vec![NodePort {
                        name: "main".into(),
                        node_port: Some(30080),
                        proxy_port: 8080,
                    }],
                })
                .collect(),
        }
    }

    fn lb() -> CloudLoadBalancer {
        CloudLoadBalancer {
            id: "lb-1".into(),
            name: "edge".into(),
            network_type: NetworkType::Public,
            vips: vec![],
        }
    }

    fn svc(name: &str) -> ServiceRef {
        ServiceRef {
            service_name: name.into(),
            namespace: None,
            service_port: 80,
        }
    }

    fn ingress(spec: IngressSpec) -> Ingress {
        Ingress {
            namespace: "default".into(),
            name: "ing".into(),
            spec,
            status: None,
        }
    }

    fn new_generator(resolver: StaticResolver, mode: BackendMode) -> ListenerGenerator {
        ListenerGenerator::new(Arc::new(resolver), "kube-system", mode)
    }

    #[tokio::test]
    async fn tcp_rule_resolves_backends() {
        let generator = new_generator(
            StaticResolver {
                services: vec![service("game", &[("game-a", "10.0.0.1"), ("game-b", "10.0.0.2")])],
                ..StaticResolver::default()
            },
            BackendMode::Overlay,
        );
        let spec = IngressSpec {
            tcp: vec![Layer4Rule {
                clb_port: 9000,
                service: svc("game"),
                attributes: RuleAttributes::default(),
            }],
            ..IngressSpec::default()
        };

        let listeners = generator.generate(&lb(), &[ingress(spec)]).await;
        assert_eq!(listeners.len(), 1);
        let l = &listeners[0];
        assert_eq!(l.key(), "kube-system/edge-9000");
        assert_eq!(l.load_balancer_id, "lb-1");
        let tg = l.target_group().unwrap();
        assert_eq!(tg.name, "default-game-80");
        assert_eq!(
            tg.backends,
            vec![Backend::new("10.0.0.1", 8080), Backend::new("10.0.0.2", 8080)]
        );
    }

    #[tokio::test]
    async fn underlay_mode_uses_node_ports() {
        let generator = new_generator(
            StaticResolver {
                services: vec![service("game", &[("game-a", "10.0.0.1")])],
                ..StaticResolver::default()
            },
            BackendMode::Underlay,
        );
        let spec = IngressSpec {
            udp: vec![Layer4Rule {
                clb_port: 53,
                service: svc("game"),
                attributes: RuleAttributes::default(),
            }],
            ..IngressSpec::default()
        };
        let listeners = generator.generate(&lb(), &[ingress(spec)]).await;
        assert_eq!(listeners[0].protocol, Protocol::Udp);
        assert_eq!(
            listeners[0].target_group().unwrap().backends,
            vec![Backend::new("192.168.0.1", 30080)]
        );
    }

    #[tokio::test]
    async fn http_rules_on_one_port_merge() {
        let generator = new_generator(
            StaticResolver {
                services: vec![service("web", &[("web-a", "10.0.0.5")])],
                ..StaticResolver::default()
            },
            BackendMode::Overlay,
        );
        let rule = |path: &str| Layer7Rule {
            clb_port: 80,
            host: "a.com".into(),
            path: path.into(),
            service: svc("web"),
            attributes: RuleAttributes::default(),
            tls: None,
        };
        let spec = IngressSpec {
            http: vec![rule("/x"), rule("/y")],
            ..IngressSpec::default()
        };

        let listeners = generator.generate(&lb(), &[ingress(spec)]).await;
        assert_eq!(listeners.len(), 1);
        let keys: Vec<_> = listeners[0].rules().iter().map(Rule::key).collect();
        assert_eq!(keys, vec![("a.com", "/x"), ("a.com", "/y")]);
    }

    #[tokio::test]
    async fn resolution_failure_keeps_listener() {
        let generator = new_generator(
            StaticResolver {
                broken: vec!["game".into()],
                ..StaticResolver::default()
            },
            BackendMode::Overlay,
        );
        let spec = IngressSpec {
            tcp: vec![
                Layer4Rule {
                    clb_port: 9000,
                    service: svc("game"),
                    attributes: RuleAttributes::default(),
                },
                Layer4Rule {
                    clb_port: 9001,
                    service: svc("missing"),
                    attributes: RuleAttributes::default(),
                },
            ],
            ..IngressSpec::default()
        };

        let listeners = generator.generate(&lb(), &[ingress(spec)]).await;
        assert_eq!(listeners.len(), 2);
        assert!(listeners.iter().all(|l| l.backend_count() == 0));
    }

    #[tokio::test]
    async fn stateful_rule_binds_ports_by_ordinal() {
        // Pods listed out of order, and ordinal 1 missing.
        let generator = new_generator(
            StaticResolver {
                services: vec![service(
                    "db",
                    &[("db-10", "10.0.1.10"), ("db-2", "10.0.1.2"), ("db-0", "10.0.1.0")],
                )],
                ..StaticResolver::default()
            },
            BackendMode::Overlay,
        );
        let spec = IngressSpec {
            statefulset: StatefulSetRules {
                tcp: vec![StatefulSetLayer4Rule {
                    range: OrdinalRange {
                        start_port: 10000,
                        start_index: 0,
                        end_index: 2,
                    },
                    service: svc("db"),
                    attributes: RuleAttributes::default(),
                }],
                ..StatefulSetRules::default()
            },
            ..IngressSpec::default()
        };

        let listeners = generator.generate(&lb(), &[ingress(spec)]).await;
        let bound: Vec<(u16, Vec<Backend>)> = listeners
            .iter()
            .map(|l| (l.listen_port, l.target_group().unwrap().backends.clone()))
            .collect();
        assert_eq!(
            bound,
            vec![
                (10000, vec![Backend::new("10.0.1.0", 8080)]),
                (10001, vec![]),
                (10002, vec![Backend::new("10.0.1.2", 8080)]),
            ]
        );
        assert_eq!(
            listeners[2].target_group().unwrap().name,
            "default-db-80-2"
        );
    }

    #[tokio::test]
    async fn output_is_sorted_by_port() {
        let generator = new_generator(StaticResolver::default(), BackendMode::Overlay);
        let rule = |port| Layer4Rule {
            clb_port: port,
            service: svc("game"),
            attributes: RuleAttributes::default(),
        };
        let spec = IngressSpec {
            tcp: vec![rule(9002), rule(80), rule(9000)],
            ..IngressSpec::default()
        };
        let ports: Vec<u16> = generator
            .generate(&lb(), &[ingress(spec)])
            .await
            .iter()
            .map(|l| l.listen_port)
            .collect();
        assert_eq!(ports, vec![80, 9000, 9002]);
    }
}
