// ── Domain model ──
//
// Value types for listeners, rules, target groups and backends, plus the
// pure diff primitives the reconciler builds on. Nothing here performs
// I/O or mutates in place.

mod backend;
mod endpoint;
mod ingress;
mod listener;
mod load_balancer;
mod rule;
mod target_group;

pub use backend::{Backend, BackendDiff, DEFAULT_WEIGHT, diff_backends, weight_updates};
pub use endpoint::{BackendMode, EndpointNode, NodePort, ServiceEndpoints, ServicePort};
pub use ingress::{
    HealthCheckSpec, Ingress, IngressSpec, IngressStatus, LbPolicySpec, Layer4Rule, Layer7Rule,
    OrdinalRange, RuleAttributes, ServiceRef, StatefulSetLayer4Rule, StatefulSetLayer7Rule,
    StatefulSetRules, TlsSpec,
};
pub use listener::{CloudListener, Forwarding, Protocol, TlsConfig, TlsMode};
pub use load_balancer::{CloudLoadBalancer, NetworkType};
pub use rule::{Rule, RuleDiff, diff_rules, update_rules};
pub use target_group::{HealthCheck, LbPolicy, TargetGroup};
