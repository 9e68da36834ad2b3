use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::backend::{Backend, diff_backends, weight_updates};
use super::listener::Protocol;

/// Backend scheduling strategy.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum LbPolicy {
    #[default]
    #[serde(rename = "wrr")]
    #[strum(serialize = "wrr")]
    RoundRobin,
    #[serde(rename = "least_conn")]
    #[strum(serialize = "least_conn")]
    LeastConnections,
    #[serde(rename = "ip_hash")]
    #[strum(serialize = "ip_hash")]
    IpHash,
}

/// Health probe settings for a target group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    pub enabled: bool,
    /// Probe timeout in seconds (four-layer only).
    pub timeout: u32,
    /// Seconds between probes.
    pub interval: u32,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
    /// Bitmask of HTTP status classes counted as healthy (1=1xx .. 16=5xx).
    pub http_code: u32,
    pub http_check_path: String,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: 2,
            interval: 5,
            healthy_threshold: 3,
            unhealthy_threshold: 3,
            http_code: 31,
            http_check_path: "/".into(),
        }
    }
}

impl HealthCheck {
    /// Compare the fields that matter for `protocol`.
    ///
    /// Two disabled checks are equal whatever their tuning. HTTP fields
    /// only count for seven-layer protocols, the probe timeout only for
    /// four-layer ones.
    pub fn is_equal(&self, other: &Self, protocol: Protocol) -> bool {
        if !self.enabled && !other.enabled {
            return true;
        }
        let common = self.enabled == other.enabled
            && self.interval == other.interval
            && self.healthy_threshold == other.healthy_threshold
            && self.unhealthy_threshold == other.unhealthy_threshold;
        if protocol.is_layer7() {
            common
                && self.http_code == other.http_code
                && self.http_check_path == other.http_check_path
        } else {
            common && self.timeout == other.timeout
        }
    }
}

/// A named set of weighted backends plus the attributes applied to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetGroup {
    /// Cloud identity; absent on freshly generated groups.
    pub id: Option<String>,
    pub name: String,
    pub protocol: Protocol,
    pub port: u16,
    /// Session persistence in seconds; `0` disables it.
    pub session_expire: u32,
    pub health_check: HealthCheck,
    pub lb_policy: LbPolicy,
    pub backends: Vec<Backend>,
}

impl TargetGroup {
    pub fn new(name: impl Into<String>, protocol: Protocol, port: u16) -> Self {
        Self {
            id: None,
            name: name.into(),
            protocol,
            port,
            session_expire: 0,
            health_check: HealthCheck::default(),
            lb_policy: LbPolicy::default(),
            backends: Vec::new(),
        }
    }

    /// Attribute equality, independent of the backend list.
    pub fn is_attr_equal(&self, other: &Self) -> bool {
        self.session_expire == other.session_expire
            && self.lb_policy == other.lb_policy
            && self
                .health_check
                .is_equal(&other.health_check, self.protocol)
    }

    /// Full equality: same attributes, same backend addresses (in any
    /// order) and same weights.
    pub fn is_equal(&self, other: &Self) -> bool {
        self.is_attr_equal(other)
            && diff_backends(&self.backends, &other.backends).is_empty()
            && weight_updates(&self.backends, &other.backends).is_empty()
    }

    /// A copy with `added` appended, skipping addresses already present.
    pub fn with_backends_added(&self, added: &[Backend]) -> Self {
        let mut next = self.clone();
        for backend in added {
            if !next.backends.iter().any(|b| b.key() == backend.key()) {
                next.backends.push(backend.clone());
            }
        }
        next
    }

    /// A copy without any backend whose address appears in `removed`.
    pub fn with_backends_removed(&self, removed: &[Backend]) -> Self {
        let mut next = self.clone();
        next.backends
            .retain(|b| !removed.iter().any(|r| r.key() == b.key()));
        next
    }

    /// A copy with the weights of matching addresses replaced.
    pub fn with_weights(&self, updates: &[Backend]) -> Self {
        let mut next = self.clone();
        for backend in &mut next.backends {
            if let Some(update) = updates.iter().find(|u| u.key() == backend.key()) {
                backend.weight = update.weight;
            }
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(backends: &[(&str, u16)]) -> TargetGroup {
        let mut tg = TargetGroup::new("default-web-80", Protocol::Tcp, 9000);
        tg.backends = backends
            .iter()
            .map(|(ip, port)| Backend::new(*ip, *port))
            .collect();
        tg
    }

    #[test]
    fn equality_ignores_backend_order() {
        let a = group(&[("10.0.0.1", 80), ("10.0.0.2", 80), ("10.0.0.3", 80)]);
        let b = group(&[("10.0.0.3", 80), ("10.0.0.1", 80), ("10.0.0.2", 80)]);
        assert!(a.is_equal(&b));
    }

    #[test]
    fn attr_equality_ignores_backends() {
        let a = group(&[("10.0.0.1", 80)]);
        let b = group(&[]);
        assert!(a.is_attr_equal(&b));
        assert!(!a.is_equal(&b));
    }

    #[test]
    fn policy_change_breaks_attr_equality() {
        let a = group(&[]);
        let mut b = group(&[]);
        b.lb_policy = LbPolicy::IpHash;
        assert!(!a.is_attr_equal(&b));
    }

    #[test]
    fn weight_change_breaks_full_equality() {
        let a = group(&[("10.0.0.1", 80)]);
        let mut b = a.clone();
        b.backends[0].weight = 1;
        assert!(a.is_attr_equal(&b));
        assert!(!a.is_equal(&b));
    }

    #[test]
    fn http_fields_ignored_for_layer4() {
        let a = group(&[]);
        let mut b = group(&[]);
        b.health_check.http_check_path = "/healthz".into();
        assert!(a.is_attr_equal(&b));

        let mut c = TargetGroup::new("r", Protocol::Http, 80);
        let mut d = c.clone();
        d.health_check.http_check_path = "/healthz".into();
        assert!(!c.is_attr_equal(&d));
        c.health_check.enabled = false;
        d.health_check.enabled = false;
        assert!(c.is_attr_equal(&d));
    }

    #[test]
    fn pure_helpers_leave_original_untouched() {
        let base = group(&[("10.0.0.1", 80)]);
        let grown = base.with_backends_added(&[
            Backend::new("10.0.0.2", 80),
            Backend::new("10.0.0.1", 80),
        ]);
        assert_eq!(base.backends.len(), 1);
        assert_eq!(grown.backends.len(), 2);

        let shrunk = grown.with_backends_removed(&[Backend::new("10.0.0.1", 80)]);
        assert_eq!(shrunk.backends, vec![Backend::new("10.0.0.2", 80)]);

        let reweighted = shrunk.with_weights(&[Backend::new("10.0.0.2", 80).with_weight(3)]);
        assert_eq!(reweighted.backends[0].weight, 3);
        assert_eq!(shrunk.backends[0].weight, 10);
    }

    #[test]
    fn lb_policy_strings() {
        assert_eq!(LbPolicy::LeastConnections.to_string(), "least_conn");
        assert_eq!("ip_hash".parse::<LbPolicy>().ok(), Some(LbPolicy::IpHash));
    }
}
