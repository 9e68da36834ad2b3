use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::rule::{Rule, diff_rules, update_rules};
use super::target_group::TargetGroup;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Http,
    Https,
}

impl Protocol {
    /// HTTP and HTTPS listeners route by host and path through rules.
    pub fn is_layer7(self) -> bool {
        matches!(self, Self::Http | Self::Https)
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TlsMode {
    #[default]
    Unidirectional,
    Mutual,
}

/// Certificate references for an HTTPS listener.
///
/// Either `cert_id` names an uploaded certificate, or the `cert_server_*`
/// fields carry one inline. Client CA fields only apply in mutual mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    pub mode: TlsMode,
    pub cert_id: Option<String>,
    pub cert_ca_id: Option<String>,
    pub cert_server_name: Option<String>,
    pub cert_server_key: Option<String>,
    pub cert_server_content: Option<String>,
    pub cert_client_ca_name: Option<String>,
    pub cert_client_ca_content: Option<String>,
}

/// Where a listener sends traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forwarding {
    /// Four-layer: one target group bound to the listener itself.
    TargetGroup(TargetGroup),
    /// Seven-layer: host/path rules, each with its own target group.
    Rules(Vec<Rule>),
}

/// A listener on the managed load balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudListener {
    pub namespace: String,
    pub name: String,
    /// Cloud identity; absent until the listener has been created.
    pub listener_id: Option<String>,
    pub load_balancer_id: String,
    pub protocol: Protocol,
    pub listen_port: u16,
    pub tls: Option<TlsConfig>,
    pub forwarding: Forwarding,
}

impl CloudListener {
    /// Cache identity, `namespace/name`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn target_group(&self) -> Option<&TargetGroup> {
        match &self.forwarding {
            Forwarding::TargetGroup(tg) => Some(tg),
            Forwarding::Rules(_) => None,
        }
    }

    /// Rules of a seven-layer listener; empty for four-layer ones.
    pub fn rules(&self) -> &[Rule] {
        match &self.forwarding {
            Forwarding::Rules(rules) => rules,
            Forwarding::TargetGroup(_) => &[],
        }
    }

    /// Total backends across the target group or every rule.
    pub fn backend_count(&self) -> usize {
        match &self.forwarding {
            Forwarding::TargetGroup(tg) => tg.backends.len(),
            Forwarding::Rules(rules) => rules.iter().map(|r| r.target_group.backends.len()).sum(),
        }
    }

    /// Whether applying `other` over `self` would be a no-op.
    ///
    /// Identity fields must match. Four-layer listeners then compare
    /// their target groups; seven-layer listeners compare TLS and
    /// require no rule to be added, removed or updated.
    pub fn is_equal(&self, other: &Self) -> bool {
        if self.name != other.name
            || self.namespace != other.namespace
            || self.load_balancer_id != other.load_balancer_id
            || self.listen_port != other.listen_port
            || self.protocol != other.protocol
        {
            return false;
        }
        match (&self.forwarding, &other.forwarding) {
            (Forwarding::TargetGroup(a), Forwarding::TargetGroup(b)) => a.is_equal(b),
            (Forwarding::Rules(a), Forwarding::Rules(b)) => {
                self.tls == other.tls
                    && diff_rules(a, b).is_empty()
                    && update_rules(a, b).is_empty()
            }
            _ => false,
        }
    }
}
