// ── Ingress rule objects ──
//
// The declarative input of a reconciliation cycle. Each `Ingress`
// carries four-layer (TCP/UDP) and seven-layer (HTTP/HTTPS) rules, plus
// stateful variants that expand one rule into a listener per replica.

use serde::{Deserialize, Serialize};

use super::listener::{TlsConfig, TlsMode};
use super::target_group::{HealthCheck, LbPolicy};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingress {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub spec: IngressSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<IngressStatus>,
}

impl Ingress {
    /// `namespace/name`, for logs and status bookkeeping.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IngressSpec {
    pub tcp: Vec<Layer4Rule>,
    pub udp: Vec<Layer4Rule>,
    pub http: Vec<Layer7Rule>,
    pub https: Vec<Layer7Rule>,
    pub statefulset: StatefulSetRules,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatefulSetRules {
    pub tcp: Vec<StatefulSetLayer4Rule>,
    pub udp: Vec<StatefulSetLayer4Rule>,
    pub http: Vec<StatefulSetLayer7Rule>,
    pub https: Vec<StatefulSetLayer7Rule>,
}

/// Operator-visible outcome of the last cycle for one ingress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum IngressStatus {
    Normal,
    Abnormal(String),
}

// ── Rule bodies ──────────────────────────────────────────────────────

/// Backend reference shared by every rule kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRef {
    pub service_name: String,
    /// Defaults to the ingress namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub service_port: u16,
}

/// Per-rule overrides of target group attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_time: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lb_policy: Option<LbPolicySpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer4Rule {
    pub clb_port: u16,
    #[serde(flatten)]
    pub service: ServiceRef,
    #[serde(flatten)]
    pub attributes: RuleAttributes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer7Rule {
    pub clb_port: u16,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(flatten)]
    pub service: ServiceRef,
    #[serde(flatten)]
    pub attributes: RuleAttributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSpec>,
}

/// One listener per replica: port `start_port + (i - start_index)` for
/// each ordinal `i` in `start_index..=end_index`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdinalRange {
    pub start_port: u16,
    pub start_index: u32,
    pub end_index: u32,
}

impl OrdinalRange {
    /// `(ordinal, port)` pairs, or `None` if the range is inverted or a
    /// port would overflow.
    pub fn ports(&self) -> Option<Vec<(u32, u16)>> {
        if self.start_index > self.end_index {
            return None;
        }
        (self.start_index..=self.end_index)
            .map(|i| {
                let offset = u16::try_from(i - self.start_index).ok()?;
                Some((i, self.start_port.checked_add(offset)?))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatefulSetLayer4Rule {
    #[serde(flatten)]
    pub range: OrdinalRange,
    #[serde(flatten)]
    pub service: ServiceRef,
    #[serde(flatten)]
    pub attributes: RuleAttributes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatefulSetLayer7Rule {
    #[serde(flatten)]
    pub range: OrdinalRange,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(flatten)]
    pub service: ServiceRef,
    #[serde(flatten)]
    pub attributes: RuleAttributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSpec>,
}

fn default_path() -> String {
    "/".into()
}

// ── Attribute specs ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LbPolicySpec {
    pub strategy: LbPolicy,
}

/// Health check overrides; unset fields keep the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HealthCheckSpec {
    pub enabled: bool,
    pub timeout: Option<u32>,
    pub interval_time: Option<u32>,
    pub health_num: Option<u32>,
    pub un_health_num: Option<u32>,
    pub http_check_path: Option<String>,
    pub http_code: Option<u32>,
}

impl HealthCheckSpec {
    pub fn to_health_check(&self) -> HealthCheck {
        let defaults = HealthCheck::default();
        HealthCheck {
            enabled: self.enabled,
            timeout: self.timeout.unwrap_or(defaults.timeout),
            interval: self.interval_time.unwrap_or(defaults.interval),
            healthy_threshold: self.health_num.unwrap_or(defaults.healthy_threshold),
            unhealthy_threshold: self.un_health_num.unwrap_or(defaults.unhealthy_threshold),
            http_code: self.http_code.unwrap_or(defaults.http_code),
            http_check_path: self
                .http_check_path
                .clone()
                .unwrap_or(defaults.http_check_path),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TlsSpec {
    pub mode: TlsMode,
    pub cert_id: Option<String>,
    pub cert_ca_id: Option<String>,
    pub cert_server_name: Option<String>,
    pub cert_server_key: Option<String>,
    pub cert_server_content: Option<String>,
    pub cert_client_ca_name: Option<String>,
    pub cert_client_ca_content: Option<String>,
}

impl From<&TlsSpec> for TlsConfig {
    fn from(spec: &TlsSpec) -> Self {
        Self {
            mode: spec.mode,
            cert_id: spec.cert_id.clone(),
            cert_ca_id: spec.cert_ca_id.clone(),
            cert_server_name: spec.cert_server_name.clone(),
            cert_server_key: spec.cert_server_key.clone(),
            cert_server_content: spec.cert_server_content.clone(),
            cert_client_ca_name: spec.cert_client_ca_name.clone(),
            cert_client_ca_content: spec.cert_client_ca_content.clone(),
        }
    }
}
