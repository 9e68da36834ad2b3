// SDK API request/response types.
//
// Field names follow the provider's PascalCase JSON. Responses arrive
// inside `{"Response": {...}}`; these types describe the inner object.

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────

pub const LB_TYPE_OPEN: &str = "OPEN";
pub const LB_TYPE_INTERNAL: &str = "INTERNAL";

// ── Shared ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HealthCheck {
    pub health_switch: i64,
    pub time_out: u32,
    pub interval_time: u32,
    pub health_num: u32,
    pub un_health_num: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_check_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CertificateInput {
    #[serde(rename = "SSLMode")]
    pub ssl_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_ca_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_ca_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_ca_content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CertificateOutput {
    #[serde(rename = "SSLMode")]
    pub ssl_mode: String,
    pub cert_id: Option<String>,
    pub cert_ca_id: Option<String>,
}

/// A backend address, as registered or deregistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Target {
    pub eni_ip: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

/// Response of an asynchronous mutation; the request id doubles as
/// the task id for `DescribeTaskStatus`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TaskResponse {
    pub request_id: Option<String>,
}

// ── Load balancers ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateLoadBalancerRequest {
    pub load_balancer_type: String,
    pub load_balancer_name: String,
    pub forward: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateLoadBalancerResponse {
    pub load_balancer_ids: Vec<String>,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeLoadBalancersRequest {
    pub load_balancer_name: String,
    pub forward: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LoadBalancer {
    pub load_balancer_id: String,
    pub load_balancer_name: String,
    pub load_balancer_type: String,
    pub load_balancer_vips: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeLoadBalancersResponse {
    pub total_count: u64,
    pub load_balancer_set: Vec<LoadBalancer>,
}

// ── Listeners ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateListenerRequest {
    pub load_balancer_id: String,
    pub ports: Vec<u16>,
    pub protocol: String,
    pub listener_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_expire_time: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateListenerResponse {
    pub listener_ids: Vec<String>,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeListenersRequest {
    pub load_balancer_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub listener_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RuleOutput {
    pub location_id: String,
    pub domain: String,
    pub url: String,
    pub session_expire_time: u32,
    pub health_check: Option<HealthCheck>,
    pub scheduler: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Listener {
    pub listener_id: String,
    pub listener_name: String,
    pub protocol: String,
    pub port: u16,
    pub certificate: Option<CertificateOutput>,
    pub health_check: Option<HealthCheck>,
    pub scheduler: Option<String>,
    pub session_expire_time: u32,
    pub rules: Vec<RuleOutput>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeListenersResponse {
    pub listeners: Vec<Listener>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteListenerRequest {
    pub load_balancer_id: String,
    pub listener_id: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModifyListenerRequest {
    pub load_balancer_id: String,
    pub listener_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listener_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_expire_time: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<String>,
}

// ── Rules ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RuleInput {
    pub domain: String,
    pub url: String,
    pub session_expire_time: u32,
    pub health_check: HealthCheck,
    pub scheduler: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateRuleRequest {
    pub load_balancer_id: String,
    pub listener_id: String,
    pub rules: Vec<RuleInput>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModifyRuleRequest {
    pub load_balancer_id: String,
    pub listener_id: String,
    pub location_id: String,
    pub session_expire_time: u32,
    pub health_check: HealthCheck,
    pub scheduler: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteRuleRequest {
    pub load_balancer_id: String,
    pub listener_id: String,
    pub location_ids: Vec<String>,
}

// ── Targets ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TargetsRequest {
    pub load_balancer_id: String,
    pub listener_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    pub targets: Vec<Target>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModifyTargetWeightRequest {
    pub load_balancer_id: String,
    pub listener_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    pub targets: Vec<Target>,
    pub weight: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeTargetsRequest {
    pub load_balancer_id: String,
    pub listener_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Backend {
    pub private_ip_addresses: Vec<String>,
    pub port: u16,
    pub weight: u32,
}

impl Backend {
    /// The address a target was registered with.
    pub fn ip(&self) -> Option<&str> {
        self.private_ip_addresses.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RuleTargets {
    pub location_id: String,
    pub domain: String,
    pub url: String,
    pub targets: Vec<Backend>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ListenerBackend {
    pub listener_id: String,
    pub protocol: String,
    pub port: u16,
    pub targets: Vec<Backend>,
    pub rules: Vec<RuleTargets>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeTargetsResponse {
    pub listeners: Vec<ListenerBackend>,
}

// ── Tasks ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeTaskStatusRequest {
    pub task_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeTaskStatusResponse {
    pub status: i64,
}

// ── Health ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeTargetHealthRequest {
    pub load_balancer_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TargetHealth {
    #[serde(rename = "IP")]
    pub ip: String,
    pub port: u16,
    pub health_status: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RuleHealth {
    pub location_id: String,
    pub domain: String,
    pub url: String,
    pub targets: Vec<TargetHealth>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ListenerHealth {
    pub listener_id: String,
    pub protocol: String,
    pub port: u16,
    pub rules: Vec<RuleHealth>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LoadBalancerHealth {
    pub load_balancer_id: String,
    pub listeners: Vec<ListenerHealth>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeTargetHealthResponse {
    pub load_balancers: Vec<LoadBalancerHealth>,
}
