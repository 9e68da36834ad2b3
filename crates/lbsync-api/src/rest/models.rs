// Query API wire types.
//
// Responses are flat JSON objects carrying `code`/`message` next to the
// payload fields. Request types are plain structs flattened into
// `prefix.N.field=value` query parameters by the client.

use std::collections::HashMap;

use serde::Deserialize;

// ── Provider constants ───────────────────────────────────────────────

/// Listener protocol codes.
pub const PROTOCOL_HTTP: i64 = 1;
pub const PROTOCOL_TCP: i64 = 2;
pub const PROTOCOL_UDP: i64 = 3;
pub const PROTOCOL_HTTPS: i64 = 4;

/// Load balancer network types.
pub const LB_TYPE_PUBLIC: i64 = 2;
pub const LB_TYPE_PRIVATE: i64 = 3;

/// Health status reported for a backend.
pub const HEALTH_STATUS_HEALTHY: i64 = 1;

// ── Request types ────────────────────────────────────────────────────

/// Health check parameters shared by listeners and rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthParams {
    pub switch: bool,
    pub timeout: u32,
    pub interval: u32,
    pub healthy: u32,
    pub unhealthy: u32,
    pub http_code: u32,
    pub http_check_path: String,
}

/// Certificate parameters for HTTPS listeners.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SslParams {
    /// `UNIDIRECTIONAL` or `MUTUAL`.
    pub mode: String,
    pub cert_id: Option<String>,
    pub cert_ca_id: Option<String>,
    pub cert_name: Option<String>,
    pub cert_key: Option<String>,
    pub cert_content: Option<String>,
    pub cert_ca_name: Option<String>,
    pub cert_ca_content: Option<String>,
}

/// A listener to create or modify.
#[derive(Debug, Clone, Default)]
pub struct ListenerRequest {
    pub name: String,
    pub port: u16,
    pub protocol: i64,
    pub session_expire: u32,
    pub scheduler: String,
    pub health: HealthParams,
    pub ssl: Option<SslParams>,
}

/// A forwarding rule to create or modify.
#[derive(Debug, Clone, Default)]
pub struct RuleRequest {
    pub domain: String,
    pub url: String,
    pub session_expire: u32,
    pub scheduler: String,
    pub health: HealthParams,
}

/// A backend address to bind or unbind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    pub ip: String,
    pub port: u16,
    pub weight: u32,
}

// ── Response types ───────────────────────────────────────────────────

/// Status fields present on every response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Status {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code_desc: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadBalancer {
    #[serde(rename = "unLoadBalancerId")]
    pub id: String,
    pub load_balancer_name: String,
    pub load_balancer_type: i64,
    pub load_balancer_vips: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct LoadBalancerSet {
    pub load_balancer_set: Vec<LoadBalancer>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateLoadBalancerResponse {
    /// Deal id → created load balancer ids.
    pub un_load_balancer_ids: HashMap<String, Vec<String>>,
    pub request_id: Option<i64>,
}

impl CreateLoadBalancerResponse {
    /// The first (and, for single creations, only) load balancer id.
    pub fn first_id(&self) -> Option<&str> {
        self.un_load_balancer_ids
            .values()
            .flat_map(|ids| ids.iter())
            .next()
            .map(String::as_str)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateListenersResponse {
    pub listener_ids: Vec<String>,
    pub request_id: Option<i64>,
}

/// Response of an asynchronous mutation.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct TaskResponse {
    pub request_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Rule {
    pub location_id: String,
    pub domain: String,
    pub url: String,
    pub session_expire: u32,
    pub health_switch: i64,
    pub interval_time: u32,
    pub health_num: u32,
    pub unhealth_num: u32,
    pub http_code: u32,
    pub http_check_path: String,
    pub scheduler: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Listener {
    pub listener_id: String,
    pub listener_name: String,
    pub protocol: i64,
    pub load_balancer_port: u16,
    pub session_expire: u32,
    pub health_switch: i64,
    pub time_out: u32,
    pub interval_time: u32,
    pub health_num: u32,
    pub unhealth_num: u32,
    pub http_code: u32,
    pub http_check_path: String,
    pub scheduler: Option<String>,
    #[serde(rename = "SSLMode")]
    pub ssl_mode: Option<String>,
    pub cert_id: Option<String>,
    pub cert_ca_id: Option<String>,
    pub rules: Vec<Rule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct ListenerSet {
    pub listener_set: Vec<Listener>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Backend {
    pub lan_ip: String,
    pub port: u16,
    pub weight: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleBackends {
    pub location_id: String,
    pub domain: String,
    pub url: String,
    pub backends: Vec<Backend>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListenerBackends {
    pub listener_id: String,
    pub protocol: i64,
    pub load_balancer_port: u16,
    pub backends: Vec<Backend>,
    pub rules: Vec<RuleBackends>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendHealth {
    pub ip: String,
    pub port: u16,
    pub health_status: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleHealth {
    pub location_id: Option<String>,
    pub domain: Option<String>,
    pub url: Option<String>,
    pub backends: Vec<BackendHealth>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListenerHealth {
    pub listener_id: String,
    pub protocol: i64,
    pub load_balancer_port: u16,
    pub rules: Vec<RuleHealth>,
}

/// `{ "data": ... }` payload wrapper used by the describe-style actions.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Data<T> {
    pub data: T,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct TaskResult {
    pub status: i64,
}
