// ── Runtime controller configuration ──
//
// These types describe *what* to reconcile and *how* to talk to the
// cloud. They carry credentials and tuning but never touch disk; the
// binary builds a `ControllerConfig` (via `lbsync-config`) and hands it in.

use std::time::Duration;

use lbsync_api::{Credentials, TlsMode, TransportConfig};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use url::Url;

use crate::model::{BackendMode, NetworkType};

/// Which wire API the cloud adapter speaks.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CloudProvider {
    /// Signed query-string API.
    #[default]
    Rest,
    /// JSON SDK API.
    Sdk,
}

impl CloudProvider {
    /// Public endpoint used when none is configured.
    pub fn default_endpoint(self) -> &'static str {
        match self {
            Self::Rest => "https://lb.api.qcloud.com/v2/index.php",
            Self::Sdk => "https://clb.tencentcloudapi.com",
        }
    }
}

/// TLS verification strategy for the cloud API endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (private gateways with self-signed certs).
    DangerAcceptInvalid,
}

/// The load balancer instance to adopt or create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerConfig {
    pub name: String,
    pub network_type: NetworkType,
    pub vpc_id: Option<String>,
    pub subnet_id: Option<String>,
}

/// Retry, backoff and batching limits applied to every cloud call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempts per call (and polls per task) before giving up.
    pub max_attempts: u32,
    /// Sleep after a rate-limit rejection.
    pub wait_rate_limited: Duration,
    /// Sleep while the load balancer is busy with another task.
    pub wait_busy: Duration,
    /// Sleep between task status polls.
    pub poll_interval: Duration,
    /// Largest number of backends bound or unbound per call.
    pub max_backends_per_bind: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 180,
            wait_rate_limited: Duration::from_secs(10),
            wait_busy: Duration::from_secs(2),
            poll_interval: Duration::from_secs(2),
            max_backends_per_bind: 20,
        }
    }
}

/// Everything the controller needs to run.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub provider: CloudProvider,
    pub region: String,
    pub endpoint: Url,
    pub credentials: Credentials,
    pub load_balancer: LoadBalancerConfig,
    /// Namespace generated listeners are cached under.
    pub namespace: String,
    pub backend_mode: BackendMode,
    /// Interval between reconciliation cycles.
    pub update_period: Duration,
    /// Interval between backend health polls. Zero disables polling.
    pub health_poll_period: Duration,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    pub tls: TlsVerification,
    pub retry: RetryConfig,
}

impl ControllerConfig {
    /// Transport settings for the wire clients.
    pub fn transport(&self) -> TransportConfig {
        let tls = match &self.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        };
        TransportConfig {
            tls,
            timeout: self.timeout,
            ..TransportConfig::default()
        }
    }
}
