// ── Cloud adapter boundary ──
//
// One trait with one operation per cloud resource. The updater only ever
// talks to `dyn CloudAdapter`; which wire API sits behind it is decided
// once, in `connect`, from the configured provider.

mod rest;
pub mod retry;
mod sdk;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{CloudProvider, ControllerConfig, LoadBalancerConfig};
use crate::error::CoreError;
use crate::metrics::MetricsSink;
use crate::model::{Backend, CloudListener, CloudLoadBalancer, Rule};

pub use self::rest::RestAdapter;
pub use self::retry::{ErrorClass, RetryPolicy, SegmentOutcome, Sleeper, TokioSleeper};
pub use self::sdk::SdkAdapter;

/// How to find a listener on a load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerLookup<'a> {
    Id(&'a str),
    Port(u16),
}

impl fmt::Display for ListenerLookup<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {id}"),
            Self::Port(port) => write!(f, "port {port}"),
        }
    }
}

/// Health of one backend as reported by the cloud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendHealth {
    pub listener_id: String,
    pub listen_port: u16,
    /// `(domain, url)` for backends bound to a seven-layer rule.
    pub rule: Option<(String, String)>,
    pub ip: String,
    pub port: u16,
    pub healthy: bool,
}

impl BackendHealth {
    /// Metric label for the listener (and rule) the backend sits behind.
    pub fn listener_label(&self) -> String {
        match &self.rule {
            Some((domain, url)) => format!("{}:{domain}{url}", self.listen_port),
            None => self.listen_port.to_string(),
        }
    }

    pub fn backend_label(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Uniform operations over a cloud load balancer API.
///
/// Describe operations return `Ok(None)` when the resource does not
/// exist. Mutating operations wait for any asynchronous task they start.
/// Operations taking a [`CloudListener`] or [`Rule`] need the cloud id to
/// be set and fail with a missing-id error otherwise.
#[async_trait]
pub trait CloudAdapter: Send + Sync {
    // ── Load balancer ────────────────────────────────────────────────

    async fn create_load_balancer(
        &self,
        config: &LoadBalancerConfig,
    ) -> Result<CloudLoadBalancer, CoreError>;

    async fn describe_load_balancer(
        &self,
        name: &str,
    ) -> Result<Option<CloudLoadBalancer>, CoreError>;

    // ── Listeners ────────────────────────────────────────────────────

    /// Create the listener itself. Rules and backends are added
    /// separately. Returns the new listener id.
    async fn create_listener(&self, listener: &CloudListener) -> Result<String, CoreError>;

    /// Describe one listener, including its rules and bound backends.
    async fn describe_listener(
        &self,
        lb_id: &str,
        lookup: ListenerLookup<'_>,
    ) -> Result<Option<CloudListener>, CoreError>;

    async fn delete_listener(&self, lb_id: &str, listener_id: &str) -> Result<(), CoreError>;

    /// Push health check, session and scheduling attributes (four-layer)
    /// or certificates (HTTPS).
    async fn modify_listener_attribute(&self, listener: &CloudListener) -> Result<(), CoreError>;

    /// Every listener on the load balancer, with rules and backends.
    async fn list_listeners(&self, lb_id: &str) -> Result<Vec<CloudListener>, CoreError>;

    // ── Rules ────────────────────────────────────────────────────────

    async fn create_rules(&self, listener: &CloudListener, rules: &[Rule]) -> Result<(), CoreError>;

    async fn describe_rule_by_domain_and_url(
        &self,
        listener: &CloudListener,
        domain: &str,
        url: &str,
    ) -> Result<Option<Rule>, CoreError>;

    async fn modify_rule_attribute(
        &self,
        listener: &CloudListener,
        rule: &Rule,
    ) -> Result<(), CoreError>;

    async fn delete_rule(&self, listener: &CloudListener, rule: &Rule) -> Result<(), CoreError>;

    // ── Backends ─────────────────────────────────────────────────────

    async fn register_4layer_backends(
        &self,
        listener: &CloudListener,
        backends: &[Backend],
    ) -> Result<(), CoreError>;

    async fn deregister_4layer_backends(
        &self,
        listener: &CloudListener,
        backends: &[Backend],
    ) -> Result<(), CoreError>;

    async fn modify_4layer_backend_weights(
        &self,
        listener: &CloudListener,
        backends: &[Backend],
    ) -> Result<(), CoreError>;

    async fn register_7layer_backends(
        &self,
        listener: &CloudListener,
        rule: &Rule,
        backends: &[Backend],
    ) -> Result<(), CoreError>;

    async fn deregister_7layer_backends(
        &self,
        listener: &CloudListener,
        rule: &Rule,
        backends: &[Backend],
    ) -> Result<(), CoreError>;

    async fn modify_7layer_backend_weights(
        &self,
        listener: &CloudListener,
        rule: &Rule,
        backends: &[Backend],
    ) -> Result<(), CoreError>;

    // ── Health ───────────────────────────────────────────────────────

    async fn describe_backend_health(&self, lb_id: &str) -> Result<Vec<BackendHealth>, CoreError>;
}

/// Build the adapter for the configured provider.
pub fn connect(
    config: &ControllerConfig,
    metrics: Arc<dyn MetricsSink>,
) -> Result<Arc<dyn CloudAdapter>, CoreError> {
    let transport = config.transport();
    let adapter: Arc<dyn CloudAdapter> = match config.provider {
        CloudProvider::Rest => {
            let client = lbsync_api::RestClient::new(
                config.endpoint.clone(),
                config.region.clone(),
                config.credentials.clone(),
                &transport,
            )?;
            let retry = RetryPolicy::new(&config.retry, retry::classify_rest, metrics);
            Arc::new(RestAdapter::new(client, retry))
        }
        CloudProvider::Sdk => {
            let client = lbsync_api::SdkClient::new(
                config.endpoint.clone(),
                config.region.clone(),
                config.credentials.clone(),
                &transport,
            )?;
            let retry = RetryPolicy::new(&config.retry, retry::classify_sdk, metrics);
            Arc::new(SdkAdapter::new(client, retry))
        }
    };
    tracing::info!(provider = %config.provider, endpoint = %config.endpoint, "cloud adapter ready");
    Ok(adapter)
}

// ── Helpers shared by the adapters ───────────────────────────────────

pub(crate) fn listener_id(listener: &CloudListener) -> Result<&str, CoreError> {
    listener
        .listener_id
        .as_deref()
        .ok_or_else(|| CoreError::MissingListenerId {
            listener: listener.key(),
        })
}

pub(crate) fn rule_id<'a>(listener: &CloudListener, rule: &'a Rule) -> Result<&'a str, CoreError> {
    rule.id.as_deref().ok_or_else(|| CoreError::MissingRuleId {
        listener: listener.key(),
        domain: rule.domain.clone(),
        url: rule.url.clone(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{Forwarding, Protocol, TargetGroup};

    #[test]
    fn health_labels() {
        let mut health = BackendHealth {
            listener_id: "lbl-1".into(),
            listen_port: 80,
            rule: Some(("a.com".into(), "/x".into())),
            ip: "10.0.0.1".into(),
            port: 8080,
            healthy: true,
        };
        assert_eq!(health.listener_label(), "80:a.com/x");
        assert_eq!(health.backend_label(), "10.0.0.1:8080");
        health.rule = None;
        assert_eq!(health.listener_label(), "80");
    }

    #[test]
    fn missing_ids_are_reported() {
        let listener = CloudListener {
            namespace: "kube-system".into(),
            name: "edge-80".into(),
            listener_id: None,
            load_balancer_id: "lb-1".into(),
            protocol: Protocol::Http,
            listen_port: 80,
            tls: None,
            forwarding: Forwarding::Rules(Vec::new()),
        };
        assert!(matches!(
            listener_id(&listener),
            Err(CoreError::MissingListenerId { .. })
        ));

        let rule = Rule {
            id: None,
            domain: "a.com".into(),
            url: "/".into(),
            target_group: TargetGroup::new("r", Protocol::Http, 80),
        };
        let err = rule_id(&listener, &rule).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Rule a.com/ on listener kube-system/edge-80 has no cloud id"
        );
    }

    #[test]
    fn lookup_display() {
        assert_eq!(ListenerLookup::Id("lbl-1").to_string(), "id lbl-1");
        assert_eq!(ListenerLookup::Port(80).to_string(), "port 80");
    }
}
