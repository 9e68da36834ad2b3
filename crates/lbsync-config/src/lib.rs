//! Configuration for the lbsync controller.
//!
//! A TOML file layered under `LBSYNC_` environment overrides, credential
//! resolution for the cloud secret key, and translation to
//! `lbsync_core::ControllerConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use lbsync_core::model::{BackendMode, NetworkType};
use lbsync_core::{
    CloudProvider, ControllerConfig, Credentials, LoadBalancerConfig, RetryConfig, TlsVerification,
};

/// Prefix of environment overrides. Nested keys are separated by `__`,
/// e.g. `LBSYNC_CLOUD__REGION`.
pub const ENV_PREFIX: &str = "LBSYNC_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no secret key configured for secret id '{secret_id}'")]
    NoCredentials { secret_id: String },

    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub cloud: CloudSection,

    #[serde(default)]
    pub load_balancer: LoadBalancerSection,

    #[serde(default)]
    pub controller: ControllerSection,

    #[serde(default)]
    pub retry: RetrySection,
}

/// Cloud API access.
#[derive(Debug, Deserialize, Serialize)]
pub struct CloudSection {
    /// Wire API: "rest" or "sdk".
    #[serde(default)]
    pub provider: CloudProvider,

    #[serde(default = "default_region")]
    pub region: String,

    /// Override the provider's public endpoint.
    pub endpoint: Option<String>,

    #[serde(default)]
    pub secret_id: String,

    /// Secret key (plaintext; prefer `secret_key_env`).
    pub secret_key: Option<String>,

    /// Environment variable name containing the secret key.
    pub secret_key_env: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub insecure: bool,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,
}

impl Default for CloudSection {
    fn default() -> Self {
        Self {
            provider: CloudProvider::default(),
            region: default_region(),
            endpoint: None,
            secret_id: String::new(),
            secret_key: None,
            secret_key_env: None,
            timeout: default_timeout(),
            insecure: false,
            ca_cert: None,
        }
    }
}

fn default_region() -> String {
    "ap-guangzhou".into()
}
fn default_timeout() -> u64 {
    30
}

/// The load balancer instance to manage.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoadBalancerSection {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub network_type: NetworkType,

    /// Required by the cloud for private load balancers.
    pub vpc_id: Option<String>,

    pub subnet_id: Option<String>,
}

/// Reconciliation behavior.
#[derive(Debug, Deserialize, Serialize)]
pub struct ControllerSection {
    /// Namespace generated listeners are cached under.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default)]
    pub backend_mode: BackendMode,

    /// Seconds between reconciliation cycles.
    #[serde(default = "default_update_period")]
    pub update_period: u64,

    /// Seconds between backend health polls; 0 disables polling.
    #[serde(default = "default_health_poll_period")]
    pub health_poll_period: u64,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            backend_mode: BackendMode::default(),
            update_period: default_update_period(),
            health_poll_period: default_health_poll_period(),
        }
    }
}

fn default_namespace() -> String {
    "kube-system".into()
}
fn default_update_period() -> u64 {
    10
}
fn default_health_poll_period() -> u64 {
    60
}

/// Retry and batching limits. Durations in seconds.
#[derive(Debug, Deserialize, Serialize)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub wait_rate_limited: u64,
    pub wait_busy: u64,
    pub poll_interval: u64,
    pub max_backends_per_bind: usize,
}

impl Default for RetrySection {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            wait_rate_limited: defaults.wait_rate_limited.as_secs(),
            wait_busy: defaults.wait_busy.as_secs(),
            poll_interval: defaults.poll_interval.as_secs(),
            max_backends_per_bind: defaults.max_backends_per_bind,
        }
    }
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from an optional file plus the environment.
///
/// A path that was given but does not exist is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Toml::file(path));
    }
    let figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Resolution ──────────────────────────────────────────────────────

/// Resolve the secret key: named env var first, then plaintext.
pub fn resolve_secret_key(cloud: &CloudSection) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = cloud.secret_key_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }
    if let Some(ref key) = cloud.secret_key {
        return Ok(SecretString::from(key.clone()));
    }
    Err(ConfigError::NoCredentials {
        secret_id: cloud.secret_id.clone(),
    })
}

fn seconds(field: &str, value: u64) -> Result<Duration, ConfigError> {
    if value == 0 {
        return Err(invalid(field, "must be at least 1 second"));
    }
    Ok(Duration::from_secs(value))
}

/// Validate a loaded Config and build the controller's runtime config.
pub fn resolve(config: &Config) -> Result<ControllerConfig, ConfigError> {
    let cloud = &config.cloud;
    if cloud.secret_id.is_empty() {
        return Err(invalid("cloud.secret_id", "must be set"));
    }
    let endpoint_str = cloud
        .endpoint
        .as_deref()
        .unwrap_or_else(|| cloud.provider.default_endpoint());
    let endpoint: url::Url = endpoint_str
        .parse()
        .map_err(|_| invalid("cloud.endpoint", format!("invalid URL: {endpoint_str}")))?;
    let credentials = Credentials::new(cloud.secret_id.clone(), resolve_secret_key(cloud)?);

    let tls = if cloud.insecure {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = cloud.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let lb = &config.load_balancer;
    if lb.name.is_empty() {
        return Err(invalid("load_balancer.name", "must be set"));
    }
    if lb.network_type == NetworkType::Private && lb.vpc_id.is_none() {
        return Err(invalid("load_balancer.vpc_id", "required for private load balancers"));
    }

    let retry = &config.retry;
    if retry.max_attempts == 0 {
        return Err(invalid("retry.max_attempts", "must be at least 1"));
    }
    if retry.max_backends_per_bind == 0 {
        return Err(invalid("retry.max_backends_per_bind", "must be at least 1"));
    }

    let controller = &config.controller;
    Ok(ControllerConfig {
        provider: cloud.provider,
        region: cloud.region.clone(),
        endpoint,
        credentials,
        load_balancer: LoadBalancerConfig {
            name: lb.name.clone(),
            network_type: lb.network_type,
            vpc_id: lb.vpc_id.clone(),
            subnet_id: lb.subnet_id.clone(),
        },
        namespace: controller.namespace.clone(),
        backend_mode: controller.backend_mode,
        update_period: seconds("controller.update_period", controller.update_period)?,
        health_poll_period: Duration::from_secs(controller.health_poll_period),
        timeout: seconds("cloud.timeout", cloud.timeout)?,
        tls,
        retry: RetryConfig {
            max_attempts: retry.max_attempts,
            wait_rate_limited: Duration::from_secs(retry.wait_rate_limited),
            wait_busy: Duration::from_secs(retry.wait_busy),
            poll_interval: Duration::from_secs(retry.poll_interval),
            max_backends_per_bind: retry.max_backends_per_bind,
        },
    })
}

/// Load and resolve in one step.
pub fn load_controller_config(path: Option<&Path>) -> Result<ControllerConfig, ConfigError> {
    resolve(&load_config(path)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    const MINIMAL: &str = r#"
        [cloud]
        secret_id = "AKIDtest"
        secret_key = "s3cret"

        [load_balancer]
        name = "edge"
    "#;

    #[test]
    fn minimal_file_fills_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("lbsync.toml", MINIMAL)?;
            let config = load_controller_config(Some(Path::new("lbsync.toml")))
                .map_err(|e| e.to_string())?;

            assert_eq!(config.provider, CloudProvider::Rest);
            assert_eq!(config.endpoint.as_str(), CloudProvider::Rest.default_endpoint());
            assert_eq!(config.namespace, "kube-system");
            assert_eq!(config.update_period, Duration::from_secs(10));
            assert_eq!(config.retry, RetryConfig::default());
            assert_eq!(config.tls, TlsVerification::SystemDefaults);
            assert_eq!(config.credentials.secret_key.expose_secret(), "s3cret");
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("lbsync.toml", MINIMAL)?;
            jail.set_env("LBSYNC_CLOUD__PROVIDER", "sdk");
            jail.set_env("LBSYNC_LOAD_BALANCER__NAME", "edge-2");
            jail.set_env("LBSYNC_RETRY__MAX_BACKENDS_PER_BIND", "5");
            jail.set_env("LBSYNC_CONTROLLER__BACKEND_MODE", "underlay");
            let config = load_controller_config(Some(Path::new("lbsync.toml")))
                .map_err(|e| e.to_string())?;

            assert_eq!(config.provider, CloudProvider::Sdk);
            assert_eq!(config.endpoint.as_str(), "https://clb.tencentcloudapi.com/");
            assert_eq!(config.load_balancer.name, "edge-2");
            assert_eq!(config.retry.max_backends_per_bind, 5);
            assert_eq!(config.backend_mode, BackendMode::Underlay);
            Ok(())
        });
    }

    #[test]
    fn secret_key_env_wins_over_plaintext() {
        Jail::expect_with(|jail| {
            jail.set_env("EDGE_SECRET", "from-env");
            let cloud = CloudSection {
                secret_id: "AKIDtest".into(),
                secret_key: Some("plaintext".into()),
                secret_key_env: Some("EDGE_SECRET".into()),
                ..CloudSection::default()
            };
            let key = resolve_secret_key(&cloud).map_err(|e| e.to_string())?;
            assert_eq!(key.expose_secret(), "from-env");
            Ok(())
        });
    }

    #[test]
    fn missing_secret_key_is_reported() {
        let cloud = CloudSection {
            secret_id: "AKIDtest".into(),
            ..CloudSection::default()
        };
        let err = resolve_secret_key(&cloud).unwrap_err();
        assert_eq!(err.to_string(), "no secret key configured for secret id 'AKIDtest'");
    }

    #[test]
    fn private_load_balancer_needs_vpc() {
        let mut config = Config::default();
        config.cloud.secret_id = "AKIDtest".into();
        config.cloud.secret_key = Some("s3cret".into());
        config.load_balancer.name = "edge".into();
        config.load_balancer.network_type = NetworkType::Private;

        let err = resolve(&config).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Validation { ref field, .. } if field == "load_balancer.vpc_id"
        ));

        config.load_balancer.vpc_id = Some("vpc-1".into());
        assert!(resolve(&config).is_ok());
    }

    #[test]
    fn zero_update_period_rejected() {
        let mut config = Config::default();
        config.cloud.secret_id = "AKIDtest".into();
        config.cloud.secret_key = Some("s3cret".into());
        config.load_balancer.name = "edge".into();
        config.controller.update_period = 0;
        assert!(resolve(&config).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/lbsync.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }
}
