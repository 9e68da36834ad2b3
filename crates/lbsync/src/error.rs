//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into operator-facing errors with
//! actionable help text and a distinct exit code per failure class.

use miette::Diagnostic;
use thiserror::Error;

use lbsync_config::ConfigError;
use lbsync_core::CoreError;
use lbsync_core::model::NetworkType;

/// Process exit codes. 2 belongs to clap usage errors.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 3;
    pub const MANIFEST: i32 = 4;
    pub const CONFLICT: i32 = 5;
    pub const CLOUD: i32 = 6;
    pub const PARTIAL: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(
        code(lbsync::config),
        help("Check the config file and any LBSYNC_* environment overrides.")
    )]
    Config(#[from] ConfigError),

    #[error("Cannot read manifest: {message}")]
    #[diagnostic(
        code(lbsync::manifest),
        help("The manifest is YAML with top-level `ingresses` and `services` lists.")
    )]
    Manifest { message: String },

    // ── Reconciliation ───────────────────────────────────────────────

    #[error("Ingress {namespace}/{name} conflicts: {message}")]
    #[diagnostic(
        code(lbsync::conflict),
        help(
            "Each load balancer port takes one TCP/UDP rule, \
             or HTTP/HTTPS rules with distinct host and path."
        )
    )]
    Conflict {
        namespace: String,
        name: String,
        message: String,
    },

    #[error("Load balancer {name} is {actual} but {expected} is configured")]
    #[diagnostic(
        code(lbsync::network_type),
        help(
            "Set load_balancer.network_type to match the existing instance, \
             or choose another load_balancer.name."
        )
    )]
    NetworkTypeMismatch {
        name: String,
        expected: NetworkType,
        actual: NetworkType,
    },

    #[error("{failed} of {total} listener operations failed")]
    #[diagnostic(code(lbsync::partial), help("Run with -v for per-listener errors."))]
    PartialApply { failed: usize, total: usize },

    #[error(transparent)]
    #[diagnostic(code(lbsync::cloud))]
    Cloud(CoreError),

    // ── Runtime ──────────────────────────────────────────────────────

    #[error("Cannot start metrics exporter on {addr}: {message}")]
    #[diagnostic(code(lbsync::metrics), help("Pick another --metrics-addr or pass --no-metrics."))]
    Metrics { addr: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::NetworkTypeMismatch { .. } => exit_code::CONFIG,
            Self::Manifest { .. } => exit_code::MANIFEST,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Cloud(_) => exit_code::CLOUD,
            Self::PartialApply { .. } => exit_code::PARTIAL,
            Self::Metrics { .. } | Self::Io(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Conflict(conflict) => Self::Conflict {
                namespace: conflict.namespace,
                name: conflict.name,
                message: conflict.message,
            },
            CoreError::NetworkTypeMismatch {
                name,
                expected,
                actual,
            } => Self::NetworkTypeMismatch {
                name,
                expected,
                actual,
            },
            CoreError::PartialApply { failed, total } => Self::PartialApply { failed, total },
            CoreError::Source { message } => Self::Manifest { message },
            other => Self::Cloud(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbsync_core::Conflict;

    #[test]
    fn conflicts_keep_the_ingress() {
        let err = CliError::from(CoreError::Conflict(Conflict {
            namespace: "default".into(),
            name: "b".into(),
            message: "port 9000 is already used by a tcp rule".into(),
        }));
        assert_eq!(err.exit_code(), exit_code::CONFLICT);
        assert_eq!(
            err.to_string(),
            "Ingress default/b conflicts: port 9000 is already used by a tcp rule"
        );
    }

    #[test]
    fn cloud_errors_map_to_cloud_exit_code() {
        let err = CliError::from(CoreError::LoadBalancerNotReady);
        assert_eq!(err.exit_code(), exit_code::CLOUD);
        let err = CliError::from(CoreError::PartialApply { failed: 1, total: 3 });
        assert_eq!(err.exit_code(), exit_code::PARTIAL);
    }
}
