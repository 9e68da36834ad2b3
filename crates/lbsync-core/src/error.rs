// ── Core error types ──
//
// Reconciliation-level errors. Wire failures stay wrapped in
// `lbsync_api::Error` so retry classification can inspect provider
// codes; everything else describes a controller-side condition.

use thiserror::Error;

use crate::model::NetworkType;
use crate::validate::Conflict;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Cloud errors ─────────────────────────────────────────────────
    #[error(transparent)]
    Cloud(#[from] lbsync_api::Error),

    #[error(
        "Load balancer {name} exists as a {actual} load balancer but {expected} is configured"
    )]
    NetworkTypeMismatch {
        name: String,
        expected: NetworkType,
        actual: NetworkType,
    },

    #[error("Listener {listener} has no cloud id")]
    MissingListenerId { listener: String },

    #[error("Rule {domain}{url} on listener {listener} has no cloud id")]
    MissingRuleId {
        listener: String,
        domain: String,
        url: String,
    },

    // ── Input errors ─────────────────────────────────────────────────
    #[error(transparent)]
    Conflict(#[from] Conflict),

    #[error("Ingress source error: {message}")]
    Source { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Load balancer has not been ensured yet")]
    LoadBalancerNotReady,

    // ── Cycle outcome ────────────────────────────────────────────────
    #[error("{failed} of {total} listener operations failed")]
    PartialApply { failed: usize, total: usize },
}

impl CoreError {
    /// Errors that retrying (or waiting for the next cycle) cannot fix.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::NetworkTypeMismatch { .. } | Self::Config { .. }
        )
    }

    /// Provider error code, if this wraps an API error.
    pub fn cloud_code(&self) -> Option<&str> {
        match self {
            Self::Cloud(err) => err.code(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_is_permanent() {
        let err = CoreError::NetworkTypeMismatch {
            name: "edge".into(),
            expected: NetworkType::Private,
            actual: NetworkType::Public,
        };
        assert!(err.is_permanent());
        assert_eq!(
            err.to_string(),
            "Load balancer edge exists as a public load balancer but private is configured"
        );
    }

    #[test]
    fn cloud_errors_keep_their_code() {
        let err = CoreError::from(lbsync_api::Error::Api {
            code: "4006".into(),
            message: "busy".into(),
            request_id: None,
        });
        assert_eq!(err.cloud_code(), Some("4006"));
        assert!(!err.is_permanent());
    }
}
