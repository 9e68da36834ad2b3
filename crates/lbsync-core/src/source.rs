// ── Input boundaries ──
//
// Where ingress objects and service endpoints come from. The controller
// reads both fresh at the start of every cycle and never mutates them;
// only the ingress status is written back.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::model::{Ingress, IngressStatus, ServiceEndpoints};

/// Supplies the ingress objects to reconcile.
#[async_trait]
pub trait IngressSource: Send + Sync {
    /// Snapshot of every ingress object.
    async fn list(&self) -> Result<Vec<Ingress>, CoreError>;

    /// Record the outcome of validation on one ingress.
    async fn set_status(
        &self,
        namespace: &str,
        name: &str,
        status: IngressStatus,
    ) -> Result<(), CoreError>;
}

/// Resolves a service to its endpoint nodes.
#[async_trait]
pub trait BackendResolver: Send + Sync {
    /// `Ok(None)` when the service does not exist.
    async fn service_endpoints(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceEndpoints>, CoreError>;
}
