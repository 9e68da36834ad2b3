// ── File-backed ingress source ──
//
// Serves ingresses and service endpoints out of one YAML manifest that
// is re-read at the start of every cycle. Statuses written back by the
// controller live in memory and are overlaid on the next listing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use tracing::{info, warn};

use lbsync_core::model::{Ingress, IngressStatus, ServiceEndpoints};
use lbsync_core::{BackendResolver, CoreError, IngressSource};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub ingresses: Vec<Ingress>,
    pub services: Vec<ServiceEndpoints>,
}

impl Manifest {
    pub async fn read(path: &Path) -> Result<Self, CoreError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| source_error(path, &e))?;
        serde_yaml::from_str(&raw).map_err(|e| source_error(path, &e))
    }
}

fn source_error(path: &Path, err: &dyn std::fmt::Display) -> CoreError {
    CoreError::Source {
        message: format!("{}: {err}", path.display()),
    }
}

pub struct ManifestSource {
    path: PathBuf,
    snapshot: ArcSwap<Manifest>,
    statuses: DashMap<String, IngressStatus>,
}

impl ManifestSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            snapshot: ArcSwap::from_pointee(Manifest::default()),
            statuses: DashMap::new(),
        }
    }

    /// Last status recorded for `namespace/name`.
    pub fn status(&self, key: &str) -> Option<IngressStatus> {
        self.statuses.get(key).map(|s| s.value().clone())
    }
}

#[async_trait]
impl IngressSource for ManifestSource {
    async fn list(&self) -> Result<Vec<Ingress>, CoreError> {
        let manifest = Manifest::read(&self.path).await?;
        let mut ingresses = manifest.ingresses.clone();
        self.snapshot.store(Arc::new(manifest));

        for ingress in &mut ingresses {
            if let Some(status) = self.statuses.get(&ingress.key()) {
                ingress.status = Some(status.value().clone());
            }
        }
        Ok(ingresses)
    }

    async fn set_status(
        &self,
        namespace: &str,
        name: &str,
        status: IngressStatus,
    ) -> Result<(), CoreError> {
        match &status {
            IngressStatus::Normal => info!(namespace, ingress = name, "ingress status normal"),
            IngressStatus::Abnormal(message) => {
                warn!(namespace, ingress = name, %message, "ingress status abnormal");
            }
        }
        self.statuses.insert(format!("{namespace}/{name}"), status);
        Ok(())
    }
}

#[async_trait]
impl BackendResolver for ManifestSource {
    async fn service_endpoints(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceEndpoints>, CoreError> {
        Ok(self
            .snapshot
            .load()
            .services
            .iter()
            .find(|s| s.namespace == namespace && s.name == name)
            .cloned())
    }
}
