// ── Service endpoints ──
//
// What service discovery reports for one service: its named ports and
// the nodes (pods) serving them. The generator turns these into
// backends according to the controller-wide `BackendMode`.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::backend::Backend;

/// How endpoint addresses map to backend addresses.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BackendMode {
    /// Register the proxy (pod) address and port.
    #[default]
    Overlay,
    /// Register the node address and host port, falling back to the proxy
    /// address when the pod has no host port mapping.
    Underlay,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoints {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub ports: Vec<ServicePort>,
    #[serde(default)]
    pub nodes: Vec<EndpointNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    pub name: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointNode {
    /// Pod name; stateful pods end in `-<ordinal>`.
    pub name: String,
    #[serde(default)]
    pub node_ip: String,
    pub proxy_ip: String,
    #[serde(default)]
    pub ports: Vec<NodePort>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePort {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_port: Option<u16>,
    pub proxy_port: u16,
}

impl EndpointNode {
    /// Numeric suffix of the pod name (`db-2` → `2`).
    pub fn ordinal(&self) -> Option<u32> {
        self.name.rsplit_once('-')?.1.parse().ok()
    }

    /// The backend this node contributes for the named port, if it serves it.
    pub fn backend(&self, port_name: &str, mode: BackendMode) -> Option<Backend> {
        let port = self.ports.iter().find(|p| p.name == port_name)?;
        let backend = match (mode, port.node_port) {
            (BackendMode::Underlay, Some(node_port)) if !self.node_ip.is_empty() => {
                Backend::new(self.node_ip.clone(), node_port)
            }
            _ => Backend::new(self.proxy_ip.clone(), port.proxy_port),
        };
        Some(backend)
    }
}

impl ServiceEndpoints {
    /// Name of the port exposed as `service_port`.
    pub fn port_name(&self, service_port: u16) -> Option<&str> {
        self.ports
            .iter()
            .find(|p| p.port == service_port)
            .map(|p| p.name.as_str())
    }

    /// Backends for every node serving `service_port`, or `None` when the
    /// service does not expose that port.
    pub fn backends(&self, service_port: u16, mode: BackendMode) -> Option<Vec<Backend>> {
        let name = self.port_name(service_port)?;
        Some(
            self.nodes
                .iter()
                .filter_map(|node| node.backend(name, mode))
                .collect(),
        )
    }

    /// Nodes with an ordinal suffix, sorted by ordinal.
    pub fn nodes_by_ordinal(&self) -> Vec<(u32, &EndpointNode)> {
        let mut nodes: Vec<_> = self
            .nodes
            .iter()
            .filter_map(|n| n.ordinal().map(|o| (o, n)))
            .collect();
        nodes.sort_by_key(|(ordinal, _)| *ordinal);
        nodes
    }
}
