use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Whether a load balancer is reachable from the internet or only inside a VPC.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NetworkType {
    #[default]
    Public,
    Private,
}

/// The load balancer instance this controller manages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudLoadBalancer {
    pub id: String,
    pub name: String,
    pub network_type: NetworkType,
    pub vips: Vec<String>,
}
