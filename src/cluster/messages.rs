//! RPC request and reply messages
//!
//! Field names follow the camelCase JSON mapping of the cluster API.
//! Requests carry the caller's [`Credentials`]; replies never do.

use super::status::ClusterStatus;
use crate::azure::{Credentials, SecretString};
use serde::{Deserialize, Serialize};

/// Summary view of a cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterItem {
    pub id: String,
    pub name: String,
    pub status: ClusterStatus,
}

/// Cluster summary plus the kubeconfig needed to reach it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterDetailItem {
    pub id: String,
    pub name: String,
    pub status: ClusterStatus,
    pub kubeconfig: String,
}

/// Agent pool requested at creation time
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPoolSpec {
    pub name: String,
    /// Initial node count
    pub min_count: i32,
    /// Agent pool type, e.g. `VirtualMachineScaleSets`
    #[serde(rename = "type")]
    pub instance_type: String,
    /// VM SKU; defaults to `Standard_DS2_v2`
    #[serde(default)]
    pub vm_size: Option<String>,
}

/// Node group bounds requested for autoscaling
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroup {
    pub name: String,
    pub min_count: i32,
    pub max_count: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// Service principal the cluster itself runs as
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAccount {
    pub client_id: String,
    pub client_secret: SecretString,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClusterRequest {
    pub name: String,
    pub location: String,
    pub k8s_version: String,
    pub agent_pools: Vec<AgentPoolSpec>,
    pub cluster_account: ClusterAccount,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClusterReply {
    pub ok: bool,
    pub cluster: ClusterItem,
}

/// Request addressing one cluster by name
///
/// Used by GetCluster, DeleteCluster, GetClusterUpgrades and
/// GetClusterNodeCount.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterRequest {
    pub name: String,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetClusterReply {
    pub ok: bool,
    pub cluster: ClusterDetailItem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteClusterReply {
    pub ok: bool,
    pub status: ClusterStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetClusterListRequest {
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetClusterListReply {
    pub ok: bool,
    pub clusters: Vec<ClusterItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upgrade {
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetClusterUpgradesReply {
    pub ok: bool,
    pub upgrades: Vec<Upgrade>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeClusterRequest {
    pub name: String,
    pub k8s_version: String,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeClusterReply {
    pub ok: bool,
    pub cluster: ClusterItem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetClusterNodeCountReply {
    pub ok: bool,
    /// Agent pool name
    pub name: String,
    pub count: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleClusterRequest {
    pub name: String,
    pub node_pool: String,
    pub count: i32,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleClusterReply {
    pub ok: bool,
    pub status: ClusterStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableClusterAutoscalingRequest {
    pub name: String,
    pub node_groups: Vec<NodeGroup>,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnableClusterAutoscalingReply {
    pub ok: bool,
}
