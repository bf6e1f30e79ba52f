//! Azure Resource Manager wire payloads
//!
//! Only the fields this service reads or writes are modelled; everything else
//! in the ARM documents is ignored on input.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TokenErrorResponse {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_description: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ArmErrorResponse {
    #[serde(default)]
    pub error: ArmError,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ArmError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResourceGroupBody<'a> {
    pub location: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ManagedClusterCreateBody<'a> {
    pub location: &'a str,
    pub tags: &'a BTreeMap<String, String>,
    pub properties: ManagedClusterCreateProperties<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ManagedClusterCreateProperties<'a> {
    pub kubernetes_version: &'a str,
    pub dns_prefix: &'a str,
    pub agent_pool_profiles: Vec<AgentPoolCreateProfile<'a>>,
    pub service_principal_profile: ServicePrincipalProfile<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AgentPoolCreateProfile<'a> {
    pub name: &'a str,
    pub count: i32,
    pub vm_size: &'a str,
    #[serde(rename = "type")]
    pub pool_type: &'a str,
    pub mode: &'static str,
    pub os_type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServicePrincipalProfile<'a> {
    pub client_id: &'a str,
    pub secret: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ManagedClusterResource {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub properties: ManagedClusterProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ManagedClusterProperties {
    pub provisioning_state: Option<String>,
    pub node_resource_group: Option<String>,
    #[serde(default)]
    pub agent_pool_profiles: Vec<AgentPoolProfileResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AgentPoolProfileResource {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ManagedClusterList {
    #[serde(default)]
    pub value: Vec<ManagedClusterResource>,
    pub next_link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CredentialResults {
    #[serde(default)]
    pub kubeconfigs: Vec<CredentialResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CredentialResult {
    /// Base64 encoded kubeconfig
    pub value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpgradeProfile {
    #[serde(default)]
    pub properties: UpgradeProfileProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpgradeProfileProperties {
    #[serde(default)]
    pub control_plane_profile: ControlPlaneUpgradeProfile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ControlPlaneUpgradeProfile {
    /// Absent when the cluster is already on the newest version
    #[serde(default)]
    pub upgrades: Option<Vec<UpgradeEntry>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpgradeEntry {
    pub kubernetes_version: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AgentPoolList {
    #[serde(default)]
    pub value: Vec<AgentPoolResource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AgentPoolResource {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub properties: AgentPoolProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AgentPoolProperties {
    pub count: Option<i32>,
    pub provisioning_state: Option<String>,
}
