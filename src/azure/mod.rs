//! Azure management-plane access
//!
//! [`ProviderConnector`] turns per-request [`Credentials`] into an
//! authenticated [`ManagedClusterApi`]. The production implementation talks to
//! Azure Resource Manager over REST ([`client::AzureConnector`]); tests swap in
//! in-memory fakes.

pub mod client;
mod credentials;
mod models;

pub use client::{AzureConnector, AzureEndpoints};
pub use credentials::{Credentials, SecretString};

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

/// Provider namespace for managed clusters
pub const CONTAINER_SERVICE_PROVIDER: &str = "Microsoft.ContainerService/managedClusters";

/// Default VM size for agent pools that do not name one
pub const DEFAULT_VM_SIZE: &str = "Standard_DS2_v2";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("management API returned {status}: {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Resource group that holds a cluster's resources
pub fn resource_group_name(cluster_name: &str) -> String {
    format!("{}-group", cluster_name)
}

/// ARM resource id of a managed cluster
pub fn cluster_resource_id(subscription_id: &str, cluster_name: &str) -> String {
    format!(
        "/subscriptions/{}/resourcegroups/{}/providers/{}/{}",
        subscription_id,
        resource_group_name(cluster_name),
        CONTAINER_SERVICE_PROVIDER,
        cluster_name
    )
}

/// Agent pool requested at cluster creation
#[derive(Debug, Clone, PartialEq)]
pub struct AgentPoolInput {
    pub name: String,
    pub count: i32,
    /// Agent pool type, e.g. `VirtualMachineScaleSets`
    pub pool_type: String,
    pub vm_size: String,
}

#[derive(Debug, Clone)]
pub struct CreateClusterInput {
    pub name: String,
    pub location: String,
    pub k8s_version: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub agent_pools: Vec<AgentPoolInput>,
    pub tags: BTreeMap<String, String>,
}

/// Agent pool as reported on an existing cluster
#[derive(Debug, Clone, PartialEq)]
pub struct AgentPoolProfile {
    pub name: String,
}

/// Full view of one managed cluster
#[derive(Debug, Clone)]
pub struct ManagedCluster {
    pub id: String,
    pub name: String,
    pub provisioning_state: String,
    pub node_resource_group: Option<String>,
    pub agent_pools: Vec<AgentPoolProfile>,
    /// Admin kubeconfig (YAML)
    pub kubeconfig: SecretString,
}

/// Entry of the subscription-wide cluster listing
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSummary {
    pub id: String,
    pub name: String,
    pub provisioning_state: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentPoolCount {
    pub name: String,
    pub count: i32,
}

/// Builds credential-scoped management clients
#[async_trait]
pub trait ProviderConnector: Send + Sync {
    /// Authenticate and return a client bound to the credentials' subscription
    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn ManagedClusterApi>, ProviderError>;
}

/// Managed-cluster operations against one subscription
///
/// Cluster-scoped calls take the cluster name; the resource group is always
/// derived with [`resource_group_name`]. Operations that start long-running
/// work return the provider's provisioning state string as reported in the
/// initial response.
#[async_trait]
pub trait ManagedClusterApi: Send + Sync {
    async fn resource_group_exists(&self, group: &str) -> Result<bool, ProviderError>;

    async fn create_resource_group(&self, group: &str, location: &str)
        -> Result<(), ProviderError>;

    async fn delete_resource_group(&self, group: &str) -> Result<(), ProviderError>;

    async fn create_cluster(&self, input: &CreateClusterInput) -> Result<String, ProviderError>;

    async fn get_cluster(&self, name: &str) -> Result<ManagedCluster, ProviderError>;

    async fn delete_cluster(&self, name: &str) -> Result<String, ProviderError>;

    async fn list_clusters(&self) -> Result<Vec<ClusterSummary>, ProviderError>;

    /// Kubernetes versions the control plane can move to, in provider order
    async fn available_upgrades(&self, name: &str) -> Result<Vec<String>, ProviderError>;

    async fn upgrade_cluster(&self, name: &str, k8s_version: &str)
        -> Result<String, ProviderError>;

    /// Name and size of the cluster's (single) agent pool
    async fn node_count(&self, name: &str) -> Result<AgentPoolCount, ProviderError>;

    async fn scale_node_pool(
        &self,
        name: &str,
        node_pool: &str,
        count: i32,
    ) -> Result<String, ProviderError>;
}
