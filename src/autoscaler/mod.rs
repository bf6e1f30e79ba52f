//! Cluster autoscaler rollout onto a managed cluster
//!
//! Enabling autoscaling pushes two things into the target cluster's own API:
//! - a Secret holding the Azure settings the autoscaler needs
//! - the autoscaler workload (service account, RBAC, Deployment) bound to
//!   one agent pool's min/max
//!
//! The cluster is reached through its admin kubeconfig via
//! [`RemoteClusterConnector`].

mod kube_client;
pub mod manifests;

pub use kube_client::KubeConnector;

use crate::azure::Credentials;
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;
use zeroize::Zeroizing;

/// Secret the autoscaler reads its Azure settings from
pub const AUTOSCALER_SECRET_NAME: &str = "cluster-autoscaler-azure";

/// Namespace the autoscaler and its secret live in
pub const AUTOSCALER_NAMESPACE: &str = "kube-system";

/// VM type flag understood by the Azure autoscaler provider
pub const AKS_VM_TYPE: &str = "AKS";

#[derive(Debug, Error)]
pub enum RemoteClusterError {
    #[error("invalid kubeconfig: {0}")]
    Kubeconfig(String),

    #[error("failed to {action}: {source}")]
    Kube {
        action: &'static str,
        #[source]
        source: kube::Error,
    },
}

impl RemoteClusterError {
    pub fn kube(action: &'static str, source: kube::Error) -> Self {
        RemoteClusterError::Kube { action, source }
    }
}

/// Agent pool the autoscaler is allowed to resize, with its bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeGroupBounds {
    pub name: String,
    pub min_count: i32,
    pub max_count: i32,
}

/// Settings bundle stored in the autoscaler secret
///
/// Values are zeroized when the bundle is dropped.
pub struct AutoscalerConfig {
    entries: BTreeMap<String, Zeroizing<Vec<u8>>>,
}

impl AutoscalerConfig {
    pub fn new(
        cluster_name: &str,
        resource_group: &str,
        node_resource_group: &str,
        credentials: &Credentials,
    ) -> Self {
        let values: [(&str, &[u8]); 8] = [
            ("ResourceGroup", resource_group.as_bytes()),
            ("NodeResourceGroup", node_resource_group.as_bytes()),
            ("ClientID", credentials.app_id.as_bytes()),
            ("ClientSecret", credentials.password.expose().as_bytes()),
            ("TenantID", credentials.tenant.as_bytes()),
            ("VMType", AKS_VM_TYPE.as_bytes()),
            ("ClusterName", cluster_name.as_bytes()),
            ("SubscriptionID", credentials.subscription_id.as_bytes()),
        ];

        let entries = values
            .into_iter()
            .map(|(key, value)| (key.to_string(), Zeroizing::new(value.to_vec())))
            .collect();

        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(|v| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for AutoscalerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoscalerConfig")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Opens a client against a managed cluster's own API server
#[async_trait]
pub trait RemoteClusterConnector: Send + Sync {
    async fn connect(
        &self,
        cluster_name: &str,
        kubeconfig: &str,
    ) -> Result<Box<dyn RemoteCluster>, RemoteClusterError>;
}

/// Writes the autoscaler resources into one cluster
///
/// Both calls create the objects or update them in place.
#[async_trait]
pub trait RemoteCluster: Send + Sync {
    async fn apply_secret(
        &self,
        namespace: &str,
        name: &str,
        config: &AutoscalerConfig,
    ) -> Result<(), RemoteClusterError>;

    async fn apply_autoscaler(&self, node_group: &NodeGroupBounds)
        -> Result<(), RemoteClusterError>;
}
