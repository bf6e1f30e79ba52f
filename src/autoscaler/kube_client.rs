//! Remote cluster access through the `kube` client
//!
//! All writes use server-side apply so repeated enable calls update the
//! existing objects instead of failing on conflicts.

use super::manifests::{
    autoscaler_secret, cluster_role, cluster_role_binding, deployment, service_account,
    AUTOSCALER_NAME,
};
use super::{
    AutoscalerConfig, NodeGroupBounds, RemoteCluster, RemoteClusterConnector,
    RemoteClusterError, AUTOSCALER_NAMESPACE,
};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use kube::api::{Api, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::info;
use zeroize::Zeroize;

/// Field manager recorded on applied objects
const FIELD_MANAGER: &str = "aksd";

/// Connects to managed clusters from their admin kubeconfig
#[derive(Debug, Clone)]
pub struct KubeConnector {
    image: String,
}

impl KubeConnector {
    /// `image` is the cluster-autoscaler image deployed into target clusters
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
        }
    }
}

#[async_trait]
impl RemoteClusterConnector for KubeConnector {
    async fn connect(
        &self,
        cluster_name: &str,
        kubeconfig: &str,
    ) -> Result<Box<dyn RemoteCluster>, RemoteClusterError> {
        let kubeconfig = Kubeconfig::from_yaml(kubeconfig)
            .map_err(|e| RemoteClusterError::Kubeconfig(e.to_string()))?;

        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| RemoteClusterError::Kubeconfig(e.to_string()))?;

        let client = Client::try_from(config)
            .map_err(|e| RemoteClusterError::kube("create cluster client", e))?;

        info!(cluster = %cluster_name, "Connected to cluster API server");

        Ok(Box::new(KubeRemoteCluster {
            client,
            image: self.image.clone(),
        }))
    }
}

struct KubeRemoteCluster {
    client: Client,
    image: String,
}

/// Wipe secret payload bytes held by a Secret object
fn scrub(secret: &mut Secret) {
    if let Some(data) = secret.data.as_mut() {
        for value in data.values_mut() {
            value.0.zeroize();
        }
    }
}

#[async_trait]
impl RemoteCluster for KubeRemoteCluster {
    async fn apply_secret(
        &self,
        namespace: &str,
        name: &str,
        config: &AutoscalerConfig,
    ) -> Result<(), RemoteClusterError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let params = PatchParams::apply(FIELD_MANAGER).force();

        let mut secret = autoscaler_secret(namespace, name, config);
        let result = api.patch(name, &params, &Patch::Apply(&secret)).await;
        scrub(&mut secret);

        let mut applied = result.map_err(|e| RemoteClusterError::kube("apply autoscaler secret", e))?;
        scrub(&mut applied);

        info!(namespace = %namespace, secret = %name, "Autoscaler secret applied");
        Ok(())
    }

    async fn apply_autoscaler(
        &self,
        node_group: &NodeGroupBounds,
    ) -> Result<(), RemoteClusterError> {
        let params = PatchParams::apply(FIELD_MANAGER).force();

        let accounts: Api<ServiceAccount> =
            Api::namespaced(self.client.clone(), AUTOSCALER_NAMESPACE);
        accounts
            .patch(AUTOSCALER_NAME, &params, &Patch::Apply(&service_account()))
            .await
            .map_err(|e| RemoteClusterError::kube("apply autoscaler service account", e))?;

        let roles: Api<ClusterRole> = Api::all(self.client.clone());
        roles
            .patch(AUTOSCALER_NAME, &params, &Patch::Apply(&cluster_role()))
            .await
            .map_err(|e| RemoteClusterError::kube("apply autoscaler cluster role", e))?;

        let bindings: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        bindings
            .patch(AUTOSCALER_NAME, &params, &Patch::Apply(&cluster_role_binding()))
            .await
            .map_err(|e| RemoteClusterError::kube("apply autoscaler role binding", e))?;

        let deployments: Api<Deployment> =
            Api::namespaced(self.client.clone(), AUTOSCALER_NAMESPACE);
        deployments
            .patch(
                AUTOSCALER_NAME,
                &params,
                &Patch::Apply(&deployment(&self.image, node_group)),
            )
            .await
            .map_err(|e| RemoteClusterError::kube("apply autoscaler deployment", e))?;

        info!(
            node_pool = %node_group.name,
            min = node_group.min_count,
            max = node_group.max_count,
            "Autoscaler deployment applied"
        );
        Ok(())
    }
}
