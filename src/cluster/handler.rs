use super::messages::{
    ClusterDetailItem, ClusterItem, ClusterRequest, CreateClusterReply, CreateClusterRequest,
    DeleteClusterReply, EnableClusterAutoscalingReply, EnableClusterAutoscalingRequest,
    GetClusterListReply, GetClusterListRequest, GetClusterNodeCountReply, GetClusterReply,
    GetClusterUpgradesReply, NodeGroup, ScaleClusterReply, ScaleClusterRequest, Upgrade,
    UpgradeClusterReply, UpgradeClusterRequest,
};
use super::status::{match_status, ClusterStatus};
use crate::autoscaler::{
    AutoscalerConfig, NodeGroupBounds, RemoteClusterConnector, RemoteClusterError,
    AUTOSCALER_NAMESPACE, AUTOSCALER_SECRET_NAME,
};
use crate::azure::{
    cluster_resource_id, resource_group_name, AgentPoolInput, AgentPoolProfile,
    CreateClusterInput, Credentials, ManagedClusterApi, ProviderConnector, ProviderError,
    DEFAULT_VM_SIZE,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Longest cluster or agent pool name AKS accepts
const MAX_NAME_LEN: usize = 63;

/// Longest accepted tenant, a verified domain name at most
const MAX_TENANT_LEN: usize = 253;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("cannot get aks client: {0}")]
    Client(#[source] ProviderError),

    #[error("error checking resource group: {0}")]
    ResourceGroupCheck(#[source] ProviderError),

    #[error("error creating resource group: {0}")]
    ResourceGroupCreate(#[source] ProviderError),

    #[error("error deleting resource group: {0}")]
    ResourceGroupDelete(#[source] ProviderError),

    #[error("error creating cluster: {0}")]
    Create(#[source] ProviderError),

    #[error("error retrieving cluster: {0}")]
    Get(#[source] ProviderError),

    #[error("error deleting cluster: {0}")]
    Delete(#[source] ProviderError),

    #[error("error listing clusters: {0}")]
    List(#[source] ProviderError),

    #[error("cannot retrieve available upgrades: {0}")]
    Upgrades(#[source] ProviderError),

    #[error("error upgrading cluster: {0}")]
    Upgrade(#[source] ProviderError),

    #[error("cannot retrieve cluster node count: {0}")]
    NodeCount(#[source] ProviderError),

    #[error("error scaling cluster: {0}")]
    Scale(#[source] ProviderError),

    #[error("unable to find provided node group in cluster {0}")]
    NodeGroupNotFound(String),

    #[error("cluster {0} reports no node resource group")]
    MissingNodeResourceGroup(String),

    #[error("cannot connect to cluster: {0}")]
    RemoteClient(#[source] RemoteClusterError),

    #[error("error creating autoscaler secret: {0}")]
    AutoscalerSecret(#[source] RemoteClusterError),

    #[error("error while enabling cluster autoscaling: {0}")]
    Autoscaling(#[source] RemoteClusterError),
}

/// Coarse error category used to pick the RPC status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    Unauthorized,
    NotFound,
    Upstream,
}

impl ClusterError {
    fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            ClusterError::Client(e)
            | ClusterError::ResourceGroupCheck(e)
            | ClusterError::ResourceGroupCreate(e)
            | ClusterError::ResourceGroupDelete(e)
            | ClusterError::Create(e)
            | ClusterError::Get(e)
            | ClusterError::Delete(e)
            | ClusterError::List(e)
            | ClusterError::Upgrades(e)
            | ClusterError::Upgrade(e)
            | ClusterError::NodeCount(e)
            | ClusterError::Scale(e) => Some(e),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ClusterError::InvalidRequest(_) | ClusterError::NodeGroupNotFound(_) => {
                ErrorKind::InvalidInput
            }
            ClusterError::Client(ProviderError::Auth(_)) => ErrorKind::Unauthorized,
            _ => match self.provider_error() {
                Some(ProviderError::NotFound(_)) => ErrorKind::NotFound,
                _ => ErrorKind::Upstream,
            },
        }
    }
}

/// Check a cluster or pool name before it is placed into a resource path
fn validate_name(field: &str, name: &str) -> Result<(), ClusterError> {
    if name.is_empty() {
        return Err(ClusterError::InvalidRequest(format!("{} is required", field)));
    }
    if name.len() > MAX_NAME_LEN
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ClusterError::InvalidRequest(format!(
            "{} {:?} must be 1-{} letters, digits, '-' or '_'",
            field, name, MAX_NAME_LEN
        )));
    }
    Ok(())
}

/// Check the tenant and subscription before they are placed into token and ARM URLs
///
/// Tenants are GUIDs or domain names, subscriptions are GUIDs.
fn validate_credentials(credentials: &Credentials) -> Result<(), ClusterError> {
    let tenant = &credentials.tenant;
    if tenant.is_empty()
        || tenant.len() > MAX_TENANT_LEN
        || !tenant
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(ClusterError::InvalidRequest(format!(
            "tenant {:?} must be a GUID or domain name",
            tenant
        )));
    }

    let subscription = &credentials.subscription_id;
    if subscription.is_empty()
        || subscription.len() > MAX_NAME_LEN
        || !subscription
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(ClusterError::InvalidRequest(format!(
            "subscription id {:?} must be 1-{} letters, digits or '-'",
            subscription, MAX_NAME_LEN
        )));
    }
    Ok(())
}

/// Pick the requested node group matching an existing agent pool
///
/// Every (pool, group) pair is visited in order and each match overwrites
/// the previous one, so the last match wins.
pub fn select_node_group(
    pools: &[AgentPoolProfile],
    requested: &[NodeGroup],
) -> Option<NodeGroupBounds> {
    let mut selected = None;
    for pool in pools {
        for group in requested {
            if group.name == pool.name {
                selected = Some(NodeGroupBounds {
                    name: group.name.clone(),
                    min_count: group.min_count,
                    max_count: group.max_count,
                });
            }
        }
    }
    selected
}

/// Cluster lifecycle operations against AKS
///
/// Stateless apart from the two connectors: every call authenticates with
/// the credentials it carries and drops the client when it returns.
pub struct ClusterService {
    provider: Arc<dyn ProviderConnector>,
    remote: Arc<dyn RemoteClusterConnector>,
}

impl ClusterService {
    pub fn new(
        provider: Arc<dyn ProviderConnector>,
        remote: Arc<dyn RemoteClusterConnector>,
    ) -> Self {
        Self { provider, remote }
    }

    async fn client(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn ManagedClusterApi>, ClusterError> {
        validate_credentials(credentials)?;
        self.provider
            .connect(credentials)
            .await
            .map_err(ClusterError::Client)
    }

    pub async fn create_cluster(
        &self,
        request: CreateClusterRequest,
    ) -> Result<CreateClusterReply, ClusterError> {
        validate_name("cluster name", &request.name)?;
        if request.agent_pools.is_empty() {
            return Err(ClusterError::InvalidRequest(
                "at least one agent pool is required".to_string(),
            ));
        }
        for pool in &request.agent_pools {
            validate_name("agent pool name", &pool.name)?;
        }

        let client = self.client(&request.credentials).await?;

        let group = resource_group_name(&request.name);
        let exists = client
            .resource_group_exists(&group)
            .await
            .map_err(ClusterError::ResourceGroupCheck)?;
        if exists {
            debug!(group = %group, "Resource group already exists");
        } else {
            client
                .create_resource_group(&group, &request.location)
                .await
                .map_err(ClusterError::ResourceGroupCreate)?;
        }

        let input = CreateClusterInput {
            name: request.name.clone(),
            location: request.location.clone(),
            k8s_version: request.k8s_version.clone(),
            client_id: request.cluster_account.client_id.clone(),
            client_secret: request.cluster_account.client_secret.clone(),
            agent_pools: request
                .agent_pools
                .iter()
                .map(|pool| AgentPoolInput {
                    name: pool.name.clone(),
                    count: pool.min_count,
                    pool_type: pool.instance_type.clone(),
                    vm_size: pool
                        .vm_size
                        .clone()
                        .unwrap_or_else(|| DEFAULT_VM_SIZE.to_string()),
                })
                .collect(),
            tags: request
                .tags
                .iter()
                .map(|tag| (tag.key.clone(), tag.value.clone()))
                .collect(),
        };

        let state = client
            .create_cluster(&input)
            .await
            .map_err(ClusterError::Create)?;
        let status = match_status(&state);

        if status != ClusterStatus::Provisioning {
            warn!(
                cluster = %request.name,
                expected = %ClusterStatus::Provisioning,
                received = %status,
                "Unexpected status after cluster create"
            );
        }
        info!(cluster = %request.name, location = %request.location, status = %status, "Cluster create submitted");

        Ok(CreateClusterReply {
            ok: true,
            cluster: ClusterItem {
                id: cluster_resource_id(&request.credentials.subscription_id, &request.name),
                name: request.name,
                status,
            },
        })
    }

    pub async fn get_cluster(
        &self,
        request: ClusterRequest,
    ) -> Result<GetClusterReply, ClusterError> {
        validate_name("cluster name", &request.name)?;
        let client = self.client(&request.credentials).await?;

        let cluster = client
            .get_cluster(&request.name)
            .await
            .map_err(ClusterError::Get)?;

        Ok(GetClusterReply {
            ok: true,
            cluster: ClusterDetailItem {
                status: match_status(&cluster.provisioning_state),
                kubeconfig: cluster.kubeconfig.expose().to_string(),
                id: cluster.id,
                name: cluster.name,
            },
        })
    }

    /// Delete the cluster, then its resource group
    ///
    /// The reply status is the one reported for the cluster deletion. A
    /// resource group that is already gone is not an error; any other failure
    /// deleting it is.
    pub async fn delete_cluster(
        &self,
        request: ClusterRequest,
    ) -> Result<DeleteClusterReply, ClusterError> {
        validate_name("cluster name", &request.name)?;
        let client = self.client(&request.credentials).await?;

        let state = client
            .delete_cluster(&request.name)
            .await
            .map_err(ClusterError::Delete)?;
        let status = match_status(&state);

        if status != ClusterStatus::Stopping {
            warn!(
                cluster = %request.name,
                expected = %ClusterStatus::Stopping,
                received = %status,
                "Unexpected status after cluster delete"
            );
        }

        let group = resource_group_name(&request.name);
        match client.delete_resource_group(&group).await {
            Ok(()) => {}
            Err(ProviderError::NotFound(_)) => {
                warn!(group = %group, "Resource group already removed");
            }
            Err(e) => return Err(ClusterError::ResourceGroupDelete(e)),
        }
        info!(cluster = %request.name, status = %status, "Cluster delete submitted");

        Ok(DeleteClusterReply { ok: true, status })
    }

    pub async fn get_cluster_list(
        &self,
        request: GetClusterListRequest,
    ) -> Result<GetClusterListReply, ClusterError> {
        let client = self.client(&request.credentials).await?;

        let clusters = client
            .list_clusters()
            .await
            .map_err(ClusterError::List)?
            .into_iter()
            .map(|c| ClusterItem {
                status: match_status(&c.provisioning_state),
                id: c.id,
                name: c.name,
            })
            .collect();

        Ok(GetClusterListReply { ok: true, clusters })
    }

    pub async fn get_cluster_upgrades(
        &self,
        request: ClusterRequest,
    ) -> Result<GetClusterUpgradesReply, ClusterError> {
        validate_name("cluster name", &request.name)?;
        let client = self.client(&request.credentials).await?;

        let upgrades = client
            .available_upgrades(&request.name)
            .await
            .map_err(ClusterError::Upgrades)?
            .into_iter()
            .map(|version| Upgrade { version })
            .collect();

        Ok(GetClusterUpgradesReply { ok: true, upgrades })
    }

    pub async fn upgrade_cluster(
        &self,
        request: UpgradeClusterRequest,
    ) -> Result<UpgradeClusterReply, ClusterError> {
        validate_name("cluster name", &request.name)?;
        if request.k8s_version.is_empty() {
            return Err(ClusterError::InvalidRequest(
                "k8s version is required".to_string(),
            ));
        }
        let client = self.client(&request.credentials).await?;

        let state = client
            .upgrade_cluster(&request.name, &request.k8s_version)
            .await
            .map_err(ClusterError::Upgrade)?;
        let status = match_status(&state);
        info!(cluster = %request.name, version = %request.k8s_version, status = %status, "Cluster upgrade submitted");

        Ok(UpgradeClusterReply {
            ok: true,
            cluster: ClusterItem {
                id: cluster_resource_id(&request.credentials.subscription_id, &request.name),
                name: request.name,
                status,
            },
        })
    }

    pub async fn get_cluster_node_count(
        &self,
        request: ClusterRequest,
    ) -> Result<GetClusterNodeCountReply, ClusterError> {
        validate_name("cluster name", &request.name)?;
        let client = self.client(&request.credentials).await?;

        let pool = client
            .node_count(&request.name)
            .await
            .map_err(ClusterError::NodeCount)?;

        Ok(GetClusterNodeCountReply {
            ok: true,
            name: pool.name,
            count: pool.count,
        })
    }

    pub async fn scale_cluster(
        &self,
        request: ScaleClusterRequest,
    ) -> Result<ScaleClusterReply, ClusterError> {
        validate_name("cluster name", &request.name)?;
        validate_name("node pool", &request.node_pool)?;
        // Zero is valid for User pools; ARM rejects it for System pools
        if request.count < 0 {
            return Err(ClusterError::InvalidRequest(format!(
                "node count must not be negative, got {}",
                request.count
            )));
        }
        let client = self.client(&request.credentials).await?;

        let state = client
            .scale_node_pool(&request.name, &request.node_pool, request.count)
            .await
            .map_err(ClusterError::Scale)?;
        let status = match_status(&state);
        info!(
            cluster = %request.name,
            node_pool = %request.node_pool,
            count = request.count,
            status = %status,
            "Cluster scale submitted"
        );

        Ok(ScaleClusterReply { ok: true, status })
    }

    /// Install the cluster autoscaler for one of the cluster's agent pools
    ///
    /// Writes the settings secret first and the workload second; a failure in
    /// either step fails the call.
    pub async fn enable_cluster_autoscaling(
        &self,
        request: EnableClusterAutoscalingRequest,
    ) -> Result<EnableClusterAutoscalingReply, ClusterError> {
        validate_name("cluster name", &request.name)?;
        if request.node_groups.is_empty() {
            return Err(ClusterError::InvalidRequest(
                "at least one node group is required".to_string(),
            ));
        }
        for group in &request.node_groups {
            if group.min_count < 0 || group.min_count > group.max_count {
                return Err(ClusterError::InvalidRequest(format!(
                    "node group {} has invalid bounds {}..{}",
                    group.name, group.min_count, group.max_count
                )));
            }
        }

        let client = self.client(&request.credentials).await?;
        let cluster = client
            .get_cluster(&request.name)
            .await
            .map_err(ClusterError::Get)?;

        let node_group = select_node_group(&cluster.agent_pools, &request.node_groups)
            .ok_or_else(|| ClusterError::NodeGroupNotFound(request.name.clone()))?;
        let node_resource_group = cluster
            .node_resource_group
            .as_deref()
            .ok_or_else(|| ClusterError::MissingNodeResourceGroup(request.name.clone()))?;

        let config = AutoscalerConfig::new(
            &request.name,
            &resource_group_name(&request.name),
            node_resource_group,
            &request.credentials,
        );

        let remote = self
            .remote
            .connect(&request.name, cluster.kubeconfig.expose())
            .await
            .map_err(ClusterError::RemoteClient)?;

        remote
            .apply_secret(AUTOSCALER_NAMESPACE, AUTOSCALER_SECRET_NAME, &config)
            .await
            .map_err(ClusterError::AutoscalerSecret)?;
        drop(config);

        remote
            .apply_autoscaler(&node_group)
            .await
            .map_err(ClusterError::Autoscaling)?;

        info!(
            cluster = %request.name,
            node_pool = %node_group.name,
            min = node_group.min_count,
            max = node_group.max_count,
            "Cluster autoscaling enabled"
        );

        Ok(EnableClusterAutoscalingReply { ok: true })
    }
}
