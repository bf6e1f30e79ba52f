//! Azure Resource Manager REST client
//!
//! Authentication uses the OAuth2 client-credentials grant against Azure AD.
//! A fresh token is acquired for every [`ProviderConnector::connect`] call and
//! dropped (zeroized) together with the client at the end of the request.

use super::models::{
    AgentPoolCreateProfile, AgentPoolList, AgentPoolResource, ArmErrorResponse, CredentialResults,
    ManagedClusterCreateBody, ManagedClusterCreateProperties, ManagedClusterList,
    ManagedClusterResource, ResourceGroupBody, ServicePrincipalProfile, TokenErrorResponse,
    TokenResponse, UpgradeProfile,
};
use super::{
    resource_group_name, AgentPoolCount, AgentPoolProfile, ClusterSummary, CreateClusterInput,
    Credentials, ManagedCluster, ManagedClusterApi, ProviderConnector, ProviderError,
    SecretString, CONTAINER_SERVICE_PROVIDER,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};
use zeroize::Zeroizing;

const RESOURCE_GROUP_API_VERSION: &str = "2021-04-01";
const CONTAINER_SERVICE_API_VERSION: &str = "2023-08-01";

/// Provisioning state reported for an accepted delete
const DELETING_STATE: &str = "Deleting";

/// Base URLs of the Azure cloud to talk to
#[derive(Debug, Clone)]
pub struct AzureEndpoints {
    /// Resource Manager endpoint, e.g. `https://management.azure.com`
    pub management_url: String,
    /// Azure AD authority, e.g. `https://login.microsoftonline.com`
    pub authority_url: String,
}

impl Default for AzureEndpoints {
    fn default() -> Self {
        Self {
            management_url: "https://management.azure.com".to_string(),
            authority_url: "https://login.microsoftonline.com".to_string(),
        }
    }
}

/// Creates [`ManagedClusterApi`] clients from per-request credentials
///
/// Holds only the shared HTTP connection pool; no credential or token
/// outlives the request that supplied it.
#[derive(Clone)]
pub struct AzureConnector {
    http: reqwest::Client,
    endpoints: AzureEndpoints,
}

impl AzureConnector {
    pub fn new(endpoints: AzureEndpoints, connect_timeout: Duration) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self { http, endpoints })
    }

    async fn acquire_token(
        &self,
        credentials: &Credentials,
    ) -> Result<Zeroizing<String>, ProviderError> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.endpoints.authority_url.trim_end_matches('/'),
            credentials.tenant
        );
        let scope = format!(
            "{}/.default",
            self.endpoints.management_url.trim_end_matches('/')
        );
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", credentials.app_id.as_str()),
            ("client_secret", credentials.password.expose()),
            ("scope", scope.as_str()),
        ];

        let response = self.http.post(&url).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body: TokenErrorResponse = response.json().await.unwrap_or_default();
            return Err(ProviderError::Auth(format!(
                "token request for tenant {} returned {}: {} {}",
                credentials.tenant, status, body.error, body.error_description
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(format!("token response: {}", e)))?;

        Ok(Zeroizing::new(token.access_token))
    }
}

#[async_trait]
impl ProviderConnector for AzureConnector {
    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn ManagedClusterApi>, ProviderError> {
        let token = self.acquire_token(credentials).await?;
        debug!(
            tenant = %credentials.tenant,
            subscription = %credentials.subscription_id,
            "Acquired management API token"
        );

        Ok(Box::new(AzureClient {
            http: self.http.clone(),
            management_url: self
                .endpoints
                .management_url
                .trim_end_matches('/')
                .to_string(),
            subscription_id: credentials.subscription_id.clone(),
            token,
        }))
    }
}

/// Management client bound to one subscription and one bearer token
struct AzureClient {
    http: reqwest::Client,
    management_url: String,
    subscription_id: String,
    token: Zeroizing<String>,
}

impl AzureClient {
    fn group_url(&self, group: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourcegroups/{}?api-version={}",
            self.management_url, self.subscription_id, group, RESOURCE_GROUP_API_VERSION
        )
    }

    /// URL of a cluster or one of its sub-resources (`suffix` starts with `/`)
    fn cluster_url(&self, name: &str, suffix: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/{}/{}{}?api-version={}",
            self.management_url,
            self.subscription_id,
            resource_group_name(name),
            CONTAINER_SERVICE_PROVIDER,
            name,
            suffix,
            CONTAINER_SERVICE_API_VERSION
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(self.token.as_str())
    }

    /// Send a request and turn non-2xx responses into [`ProviderError`]s
    async fn send(&self, request: RequestBuilder, resource: &str) -> Result<Response, ProviderError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(resource.to_string()));
        }

        let body: ArmErrorResponse = response.json().await.unwrap_or_default();
        Err(ProviderError::Api {
            status: status.as_u16(),
            code: body.error.code,
            message: body.error.message,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        resource: &str,
    ) -> Result<T, ProviderError> {
        let response = self.send(request, resource).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Decode(format!("{}: {}", resource, e)))
    }

    /// GET a resource, set one field under `properties`, PUT it back
    ///
    /// ARM has no partial update for managed clusters or agent pools, so
    /// mutations round-trip the full document.
    async fn update_property<T: DeserializeOwned>(
        &self,
        url: &str,
        resource: &str,
        field: &str,
        value: Value,
    ) -> Result<T, ProviderError> {
        let mut document: Value = self
            .send_json(self.request(Method::GET, url), resource)
            .await?;

        document
            .get_mut("properties")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| ProviderError::Decode(format!("{}: missing properties", resource)))?
            .insert(field.to_string(), value);

        self.send_json(self.request(Method::PUT, url).json(&document), resource)
            .await
    }

    async fn admin_kubeconfig(&self, name: &str) -> Result<SecretString, ProviderError> {
        let url = self.cluster_url(name, "/listClusterAdminCredential");
        let credentials: CredentialResults = self
            .send_json(
                self.request(Method::POST, &url).header(CONTENT_LENGTH, "0"),
                name,
            )
            .await?;

        let encoded = credentials
            .kubeconfigs
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Decode(format!("{}: no kubeconfig returned", name)))?;

        let raw = Zeroizing::new(
            STANDARD
                .decode(encoded.value.as_bytes())
                .map_err(|e| ProviderError::Decode(format!("{}: kubeconfig: {}", name, e)))?,
        );
        let text = std::str::from_utf8(&raw)
            .map_err(|e| ProviderError::Decode(format!("{}: kubeconfig: {}", name, e)))?;

        Ok(SecretString::new(text))
    }
}

#[async_trait]
impl ManagedClusterApi for AzureClient {
    async fn resource_group_exists(&self, group: &str) -> Result<bool, ProviderError> {
        let url = self.group_url(group);
        match self.send(self.request(Method::HEAD, &url), group).await {
            Ok(_) => Ok(true),
            Err(ProviderError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_resource_group(
        &self,
        group: &str,
        location: &str,
    ) -> Result<(), ProviderError> {
        let url = self.group_url(group);
        self.send(
            self.request(Method::PUT, &url)
                .json(&ResourceGroupBody { location }),
            group,
        )
        .await?;

        info!(group = %group, location = %location, "Resource group created");
        Ok(())
    }

    async fn delete_resource_group(&self, group: &str) -> Result<(), ProviderError> {
        let url = self.group_url(group);
        self.send(self.request(Method::DELETE, &url), group).await?;

        info!(group = %group, "Resource group deletion accepted");
        Ok(())
    }

    async fn create_cluster(&self, input: &CreateClusterInput) -> Result<String, ProviderError> {
        let agent_pool_profiles = input
            .agent_pools
            .iter()
            .enumerate()
            .map(|(i, pool)| AgentPoolCreateProfile {
                name: &pool.name,
                count: pool.count,
                vm_size: &pool.vm_size,
                pool_type: &pool.pool_type,
                // AKS requires the first pool to host system pods
                mode: if i == 0 { "System" } else { "User" },
                os_type: "Linux",
            })
            .collect();

        let body = ManagedClusterCreateBody {
            location: &input.location,
            tags: &input.tags,
            properties: ManagedClusterCreateProperties {
                kubernetes_version: &input.k8s_version,
                dns_prefix: &input.name,
                agent_pool_profiles,
                service_principal_profile: ServicePrincipalProfile {
                    client_id: &input.client_id,
                    secret: input.client_secret.expose(),
                },
            },
        };

        let url = self.cluster_url(&input.name, "");
        let cluster: ManagedClusterResource = self
            .send_json(self.request(Method::PUT, &url).json(&body), &input.name)
            .await?;

        Ok(cluster.properties.provisioning_state.unwrap_or_default())
    }

    async fn get_cluster(&self, name: &str) -> Result<ManagedCluster, ProviderError> {
        let url = self.cluster_url(name, "");
        let cluster: ManagedClusterResource =
            self.send_json(self.request(Method::GET, &url), name).await?;
        let kubeconfig = self.admin_kubeconfig(name).await?;

        Ok(ManagedCluster {
            id: cluster.id,
            name: cluster.name,
            provisioning_state: cluster.properties.provisioning_state.unwrap_or_default(),
            node_resource_group: cluster.properties.node_resource_group,
            agent_pools: cluster
                .properties
                .agent_pool_profiles
                .into_iter()
                .map(|p| AgentPoolProfile { name: p.name })
                .collect(),
            kubeconfig,
        })
    }

    async fn delete_cluster(&self, name: &str) -> Result<String, ProviderError> {
        let url = self.cluster_url(name, "");
        let response = self.send(self.request(Method::DELETE, &url), name).await?;

        // 204: the cluster is already gone, the caller still owns its group
        if response.status() == StatusCode::NO_CONTENT {
            debug!(cluster = %name, "cluster already deleted");
        }

        Ok(DELETING_STATE.to_string())
    }

    async fn list_clusters(&self) -> Result<Vec<ClusterSummary>, ProviderError> {
        let mut next = Some(format!(
            "{}/subscriptions/{}/providers/{}?api-version={}",
            self.management_url,
            self.subscription_id,
            CONTAINER_SERVICE_PROVIDER,
            CONTAINER_SERVICE_API_VERSION
        ));
        let mut clusters = Vec::new();

        while let Some(url) = next.take() {
            let page: ManagedClusterList = self
                .send_json(self.request(Method::GET, &url), "managedClusters")
                .await?;

            clusters.extend(page.value.into_iter().map(|c| ClusterSummary {
                id: c.id,
                name: c.name,
                provisioning_state: c.properties.provisioning_state.unwrap_or_default(),
            }));
            next = page.next_link.filter(|link| !link.is_empty());
        }

        Ok(clusters)
    }

    async fn available_upgrades(&self, name: &str) -> Result<Vec<String>, ProviderError> {
        let url = self.cluster_url(name, "/upgradeProfiles/default");
        let profile: UpgradeProfile = self.send_json(self.request(Method::GET, &url), name).await?;

        Ok(profile
            .properties
            .control_plane_profile
            .upgrades
            .unwrap_or_default()
            .into_iter()
            .map(|u| u.kubernetes_version)
            .collect())
    }

    async fn upgrade_cluster(
        &self,
        name: &str,
        k8s_version: &str,
    ) -> Result<String, ProviderError> {
        let url = self.cluster_url(name, "");
        let cluster: ManagedClusterResource = self
            .update_property(&url, name, "kubernetesVersion", Value::from(k8s_version))
            .await?;

        Ok(cluster.properties.provisioning_state.unwrap_or_default())
    }

    async fn node_count(&self, name: &str) -> Result<AgentPoolCount, ProviderError> {
        let url = self.cluster_url(name, "/agentPools");
        let pools: AgentPoolList = self.send_json(self.request(Method::GET, &url), name).await?;

        let pool = pools
            .value
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NotFound(format!("agent pool of {}", name)))?;

        Ok(AgentPoolCount {
            name: pool.name,
            count: pool.properties.count.unwrap_or_default(),
        })
    }

    async fn scale_node_pool(
        &self,
        name: &str,
        node_pool: &str,
        count: i32,
    ) -> Result<String, ProviderError> {
        let url = self.cluster_url(name, &format!("/agentPools/{}", node_pool));
        let pool: AgentPoolResource = self
            .update_property(&url, node_pool, "count", Value::from(count))
            .await?;

        Ok(pool.properties.provisioning_state.unwrap_or_default())
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
