//! Shared harness for the RPC integration tests
//!
//! - `MockArm`: a stateful in-process stand-in for Azure AD and the Resource
//!   Manager API, enough for the full cluster lifecycle
//! - `RecordingRemote`: a remote-cluster connector that records what the
//!   autoscaler rollout would have applied

#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use aksd::autoscaler::{
    AutoscalerConfig, NodeGroupBounds, RemoteCluster, RemoteClusterConnector, RemoteClusterError,
};
use aksd::azure::{AzureConnector, AzureEndpoints};
use aksd::server::{create_metrics, router, AppState, ReadinessState};
use aksd::ClusterService;
use async_trait::async_trait;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

pub const TENANT: &str = "tenant1";
pub const APP_SECRET: &str = "app-secret";
pub const SUBSCRIPTION: &str = "sub1";
pub const KUBECONFIG: &str = "apiVersion: v1\nkind: Config\nclusters: []\n";

const TOKEN: &str = "integration-token";

pub fn credentials() -> Value {
    json!({
        "tenant": TENANT,
        "appId": "app1",
        "password": APP_SECRET,
        "subscriptionId": SUBSCRIPTION
    })
}

#[derive(Default)]
pub struct ArmState {
    pub groups: HashSet<String>,
    /// Clusters in creation order
    pub clusters: Vec<(String, Value)>,
    pub requests: Vec<String>,
}

impl ArmState {
    fn cluster_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.clusters
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, doc)| doc)
    }
}

#[derive(Clone, Default)]
pub struct MockArm {
    pub state: Arc<Mutex<ArmState>>,
}

impl MockArm {
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.state.lock().unwrap().groups.contains(group)
    }

    fn record(&self, entry: String) {
        self.state.lock().unwrap().requests.push(entry);
    }
}

fn arm_error(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({"error": {"code": code, "message": message}})),
    )
        .into_response()
}

async fn require_token(headers: HeaderMap, request: Request, next: Next) -> Response {
    let expected = format!("Bearer {}", TOKEN);
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !authorized {
        return arm_error(
            StatusCode::UNAUTHORIZED,
            "AuthenticationFailed",
            "missing or invalid bearer token",
        );
    }
    next.run(request).await
}

async fn token(
    Path(tenant): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    if tenant == TENANT && form.get("client_secret").map(String::as_str) == Some(APP_SECRET) {
        return Json(json!({"access_token": TOKEN, "token_type": "Bearer"})).into_response();
    }
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "invalid_client",
            "error_description": "AADSTS7000215: Invalid client secret provided."
        })),
    )
        .into_response()
}

async fn get_group(State(arm): State<MockArm>, Path((_sub, group)): Path<(String, String)>) -> StatusCode {
    if arm.has_group(&group) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn put_group(
    State(arm): State<MockArm>,
    Path((_sub, group)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    arm.record(format!("PUT group {}", group));
    arm.state.lock().unwrap().groups.insert(group.clone());
    (
        StatusCode::CREATED,
        Json(json!({"name": group, "location": body["location"]})),
    )
        .into_response()
}

async fn delete_group(State(arm): State<MockArm>, Path((_sub, group)): Path<(String, String)>) -> Response {
    arm.record(format!("DELETE group {}", group));
    if arm.state.lock().unwrap().groups.remove(&group) {
        StatusCode::ACCEPTED.into_response()
    } else {
        arm_error(StatusCode::NOT_FOUND, "ResourceGroupNotFound", "group not found")
    }
}

async fn put_cluster(
    State(arm): State<MockArm>,
    Path((sub, group, name)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Response {
    arm.record(format!("PUT cluster {}", name));
    let mut state = arm.state.lock().unwrap();
    if !state.groups.contains(&group) {
        return arm_error(StatusCode::NOT_FOUND, "ResourceGroupNotFound", "group not found");
    }

    if let Some(existing) = state.cluster_mut(&name) {
        let mut updated = body;
        updated["properties"]["provisioningState"] = json!("Upgrading");
        *existing = updated.clone();
        return Json(updated).into_response();
    }

    let pools: Vec<Value> = body["properties"]["agentPoolProfiles"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    let document = json!({
        "id": format!(
            "/subscriptions/{}/resourcegroups/{}/providers/Microsoft.ContainerService/managedClusters/{}",
            sub, group, name
        ),
        "name": name,
        "location": body["location"],
        "tags": body["tags"],
        "properties": {
            "provisioningState": "Creating",
            "kubernetesVersion": body["properties"]["kubernetesVersion"],
            "dnsPrefix": body["properties"]["dnsPrefix"],
            "nodeResourceGroup": format!("MC_{}_{}_eastus", group, name),
            "agentPoolProfiles": pools
        }
    });
    state.clusters.push((name, document.clone()));
    (StatusCode::CREATED, Json(document)).into_response()
}

async fn get_cluster(
    State(arm): State<MockArm>,
    Path((_sub, _group, name)): Path<(String, String, String)>,
) -> Response {
    let mut state = arm.state.lock().unwrap();
    match state.cluster_mut(&name) {
        Some(doc) => Json(doc.clone()).into_response(),
        None => arm_error(StatusCode::NOT_FOUND, "ResourceNotFound", "cluster not found"),
    }
}

async fn delete_cluster(
    State(arm): State<MockArm>,
    Path((_sub, _group, name)): Path<(String, String, String)>,
) -> StatusCode {
    arm.record(format!("DELETE cluster {}", name));
    let mut state = arm.state.lock().unwrap();
    let before = state.clusters.len();
    state.clusters.retain(|(n, _)| n != &name);
    if state.clusters.len() < before {
        StatusCode::ACCEPTED
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn list_clusters(State(arm): State<MockArm>) -> Json<Value> {
    let state = arm.state.lock().unwrap();
    let value: Vec<Value> = state.clusters.iter().map(|(_, doc)| doc.clone()).collect();
    Json(json!({ "value": value }))
}

async fn list_credentials(Path((_sub, _group, _name)): Path<(String, String, String)>) -> Json<Value> {
    Json(json!({
        "kubeconfigs": [{"name": "clusterAdmin", "value": STANDARD.encode(KUBECONFIG)}]
    }))
}

async fn upgrade_profile(
    State(arm): State<MockArm>,
    Path((_sub, _group, name)): Path<(String, String, String)>,
) -> Response {
    if arm.state.lock().unwrap().cluster_mut(&name).is_none() {
        return arm_error(StatusCode::NOT_FOUND, "ResourceNotFound", "cluster not found");
    }
    Json(json!({
        "properties": {
            "controlPlaneProfile": {
                "upgrades": [{"kubernetesVersion": "1.29.4"}, {"kubernetesVersion": "1.30.0"}]
            }
        }
    }))
    .into_response()
}

fn pool_document(profile: &Value, state: &str) -> Value {
    json!({
        "name": profile["name"],
        "properties": {
            "count": profile["count"],
            "vmSize": profile["vmSize"],
            "provisioningState": state
        }
    })
}

async fn list_agent_pools(
    State(arm): State<MockArm>,
    Path((_sub, _group, name)): Path<(String, String, String)>,
) -> Response {
    let mut state = arm.state.lock().unwrap();
    let Some(cluster) = state.cluster_mut(&name) else {
        return arm_error(StatusCode::NOT_FOUND, "ResourceNotFound", "cluster not found");
    };
    let value: Vec<Value> = cluster["properties"]["agentPoolProfiles"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|p| pool_document(p, "Succeeded"))
        .collect();
    Json(json!({ "value": value })).into_response()
}

fn find_pool<'a>(cluster: &'a mut Value, pool: &str) -> Option<&'a mut Value> {
    cluster["properties"]["agentPoolProfiles"]
        .as_array_mut()?
        .iter_mut()
        .find(|p| p["name"] == pool)
}

async fn get_agent_pool(
    State(arm): State<MockArm>,
    Path((_sub, _group, name, pool)): Path<(String, String, String, String)>,
) -> Response {
    let mut state = arm.state.lock().unwrap();
    match state.cluster_mut(&name).and_then(|c| find_pool(c, &pool)) {
        Some(profile) => Json(pool_document(profile, "Succeeded")).into_response(),
        None => arm_error(StatusCode::NOT_FOUND, "ResourceNotFound", "agent pool not found"),
    }
}

async fn put_agent_pool(
    State(arm): State<MockArm>,
    Path((_sub, _group, name, pool)): Path<(String, String, String, String)>,
    Json(body): Json<Value>,
) -> Response {
    arm.record(format!("PUT pool {}/{}", name, pool));
    let mut state = arm.state.lock().unwrap();
    match state.cluster_mut(&name).and_then(|c| find_pool(c, &pool)) {
        Some(profile) => {
            profile["count"] = body["properties"]["count"].clone();
            Json(pool_document(profile, "Updating")).into_response()
        }
        None => arm_error(StatusCode::NOT_FOUND, "ResourceNotFound", "agent pool not found"),
    }
}

const CLUSTER: &str =
    "/subscriptions/{sub}/resourceGroups/{group}/providers/Microsoft.ContainerService/managedClusters/{name}";

/// Start the mock management API and return its base URL
pub async fn start_mock_arm(arm: MockArm) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock listener");
    let base_url = format!("http://{}", listener.local_addr().expect("local addr"));

    let management = Router::new()
        .route(
            "/subscriptions/{sub}/resourcegroups/{group}",
            get(get_group).put(put_group).delete(delete_group),
        )
        .route(
            "/subscriptions/{sub}/providers/Microsoft.ContainerService/managedClusters",
            get(list_clusters),
        )
        .route(CLUSTER, get(get_cluster).put(put_cluster).delete(delete_cluster))
        .route(
            &format!("{}/listClusterAdminCredential", CLUSTER),
            post(list_credentials),
        )
        .route(
            &format!("{}/upgradeProfiles/default", CLUSTER),
            get(upgrade_profile),
        )
        .route(&format!("{}/agentPools", CLUSTER), get(list_agent_pools))
        .route(
            &format!("{}/agentPools/{{pool}}", CLUSTER),
            get(get_agent_pool).put(put_agent_pool),
        )
        .layer(middleware::from_fn(require_token));

    let app = Router::new()
        .route("/{tenant}/oauth2/v2.0/token", post(token))
        .merge(management)
        .with_state(arm);

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    base_url
}

#[derive(Debug, Default)]
pub struct RemoteRecord {
    pub connected: Vec<String>,
    pub kubeconfig: Option<String>,
    pub secret: BTreeMap<String, Vec<u8>>,
    pub autoscaler: Option<NodeGroupBounds>,
}

#[derive(Clone, Default)]
pub struct RecordingRemote {
    pub record: Arc<Mutex<RemoteRecord>>,
}

#[async_trait]
impl RemoteClusterConnector for RecordingRemote {
    async fn connect(
        &self,
        cluster_name: &str,
        kubeconfig: &str,
    ) -> Result<Box<dyn RemoteCluster>, RemoteClusterError> {
        let mut record = self.record.lock().unwrap();
        record.connected.push(cluster_name.to_string());
        record.kubeconfig = Some(kubeconfig.to_string());
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl RemoteCluster for RecordingRemote {
    async fn apply_secret(
        &self,
        _namespace: &str,
        _name: &str,
        config: &AutoscalerConfig,
    ) -> Result<(), RemoteClusterError> {
        self.record.lock().unwrap().secret = config
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_vec()))
            .collect();
        Ok(())
    }

    async fn apply_autoscaler(
        &self,
        node_group: &NodeGroupBounds,
    ) -> Result<(), RemoteClusterError> {
        self.record.lock().unwrap().autoscaler = Some(node_group.clone());
        Ok(())
    }
}

pub struct Harness {
    pub base: String,
    pub arm: MockArm,
    pub remote: RecordingRemote,
    pub state: AppState,
    http: reqwest::Client,
}

impl Harness {
    /// Mock ARM + service router, each on its own ephemeral port
    pub async fn start() -> Self {
        let arm = MockArm::default();
        let arm_url = start_mock_arm(arm.clone()).await;

        let provider = AzureConnector::new(
            AzureEndpoints {
                management_url: arm_url.clone(),
                authority_url: arm_url,
            },
            Duration::from_secs(2),
        )
        .expect("build connector");
        let remote = RecordingRemote::default();

        let state = AppState {
            service: Arc::new(ClusterService::new(
                Arc::new(provider),
                Arc::new(remote.clone()),
            )),
            readiness: ReadinessState::new(),
            metrics: create_metrics().expect("create metrics"),
        };
        state.readiness.set_ready();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind service listener");
        let base = format!("http://{}", listener.local_addr().expect("local addr"));
        let app = router(state.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base,
            arm,
            remote,
            state,
            http: reqwest::Client::new(),
        }
    }

    pub async fn call(&self, operation: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .http
            .post(format!("{}/v1/{}", self.base, operation))
            .json(&body)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .expect("rpc request");
        let status = StatusCode::from_u16(response.status().as_u16()).expect("status");
        let body = response.json().await.expect("json body");
        (status, body)
    }
}
