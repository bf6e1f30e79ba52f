//! Cluster RPC endpoints
//!
//! Each operation is `POST /v1/<Operation>` with a JSON request body and a
//! JSON reply. Failures carry an HTTP status derived from the error kind and
//! a `{"error": "..."}` body.

use super::AppState;
use crate::cluster::messages::{
    ClusterRequest, CreateClusterReply, CreateClusterRequest, DeleteClusterReply,
    EnableClusterAutoscalingReply, EnableClusterAutoscalingRequest, GetClusterListReply,
    GetClusterListRequest, GetClusterNodeCountReply, GetClusterReply, GetClusterUpgradesReply,
    ScaleClusterReply, ScaleClusterRequest, UpgradeClusterReply, UpgradeClusterRequest,
};
use crate::cluster::{ClusterError, ClusterService, ErrorKind};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info_span, warn, Instrument};
use uuid::Uuid;

/// Error body returned by every failed RPC
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug)]
pub struct RpcError {
    status: StatusCode,
    message: String,
}

impl RpcError {
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ClusterError> for RpcError {
    fn from(e: ClusterError) -> Self {
        let status = match e.kind() {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<JsonRejection> for RpcError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

type Payload<T> = Result<Json<T>, JsonRejection>;

/// Run one RPC inside its own span, recording metrics for the outcome
async fn dispatch<Req, Rep, Fut>(
    state: &AppState,
    operation: &'static str,
    payload: Payload<Req>,
    call: impl FnOnce(Arc<ClusterService>, Req) -> Fut,
) -> Result<Rep, RpcError>
where
    Fut: Future<Output = Result<Rep, ClusterError>>,
{
    let request_id = Uuid::new_v4();
    let span = info_span!("rpc", operation, request_id = %request_id);

    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(parent: &span, error = %rejection.body_text(), "Rejected malformed request");
            state.metrics.record_invalid(operation);
            return Err(rejection.into());
        }
    };

    let start = Instant::now();
    let result = call(state.service.clone(), request)
        .instrument(span.clone())
        .await;
    let elapsed = start.elapsed().as_secs_f64();

    match result {
        Ok(reply) => {
            debug!(parent: &span, elapsed_secs = elapsed, "RPC completed");
            state.metrics.record_success(operation, elapsed);
            Ok(reply)
        }
        Err(e) => {
            error!(parent: &span, error = %e, "RPC failed");
            state.metrics.record_error(operation, elapsed);
            Err(e.into())
        }
    }
}

async fn create_cluster(
    State(state): State<AppState>,
    payload: Payload<CreateClusterRequest>,
) -> Result<Json<CreateClusterReply>, RpcError> {
    let reply = dispatch(&state, "CreateCluster", payload, |service, request| async move {
        service.create_cluster(request).await
    })
    .await?;
    state
        .metrics
        .record_status("CreateCluster", reply.cluster.status);
    Ok(Json(reply))
}

async fn get_cluster(
    State(state): State<AppState>,
    payload: Payload<ClusterRequest>,
) -> Result<Json<GetClusterReply>, RpcError> {
    let reply = dispatch(&state, "GetCluster", payload, |service, request| async move {
        service.get_cluster(request).await
    })
    .await?;
    state.metrics.record_status("GetCluster", reply.cluster.status);
    Ok(Json(reply))
}

async fn delete_cluster(
    State(state): State<AppState>,
    payload: Payload<ClusterRequest>,
) -> Result<Json<DeleteClusterReply>, RpcError> {
    let reply = dispatch(&state, "DeleteCluster", payload, |service, request| async move {
        service.delete_cluster(request).await
    })
    .await?;
    state.metrics.record_status("DeleteCluster", reply.status);
    Ok(Json(reply))
}

async fn get_cluster_list(
    State(state): State<AppState>,
    payload: Payload<GetClusterListRequest>,
) -> Result<Json<GetClusterListReply>, RpcError> {
    let reply = dispatch(&state, "GetClusterList", payload, |service, request| async move {
        service.get_cluster_list(request).await
    })
    .await?;
    for cluster in &reply.clusters {
        state.metrics.record_status("GetClusterList", cluster.status);
    }
    Ok(Json(reply))
}

async fn get_cluster_upgrades(
    State(state): State<AppState>,
    payload: Payload<ClusterRequest>,
) -> Result<Json<GetClusterUpgradesReply>, RpcError> {
    dispatch(&state, "GetClusterUpgrades", payload, |service, request| async move {
        service.get_cluster_upgrades(request).await
    })
    .await
    .map(Json)
}

async fn upgrade_cluster(
    State(state): State<AppState>,
    payload: Payload<UpgradeClusterRequest>,
) -> Result<Json<UpgradeClusterReply>, RpcError> {
    let reply = dispatch(&state, "UpgradeCluster", payload, |service, request| async move {
        service.upgrade_cluster(request).await
    })
    .await?;
    state
        .metrics
        .record_status("UpgradeCluster", reply.cluster.status);
    Ok(Json(reply))
}

async fn get_cluster_node_count(
    State(state): State<AppState>,
    payload: Payload<ClusterRequest>,
) -> Result<Json<GetClusterNodeCountReply>, RpcError> {
    dispatch(&state, "GetClusterNodeCount", payload, |service, request| async move {
        service.get_cluster_node_count(request).await
    })
    .await
    .map(Json)
}

async fn scale_cluster(
    State(state): State<AppState>,
    payload: Payload<ScaleClusterRequest>,
) -> Result<Json<ScaleClusterReply>, RpcError> {
    let reply = dispatch(&state, "ScaleCluster", payload, |service, request| async move {
        service.scale_cluster(request).await
    })
    .await?;
    state.metrics.record_status("ScaleCluster", reply.status);
    Ok(Json(reply))
}

async fn enable_cluster_autoscaling(
    State(state): State<AppState>,
    payload: Payload<EnableClusterAutoscalingRequest>,
) -> Result<Json<EnableClusterAutoscalingReply>, RpcError> {
    dispatch(
        &state,
        "EnableClusterAutoscaling",
        payload,
        |service, request| async move { service.enable_cluster_autoscaling(request).await },
    )
    .await
    .map(Json)
}

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/CreateCluster", post(create_cluster))
        .route("/v1/GetCluster", post(get_cluster))
        .route("/v1/DeleteCluster", post(delete_cluster))
        .route("/v1/GetClusterList", post(get_cluster_list))
        .route("/v1/GetClusterUpgrades", post(get_cluster_upgrades))
        .route("/v1/UpgradeCluster", post(upgrade_cluster))
        .route("/v1/GetClusterNodeCount", post(get_cluster_node_count))
        .route("/v1/ScaleCluster", post(scale_cluster))
        .route(
            "/v1/EnableClusterAutoscaling",
            post(enable_cluster_autoscaling),
        )
}
