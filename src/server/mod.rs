//! HTTP server for the cluster RPCs
//!
//! One listener serves:
//! - `POST /v1/<Operation>` - cluster control RPCs
//! - `/healthz`, `/readyz` - Kubernetes probes
//! - `/metrics` - Prometheus scrape endpoint

mod health;
mod metrics;
mod rpc;

pub use health::ReadinessState;
pub use metrics::{create_metrics, RpcMetrics, SharedMetrics};
pub use rpc::{ErrorBody, RpcError};

use crate::cluster::ClusterService;
use axum::extract::FromRef;
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// State shared by every route
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ClusterService>,
    pub readiness: ReadinessState,
    pub metrics: SharedMetrics,
}

impl FromRef<AppState> for ReadinessState {
    fn from_ref(state: &AppState) -> Self {
        state.readiness.clone()
    }
}

pub fn router(state: AppState) -> Router {
    rpc::routes().merge(health::routes()).with_state(state)
}

/// Serve until `shutdown` resolves
///
/// Readiness is withdrawn as soon as shutdown starts so the endpoint drops
/// out of rotation while in-flight RPCs finish.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let readiness = state.readiness.clone();
    let app = router(state);

    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "RPC server listening");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            readiness.set_not_ready();
            info!("Shutdown requested, draining requests");
        })
        .await
}

#[cfg(test)]
#[path = "fakes_test.rs"]
mod fakes;

#[cfg(test)]
#[path = "health_test.rs"]
mod health_tests;

#[cfg(test)]
#[path = "metrics_test.rs"]
mod metrics_tests;

#[cfg(test)]
#[path = "rpc_test.rs"]
mod rpc_tests;
