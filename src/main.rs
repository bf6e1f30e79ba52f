use aksd::autoscaler::KubeConnector;
use aksd::azure::AzureConnector;
use aksd::server::{create_metrics, serve, AppState, ReadinessState};
use aksd::{ClusterService, ServiceConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting aksd cluster control service");

    let config = match ServiceConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    info!(
        port = config.port,
        management_url = %config.endpoints.management_url,
        autoscaler_image = %config.autoscaler_image,
        "Configuration loaded"
    );

    let provider = AzureConnector::new(config.endpoints.clone(), config.connect_timeout)?;
    let remote = KubeConnector::new(config.autoscaler_image.clone());
    let service = ClusterService::new(Arc::new(provider), Arc::new(remote));

    let readiness = ReadinessState::new();
    let state = AppState {
        service: Arc::new(service),
        readiness: readiness.clone(),
        metrics: create_metrics()?,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    // Bound and wired; start taking traffic
    readiness.set_ready();

    serve(listener, state, shutdown_signal()).await?;

    info!("aksd stopped");
    Ok(())
}
