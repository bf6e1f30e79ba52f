//! Prometheus metrics for the RPC surface
//!
//! - Request counts by operation and result
//! - Request durations by operation
//! - Translated cluster statuses returned to callers

use crate::cluster::ClusterStatus;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// RPC metrics registry
///
/// Clone is cheap (the collectors are reference counted).
#[derive(Clone)]
pub struct RpcMetrics {
    registry: Registry,
    /// Total RPCs by operation and result (success, error, invalid)
    pub requests_total: IntCounterVec,
    /// RPC duration in seconds
    pub request_duration_seconds: HistogramVec,
    /// Statuses returned in replies, by operation
    pub cluster_status_total: IntCounterVec,
}

impl RpcMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("aksd_rpc_requests_total", "Total number of cluster RPCs"),
            &["operation", "result"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        // Cluster operations only submit long-running requests, so the
        // buckets top out at a minute.
        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "aksd_rpc_duration_seconds",
                "Duration of cluster RPCs in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
            &["operation"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        let cluster_status_total = IntCounterVec::new(
            Opts::new(
                "aksd_cluster_status_total",
                "Cluster statuses returned to callers",
            ),
            &["operation", "status"],
        )?;
        registry.register(Box::new(cluster_status_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration_seconds,
            cluster_status_total,
        })
    }

    pub fn record_success(&self, operation: &str, duration_secs: f64) {
        self.requests_total
            .with_label_values(&[operation, "success"])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    pub fn record_error(&self, operation: &str, duration_secs: f64) {
        self.requests_total
            .with_label_values(&[operation, "error"])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    /// Record a request rejected before reaching the handler
    pub fn record_invalid(&self, operation: &str) {
        self.requests_total
            .with_label_values(&[operation, "invalid"])
            .inc();
    }

    pub fn record_status(&self, operation: &str, status: ClusterStatus) {
        self.cluster_status_total
            .with_label_values(&[operation, status.as_str()])
            .inc();
    }

    /// Encode all metrics to Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e))
        })
    }
}

pub type SharedMetrics = Arc<RpcMetrics>;

pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    Ok(Arc::new(RpcMetrics::new()?))
}
