pub mod autoscaler;
pub mod azure;
pub mod cluster;
pub mod config;
pub mod server;

// Re-export for main.rs and integration tests
pub use crate::cluster::{ClusterError, ClusterService};
pub use crate::config::ServiceConfig;
