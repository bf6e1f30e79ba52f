//! Cluster control handler
//!
//! One method per RPC: authenticate with the request's credentials, call the
//! management API, translate the provisioning state and build the reply.

mod handler;
pub mod messages;
pub mod status;

pub use handler::{select_node_group, ClusterError, ClusterService, ErrorKind};
pub use status::{match_status, ClusterStatus};

#[cfg(test)]
#[path = "handler_test.rs"]
mod tests;
