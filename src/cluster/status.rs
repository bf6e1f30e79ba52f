//! Canonical cluster status and its derivation from AKS provisioning states

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cluster lifecycle status reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterStatus {
    #[default]
    #[serde(rename = "STATUS_UNSPECIFIED")]
    Unspecified,
    Provisioning,
    Reconciling,
    Running,
    Stopping,
    Error,
}

impl ClusterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterStatus::Unspecified => "STATUS_UNSPECIFIED",
            ClusterStatus::Provisioning => "PROVISIONING",
            ClusterStatus::Reconciling => "RECONCILING",
            ClusterStatus::Running => "RUNNING",
            ClusterStatus::Stopping => "STOPPING",
            ClusterStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Translate an AKS provisioning state into a [`ClusterStatus`]
///
/// Total: unknown states (including the empty string) map to
/// [`ClusterStatus::Unspecified`].
pub fn match_status(state: &str) -> ClusterStatus {
    match state {
        "Creating" => ClusterStatus::Provisioning,
        "Updating" | "Upgrading" => ClusterStatus::Reconciling,
        "Succeeded" => ClusterStatus::Running,
        "Deleting" => ClusterStatus::Stopping,
        "Failed" => ClusterStatus::Error,
        _ => ClusterStatus::Unspecified,
    }
}
