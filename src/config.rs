//! Service configuration from environment variables
//!
//! - `AKSD_PORT` - listen port for RPC, health and metrics (default 9050)
//! - `AKSD_AZURE_MANAGEMENT_URL` - Resource Manager endpoint
//! - `AKSD_AZURE_AUTHORITY_URL` - Azure AD authority
//! - `AKSD_CONNECT_TIMEOUT_SECS` - outbound connect timeout (default 10)
//! - `AKSD_AUTOSCALER_IMAGE` - cluster-autoscaler image pushed to clusters

use crate::azure::AzureEndpoints;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 9050;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_AUTOSCALER_IMAGE: &str =
    "mcr.microsoft.com/oss/kubernetes/autoscaler/cluster-autoscaler:v1.29.0";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub endpoints: AzureEndpoints,
    pub connect_timeout: Duration,
    pub autoscaler_image: String,
}

impl ServiceConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from any variable source
    ///
    /// Unset or empty variables take their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match var("AKSD_PORT") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "AKSD_PORT",
                expected: "a port number",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        let connect_timeout = match var("AKSD_CONNECT_TIMEOUT_SECS") {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "AKSD_CONNECT_TIMEOUT_SECS",
                        expected: "a positive number of seconds",
                        value,
                    })
                }
            },
            None => DEFAULT_CONNECT_TIMEOUT,
        };

        let defaults = AzureEndpoints::default();
        let endpoints = AzureEndpoints {
            management_url: var("AKSD_AZURE_MANAGEMENT_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.management_url),
            authority_url: var("AKSD_AZURE_AUTHORITY_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.authority_url),
        };

        let autoscaler_image =
            var("AKSD_AUTOSCALER_IMAGE").unwrap_or_else(|| DEFAULT_AUTOSCALER_IMAGE.to_string());

        Ok(Self {
            port,
            endpoints,
            connect_timeout,
            autoscaler_image,
        })
    }
}
