//! Per-request service principal credentials
//!
//! Credentials arrive with every RPC and live only for the duration of that
//! request. Secret material is held in [`SecretString`], which zeroizes its
//! buffer on drop and never prints its contents.

use serde::{Deserialize, Deserializer};
use std::fmt;
use zeroize::Zeroizing;

/// A secret value that is wiped from memory when dropped
#[derive(Clone, Default)]
pub struct SecretString(Zeroizing<String>);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Borrow the secret for the single call that needs it
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(***)")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretString::new)
    }
}

/// Azure service principal used to authenticate against the management API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Azure AD tenant id
    pub tenant: String,
    /// Application (client) id of the service principal
    pub app_id: String,
    /// Application secret
    pub password: SecretString,
    /// Subscription the clusters live in
    pub subscription_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_secret() {
        let creds = Credentials {
            tenant: "tenant1".to_string(),
            app_id: "app1".to_string(),
            password: SecretString::new("hunter2"),
            subscription_id: "sub1".to_string(),
        };

        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("SecretString(***)"));
        assert!(rendered.contains("tenant1"));
    }

    #[test]
    fn deserializes_from_wire_names() {
        let creds: Credentials = serde_json::from_value(serde_json::json!({
            "tenant": "t",
            "appId": "a",
            "password": "p",
            "subscriptionId": "s"
        }))
        .expect("credentials should parse");

        assert_eq!(creds.app_id, "a");
        assert_eq!(creds.password.expose(), "p");
        assert_eq!(creds.subscription_id, "s");
    }
}
