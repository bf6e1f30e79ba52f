//! Kubernetes objects for the Azure cluster autoscaler
//!
//! The deployment reads every Azure setting from the
//! [`AUTOSCALER_SECRET_NAME`] secret and scales exactly one agent pool.

use super::{AutoscalerConfig, NodeGroupBounds, AUTOSCALER_NAMESPACE, AUTOSCALER_SECRET_NAME};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, PodSpec, PodTemplateSpec, ResourceRequirements,
    Secret, SecretKeySelector, ServiceAccount,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::ByteString;
use std::collections::BTreeMap;

/// Name shared by the deployment, service account and RBAC objects
pub const AUTOSCALER_NAME: &str = "cluster-autoscaler";

/// Container environment variable → key in the autoscaler secret
const SECRET_ENV: [(&str, &str); 8] = [
    ("ARM_SUBSCRIPTION_ID", "SubscriptionID"),
    ("ARM_RESOURCE_GROUP", "ResourceGroup"),
    ("ARM_TENANT_ID", "TenantID"),
    ("ARM_CLIENT_ID", "ClientID"),
    ("ARM_CLIENT_SECRET", "ClientSecret"),
    ("ARM_VM_TYPE", "VMType"),
    ("AZURE_CLUSTER_NAME", "ClusterName"),
    ("AZURE_NODE_RESOURCE_GROUP", "NodeResourceGroup"),
];

fn labels() -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), AUTOSCALER_NAME.to_string())])
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn rule(api_group: &str, resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![api_group.to_string()]),
        resources: Some(strings(resources)),
        verbs: strings(verbs),
        ..Default::default()
    }
}

/// Opaque secret carrying the autoscaler settings bundle
pub fn autoscaler_secret(namespace: &str, name: &str, config: &AutoscalerConfig) -> Secret {
    let data = config
        .iter()
        .map(|(key, value)| (key.to_string(), ByteString(value.to_vec())))
        .collect();

    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels()),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(data),
        ..Default::default()
    }
}

pub fn service_account() -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(AUTOSCALER_NAME.to_string()),
            namespace: Some(AUTOSCALER_NAMESPACE.to_string()),
            labels: Some(labels()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn cluster_role() -> ClusterRole {
    let read = ["get", "list", "watch"];

    ClusterRole {
        metadata: ObjectMeta {
            name: Some(AUTOSCALER_NAME.to_string()),
            labels: Some(labels()),
            ..Default::default()
        },
        rules: Some(vec![
            rule("", &["events", "endpoints"], &["create", "patch"]),
            rule("", &["pods/eviction"], &["create"]),
            rule("", &["pods/status"], &["update"]),
            rule("", &["endpoints"], &["get", "update"]),
            rule("", &["nodes"], &["watch", "list", "get", "update", "delete"]),
            rule(
                "",
                &[
                    "namespaces",
                    "pods",
                    "services",
                    "replicationcontrollers",
                    "persistentvolumeclaims",
                    "persistentvolumes",
                ],
                &read,
            ),
            rule("", &["configmaps"], &["create", "get", "list", "watch", "update", "delete"]),
            rule("extensions", &["replicasets", "daemonsets"], &read),
            rule("policy", &["poddisruptionbudgets"], &["watch", "list"]),
            rule("apps", &["statefulsets", "replicasets", "daemonsets"], &read),
            rule(
                "storage.k8s.io",
                &["storageclasses", "csinodes", "csidrivers", "csistoragecapacities"],
                &read,
            ),
            rule("batch", &["jobs", "cronjobs"], &read),
            rule("coordination.k8s.io", &["leases"], &["create"]),
            PolicyRule {
                api_groups: Some(vec!["coordination.k8s.io".to_string()]),
                resource_names: Some(vec![AUTOSCALER_NAME.to_string()]),
                resources: Some(vec!["leases".to_string()]),
                verbs: strings(&["get", "update"]),
                ..Default::default()
            },
        ]),
        ..Default::default()
    }
}

pub fn cluster_role_binding() -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(AUTOSCALER_NAME.to_string()),
            labels: Some(labels()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: AUTOSCALER_NAME.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: AUTOSCALER_NAME.to_string(),
            namespace: Some(AUTOSCALER_NAMESPACE.to_string()),
            ..Default::default()
        }]),
    }
}

fn secret_env() -> Vec<EnvVar> {
    SECRET_ENV
        .iter()
        .map(|(env, key)| EnvVar {
            name: env.to_string(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: AUTOSCALER_SECRET_NAME.to_string(),
                    key: key.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect()
}

/// Autoscaler deployment limited to one agent pool
pub fn deployment(image: &str, node_group: &NodeGroupBounds) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(AUTOSCALER_NAME.to_string()),
            namespace: Some(AUTOSCALER_NAMESPACE.to_string()),
            labels: Some(labels()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels()),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("Recreate".to_string()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(AUTOSCALER_NAME.to_string()),
                    priority_class_name: Some("system-cluster-critical".to_string()),
                    containers: vec![Container {
                        name: AUTOSCALER_NAME.to_string(),
                        image: Some(image.to_string()),
                        image_pull_policy: Some("IfNotPresent".to_string()),
                        command: Some(vec![
                            "./cluster-autoscaler".to_string(),
                            "--v=3".to_string(),
                            "--logtostderr=true".to_string(),
                            "--cloud-provider=azure".to_string(),
                            "--skip-nodes-with-local-storage=false".to_string(),
                            format!(
                                "--nodes={}:{}:{}",
                                node_group.min_count, node_group.max_count, node_group.name
                            ),
                        ]),
                        env: Some(secret_env()),
                        resources: Some(ResourceRequirements {
                            requests: Some(BTreeMap::from([
                                ("cpu".to_string(), Quantity("100m".to_string())),
                                ("memory".to_string(), Quantity("300Mi".to_string())),
                            ])),
                            limits: Some(BTreeMap::from([
                                ("cpu".to_string(), Quantity("100m".to_string())),
                                ("memory".to_string(), Quantity("300Mi".to_string())),
                            ])),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::{Credentials, SecretString};

    fn bounds() -> NodeGroupBounds {
        NodeGroupBounds {
            name: "pool1".to_string(),
            min_count: 1,
            max_count: 5,
        }
    }

    #[test]
    fn test_deployment_scales_requested_pool() {
        let deploy = deployment("autoscaler:test", &bounds());

        let container = &deploy
            .spec
            .as_ref()
            .and_then(|s| s.template.spec.as_ref())
            .expect("pod spec")
            .containers[0];

        assert_eq!(container.image.as_deref(), Some("autoscaler:test"));
        let command = container.command.as_ref().expect("command");
        assert!(command.contains(&"--cloud-provider=azure".to_string()));
        assert!(command.contains(&"--nodes=1:5:pool1".to_string()));
        assert_eq!(deploy.metadata.namespace.as_deref(), Some("kube-system"));
    }

    #[test]
    fn test_every_secret_key_is_wired_into_env() {
        let creds = Credentials {
            tenant: "t".to_string(),
            app_id: "a".to_string(),
            password: SecretString::new("p"),
            subscription_id: "s".to_string(),
        };
        let config = AutoscalerConfig::new("demo", "demo-group", "MC_demo", &creds);
        let env = secret_env();

        assert_eq!(env.len(), config.len());
        for var in &env {
            let selector = var
                .value_from
                .as_ref()
                .and_then(|v| v.secret_key_ref.as_ref())
                .expect("secret ref");
            assert_eq!(selector.name, AUTOSCALER_SECRET_NAME);
            assert!(
                config.get(&selector.key).is_some(),
                "env {} refers to missing key {}",
                var.name,
                selector.key
            );
        }
    }

    #[test]
    fn test_secret_carries_bundle() {
        let creds = Credentials {
            tenant: "t".to_string(),
            app_id: "a".to_string(),
            password: SecretString::new("p"),
            subscription_id: "s".to_string(),
        };
        let config = AutoscalerConfig::new("demo", "demo-group", "MC_demo", &creds);

        let secret = autoscaler_secret("kube-system", AUTOSCALER_SECRET_NAME, &config);

        assert_eq!(secret.metadata.name.as_deref(), Some("cluster-autoscaler-azure"));
        assert_eq!(secret.type_.as_deref(), Some("Opaque"));
        let data = secret.data.expect("data");
        assert_eq!(data.len(), 8);
        assert_eq!(data["VMType"].0, b"AKS".to_vec());
    }

    #[test]
    fn test_manifests_render_as_yaml() {
        let yaml = serde_yaml::to_string(&deployment("autoscaler:test", &bounds()))
            .expect("deployment yaml");
        assert!(yaml.contains("kind: Deployment"));
        assert!(yaml.contains("cluster-autoscaler-azure"));

        let binding = serde_yaml::to_string(&cluster_role_binding()).expect("binding yaml");
        assert!(binding.contains("kind: ClusterRoleBinding"));
        assert!(binding.contains("namespace: kube-system"));
    }
}
