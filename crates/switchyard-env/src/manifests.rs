//! Manifest rendering for the objects an environment owns.

use serde_json::{Value, json};
use switchyard_core::{DataStore, DataStoreRole, EnvironmentKind, ResourceLimits};

use crate::error::{EnvironmentError, EnvironmentResult};

/// Label carrying the environment kind (`blue` / `green`).
pub const KIND_LABEL: &str = "switchyard.io/environment";
/// Label carrying the environment name.
pub const NAME_LABEL: &str = "switchyard.io/name";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "switchyard";

pub const QUOTA_NAME: &str = "switchyard-quota";
pub const NETWORK_POLICY_NAME: &str = "switchyard-isolation";
pub const MONITORING_NAME: &str = "switchyard-monitoring";

fn to_yaml(value: &Value) -> EnvironmentResult<String> {
    serde_yaml::to_string(value).map_err(|e| EnvironmentError::Render(e.to_string()))
}

fn metadata(name: &str, namespace: &str, kind: EnvironmentKind) -> Value {
    json!({
        "name": name,
        "namespace": namespace,
        "labels": {
            KIND_LABEL: kind.as_str(),
            MANAGED_BY_LABEL: MANAGED_BY,
        },
    })
}

/// ResourceQuota capping requests and limits at the environment's shape.
pub fn resource_quota(
    namespace: &str,
    kind: EnvironmentKind,
    limits: &ResourceLimits,
) -> EnvironmentResult<String> {
    let mut hard = json!({
        "requests.cpu": limits.cpu,
        "requests.memory": limits.memory,
        "limits.cpu": limits.cpu,
        "limits.memory": limits.memory,
    });
    if let (Some(storage), Some(map)) = (&limits.storage, hard.as_object_mut()) {
        map.insert("requests.storage".to_string(), json!(storage));
    }

    to_yaml(&json!({
        "apiVersion": "v1",
        "kind": "ResourceQuota",
        "metadata": metadata(QUOTA_NAME, namespace, kind),
        "spec": { "hard": hard },
    }))
}

/// NetworkPolicy admitting ingress only from pods of the same kind.
pub fn network_policy(namespace: &str, kind: EnvironmentKind) -> EnvironmentResult<String> {
    to_yaml(&json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "NetworkPolicy",
        "metadata": metadata(NETWORK_POLICY_NAME, namespace, kind),
        "spec": {
            "podSelector": {},
            "policyTypes": ["Ingress"],
            "ingress": [{
                "from": [{
                    "namespaceSelector": { "matchLabels": { KIND_LABEL: kind.as_str() } },
                    "podSelector": { "matchLabels": { KIND_LABEL: kind.as_str() } },
                }],
            }],
        },
    }))
}

/// ConfigMap describing a data store's role, read by the store's chart.
pub fn data_store_config(
    store: &DataStore,
    namespace: &str,
    kind: EnvironmentKind,
) -> EnvironmentResult<String> {
    let (role, source) = match &store.role {
        DataStoreRole::Primary => ("primary", None),
        DataStoreRole::ReadReplica { source } => ("read-replica", Some(source.as_str())),
    };
    let mut data = json!({
        "engine": store.engine,
        "role": role,
        "read_only": (source.is_some()).to_string(),
    });
    if let (Some(source), Some(map)) = (source, data.as_object_mut()) {
        map.insert("replicate_from".to_string(), json!(source));
    }

    to_yaml(&json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": metadata(&format!("{}-datastore", store.name), namespace, kind),
        "data": data,
    }))
}

/// ConfigMap pointing monitoring at the environment.
pub fn monitoring_config(
    namespace: &str,
    kind: EnvironmentKind,
    env_name: &str,
) -> EnvironmentResult<String> {
    to_yaml(&json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": metadata(MONITORING_NAME, namespace, kind),
        "data": {
            "environment": env_name,
            "kind": kind.as_str(),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> serde_yaml::Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn quota_carries_limits() {
        let limits = ResourceLimits {
            cpu: "4".to_string(),
            memory: "8Gi".to_string(),
            storage: Some("100Gi".to_string()),
        };
        let doc = parse(&resource_quota("shop-green", EnvironmentKind::Green, &limits).unwrap());
        assert_eq!(doc["kind"], "ResourceQuota");
        assert_eq!(doc["metadata"]["namespace"], "shop-green");
        assert_eq!(doc["spec"]["hard"]["limits.memory"], "8Gi");
        assert_eq!(doc["spec"]["hard"]["requests.storage"], "100Gi");
    }

    #[test]
    fn quota_without_storage_omits_it() {
        let doc = parse(
            &resource_quota("a", EnvironmentKind::Blue, &ResourceLimits::default()).unwrap(),
        );
        assert!(doc["spec"]["hard"].get("requests.storage").is_none());
    }

    #[test]
    fn policy_selects_same_kind() {
        let doc = parse(&network_policy("shop-blue", EnvironmentKind::Blue).unwrap());
        let from = &doc["spec"]["ingress"][0]["from"][0];
        assert_eq!(from["podSelector"]["matchLabels"][KIND_LABEL], "blue");
    }

    #[test]
    fn replica_config_names_its_source() {
        let store = DataStore {
            name: "orders-db".to_string(),
            engine: "postgres".to_string(),
            role: DataStoreRole::ReadReplica {
                source: "shop-green/orders-db".to_string(),
            },
        };
        let doc = parse(&data_store_config(&store, "shop-blue", EnvironmentKind::Blue).unwrap());
        assert_eq!(doc["metadata"]["name"], "orders-db-datastore");
        assert_eq!(doc["data"]["role"], "read-replica");
        assert_eq!(doc["data"]["read_only"], "true");
        assert_eq!(doc["data"]["replicate_from"], "shop-green/orders-db");
    }
}
