use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::STATUS_TRUE;

/// Condition the hub sets once the spoke agent has a healthy lease
pub const CONDITION_AVAILABLE: &str = "ManagedClusterConditionAvailable";

/// Condition set once the spoke agent's outbound connection is established
pub const CONDITION_CONNECTED: &str = "ManagedClusterConditionConnected";

/// The control plane's record of a member cluster.
///
/// Example:
/// ```yaml
/// apiVersion: cluster.open-cluster-management.io/v1
/// kind: ManagedCluster
/// metadata:
///   name: cluster-5f0c9e0e-3f55-4a8e-9a8e-b2f57c3ce3d1
///   labels:
///     product.open-cluster-management.io: EKS
/// spec:
///   hubAcceptsClient: true
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cluster.open-cluster-management.io",
    version = "v1",
    kind = "ManagedCluster",
    status = "ManagedClusterStatus",
    printcolumn = r#"{"name":"Accepted","type":"boolean","jsonPath":".spec.hubAcceptsClient"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterSpec {
    /// Whether the hub accepts registration from this cluster's agent
    #[serde(default)]
    pub hub_accepts_client: bool,

    /// Lease renewal interval reported by the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_duration_seconds: Option<i32>,
}

/// Status reported by the hub about a member cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterStatus {
    /// Conditions maintained by the hub and the spoke agent
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ClusterCondition>,

    /// Claims the spoke agent synced up from its ClusterClaims
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_claims: Vec<ManagedClusterClaim>,

    /// Kubernetes version of the member
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<serde_json::Value>,
}

/// A condition entry; `status` is "True", "False" or "Unknown"
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCondition {
    /// Condition type, e.g. [`CONDITION_AVAILABLE`]
    #[serde(rename = "type")]
    pub type_: String,
    /// "True", "False" or "Unknown"
    pub status: String,
    /// Machine-readable reason for the last transition
    #[serde(default)]
    pub reason: String,
    /// Human-readable details
    #[serde(default)]
    pub message: String,
    /// RFC 3339 timestamp of the last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// A name/value claim as synced into the ManagedCluster status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ManagedClusterClaim {
    /// Claim name
    pub name: String,
    /// Claim value
    pub value: String,
}

impl ManagedCluster {
    /// True when `condition_type` is present with status "True"
    pub fn has_condition(&self, condition_type: &str) -> bool {
        self.status
            .as_ref()
            .map(|s| {
                s.conditions
                    .iter()
                    .any(|c| c.type_ == condition_type && c.status == STATUS_TRUE)
            })
            .unwrap_or(false)
    }

    /// Connected means both Available and Connected hold at the same time
    pub fn is_connected(&self) -> bool {
        self.has_condition(CONDITION_AVAILABLE) && self.has_condition(CONDITION_CONNECTED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_conditions(conds: &[(&str, &str)]) -> ManagedCluster {
        let mut mc = ManagedCluster::new("c", ManagedClusterSpec::default());
        mc.status = Some(ManagedClusterStatus {
            conditions: conds
                .iter()
                .map(|(t, s)| ClusterCondition {
                    type_: t.to_string(),
                    status: s.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        });
        mc
    }

    #[test]
    fn connected_requires_both_conditions() {
        assert!(!with_conditions(&[]).is_connected());
        assert!(!with_conditions(&[(CONDITION_AVAILABLE, "True")]).is_connected());
        assert!(!with_conditions(&[(CONDITION_CONNECTED, "True")]).is_connected());
        assert!(!with_conditions(&[
            (CONDITION_AVAILABLE, "True"),
            (CONDITION_CONNECTED, "Unknown")
        ])
        .is_connected());
        assert!(with_conditions(&[
            (CONDITION_AVAILABLE, "True"),
            (CONDITION_CONNECTED, "True")
        ])
        .is_connected());
    }

    #[test]
    fn deserializes_hub_status() {
        let json = serde_json::json!({
            "apiVersion": "cluster.open-cluster-management.io/v1",
            "kind": "ManagedCluster",
            "metadata": {"name": "cluster-1"},
            "spec": {"hubAcceptsClient": true, "leaseDurationSeconds": 60},
            "status": {
                "conditions": [{"type": CONDITION_AVAILABLE, "status": "True", "reason": "Lease"}],
                "clusterClaims": [{"name": "platform.open-cluster-management.io", "value": "AWS"}],
                "allocatable": {"cpu": "4"}
            }
        });
        let mc: ManagedCluster = serde_json::from_value(json).unwrap();
        assert!(mc.spec.hub_accepts_client);
        assert!(mc.has_condition(CONDITION_AVAILABLE));
        assert_eq!(mc.status.unwrap().cluster_claims[0].value, "AWS");
    }
}
