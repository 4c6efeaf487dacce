use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A cluster-scoped fact a spoke publishes about itself.
///
/// The klusterlet syncs claims into the hub's ManagedCluster status, which
/// is how identity and metadata written here become queryable centrally.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cluster.open-cluster-management.io",
    version = "v1alpha1",
    kind = "ClusterClaim",
    printcolumn = r#"{"name":"Value","type":"string","jsonPath":".spec.value"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterClaimSpec {
    /// Claim value
    #[serde(default)]
    pub value: String,
}
