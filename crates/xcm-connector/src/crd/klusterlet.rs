use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Operator-managed description of the spoke agent deployment.
///
/// The registration operator watches this object and runs the registration
/// and work agents accordingly.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "operator.open-cluster-management.io",
    version = "v1",
    kind = "Klusterlet"
)]
#[serde(rename_all = "camelCase")]
pub struct KlusterletSpec {
    /// Name the spoke registers under on the hub
    #[serde(default)]
    pub cluster_name: String,

    /// Namespace the agents run in
    #[serde(default)]
    pub namespace: String,

    /// Registration agent image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_image_pull_spec: Option<String>,

    /// Work agent image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_image_pull_spec: Option<String>,

    /// Extra registration knobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_configuration: Option<RegistrationConfiguration>,

    /// Where the agents are deployed ("Default", "Hosted", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_option: Option<serde_json::Value>,
}

/// Registration agent settings carried by the Klusterlet
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationConfiguration {
    /// Feature gates enabled on the registration agent
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feature_gates: Vec<serde_json::Value>,

    /// Lifetime requested for the agent client certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert_expiration_seconds: Option<i64>,
}
