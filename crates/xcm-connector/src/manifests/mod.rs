//! Embedded manifest catalog
//!
//! Manifests are build-time assets: every template the connector can apply
//! is compiled into the binary and grouped into ordered sets. Each set is
//! rendered against exactly one values type, so a template can only refer to
//! fields that type provides. [`validate_catalog`] renders every set once at
//! startup so a broken template fails the process before any remote call.

mod registry;
mod renderer;

pub use registry::{DecodeError, KindRegistry, RegistryBuilder};
pub use renderer::ManifestRenderer;

use serde::Serialize;
use tracing::debug;

use crate::kube_utils::deterministic_hash;
use crate::resource::ResourceObject;
use crate::{Error, Result};

/// One embedded template
#[derive(Clone, Copy, Debug)]
pub struct Manifest {
    /// Catalog path, used in error messages
    pub id: &'static str,
    /// Template source
    pub template: &'static str,
}

macro_rules! manifest {
    ($path:literal) => {
        Manifest {
            id: $path,
            template: include_str!(concat!("../../manifests/", $path)),
        }
    };
}

/// Namespace and externally reachable service for the control plane
pub const ENDPOINT_MANIFESTS: &[Manifest] = &[
    manifest!("control-plane/namespace.yaml"),
    manifest!("control-plane/service.yaml"),
];

/// Control plane workload, applied once the endpoint host is known.
///
/// The deployment mounts the service account and config secret, so it is
/// applied last.
pub const CONTROL_PLANE_MANIFESTS: &[Manifest] = &[
    manifest!("control-plane/serviceaccount.yaml"),
    manifest!("control-plane/clusterrolebinding.yaml"),
    manifest!("control-plane/config-secret.yaml"),
    manifest!("control-plane/deployment.yaml"),
];

/// Needed on the spoke before identity and metadata claims can be written
pub const SPOKE_IDENTITY_MANIFESTS: &[Manifest] = &[manifest!("spoke/crd-clusterclaims.yaml")];

/// Registration operator and its Klusterlet on the spoke
pub const SPOKE_AGENT_MANIFESTS: &[Manifest] = &[
    manifest!("spoke/crd-klusterlets.yaml"),
    manifest!("spoke/namespace-operator.yaml"),
    manifest!("spoke/namespace-agent.yaml"),
    manifest!("spoke/serviceaccount.yaml"),
    manifest!("spoke/clusterrole.yaml"),
    manifest!("spoke/clusterrolebinding.yaml"),
    manifest!("spoke/bootstrap-secret.yaml"),
    manifest!("spoke/operator.yaml"),
    manifest!("spoke/klusterlet.yaml"),
];

/// Values for [`ENDPOINT_MANIFESTS`]
#[derive(Clone, Debug, Serialize)]
pub struct EndpointValues {
    /// Control plane namespace
    pub namespace: String,
    /// Type of the exposing Service
    pub service_type: String,
}

/// Pod template annotation carrying [`ControlPlaneValues::config_hash`]
pub const CONFIG_HASH_ANNOTATION: &str = "xcm.open-cluster-management.io/config-hash";

/// Values for [`CONTROL_PLANE_MANIFESTS`]
#[derive(Clone, Serialize)]
pub struct ControlPlaneValues {
    /// Control plane namespace
    pub namespace: String,
    /// Control plane server image
    pub image: String,
    /// Externally reachable host name of the control plane
    pub host_name: String,
    /// Management plane URL
    pub xcm_server: String,
    /// PEM service account signing key
    pub service_account_key: String,
    /// PEM client CA certificate
    pub client_ca: String,
    /// PEM client CA key
    pub client_ca_key: String,
    /// PEM serving certificate
    pub serving_cert: String,
    /// PEM serving key
    pub serving_cert_key: String,
    /// Admin kubeconfig YAML
    pub admin_kubeconfig: String,
    /// Control plane server config file, rendered from the fields above
    pub ocm_config: String,
    /// Digest of the config secret contents, stamped on the pod template so
    /// new certificates roll the control plane pods
    pub config_hash: String,
}

impl ControlPlaneValues {
    /// Fill [`Self::config_hash`] from the values that land in the config secret
    pub fn with_config_hash(mut self) -> Self {
        let contents = [
            self.admin_kubeconfig.as_str(),
            self.service_account_key.as_str(),
            self.client_ca.as_str(),
            self.client_ca_key.as_str(),
            self.serving_cert.as_str(),
            self.serving_cert_key.as_str(),
            self.ocm_config.as_str(),
        ]
        .join("\n---\n");
        self.config_hash = deterministic_hash(&contents);
        self
    }

    /// Config file the control plane binary reads from its mounted secret
    pub fn render_ocm_config(host_name: &str, xcm_server: &str) -> String {
        format!(
            "apiserver:\n  externalHostname: {host_name}\n  port: 9443\n  caFile: /controlplane_config/client-ca.crt\n  caKeyFile: /controlplane_config/client-ca.key\n  servingCertFile: /controlplane_config/serving.crt\n  servingKeyFile: /controlplane_config/serving.key\nserviceAccountKeyFile: /controlplane_config/sa.key\nxcmServer: {xcm_server}\n"
        )
    }
}

/// Values for manifests without placeholders, such as [`SPOKE_IDENTITY_MANIFESTS`]
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct StaticValues {}

/// Values for [`SPOKE_AGENT_MANIFESTS`]
#[derive(Clone, Serialize)]
pub struct SpokeValues {
    /// Name the spoke registers under
    pub cluster_name: String,
    /// Namespace of the registration and work agents
    pub agent_namespace: String,
    /// Namespace of the registration operator
    pub operator_namespace: String,
    /// Kubeconfig YAML the agents bootstrap with
    pub bootstrap_kubeconfig: String,
    /// Registration operator image
    pub operator_image: String,
    /// Registration agent image
    pub registration_image: String,
    /// Work agent image
    pub work_image: String,
}

fn probe_endpoint() -> EndpointValues {
    EndpointValues {
        namespace: "probe".into(),
        service_type: "LoadBalancer".into(),
    }
}

fn probe_control_plane() -> ControlPlaneValues {
    ControlPlaneValues {
        namespace: "probe".into(),
        image: "probe:latest".into(),
        host_name: "probe.example.com".into(),
        xcm_server: "https://probe.example.com".into(),
        service_account_key: "k".into(),
        client_ca: "c".into(),
        client_ca_key: "k".into(),
        serving_cert: "c".into(),
        serving_cert_key: "k".into(),
        admin_kubeconfig: "apiVersion: v1\nkind: Config\n".into(),
        ocm_config: ControlPlaneValues::render_ocm_config(
            "probe.example.com",
            "https://probe.example.com",
        ),
        config_hash: String::new(),
    }
    .with_config_hash()
}

fn probe_spoke() -> SpokeValues {
    SpokeValues {
        cluster_name: "cluster-probe".into(),
        agent_namespace: "probe-agent".into(),
        operator_namespace: "probe-operator".into(),
        bootstrap_kubeconfig: "apiVersion: v1\nkind: Config\n".into(),
        operator_image: "probe:latest".into(),
        registration_image: "probe:latest".into(),
        work_image: "probe:latest".into(),
    }
}

fn validate_set<S: Serialize>(
    renderer: &ManifestRenderer,
    manifests: &[Manifest],
    values: &S,
) -> Result<usize> {
    for manifest in manifests {
        let object = renderer.render(manifest, values)?;
        if let ResourceObject::Unrecognized(_) = object {
            return Err(Error::manifest(
                manifest.id,
                format!("renders to unsupported kind: {}", object.describe()),
            ));
        }
    }
    Ok(manifests.len())
}

/// Render every embedded manifest against placeholder values.
///
/// Fails on the first template that does not parse, refers to a field its
/// set's values type does not provide, or decodes to an unsupported kind.
pub fn validate_catalog(renderer: &ManifestRenderer) -> Result<()> {
    let mut checked = 0;
    checked += validate_set(renderer, ENDPOINT_MANIFESTS, &probe_endpoint())?;
    checked += validate_set(renderer, CONTROL_PLANE_MANIFESTS, &probe_control_plane())?;
    checked += validate_set(renderer, SPOKE_IDENTITY_MANIFESTS, &StaticValues {})?;
    checked += validate_set(renderer, SPOKE_AGENT_MANIFESTS, &probe_spoke())?;
    debug!(manifests = checked, "manifest catalog validated");
    Ok(())
}
