//! Run options and the per-run control plane configuration

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::credential::BootstrapCredential;
use crate::identity::ClusterMetadata;
use crate::pki::BootstrapCertificates;
use crate::{
    Error, Result, AGENT_NAMESPACE, CONTROL_PLANE_NAMESPACE, DEFAULT_TIMEOUT, OPERATOR_NAMESPACE,
};

/// Fixed polling intervals per call site, sized to how fast each remote
/// converges
#[derive(Clone, Debug)]
pub struct PollIntervals {
    /// Re-applying a manifest set while its namespace or CRD is missing
    pub apply: Duration,
    /// Load balancer address and deployment health
    pub health: Duration,
    /// ManagedCluster and ClusterClaim writes
    pub registration: Duration,
    /// Waiting for the spoke agent to report in
    pub connection: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            apply: Duration::from_secs(1),
            health: Duration::from_secs(1),
            registration: Duration::from_secs(10),
            connection: Duration::from_secs(1),
        }
    }
}

/// Container images deployed by the connector
#[derive(Clone, Debug)]
pub struct Images {
    /// Control plane server image
    pub control_plane: String,
    /// Registration operator image installed on the spoke
    pub registration_operator: String,
    /// Registration agent image
    pub registration: String,
    /// Work agent image
    pub work: String,
}

impl Default for Images {
    fn default() -> Self {
        Self {
            control_plane: "quay.io/open-cluster-management/multicluster-controlplane:latest"
                .to_string(),
            registration_operator: "quay.io/open-cluster-management/registration-operator:latest"
                .to_string(),
            registration: "quay.io/open-cluster-management/registration:latest".to_string(),
            work: "quay.io/open-cluster-management/work:latest".to_string(),
        }
    }
}

/// Knobs for one orchestration run
#[derive(Clone, Debug)]
pub struct OrchestratorOptions {
    /// Budget for each polled operation
    pub timeout: Duration,
    /// Pacing of the polling loops
    pub intervals: PollIntervals,
    /// Namespace the control plane is deployed into
    pub control_plane_namespace: String,
    /// Namespace the spoke agents run in
    pub agent_namespace: String,
    /// Namespace of the registration operator on the spoke
    pub operator_namespace: String,
    /// Service type exposing the control plane
    pub service_type: String,
    /// Management plane URL handed to the control plane
    pub xcm_server: String,
    /// Facts recorded alongside the cluster identity
    pub metadata: ClusterMetadata,
    /// Images to deploy
    pub images: Images,
    /// Fired by the caller to abort the run
    pub cancel: CancellationToken,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            intervals: PollIntervals::default(),
            control_plane_namespace: CONTROL_PLANE_NAMESPACE.to_string(),
            agent_namespace: AGENT_NAMESPACE.to_string(),
            operator_namespace: OPERATOR_NAMESPACE.to_string(),
            service_type: "LoadBalancer".to_string(),
            xcm_server: String::new(),
            metadata: ClusterMetadata::default(),
            images: Images::default(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Everything one run learns about the control plane, filled stage by stage.
///
/// Moved from stage to stage by value. A stage may fill only the fields it
/// owns; filling a field twice is an internal error.
#[derive(Clone, Debug)]
pub struct ControlPlaneConfig {
    namespace: String,
    service_type: String,
    xcm_server: String,
    host_name: Option<String>,
    certificates: Option<BootstrapCertificates>,
    admin_credential: Option<BootstrapCredential>,
}

fn set_once<T>(slot: &mut Option<T>, value: T, field: &str) -> Result<()> {
    if slot.is_some() {
        return Err(Error::internal_with_context(
            "control plane config",
            format!("{} is already set", field),
        ));
    }
    *slot = Some(value);
    Ok(())
}

fn require<'a, T>(slot: &'a Option<T>, field: &str) -> Result<&'a T> {
    slot.as_ref().ok_or_else(|| {
        Error::internal_with_context("control plane config", format!("{} is not set yet", field))
    })
}

impl ControlPlaneConfig {
    /// Empty config seeded from the run options
    pub fn new(options: &OrchestratorOptions) -> Self {
        Self {
            namespace: options.control_plane_namespace.clone(),
            service_type: options.service_type.clone(),
            xcm_server: options.xcm_server.clone(),
            host_name: None,
            certificates: None,
            admin_credential: None,
        }
    }

    /// Namespace the control plane runs in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Service type exposing the control plane
    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    /// Management plane URL
    pub fn xcm_server(&self) -> &str {
        &self.xcm_server
    }

    /// Record the externally reachable host name
    pub fn with_host_name(mut self, host: impl Into<String>) -> Result<Self> {
        set_once(&mut self.host_name, host.into(), "host name")?;
        Ok(self)
    }

    /// Host name recorded by the endpoint stage
    pub fn host_name(&self) -> Result<&str> {
        require(&self.host_name, "host name").map(String::as_str)
    }

    /// Record the certificates generated for a fresh deployment
    pub fn with_certificates(mut self, certs: BootstrapCertificates) -> Result<Self> {
        set_once(&mut self.certificates, certs, "certificates")?;
        Ok(self)
    }

    /// Certificates generated in this run, if any
    pub fn certificates(&self) -> Option<&BootstrapCertificates> {
        self.certificates.as_ref()
    }

    /// Record the admin credential read back from the control plane
    pub fn with_admin_credential(mut self, credential: BootstrapCredential) -> Result<Self> {
        set_once(&mut self.admin_credential, credential, "admin credential")?;
        Ok(self)
    }

    /// Admin credential recorded by the credential stage
    pub fn admin_credential(&self) -> Result<&BootstrapCredential> {
        require(&self.admin_credential, "admin credential")
    }

    /// Whether the admin credential has been recorded
    pub fn has_admin_credential(&self) -> bool {
        self.admin_credential.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_fill_once() {
        let config = ControlPlaneConfig::new(&OrchestratorOptions::default())
            .with_host_name("a.example.com")
            .unwrap();
        assert_eq!(config.host_name().unwrap(), "a.example.com");

        let err = config.with_host_name("b.example.com").unwrap_err();
        assert!(err.to_string().contains("host name is already set"));
    }

    #[test]
    fn reading_unset_field_is_internal_error() {
        let config = ControlPlaneConfig::new(&OrchestratorOptions::default());
        assert!(matches!(config.host_name(), Err(Error::Internal { .. })));
        assert!(config.admin_credential().is_err());
        assert!(!config.has_admin_credential());
    }

    #[test]
    fn defaults() {
        let options = OrchestratorOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert_eq!(options.intervals.apply, Duration::from_secs(1));
        assert_eq!(options.intervals.registration, Duration::from_secs(10));
        assert_eq!(options.control_plane_namespace, "multicluster-controlplane");
        assert_eq!(options.service_type, "LoadBalancer");

        let config = ControlPlaneConfig::new(&options);
        assert_eq!(config.namespace(), "multicluster-controlplane");
    }
}
