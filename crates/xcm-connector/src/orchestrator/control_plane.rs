//! Stages that stand up the control plane on the target cluster

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Secret;
use tracing::{info, warn};

use super::{unexpected_kind, ConnectionOrchestrator};
use crate::config::ControlPlaneConfig;
use crate::credential::{BootstrapCredential, KUBECONFIG_KEY};
use crate::kube_utils::{deployment_rolled_out, load_balancer_address};
use crate::manifests::{
    ControlPlaneValues, EndpointValues, CONTROL_PLANE_MANIFESTS, ENDPOINT_MANIFESTS,
};
use crate::pki::generate_bootstrap_certificates;
use crate::resource::{ObjectKey, ResourceKind, ResourceObject};
use crate::retry::{poll, poll_immediate};
use crate::{Error, Result};

/// Name shared by the control plane Service and Deployment
pub(crate) const CONTROL_PLANE_NAME: &str = "multicluster-controlplane";

/// Secret mounted by the control plane, holding its certificates and the
/// admin kubeconfig
pub(crate) const CONFIG_SECRET_NAME: &str = "multicluster-controlplane-config";

impl ConnectionOrchestrator {
    /// Apply the namespace and service, then wait for an external address
    pub(super) async fn ensure_endpoint(
        &self,
        config: ControlPlaneConfig,
    ) -> Result<ControlPlaneConfig> {
        let values = EndpointValues {
            namespace: config.namespace().to_string(),
            service_type: config.service_type().to_string(),
        };
        let objects = self.renderer.render_all(ENDPOINT_MANIFESTS, &values)?;
        self.apply_until_available(
            self.target.resources.as_ref(),
            &objects,
            "applying control plane endpoint",
        )
        .await?;

        let key = ObjectKey::new(
            ResourceKind::Service,
            Some(config.namespace()),
            CONTROL_PLANE_NAME,
        );
        let key = &key;
        let host = poll_immediate(
            self.options.intervals.health,
            self.options.timeout,
            &self.options.cancel,
            "load balancer address",
            move || async move {
                match self.target.resources.get(key).await? {
                    Some(ResourceObject::Service(service)) => Ok(load_balancer_address(&service)),
                    Some(other) => Err(unexpected_kind(key, &other)),
                    None => Ok(None),
                }
            },
        )
        .await?;

        info!(host = %host, "control plane endpoint is reachable");
        config.with_host_name(host)
    }

    /// Deploy the control plane unless a healthy one with an admin
    /// kubeconfig is already there
    pub(super) async fn ensure_control_plane_deployed(
        &self,
        config: ControlPlaneConfig,
    ) -> Result<ControlPlaneConfig> {
        let namespace = config.namespace().to_string();

        if let Some(deployment) = self.control_plane_deployment(&namespace).await? {
            if deployment_rolled_out(&deployment) {
                match self.stored_admin_credential(&namespace).await {
                    Ok(Some(_)) => {
                        info!(namespace = %namespace, "control plane already deployed, skipping");
                        return Ok(config);
                    }
                    Ok(None) => warn!(
                        namespace = %namespace,
                        "control plane has no admin kubeconfig, redeploying"
                    ),
                    Err(Error::Credential { message }) => warn!(
                        namespace = %namespace,
                        error = %message,
                        "control plane admin kubeconfig is unreadable, redeploying"
                    ),
                    Err(e) => return Err(e),
                }
            }
        }

        let host = config.host_name()?.to_string();
        let certs = generate_bootstrap_certificates(&host)?;
        let credential = BootstrapCredential::from_certificates(&host, &certs)?;

        let values = ControlPlaneValues {
            namespace: namespace.clone(),
            image: self.options.images.control_plane.clone(),
            host_name: host.clone(),
            xcm_server: config.xcm_server().to_string(),
            service_account_key: certs.service_account_key.clone(),
            client_ca: certs.client_ca.clone(),
            client_ca_key: certs.client_ca_key.clone(),
            serving_cert: certs.serving_cert.clone(),
            serving_cert_key: certs.serving_key.clone(),
            admin_kubeconfig: credential.as_str().to_string(),
            ocm_config: ControlPlaneValues::render_ocm_config(&host, config.xcm_server()),
            config_hash: String::new(),
        }
        .with_config_hash();
        let objects = self.renderer.render_all(CONTROL_PLANE_MANIFESTS, &values)?;
        let config = config.with_certificates(certs)?;

        self.apply_until_available(
            self.target.resources.as_ref(),
            &objects,
            "applying control plane",
        )
        .await?;

        let namespace = namespace.as_str();
        poll(
            self.options.intervals.health,
            self.options.timeout,
            &self.options.cancel,
            "control plane deployment to roll out",
            move || async move {
                Ok(self
                    .control_plane_deployment(namespace)
                    .await?
                    .filter(deployment_rolled_out)
                    .map(|_| ()))
            },
        )
        .await?;

        info!(namespace = %namespace, "control plane deployment is available");
        Ok(config)
    }

    /// Build the admin credential from fresh certificates, or read it back
    /// from the config secret of an existing deployment
    pub(super) async fn extract_admin_credential(
        &self,
        config: ControlPlaneConfig,
    ) -> Result<ControlPlaneConfig> {
        let credential = match config.certificates() {
            Some(certs) => BootstrapCredential::from_certificates(config.host_name()?, certs)?,
            None => self
                .stored_admin_credential(config.namespace())
                .await?
                .ok_or_else(|| {
                    Error::credential(format!(
                        "secret {}/{} has no {} entry",
                        config.namespace(),
                        CONFIG_SECRET_NAME,
                        KUBECONFIG_KEY
                    ))
                })?,
        };

        info!(server = ?credential.server(), "admin credential ready");
        config.with_admin_credential(credential)
    }

    async fn control_plane_deployment(&self, namespace: &str) -> Result<Option<Deployment>> {
        let key = ObjectKey::new(ResourceKind::Deployment, Some(namespace), CONTROL_PLANE_NAME);
        match self.get_target(&key).await? {
            Some(ResourceObject::Deployment(deployment)) => Ok(Some(deployment)),
            Some(other) => Err(unexpected_kind(&key, &other)),
            None => Ok(None),
        }
    }

    async fn config_secret(&self, namespace: &str) -> Result<Option<Secret>> {
        let key = ObjectKey::new(ResourceKind::Secret, Some(namespace), CONFIG_SECRET_NAME);
        match self.get_target(&key).await? {
            Some(ResourceObject::Secret(secret)) => Ok(Some(secret)),
            Some(other) => Err(unexpected_kind(&key, &other)),
            None => Ok(None),
        }
    }

    async fn stored_admin_credential(&self, namespace: &str) -> Result<Option<BootstrapCredential>> {
        match self.config_secret(namespace).await? {
            Some(secret) => BootstrapCredential::from_secret(&secret),
            None => Ok(None),
        }
    }
}
