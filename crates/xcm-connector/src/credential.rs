//! The admin kubeconfig that bootstraps trust between spoke and control plane

use base64::{engine::general_purpose::STANDARD, Engine};
use k8s_openapi::api::core::v1::Secret;
use kube::config::Kubeconfig;

#[cfg(test)]
use mockall::automock;

use crate::pki::BootstrapCertificates;
use crate::{Error, Result};

/// Key holding the kubeconfig inside the control plane config secret
pub const KUBECONFIG_KEY: &str = "kubeconfig";

const CLUSTER_NAME: &str = "default-cluster";
const USER_NAME: &str = "default-auth";
const CONTEXT_NAME: &str = "default-context";
const CONTEXT_NAMESPACE: &str = "configuration";

/// Serialized kubeconfig: endpoint, serving CA and admin client certificate.
///
/// Produced once by the control plane stage and passed on byte for byte to
/// the spoke agent's bootstrap secret.
#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapCredential {
    yaml: String,
}

impl std::fmt::Debug for BootstrapCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapCredential")
            .field("server", &self.server())
            .finish_non_exhaustive()
    }
}

impl BootstrapCredential {
    /// Build the admin kubeconfig for a control plane served at `https://<host>`
    pub fn from_certificates(host: &str, certs: &BootstrapCertificates) -> Result<Self> {
        let doc = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Config",
            "clusters": [{
                "name": CLUSTER_NAME,
                "cluster": {
                    "server": format!("https://{}", host),
                    "certificate-authority-data": STANDARD.encode(&certs.serving_ca),
                }
            }],
            "users": [{
                "name": USER_NAME,
                "user": {
                    "client-certificate-data": STANDARD.encode(&certs.client_cert),
                    "client-key-data": STANDARD.encode(&certs.client_key),
                }
            }],
            "contexts": [{
                "name": CONTEXT_NAME,
                "context": {
                    "cluster": CLUSTER_NAME,
                    "user": USER_NAME,
                    "namespace": CONTEXT_NAMESPACE,
                }
            }],
            "current-context": CONTEXT_NAME,
        });
        let yaml = serde_yaml::to_string(&doc)
            .map_err(|e| Error::serialization(format!("failed to encode kubeconfig: {}", e)))?;
        Ok(Self { yaml })
    }

    /// Parse and validate a persisted credential
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let yaml = std::str::from_utf8(bytes)
            .map_err(|e| Error::credential(format!("not valid UTF-8: {}", e)))?
            .to_string();
        let credential = Self { yaml };
        credential.validate()?;
        Ok(credential)
    }

    /// Read the credential out of the control plane config secret, if present
    pub fn from_secret(secret: &Secret) -> Result<Option<Self>> {
        match secret.data.as_ref().and_then(|d| d.get(KUBECONFIG_KEY)) {
            Some(bytes) if !bytes.0.is_empty() => Self::from_bytes(&bytes.0).map(Some),
            _ => Ok(None),
        }
    }

    fn validate(&self) -> Result<()> {
        let kubeconfig = self.kubeconfig()?;
        if kubeconfig.current_context.as_deref().unwrap_or_default().is_empty() {
            return Err(Error::credential("kubeconfig has no current context"));
        }
        if self.server().is_none() {
            return Err(Error::credential("kubeconfig has no cluster server"));
        }
        Ok(())
    }

    /// Parsed form, for building clients
    pub fn kubeconfig(&self) -> Result<Kubeconfig> {
        Kubeconfig::from_yaml(&self.yaml)
            .map_err(|e| Error::credential(format!("invalid kubeconfig: {}", e)))
    }

    /// API server URL of the control plane
    pub fn server(&self) -> Option<String> {
        self.kubeconfig()
            .ok()?
            .clusters
            .into_iter()
            .find_map(|c| c.cluster.and_then(|c| c.server))
    }

    /// Raw kubeconfig YAML
    pub fn as_str(&self) -> &str {
        &self.yaml
    }

    /// Raw kubeconfig bytes, as persisted
    pub fn as_bytes(&self) -> &[u8] {
        self.yaml.as_bytes()
    }
}

/// Durable storage for the admin credential between invocations
#[cfg_attr(test, automock)]
pub trait CredentialStore: Send + Sync {
    /// Persist, replacing any previous credential
    fn save_admin_credential(&self, credential: &BootstrapCredential) -> Result<()>;

    /// Load the last persisted credential
    ///
    /// Missing or unparseable state is reported as [`Error::Credential`].
    fn load_admin_credential(&self) -> Result<BootstrapCredential>;
}
