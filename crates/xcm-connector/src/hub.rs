//! Cluster registration records: claims on the spoke, ManagedClusters on the hub

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::PostParams;
use kube::{Api, Client};

#[cfg(test)]
use mockall::automock;

use crate::credential::BootstrapCredential;
use crate::crd::{ClusterClaim, ManagedCluster};
use crate::kube_utils::client_from_kubeconfig;
use crate::Result;

/// ClusterClaims on the cluster being registered
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClaimClient: Send + Sync {
    /// Fetch a claim, `Ok(None)` if absent
    async fn get_claim(&self, name: &str) -> Result<Option<ClusterClaim>>;

    /// Create a claim, returning what the server stored
    async fn create_claim(&self, claim: &ClusterClaim) -> Result<ClusterClaim>;
}

/// ManagedCluster records on the control plane
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HubClient: Send + Sync {
    /// Fetch a cluster record, `Ok(None)` if absent
    async fn get_managed_cluster(&self, name: &str) -> Result<Option<ManagedCluster>>;

    /// Create a cluster record
    async fn create_managed_cluster(&self, cluster: &ManagedCluster) -> Result<ManagedCluster>;
}

/// Opens a [`HubClient`] using the admin credential
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HubConnector: Send + Sync {
    /// Build a client for the control plane the credential points at
    async fn connect(&self, credential: &BootstrapCredential) -> Result<Arc<dyn HubClient>>;
}

/// [`ClaimClient`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeClaimClient {
    api: Api<ClusterClaim>,
}

impl KubeClaimClient {
    /// Client over every ClusterClaim of the cluster
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl ClaimClient for KubeClaimClient {
    async fn get_claim(&self, name: &str) -> Result<Option<ClusterClaim>> {
        Ok(self.api.get_opt(name).await?)
    }

    async fn create_claim(&self, claim: &ClusterClaim) -> Result<ClusterClaim> {
        Ok(self.api.create(&PostParams::default(), claim).await?)
    }
}

/// [`HubClient`] backed by the Kubernetes API of the control plane
#[derive(Clone)]
pub struct KubeHubClient {
    api: Api<ManagedCluster>,
}

impl KubeHubClient {
    /// Client over every ManagedCluster of the control plane
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl HubClient for KubeHubClient {
    async fn get_managed_cluster(&self, name: &str) -> Result<Option<ManagedCluster>> {
        Ok(self.api.get_opt(name).await?)
    }

    async fn create_managed_cluster(&self, cluster: &ManagedCluster) -> Result<ManagedCluster> {
        Ok(self.api.create(&PostParams::default(), cluster).await?)
    }
}

/// Connects to the control plane through its admin kubeconfig
#[derive(Clone, Copy, Debug, Default)]
pub struct KubeHubConnector;

#[async_trait]
impl HubConnector for KubeHubConnector {
    async fn connect(&self, credential: &BootstrapCredential) -> Result<Arc<dyn HubClient>> {
        let client = client_from_kubeconfig(credential.kubeconfig()?).await?;
        Ok(Arc::new(KubeHubClient::new(client)))
    }
}
