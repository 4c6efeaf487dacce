//! Bootstrap workflows that connect a cluster to a control plane
//!
//! Two paths share the tail of the state machine:
//!
//! ```text
//! connect: EnsureEndpoint -> EnsureControlPlaneDeployed -> ExtractAdminCredential
//!          -> PersistCredential -> RegisterSpokeIdentity -> DeploySpokeAgent -> AwaitConnected
//! relay:   LoadCredential -> RegisterSpokeIdentity -> DeploySpokeAgent -> AwaitConnected
//! ```
//!
//! Stages run one after another. A failing stage aborts the run with its
//! error wrapped in [`Error::Stage`]; nothing is rolled back, and every stage
//! is safe to run again against whatever the previous attempt left behind.

mod control_plane;
mod spoke;


use std::fmt;
use std::future::Future;
use std::sync::Arc;

use kube::Client;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::{ControlPlaneConfig, OrchestratorOptions};
use crate::credential::{BootstrapCredential, CredentialStore};
use crate::hub::{ClaimClient, HubConnector, KubeClaimClient};
use crate::identity::ClusterIdentity;
use crate::manifests::{validate_catalog, KindRegistry, ManifestRenderer};
use crate::reconcile::{apply, ApplyReport, KubeResourceClient, ResourceClient};
use crate::resource::{ObjectKey, ResourceObject};
use crate::retry::{cancellable, poll_immediate};
use crate::{Error, Result};

/// Named steps of the bootstrap state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Expose the control plane and learn its host name
    EnsureEndpoint,
    /// Deploy the control plane, or redeploy it if its admin config is unusable
    EnsureControlPlaneDeployed,
    /// Read the admin kubeconfig back from the control plane
    ExtractAdminCredential,
    /// Save the admin kubeconfig for later runs
    PersistCredential,
    /// Load a saved admin kubeconfig
    LoadCredential,
    /// Record the cluster identity on the spoke
    RegisterSpokeIdentity,
    /// Install the registration operator and Klusterlet
    DeploySpokeAgent,
    /// Wait for the hub to report the spoke connected
    AwaitConnected,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::EnsureEndpoint => "ensure endpoint",
            Stage::EnsureControlPlaneDeployed => "ensure control plane deployed",
            Stage::ExtractAdminCredential => "extract admin credential",
            Stage::PersistCredential => "persist credential",
            Stage::LoadCredential => "load credential",
            Stage::RegisterSpokeIdentity => "register spoke identity",
            Stage::DeploySpokeAgent => "deploy spoke agent",
            Stage::AwaitConnected => "await connected",
        })
    }
}

/// Remote APIs of the cluster being connected
#[derive(Clone)]
pub struct ClusterHandles {
    /// Server-side apply of rendered manifests
    pub resources: Arc<dyn ResourceClient>,
    /// ClusterClaim access
    pub claims: Arc<dyn ClaimClient>,
}

impl ClusterHandles {
    /// Handles backed by one kube client
    pub fn from_client(client: Client) -> Self {
        Self {
            resources: Arc::new(KubeResourceClient::new(client.clone())),
            claims: Arc::new(KubeClaimClient::new(client)),
        }
    }
}

/// Result of a successful run
#[derive(Clone, Debug)]
pub struct Connection {
    /// Identity the cluster is registered under
    pub identity: ClusterIdentity,
    /// Name of the ManagedCluster record on the control plane
    pub cluster_name: String,
}

/// Drives one cluster through the bootstrap workflow.
///
/// The target cluster hosts the control plane on the `connect` path and is
/// always the spoke being registered.
pub struct ConnectionOrchestrator {
    target: ClusterHandles,
    hub: Arc<dyn HubConnector>,
    store: Arc<dyn CredentialStore>,
    renderer: ManifestRenderer,
    options: OrchestratorOptions,
}

impl ConnectionOrchestrator {
    /// Build an orchestrator, validating the embedded manifest catalog first
    pub fn new(
        target: ClusterHandles,
        hub: Arc<dyn HubConnector>,
        store: Arc<dyn CredentialStore>,
        options: OrchestratorOptions,
    ) -> Result<Self> {
        let renderer = ManifestRenderer::new(KindRegistry::standard());
        validate_catalog(&renderer)?;
        Ok(Self {
            target,
            hub,
            store,
            renderer,
            options,
        })
    }

    /// Options this orchestrator runs with
    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Deploy a control plane on the target cluster and register the same
    /// cluster as its first member
    pub async fn connect(&self) -> Result<Connection> {
        let started = Instant::now();
        let config = ControlPlaneConfig::new(&self.options);

        let config = self
            .run_stage(Stage::EnsureEndpoint, self.ensure_endpoint(config))
            .await?;
        let config = self
            .run_stage(
                Stage::EnsureControlPlaneDeployed,
                self.ensure_control_plane_deployed(config),
            )
            .await?;
        let config = self
            .run_stage(
                Stage::ExtractAdminCredential,
                self.extract_admin_credential(config),
            )
            .await?;

        let credential = config.admin_credential()?.clone();
        self.run_stage(Stage::PersistCredential, async {
            self.store.save_admin_credential(&credential)
        })
        .await?;

        let connection = self.attach(&credential).await?;
        info!(
            cluster = %connection.cluster_name,
            elapsed = ?started.elapsed(),
            "cluster connected"
        );
        Ok(connection)
    }

    /// Register the target cluster with a control plane deployed by an
    /// earlier `connect`
    pub async fn relay(&self) -> Result<Connection> {
        let started = Instant::now();
        let credential = self
            .run_stage(Stage::LoadCredential, async {
                self.store.load_admin_credential()
            })
            .await?;

        let connection = self.attach(&credential).await?;
        info!(
            cluster = %connection.cluster_name,
            elapsed = ?started.elapsed(),
            "cluster relayed"
        );
        Ok(connection)
    }

    async fn attach(&self, credential: &BootstrapCredential) -> Result<Connection> {
        let (hub, identity) = self
            .run_stage(
                Stage::RegisterSpokeIdentity,
                self.register_spoke_identity(credential),
            )
            .await?;
        self.run_stage(
            Stage::DeploySpokeAgent,
            self.deploy_spoke_agent(&identity, credential),
        )
        .await?;
        self.run_stage(
            Stage::AwaitConnected,
            self.await_connected(hub.as_ref(), &identity),
        )
        .await?;

        Ok(Connection {
            cluster_name: identity.cluster_name(),
            identity,
        })
    }

    async fn run_stage<T>(&self, stage: Stage, work: impl Future<Output = Result<T>>) -> Result<T> {
        if self.options.cancel.is_cancelled() {
            return Err(Error::cancelled(format!("starting {}", stage)).in_stage(stage));
        }
        info!(%stage, "starting stage");
        let started = Instant::now();
        let result = work.await.map_err(|e| e.in_stage(stage));
        debug!(%stage, elapsed = ?started.elapsed(), ok = result.is_ok(), "stage finished");
        result
    }

    /// Apply `objects`, polling while the batch fails only because
    /// something it depends on does not exist yet
    async fn apply_until_available(
        &self,
        client: &dyn ResourceClient,
        objects: &[ResourceObject],
        operation: &str,
    ) -> Result<ApplyReport> {
        poll_immediate(
            self.options.intervals.apply,
            self.options.timeout,
            &self.options.cancel,
            operation,
            move || async move {
                match apply(client, objects).await {
                    Ok(report) => Ok(Some(report)),
                    Err(e) if e.is_not_yet_available() => {
                        debug!(error = %e, "dependencies not available yet");
                        Ok(None)
                    }
                    Err(e) => Err(e.into()),
                }
            },
        )
        .await
    }

    /// Single read against the target cluster, aborted on cancellation
    async fn get_target(&self, key: &ObjectKey) -> Result<Option<ResourceObject>> {
        cancellable(
            &self.options.cancel,
            &format!("reading {}", key),
            self.target.resources.get(key),
        )
        .await
    }
}

fn unexpected_kind(key: &ObjectKey, found: &ResourceObject) -> Error {
    Error::internal_with_context(
        "orchestrator",
        format!("expected {}, found {}", key, found.describe()),
    )
}
