//! Stages that register the target cluster as a spoke of the control plane

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::ConnectionOrchestrator;
use crate::credential::BootstrapCredential;
use crate::crd::{ClusterClaim, ClusterClaimSpec, ManagedCluster, ManagedClusterSpec};
use crate::hub::HubClient;
use crate::identity::{ClusterIdentity, ID_CLAIM};
use crate::manifests::{
    SpokeValues, StaticValues, SPOKE_AGENT_MANIFESTS, SPOKE_IDENTITY_MANIFESTS,
};
use crate::retry::{cancellable, poll_immediate};
use crate::{Error, Result};

fn claim(name: &str, value: &str) -> ClusterClaim {
    ClusterClaim::new(
        name,
        ClusterClaimSpec {
            value: value.to_string(),
        },
    )
}

/// Whether a failed registration write is worth another attempt.
///
/// 404 covers a CRD that is not served yet; 409 means another writer won
/// and the next read will see its object.
fn keep_polling(error: &Error) -> bool {
    error.is_not_found() || error.is_conflict() || error.is_retryable()
}

impl ConnectionOrchestrator {
    /// Record a stable id on the spoke, create its cluster record on the
    /// control plane, and tag it with metadata
    pub(super) async fn register_spoke_identity(
        &self,
        credential: &BootstrapCredential,
    ) -> Result<(Arc<dyn HubClient>, ClusterIdentity)> {
        let objects = self
            .renderer
            .render_all(SPOKE_IDENTITY_MANIFESTS, &StaticValues::default())?;
        self.apply_until_available(
            self.target.resources.as_ref(),
            &objects,
            "installing cluster claim definition",
        )
        .await?;

        let identity = self.ensure_identity_claim().await?;

        let hub = cancellable(
            &self.options.cancel,
            "connecting to control plane",
            self.hub.connect(credential),
        )
        .await?;
        self.ensure_managed_cluster(hub.as_ref(), &identity).await?;
        self.write_metadata_claims().await?;

        Ok((hub, identity))
    }

    /// Read the id claim, creating it with a fresh id on first registration.
    ///
    /// An existing claim is reused as is, so re-running against the same
    /// cluster keeps its identity.
    async fn ensure_identity_claim(&self) -> Result<ClusterIdentity> {
        let claims = self.target.claims.as_ref();
        poll_immediate(
            self.options.intervals.registration,
            self.options.timeout,
            &self.options.cancel,
            "cluster id claim",
            move || async move {
                match claims.get_claim(ID_CLAIM).await {
                    Ok(Some(existing)) => {
                        let identity = ClusterIdentity::parse(&existing.spec.value)?;
                        debug!(cluster_id = %identity, "reusing recorded cluster id");
                        return Ok(Some(identity));
                    }
                    Ok(None) => {}
                    Err(e) if keep_polling(&e) => {
                        debug!(error = %e, "cluster id claim not readable yet");
                        return Ok(None);
                    }
                    Err(e) => return Err(e),
                }

                let identity = ClusterIdentity::generate();
                match claims.create_claim(&claim(ID_CLAIM, &identity.id())).await {
                    Ok(_) => {
                        info!(cluster_id = %identity, "recorded new cluster id");
                        Ok(Some(identity))
                    }
                    Err(e) if keep_polling(&e) => {
                        debug!(error = %e, "cluster id claim not writable yet");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            },
        )
        .await
    }

    /// Get-or-create the ManagedCluster record, accepted and labelled
    async fn ensure_managed_cluster(
        &self,
        hub: &dyn HubClient,
        identity: &ClusterIdentity,
    ) -> Result<()> {
        let name = identity.cluster_name();
        let mut desired = ManagedCluster::new(
            &name,
            ManagedClusterSpec {
                hub_accepts_client: true,
                lease_duration_seconds: None,
            },
        );
        desired.metadata.labels = Some(self.options.metadata.labels());

        let (name, desired) = (name.as_str(), &desired);
        poll_immediate(
            self.options.intervals.registration,
            self.options.timeout,
            &self.options.cancel,
            "managed cluster record",
            move || async move {
                match hub.get_managed_cluster(name).await {
                    Ok(Some(_)) => {
                        debug!(cluster = name, "managed cluster already registered");
                        return Ok(Some(()));
                    }
                    Ok(None) => {}
                    Err(e) if keep_polling(&e) => return Ok(None),
                    Err(e) => return Err(e),
                }

                match hub.create_managed_cluster(desired).await {
                    Ok(_) => {
                        info!(cluster = name, "managed cluster registered");
                        Ok(Some(()))
                    }
                    Err(e) if keep_polling(&e) => {
                        debug!(error = %e, "managed cluster not writable yet");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            },
        )
        .await
    }

    /// Write product, platform and region claims.
    ///
    /// Each claim is write-once and retried on its own. A claim that still
    /// fails is logged and skipped; only cancellation stops the run.
    async fn write_metadata_claims(&self) -> Result<()> {
        let claims = self.target.claims.as_ref();
        for (name, value) in self.options.metadata.claims() {
            let result = poll_immediate(
                self.options.intervals.registration,
                self.options.timeout,
                &self.options.cancel,
                name,
                move || async move {
                    if claims.get_claim(name).await?.is_some() {
                        return Ok(Some(()));
                    }
                    match claims.create_claim(&claim(name, value)).await {
                        Ok(_) => Ok(Some(())),
                        Err(e) if e.is_conflict() => Ok(Some(())),
                        Err(e) if keep_polling(&e) => Ok(None),
                        Err(e) => Err(e),
                    }
                },
            )
            .await;

            match result {
                Ok(()) => debug!(claim = name, value, "cluster metadata recorded"),
                Err(e @ Error::Cancelled { .. }) => return Err(e),
                Err(e) => warn!(claim = name, error = %e, "failed to record cluster metadata"),
            }
        }
        Ok(())
    }

    /// Install the registration operator and its Klusterlet on the spoke
    pub(super) async fn deploy_spoke_agent(
        &self,
        identity: &ClusterIdentity,
        credential: &BootstrapCredential,
    ) -> Result<()> {
        let images = &self.options.images;
        let values = SpokeValues {
            cluster_name: identity.cluster_name(),
            agent_namespace: self.options.agent_namespace.clone(),
            operator_namespace: self.options.operator_namespace.clone(),
            bootstrap_kubeconfig: credential.as_str().to_string(),
            operator_image: images.registration_operator.clone(),
            registration_image: images.registration.clone(),
            work_image: images.work.clone(),
        };
        let objects = self.renderer.render_all(SPOKE_AGENT_MANIFESTS, &values)?;
        let report = self
            .apply_until_available(
                self.target.resources.as_ref(),
                &objects,
                "deploying spoke agent",
            )
            .await?;

        info!(
            cluster = %values.cluster_name,
            objects = report.outcomes.len(),
            "spoke agent deployed"
        );
        Ok(())
    }

    /// Wait until the agent has reported both Available and Connected
    pub(super) async fn await_connected(
        &self,
        hub: &dyn HubClient,
        identity: &ClusterIdentity,
    ) -> Result<()> {
        let name = identity.cluster_name();
        let name = name.as_str();
        poll_immediate(
            self.options.intervals.connection,
            self.options.timeout,
            &self.options.cancel,
            "cluster to report connected",
            move || async move {
                match hub.get_managed_cluster(name).await {
                    Ok(Some(cluster)) if cluster.is_connected() => Ok(Some(())),
                    Ok(_) => Ok(None),
                    Err(e) if e.is_not_found() => Ok(None),
                    Err(e) => Err(e),
                }
            },
        )
        .await?;

        info!(cluster = name, "cluster reports connected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::api_error;

    #[test]
    fn registration_polls_through_races_and_missing_crds_only() {
        assert!(keep_polling(&api_error(404).into()));
        assert!(keep_polling(&api_error(409).into()));
        assert!(keep_polling(&api_error(503).into()));

        assert!(!keep_polling(&api_error(403).into()));
        assert!(!keep_polling(&Error::internal("claim has no spec")));
        assert!(!keep_polling(&Error::cancelled("registering")));
    }
}
