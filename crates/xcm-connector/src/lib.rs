//! Connect Kubernetes clusters to xCM through a hosted OCM control plane

#![deny(missing_docs)]

use std::time::Duration;

pub mod config;
pub mod crd;
pub mod credential;
pub mod error;
pub mod hub;
pub mod identity;
pub mod kube_utils;
pub mod manifests;
pub mod orchestrator;
pub mod pki;
pub mod reconcile;
pub mod resource;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{OrchestratorOptions, PollIntervals};
pub use credential::{BootstrapCredential, CredentialStore};
pub use error::{Error, Result};
pub use identity::{ClusterIdentity, ClusterMetadata};
pub use orchestrator::{ClusterHandles, Connection, ConnectionOrchestrator, Stage};

/// Namespace the control plane is deployed into
pub const CONTROL_PLANE_NAMESPACE: &str = "multicluster-controlplane";

/// Namespace the registration and work agents run in on the spoke
pub const AGENT_NAMESPACE: &str = "multicluster-controlplane-agent";

/// Namespace of the registration operator on the spoke
pub const OPERATOR_NAMESPACE: &str = "open-cluster-management";

/// Budget for each polled operation unless the caller overrides it
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
