//! Custom resource types of the open-cluster-management APIs the connector
//! talks to
//!
//! Only the fields the bootstrap flow reads or writes are modelled. Unknown
//! fields written by the remote agents are preserved on the update path
//! because updates always start from the fetched object.

mod cluster_claim;
mod klusterlet;
mod managed_cluster;

pub use cluster_claim::{ClusterClaim, ClusterClaimSpec};
pub use klusterlet::{Klusterlet, KlusterletSpec, RegistrationConfiguration};
pub use managed_cluster::{
    ClusterCondition, ManagedCluster, ManagedClusterClaim, ManagedClusterSpec,
    ManagedClusterStatus, CONDITION_AVAILABLE, CONDITION_CONNECTED,
};

/// Condition status value meaning the condition holds
pub const STATUS_TRUE: &str = "True";
