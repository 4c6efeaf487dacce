//! Identity and descriptive metadata of a registered cluster

use std::collections::BTreeMap;
use std::fmt;

use uuid::Uuid;

use crate::{Error, Result};

/// Claim holding the cluster's stable identifier
pub const ID_CLAIM: &str = "xcmid.open-cluster-management.io";

/// Claim and label carrying the product (EKS, OpenShift, ...)
pub const PRODUCT_CLAIM: &str = "product.open-cluster-management.io";

/// Claim and label carrying the infrastructure platform
pub const PLATFORM_CLAIM: &str = "platform.open-cluster-management.io";

/// Claim and label carrying the region
pub const REGION_CLAIM: &str = "region.open-cluster-management.io";

const NAME_PREFIX: &str = "cluster-";

/// Generated once per cluster, then read back from the cluster's own claim
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterIdentity {
    id: Uuid,
}

impl ClusterIdentity {
    /// Fresh random identity
    pub fn generate() -> Self {
        Self { id: Uuid::new_v4() }
    }

    /// Parse a previously recorded identifier
    pub fn parse(id: &str) -> Result<Self> {
        Uuid::parse_str(id.trim())
            .map(|id| Self { id })
            .map_err(|e| Error::validation(format!("invalid cluster id '{}': {}", id, e)))
    }

    /// Canonical hyphenated form of the identifier
    pub fn id(&self) -> String {
        self.id.to_string()
    }

    /// Name of the ManagedCluster record on the control plane
    pub fn cluster_name(&self) -> String {
        format!("{}{}", NAME_PREFIX, self.id)
    }
}

impl fmt::Display for ClusterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Descriptive facts attached to a cluster record for later querying
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterMetadata {
    /// Kubernetes distribution, e.g. "EKS"
    pub product: String,
    /// Cloud platform, e.g. "AWS"
    pub platform: String,
    /// Cloud region
    pub region: String,
}

impl Default for ClusterMetadata {
    fn default() -> Self {
        Self {
            product: "EKS".to_string(),
            platform: "AWS".to_string(),
            region: "us-west-1".to_string(),
        }
    }
}

impl ClusterMetadata {
    /// `(claim name, value)` pairs, in write order
    pub fn claims(&self) -> [(&'static str, &str); 3] {
        [
            (PRODUCT_CLAIM, self.product.as_str()),
            (PLATFORM_CLAIM, self.platform.as_str()),
            (REGION_CLAIM, self.region.as_str()),
        ]
    }

    /// Same facts as labels for the ManagedCluster record
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.claims()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}
