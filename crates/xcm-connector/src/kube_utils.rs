//! Kubernetes helpers shared by the reconciler and the orchestrator

use std::path::Path;
use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::{Error, Result};

/// Connect timeout applied to every client the connector builds
pub const CLIENT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-request read timeout
pub const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a client from an in-memory kubeconfig document
pub async fn client_from_kubeconfig(kubeconfig: Kubeconfig) -> Result<Client> {
    let mut config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::validation(format!("invalid kubeconfig: {}", e)))?;
    config.connect_timeout = Some(CLIENT_CONNECT_TIMEOUT);
    config.read_timeout = Some(CLIENT_READ_TIMEOUT);
    Ok(Client::try_from(config)?)
}

/// Build a client from a kubeconfig file on disk
pub async fn client_from_kubeconfig_path(path: &Path) -> Result<Client> {
    let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
        Error::validation(format!("failed to read kubeconfig {}: {}", path.display(), e))
    })?;
    client_from_kubeconfig(kubeconfig).await
}

/// Compute a deterministic hash of the input string, returning a 16-char hex digest.
///
/// Truncated SHA-256, stable across toolchains, so it can be persisted in
/// annotations.
pub fn deterministic_hash(input: &str) -> String {
    use aws_lc_rs::digest;
    let hash = digest::digest(&digest::SHA256, input.as_bytes());
    hash.as_ref()[..8]
        .iter()
        .fold(String::with_capacity(16), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
}

/// True when every field set in `desired` has the same value in `existing`.
///
/// `null` in `desired` means "not specified". Arrays must match
/// element-wise with equal length. Fields the server fills in (defaults,
/// allocated ports, uids) are ignored because `desired` never sets them.
pub fn is_subset(desired: &serde_json::Value, existing: &serde_json::Value) -> bool {
    use serde_json::Value;
    match (desired, existing) {
        (Value::Null, _) => true,
        (Value::Object(d), Value::Object(e)) => d
            .iter()
            .all(|(k, v)| v.is_null() || e.get(k).is_some_and(|ev| is_subset(v, ev))),
        (Value::Array(d), Value::Array(e)) => {
            d.len() == e.len() && d.iter().zip(e).all(|(a, b)| is_subset(a, b))
        }
        (d, e) => d == e,
    }
}

fn desired_replicas(deployment: &Deployment) -> i32 {
    deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1)
}

/// Desired replicas minus available replicas; desired defaults to 1
pub fn unavailable_replicas(deployment: &Deployment) -> i32 {
    let desired = desired_replicas(deployment);
    let available = deployment
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0);
    (desired - available).max(0)
}

/// The controller has observed the latest spec and every desired replica
/// runs the current pod template and is available
pub fn deployment_rolled_out(deployment: &Deployment) -> bool {
    let status = deployment.status.as_ref();
    let generation = deployment.metadata.generation.unwrap_or_default();
    let observed = status
        .and_then(|s| s.observed_generation)
        .unwrap_or_default();
    let updated = status.and_then(|s| s.updated_replicas).unwrap_or_default();
    observed >= generation
        && updated >= desired_replicas(deployment)
        && unavailable_replicas(deployment) == 0
}

/// First externally reachable address published for a LoadBalancer service
pub fn load_balancer_address(service: &Service) -> Option<String> {
    service
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?
        .iter()
        .find_map(|ingress| {
            ingress
                .hostname
                .clone()
                .filter(|h| !h.is_empty())
                .or_else(|| ingress.ip.clone().filter(|ip| !ip.is_empty()))
        })
}
