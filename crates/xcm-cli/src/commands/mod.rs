//! CLI commands

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, ValueEnum};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use xcm_connector::hub::KubeHubConnector;
use xcm_connector::kube_utils::client_from_kubeconfig_path;
use xcm_connector::{
    ClusterHandles, ClusterMetadata, Connection, ConnectionOrchestrator, OrchestratorOptions,
};

use crate::config::FileCredentialStore;
use crate::{GlobalArgs, Result};

pub mod clusters;
pub mod connect;
pub mod login;
pub mod logout;
pub mod relay;
pub mod version;

/// Output format
#[derive(Clone, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    /// Columnar table (default)
    #[default]
    Table,
    /// JSON
    Json,
}

/// Flags shared by `connect` and `relay`
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Path to the target cluster kubeconfig (default: $KUBECONFIG or ~/.kube/config)
    #[arg(long)]
    pub kubeconfig: Option<String>,

    /// Product type recorded for the cluster
    #[arg(long, default_value = "EKS")]
    pub product: String,

    /// Cloud platform recorded for the cluster
    #[arg(long, default_value = "AWS")]
    pub platform: String,

    /// Region recorded for the cluster
    #[arg(long, default_value = "us-west-1")]
    pub region: String,
}

impl TargetArgs {
    fn metadata(&self) -> ClusterMetadata {
        ClusterMetadata {
            product: self.product.clone(),
            platform: self.platform.clone(),
            region: self.region.clone(),
        }
    }

    /// Orchestrator options for this invocation
    pub fn options(&self, global: &GlobalArgs, xcm_server: &str) -> OrchestratorOptions {
        OrchestratorOptions {
            timeout: Duration::from_secs(global.timeout),
            xcm_server: xcm_server.to_string(),
            metadata: self.metadata(),
            ..Default::default()
        }
    }
}

/// Build a kube [`Client`] from `--kubeconfig`, else the kube defaults
/// (`KUBECONFIG`, `~/.kube/config`, in-cluster).
pub async fn resolve_kube_client(explicit: Option<&str>) -> Result<Client> {
    let Some(path) = explicit.filter(|p| !p.is_empty()) else {
        debug!("using default kube client configuration");
        return Ok(Client::try_default().await?);
    };
    Ok(client_from_kubeconfig_path(Path::new(path)).await?)
}

/// Token fired on Ctrl-C
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupted, cancelling");
                child.cancel();
            }
            Err(e) => debug!(error = %e, "cannot listen for Ctrl-C"),
        }
    });
    token
}

/// Wire the orchestrator to the target cluster and the on-disk credential
pub async fn build_orchestrator(
    target: &TargetArgs,
    options: OrchestratorOptions,
) -> Result<ConnectionOrchestrator> {
    let client = resolve_kube_client(target.kubeconfig.as_deref()).await?;
    let store = FileCredentialStore::default_location()?;
    debug!(path = %store.path().display(), "control plane admin config location");
    Ok(ConnectionOrchestrator::new(
        ClusterHandles::from_client(client),
        Arc::new(KubeHubConnector),
        Arc::new(store),
        options,
    )?)
}

/// Final line printed after a successful run
pub fn connected_message(connection: &Connection) -> String {
    format!(
        "The cluster is connected to xCM with id {}",
        connection.identity.id()
    )
}

/// Render rows as a column-aligned table with headers.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let num_cols = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(num_cols) {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let format_line = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:<width$}", cell, width = w)
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = format_line(headers.to_vec());
    out.push('\n');
    for row in rows {
        out.push_str(&format_line(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn table_columns_align_to_widest_cell() {
        let rows = vec![
            vec!["a-long-id".to_string(), "Ready".to_string()],
            vec!["b".to_string(), "unknown".to_string()],
        ];
        let table = render_table(&["ID", "STATUS"], &rows);
        assert_eq!(
            table,
            "ID         STATUS\na-long-id  Ready\nb          unknown\n"
        );
    }

    #[test]
    fn empty_table_prints_headers() {
        assert_eq!(render_table(&["ID", "STATUS"], &[]), "ID  STATUS\n");
    }

    #[test]
    fn options_carry_timeout_and_metadata() {
        let target = TargetArgs {
            kubeconfig: None,
            product: "GKE".to_string(),
            platform: "GCP".to_string(),
            region: "europe-west1".to_string(),
        };
        let options = target.options(&GlobalArgs { timeout: 90 }, "https://api.example.com");
        assert_eq!(options.timeout, Duration::from_secs(90));
        assert_eq!(options.xcm_server, "https://api.example.com");
        assert_eq!(options.metadata.platform, "GCP");
        assert_eq!(options.control_plane_namespace, "multicluster-controlplane");
    }

    #[test]
    fn kube_errors_keep_their_own_variant() {
        let err: Error = kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "forbidden".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        })
        .into();
        assert!(matches!(err, Error::Kube(_)));
        assert!(err.to_string().starts_with("kubernetes error: "));
    }
}
