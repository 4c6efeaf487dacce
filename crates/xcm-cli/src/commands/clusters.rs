//! `xcm clusters [ID]`: query the xCM cluster inventory.

use clap::Args;

use crate::commands::{render_table, OutputFormat};
use crate::config::ApiConfig;
use crate::rest::{ClusterSummary, RestClient};
use crate::Result;

const HEADERS: [&str; 6] = ["ID", "STATUS", "TYPE", "VERSION", "PLATFORM", "REGION"];

/// List clusters registered with xCM
#[derive(Args, Debug)]
pub struct ClustersArgs {
    /// Show only this cluster
    pub id: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub output: OutputFormat,
}

pub async fn run(args: ClustersArgs) -> Result<()> {
    let client = RestClient::new(&ApiConfig::load()?)?;
    let clusters = match args.id.as_deref() {
        Some(id) => vec![client.get_cluster(id).await?],
        None => client.list_clusters().await?,
    };
    print!("{}", render(&clusters, &args.output)?);
    Ok(())
}

fn render(clusters: &[ClusterSummary], output: &OutputFormat) -> Result<String> {
    match output {
        OutputFormat::Table => {
            let rows: Vec<Vec<String>> = clusters.iter().map(ClusterSummary::row).collect();
            Ok(render_table(&HEADERS, &rows))
        }
        OutputFormat::Json => Ok(format!("{}\n", serde_json::to_string_pretty(clusters)?)),
    }
}
