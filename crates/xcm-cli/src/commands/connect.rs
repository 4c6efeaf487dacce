//! `xcm connect`: deploy a control plane on the target cluster and register
//! the cluster with it.
//!
//! The control plane is handed the xCM server URL from `xcm login`, so a prior
//! login is required. The admin kubeconfig is saved for later `xcm relay`
//! runs.

use clap::Args;
use tracing::info;

use crate::commands::{build_orchestrator, cancel_on_ctrl_c, connected_message, TargetArgs};
use crate::config::ApiConfig;
use crate::{GlobalArgs, Result};

/// Deploy a control plane on a cluster and connect the cluster to xCM
#[derive(Args, Debug)]
pub struct ConnectArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

pub async fn run(args: ConnectArgs, global: &GlobalArgs) -> Result<()> {
    let api = ApiConfig::load()?;
    api.require_login()?;

    let mut options = args.target.options(global, &api.url);
    options.cancel = cancel_on_ctrl_c();
    let orchestrator = build_orchestrator(&args.target, options).await?;

    info!(xcm_server = %api.url, "connecting cluster");
    let connection = orchestrator.connect().await?;
    println!("{}", connected_message(&connection));
    Ok(())
}
