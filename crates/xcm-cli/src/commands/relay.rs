//! `xcm relay`: register a cluster with the control plane that an earlier
//! `xcm connect` deployed, using the saved admin kubeconfig.

use clap::Args;
use tracing::info;

use crate::commands::{build_orchestrator, cancel_on_ctrl_c, connected_message, TargetArgs};
use crate::{GlobalArgs, Result};

/// Connect a cluster to the control plane deployed by `connect`
#[derive(Args, Debug)]
pub struct RelayArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

pub async fn run(args: RelayArgs, global: &GlobalArgs) -> Result<()> {
    let mut options = args.target.options(global, "");
    options.cancel = cancel_on_ctrl_c();
    let orchestrator = build_orchestrator(&args.target, options).await?;

    info!("relaying cluster to existing control plane");
    let connection = orchestrator.relay().await?;
    println!("{}", connected_message(&connection));
    Ok(())
}
