//! `xcm logout`: clear the saved login state.

use clap::Args;
use tracing::debug;

use crate::config::{self, ApiConfig};
use crate::Result;

/// Log out, removing the credentials from the configuration file
#[derive(Args, Debug)]
pub struct LogoutArgs {}

pub async fn run(_args: LogoutArgs) -> Result<()> {
    let path = config::config_path()?;
    let mut cfg = ApiConfig::load_from(&path)?;
    cfg.disarm();
    cfg.save_to(&path)?;
    debug!(path = %path.display(), "cleared login state");
    println!("Logout successful");
    Ok(())
}
