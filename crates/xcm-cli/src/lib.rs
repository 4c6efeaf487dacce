//! xCM CLI library

pub mod commands;
pub mod config;
pub mod error;
pub mod rest;

pub use error::{Error, Result};

use clap::{Args, Parser, Subcommand};

/// xCM - connect clusters to a central management plane
#[derive(Parser, Debug)]
#[command(name = "xcm")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Upper bound for `--timeout`: one day
const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Flags shared by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Budget in seconds for each operation that waits on a remote
    #[arg(
        long,
        global = true,
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_SECS)
    )]
    pub timeout: u64,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in, saving the credentials to the configuration file
    Login(commands::login::LoginArgs),
    /// Log out, removing the credentials from the configuration file
    Logout(commands::logout::LogoutArgs),
    /// Deploy a control plane on a cluster and connect the cluster to xCM
    Connect(commands::connect::ConnectArgs),
    /// Connect a cluster to the control plane deployed by `connect`
    Relay(commands::relay::RelayArgs),
    /// List clusters registered with xCM
    Clusters(commands::clusters::ClustersArgs),
    /// Print the client version
    Version,
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Login(args) => commands::login::run(args).await,
            Commands::Logout(args) => commands::logout::run(args).await,
            Commands::Connect(args) => commands::connect::run(args, &self.global).await,
            Commands::Relay(args) => commands::relay::run(args, &self.global).await,
            Commands::Clusters(args) => commands::clusters::run(args).await,
            Commands::Version => commands::version::run(),
        }
    }
}
