// plugsync/src/cli.rs
//! Defines the command-line argument structure using clap.
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use plugsync_common::Config;
use plugsync_core::CancelToken;

pub mod daemon;
pub mod init;
pub mod prune;
pub mod reset;
pub mod restore;
pub mod run;
pub mod startup;
pub mod status;

use crate::cli::daemon::Daemon;
pub use crate::cli::init::InitArgs;
use crate::cli::prune::Prune;
use crate::cli::reset::Reset;
use crate::cli::restore::Restore;
use crate::cli::run::RunArgs;
use crate::cli::startup::Startup;
use crate::cli::status::Status;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "plugsync", bin_name = "plugsync")]
#[command(propagate_version = true)]
pub struct CliArgs {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of $PLUGSYNC_CONFIG or the default location.
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a starter config, or create the directories of an existing one
    Init(InitArgs),
    /// Run one update cycle
    Run(RunArgs),
    /// Run update cycles forever, every `check_interval`
    Daemon(Daemon),
    /// Run a forced cycle, then make sure the server is up
    Startup(Startup),
    /// Apply the backup retention policy
    Prune(Prune),
    /// Show what the ledger records for each configured artifact
    Status(Status),
    /// Forget the ledger record of one artifact
    Reset(Reset),
    /// Put the newest backup of one artifact back in place
    Restore(Restore),
}

impl Command {
    pub async fn run(&self, config: &Config, cancel: CancelToken) -> anyhow::Result<()> {
        match self {
            Self::Init(command) => command.prepare(config),
            Self::Run(command) => command.run(config, cancel).await,
            Self::Daemon(command) => command.run(config, cancel).await,
            Self::Startup(command) => command.run(config, cancel).await,
            Self::Prune(command) => command.run(config),
            Self::Status(command) => command.run(config),
            Self::Reset(command) => command.run(config),
            Self::Restore(command) => command.run(config).await,
        }
    }

    /// Commands that stop between artifacts on Ctrl-C or SIGTERM.
    pub fn wants_signals(&self) -> bool {
        matches!(self, Self::Run(_) | Self::Daemon(_) | Self::Startup(_))
    }
}
