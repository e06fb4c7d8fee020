// plugsync/src/cli/startup.rs
use anyhow::bail;
use clap::Args;
use plugsync_common::Config;
use plugsync_core::CancelToken;
use tracing::info;

use crate::cli::run::execute_cycle;

/// Meant for a boot script: update before the server comes up.
#[derive(Args, Debug)]
pub struct Startup;

impl Startup {
    pub async fn run(&self, config: &Config, cancel: CancelToken) -> anyhow::Result<()> {
        info!("Startup check");
        let report = execute_cycle(config, cancel, true).await?;
        if let Some((identity, err)) = report.failed.iter().find(|(_, e)| e.is_fatal()) {
            bail!("{identity}: {err}");
        }
        Ok(())
    }
}
