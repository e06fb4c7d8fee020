// plugsync/src/cli/reset.rs
use anyhow::bail;
use clap::Args;
use colored::Colorize;
use plugsync_common::Config;
use plugsync_core::VersionLedger;

#[derive(Args, Debug)]
pub struct Reset {
    /// Artifact name as used in the config
    pub identity: String,
}

impl Reset {
    pub fn run(&self, config: &Config) -> anyhow::Result<()> {
        let mut ledger = VersionLedger::load(&config.ledger_path())?;
        if !ledger.forget(&self.identity)? {
            bail!("the ledger has no record for '{}'", self.identity);
        }
        println!(
            "{} {}; the next cycle re-installs it",
            "Forgot".yellow().bold(),
            self.identity.bold()
        );
        Ok(())
    }
}
