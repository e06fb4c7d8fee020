// plugsync/src/cli/restore.rs
use anyhow::bail;
use clap::Args;
use colored::Colorize;
use plugsync_common::Config;
use plugsync_core::{
    CancelToken, InstallOutcome, Reconciler, ScreenServer, ServerControl, Unmanaged,
    VersionLedger,
};
use plugsync_net::RegistryClient;

#[derive(Args, Debug)]
pub struct Restore {
    /// Artifact name as used in the config
    pub identity: String,
}

impl Restore {
    pub async fn run(&self, config: &Config) -> anyhow::Result<()> {
        let registry = RegistryClient::new(config)?;
        let mut ledger = VersionLedger::load(&config.ledger_path())?;
        let outcome = if config.server.enabled {
            let server = ScreenServer::new(config);
            self.restore_with(config, &registry, &server, &mut ledger).await?
        } else {
            self.restore_with(config, &registry, &Unmanaged, &mut ledger)
                .await?
        };

        match outcome {
            None => bail!("no backup of '{}' to restore", self.identity),
            Some(InstallOutcome::Installed {
                previous_version,
                filename,
                ..
            }) => println!(
                "{} {} to {} (was {})",
                "Restored".green().bold(),
                self.identity.bold(),
                filename,
                previous_version.as_deref().unwrap_or("untracked").dimmed()
            ),
            Some(_) => println!(
                "{} {} already matches its newest backup",
                "==>".bold().blue(),
                self.identity.bold()
            ),
        }
        if config
            .artifact(&self.identity)
            .is_some_and(|spec| spec.enabled)
        {
            println!(
                "{} the next cycle updates it again unless its [[artifact]] entry has enabled = false",
                "Note:".yellow()
            );
        }
        Ok(())
    }

    async fn restore_with<C: ServerControl>(
        &self,
        config: &Config,
        registry: &RegistryClient,
        server: &C,
        ledger: &mut VersionLedger,
    ) -> plugsync_common::Result<Option<InstallOutcome>> {
        let reconciler = Reconciler::new(config, registry, registry, server, CancelToken::new());
        reconciler.restore(ledger, &self.identity).await
    }
}
