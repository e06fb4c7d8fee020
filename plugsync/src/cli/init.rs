// plugsync/src/cli/init.rs
use std::fs;
use std::path::Path;

use anyhow::Context;
use clap::Args;
use colored::Colorize;
use plugsync_aio::fs::create_dir_all;
use plugsync_common::Config;
use plugsync_core::VersionLedger;
use tracing::{debug, info};

const TEMPLATE: &str = r#"# plugsync configuration
server_dir = "/srv/minecraft"
minecraft_version = "1.21.1"
check_interval = "10h"

[server]
screen_name = "minecraft"
jar = "server.jar"
announce_minutes = 5

[retention]
keep = 5
max_age = "7days"

[[artifact]]
name = "purpur"
kind = "server"
source = { type = "purpur" }

[[artifact]]
name = "LuckPerms"
file_pattern = "LuckPerms-*.jar"
source = { type = "modrinth", project_id = "Vebnzrzj" }

[[artifact]]
name = "PlaceholderAPI"
file_pattern = "PlaceholderAPI*.jar"
source = { type = "spigot", resource_id = "6245" }

[[artifact]]
name = "Vault"
file_pattern = "Vault*.jar"
source = { type = "github", repo = "MilkBowl/Vault" }
"#;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config file with the starter template.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Writes the starter config when `path` does not hold one yet, then
    /// prepares the directories of whatever config is there.
    pub async fn run(&self, path: &Path) -> anyhow::Result<()> {
        if self.force || !path.exists() {
            if let Some(parent) = path.parent() {
                create_dir_all(parent)?;
            }
            fs::write(path, TEMPLATE)
                .with_context(|| format!("writing starter config to {}", path.display()))?;
            println!(
                "{} {}; edit server_dir and the [[artifact]] list, then run `plugsync init` again",
                "Wrote".green().bold(),
                path.display()
            );
            return Ok(());
        }
        let config = Config::load(Some(path))
            .with_context(|| format!("loading {}", path.display()))?;
        self.prepare(&config)
    }

    pub fn prepare(&self, config: &Config) -> anyhow::Result<()> {
        info!(
            "Initializing plugsync for server at {}",
            config.server_dir().display()
        );
        if !config.server_dir().is_dir() {
            anyhow::bail!(
                "server_dir {} does not exist",
                config.server_dir().display()
            );
        }
        for dir in config.managed_dirs() {
            debug!("Ensuring {}", dir.display());
            create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let ledger_path = config.ledger_path();
        if !ledger_path.exists() {
            VersionLedger::load(&ledger_path)?.persist()?;
        }
        println!(
            "{} {} artifacts configured, state in {}",
            "Ready:".green().bold(),
            config.artifacts.len(),
            config.state_dir().display()
        );
        Ok(())
    }
}
