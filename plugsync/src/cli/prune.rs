// plugsync/src/cli/prune.rs
use std::time::SystemTime;

use clap::Args;
use colored::Colorize;
use plugsync_common::error::Result;
use plugsync_common::{ArtifactKind, Config};
use plugsync_core::{BackupStore, RetentionPolicy};

#[derive(Args, Debug)]
pub struct Prune;

impl Prune {
    pub fn run(&self, config: &Config) -> anyhow::Result<()> {
        let removed = prune_backups(config)?;
        println!(
            "{}{}",
            "==> ".bold().blue(),
            format!("Removed {removed} old backups").bold()
        );
        Ok(())
    }
}

/// Applies the retention policy to plugin and server backups. Returns how
/// many files were removed.
pub fn prune_backups(config: &Config) -> Result<usize> {
    let policy = RetentionPolicy::from(&config.retention);
    let now = SystemTime::now();
    let mut removed = 0;
    for kind in [ArtifactKind::Plugin, ArtifactKind::Server] {
        let report = BackupStore::new(config.backup_root(kind)).prune(&policy, now)?;
        removed += report.removed.len();
    }
    Ok(removed)
}
