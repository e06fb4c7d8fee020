// plugsync/src/cli/run.rs
//! `plugsync run`, plus the cycle plumbing shared with `daemon` and `startup`.
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::bail;
use clap::Args;
use colored::Colorize;
use plugsync_common::error::{PlugsyncError, Result};
use plugsync_common::Config;
use plugsync_core::{
    CancelToken, CycleReport, Reconciler, ScreenServer, ServerControl, Unmanaged, VersionLedger,
};
use plugsync_net::RegistryClient;
use tracing::{debug, info, warn};

use crate::cli::prune::prune_backups;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Check now even if the last check is younger than `check_interval`.
    #[arg(long)]
    pub force: bool,
}

impl RunArgs {
    pub async fn run(&self, config: &Config, cancel: CancelToken) -> anyhow::Result<()> {
        if !self.force && !interval_elapsed(&config.last_check_path(), config.check_interval) {
            println!(
                "{}{}",
                "==> ".bold().blue(),
                "Checked recently, nothing to do (use --force to check anyway).".bold()
            );
            return Ok(());
        }
        let report = execute_cycle(config, cancel, false).await?;
        prune_after_cycle(config, &report);
        if let Some((identity, err)) = report.failed.iter().find(|(_, e)| e.is_fatal()) {
            bail!("{identity}: {err}");
        }
        Ok(())
    }
}

/// One full cycle against the real registries and server. Errors here are
/// setup failures; per-artifact failures are inside the report.
pub async fn execute_cycle(
    config: &Config,
    cancel: CancelToken,
    ensure_running: bool,
) -> Result<CycleReport> {
    let registry = RegistryClient::new(config)?;
    let mut ledger = VersionLedger::load(&config.ledger_path())?;
    let report = if config.server.enabled {
        let server = ScreenServer::new(config);
        drive(config, &registry, &server, cancel, &mut ledger, ensure_running).await
    } else {
        drive(config, &registry, &Unmanaged, cancel, &mut ledger, ensure_running).await
    };
    if !report.cancelled {
        touch_last_check(&config.last_check_path());
    }
    print_report(&report);
    Ok(report)
}

async fn drive<C: ServerControl>(
    config: &Config,
    registry: &RegistryClient,
    server: &C,
    cancel: CancelToken,
    ledger: &mut VersionLedger,
    ensure_running: bool,
) -> CycleReport {
    let reconciler = Reconciler::new(config, registry, registry, server, cancel);
    let report = reconciler.run_cycle(ledger).await;
    if ensure_running && !report.cancelled && !reconciler.ensure_running().await {
        warn!("Server could not be started");
    }
    report
}

/// Applies the retention policy once a cycle has run to completion.
/// Returns how many backups were removed.
fn prune_after_cycle(config: &Config, report: &CycleReport) -> usize {
    if report.cancelled {
        return 0;
    }
    match prune_backups(config) {
        Ok(removed) => {
            if removed > 0 {
                info!("Pruned {} old backups", removed);
            }
            removed
        }
        Err(e) => {
            warn!("Backup pruning failed: {}", e);
            0
        }
    }
}

/// Whether the timestamp file is missing or older than `interval`.
pub fn interval_elapsed(timestamp_file: &Path, interval: Duration) -> bool {
    let modified = match fs::metadata(timestamp_file).and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(_) => {
            debug!(
                "No last-check timestamp at {}, checking now",
                timestamp_file.display()
            );
            return true;
        }
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => {
            debug!("Time since last check: {:?}", age);
            age >= interval
        }
        Err(e) => {
            warn!(
                "Last-check timestamp lies in the future ({}); checking now",
                e
            );
            true
        }
    }
}

fn touch_last_check(timestamp_file: &Path) {
    if let Some(parent) = timestamp_file.parent() {
        let _ = fs::create_dir_all(parent);
    }
    match fs::File::create(timestamp_file) {
        Ok(_) => debug!("Updated timestamp file: {}", timestamp_file.display()),
        Err(e) => warn!(
            "Failed to update timestamp file '{}': {}",
            timestamp_file.display(),
            e
        ),
    }
}

pub fn print_report(report: &CycleReport) {
    for update in &report.updated {
        println!(
            "{} {} {} -> {}",
            "Updated".green().bold(),
            update.identity.bold(),
            update.from.as_deref().unwrap_or("untracked").dimmed(),
            update.to.green()
        );
    }
    for identity in &report.reconciled {
        println!("{} {} (ledger only)", "Recorded".cyan(), identity.bold());
    }
    for identity in &report.unavailable {
        println!("{} {}: no compatible release", "Skipped".yellow(), identity);
    }
    for (identity, err) in &report.failed {
        let label = if err.is_fatal() {
            "FATAL".red().bold()
        } else {
            "Failed".red()
        };
        println!("{} {}: {}", label, identity.bold(), err);
    }
    if report.server_stopped {
        let state = if report.server_started {
            "restarted".green()
        } else {
            "left stopped".red()
        };
        println!("{} Server {}", "==>".bold().blue(), state);
    }
    if report.cancelled {
        println!("{}", "Cycle cancelled before completion.".yellow());
    }
    println!(
        "{}{}",
        "==> ".bold().blue(),
        format!(
            "{} updated, {} up to date, {} failed",
            report.updated.len(),
            report.up_to_date.len() + report.reconciled.len(),
            report.failed.len()
        )
        .bold()
    );
}

/// Errors that should end a long-running process rather than be retried.
pub fn is_fatal_setup_error(err: &PlugsyncError) -> bool {
    err.is_fatal() || matches!(err, PlugsyncError::Config(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_timestamp_means_due() {
        let dir = tempfile::tempdir().unwrap();
        let stamp = dir.path().join(".plugsync_last_check");
        assert!(interval_elapsed(&stamp, Duration::from_secs(3600)));

        touch_last_check(&stamp);
        assert!(!interval_elapsed(&stamp, Duration::from_secs(3600)));
        assert!(interval_elapsed(&stamp, Duration::ZERO));
    }

    #[test]
    fn completed_cycle_prunes_backups() {
        let dir = tempfile::tempdir().unwrap();
        let raw = format!(
            "server_dir = \"{}\"\nminecraft_version = \"1.21.1\"\n[retention]\nkeep = 1\n",
            dir.path().display()
        );
        let config = Config::from_toml_str(&raw).unwrap();
        let backups = config.plugin_backup_dir().join("X");
        fs::create_dir_all(&backups).unwrap();
        for stamp in ["20250101_000000_000001", "20250102_000000_000001", "20250103_000000_000001"] {
            fs::write(backups.join(format!("{stamp}_X.jar")), b"jar").unwrap();
        }

        let cancelled = CycleReport {
            cancelled: true,
            ..CycleReport::default()
        };
        assert_eq!(prune_after_cycle(&config, &cancelled), 0);
        assert_eq!(fs::read_dir(&backups).unwrap().count(), 3);

        assert_eq!(prune_after_cycle(&config, &CycleReport::default()), 2);
        let left: Vec<_> = fs::read_dir(&backups)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(left, vec!["20250103_000000_000001_X.jar"]);
    }
}
