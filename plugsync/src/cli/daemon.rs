// plugsync/src/cli/daemon.rs
use std::time::Duration;

use clap::Args;
use plugsync_common::Config;
use plugsync_core::CancelToken;
use tracing::{error, info, warn};

use crate::cli::prune::prune_backups;
use crate::cli::run::{execute_cycle, is_fatal_setup_error};

const RETRY_DELAY: Duration = Duration::from_secs(5 * 60);

#[derive(Args, Debug)]
pub struct Daemon;

impl Daemon {
    pub async fn run(&self, config: &Config, cancel: CancelToken) -> anyhow::Result<()> {
        info!(
            "Daemon started, checking every {}",
            humantime::format_duration(config.check_interval)
        );
        loop {
            let pause = match execute_cycle(config, cancel.clone(), false).await {
                Ok(report) if report.cancelled => break,
                Ok(report) => {
                    if report.has_fatal() {
                        warn!("Some artifacts need operator attention; see the errors above");
                    }
                    if let Err(e) = prune_backups(config) {
                        error!("Backup pruning failed: {}", e);
                    }
                    config.check_interval
                }
                Err(e) if is_fatal_setup_error(&e) => return Err(e.into()),
                Err(e) => {
                    error!(
                        "Update cycle failed: {}; retrying in {}",
                        e,
                        humantime::format_duration(RETRY_DELAY)
                    );
                    RETRY_DELAY
                }
            };
            if !cancel.sleep(pause).await {
                break;
            }
        }
        info!("Daemon stopped");
        Ok(())
    }
}
