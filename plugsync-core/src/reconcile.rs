// plugsync-core/src/reconcile.rs
//! One pass over every configured identity.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use plugsync_common::config::Config;
use plugsync_common::error::{PlugsyncError, Result};
use plugsync_common::model::ArtifactSpec;
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::fetch::{ArtifactFetcher, CandidateSource};
use crate::install::{InstallOutcome, Preparation, SafeSwapInstaller};
use crate::ledger::VersionLedger;
use crate::server::{announce_restart, ServerControl};

/// Shared stop request. A cycle only looks at it between identities, so an
/// attempt that has started always runs to `Idle`.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<CancelState>);

#[derive(Debug, Default)]
struct CancelState {
    requested: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.requested.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.requested.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let notified = self.0.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Sleeps for `duration` unless cancelled first. Returns false when
    /// woken by a cancel.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = sleep(duration) => !self.is_cancelled(),
            _ = self.cancelled() => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub identity: String,
    pub from: Option<String>,
    pub to: String,
}

#[derive(Debug, Default)]
pub struct CycleReport {
    pub updated: Vec<Update>,
    /// Ledger brought in line with a live file that was already current.
    pub reconciled: Vec<String>,
    pub up_to_date: Vec<String>,
    /// The registry offered nothing installable.
    pub unavailable: Vec<String>,
    pub failed: Vec<(String, PlugsyncError)>,
    pub cancelled: bool,
    pub server_stopped: bool,
    pub server_started: bool,
}

impl CycleReport {
    pub fn has_fatal(&self) -> bool {
        self.failed.iter().any(|(_, e)| e.is_fatal())
    }

    fn fail(&mut self, identity: &str, err: PlugsyncError) {
        if err.is_fatal() {
            error!("{}: {} (operator action required)", identity, err);
        } else {
            warn!("{}: {}", identity, err);
        }
        self.failed.push((identity.to_string(), err));
    }
}

pub struct Reconciler<'a, S, F, C> {
    config: &'a Config,
    source: &'a S,
    installer: SafeSwapInstaller<'a, F>,
    server: &'a C,
    cancel: CancelToken,
}

impl<'a, S, F, C> Reconciler<'a, S, F, C>
where
    S: CandidateSource,
    F: ArtifactFetcher,
    C: ServerControl,
{
    pub fn new(
        config: &'a Config,
        source: &'a S,
        fetcher: &'a F,
        server: &'a C,
        cancel: CancelToken,
    ) -> Self {
        Self {
            config,
            source,
            installer: SafeSwapInstaller::new(config, fetcher),
            server,
            cancel,
        }
    }

    pub fn installer(&self) -> &SafeSwapInstaller<'a, F> {
        &self.installer
    }

    /// Downloads and validates everything first, then stops the server if a
    /// live file has to change, swaps, and starts it again.
    pub async fn run_cycle(&self, ledger: &mut VersionLedger) -> CycleReport {
        let mut report = CycleReport::default();
        let mut pending: Vec<(&ArtifactSpec, Preparation)> = Vec::new();

        for (index, spec) in self.config.enabled_artifacts().enumerate() {
            if self.cancel.is_cancelled() {
                info!("Cycle cancelled before {}", spec.name);
                report.cancelled = true;
                return report;
            }
            if index > 0 && !self.config.http.rate_limit_delay.is_zero() {
                sleep(self.config.http.rate_limit_delay).await;
            }

            let candidate = match self.source.latest(spec).await {
                Ok(Some(candidate)) => candidate,
                Ok(None) => {
                    report.unavailable.push(spec.name.clone());
                    continue;
                }
                Err(e) => {
                    report.fail(&spec.name, e);
                    continue;
                }
            };
            match self.installer.prepare(ledger, spec, &candidate).await {
                Ok(Preparation::UpToDate) => report.up_to_date.push(spec.name.clone()),
                Ok(preparation) => pending.push((spec, preparation)),
                Err(e) => report.fail(&spec.name, e),
            }
        }

        let swaps = pending.iter().filter(|(_, p)| p.needs_swap()).count();
        let mut stopped = false;
        if swaps > 0 {
            match self.quiesce(swaps).await {
                Ok(was_running) => {
                    stopped = was_running;
                    report.server_stopped = was_running;
                }
                Err(e) => {
                    error!("{}; leaving live files untouched this cycle", e);
                    pending.retain(|(spec, preparation)| {
                        if preparation.needs_swap() {
                            report.failed.push((
                                spec.name.clone(),
                                PlugsyncError::Swap(format!("{}: server did not stop", spec.name)),
                            ));
                            false
                        } else {
                            true
                        }
                    });
                }
            }
        }

        for (spec, preparation) in pending {
            if self.cancel.is_cancelled() {
                info!("Cycle cancelled before installing {}", spec.name);
                report.cancelled = true;
                break;
            }
            match self.installer.finish(ledger, spec, preparation) {
                Ok(InstallOutcome::Installed {
                    previous_version,
                    version,
                    ..
                }) => report.updated.push(Update {
                    identity: spec.name.clone(),
                    from: previous_version,
                    to: version,
                }),
                Ok(InstallOutcome::Reconciled { .. }) => report.reconciled.push(spec.name.clone()),
                Ok(InstallOutcome::UpToDate) => report.up_to_date.push(spec.name.clone()),
                Err(e) => report.fail(&spec.name, e),
            }
        }

        if stopped {
            if self.server.start().await {
                report.server_started = true;
            } else {
                error!("Server did not come back after the update");
            }
        }

        info!(
            "Cycle done: {} updated, {} current, {} failed",
            report.updated.len(),
            report.up_to_date.len() + report.reconciled.len(),
            report.failed.len()
        );
        report
    }

    /// Puts the newest backup of `identity` back in place, stopping and
    /// restarting a running server around the swap. `Ok(None)` when there
    /// is no backup to restore.
    pub async fn restore(
        &self,
        ledger: &mut VersionLedger,
        identity: &str,
    ) -> Result<Option<InstallOutcome>> {
        let spec = self.config.artifact(identity).ok_or_else(|| {
            PlugsyncError::Config(format!("no [[artifact]] named '{identity}'"))
        })?;
        let Some(preparation) = self.installer.prepare_restore(ledger, spec)? else {
            return Ok(None);
        };
        let stopped = if preparation.needs_swap() {
            self.quiesce(1).await?
        } else {
            false
        };
        let outcome = self.installer.finish(ledger, spec, preparation);
        if stopped && !self.server.start().await {
            error!("Server did not come back after the restore");
        }
        outcome.map(Some)
    }

    /// Stops a managed, running server before live files change. `Ok(true)`
    /// means it went down and has to be started again.
    async fn quiesce(&self, swaps: usize) -> Result<bool> {
        if !self.manages_server() || !self.server.is_running().await {
            return Ok(false);
        }
        info!("{} update(s) pending, stopping the server", swaps);
        announce_restart(self.server, self.config.server.announce_minutes).await;
        if self.server.stop(self.config.server.stop_timeout).await {
            Ok(true)
        } else {
            Err(PlugsyncError::Swap("server did not stop".to_string()))
        }
    }

    /// Starts the server if it is managed and not running.
    pub async fn ensure_running(&self) -> bool {
        if !self.config.server.enabled || self.server.is_running().await {
            return true;
        }
        info!("Server is not running, starting it");
        self.server.start().await
    }

    fn manages_server(&self) -> bool {
        self.config.server.enabled && self.config.server.restart_on_update
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::Ordering;

    use plugsync_common::model::CandidateArtifact;

    use super::*;
    use crate::testutil::{plugin_jar, test_config, FakeFetcher, FakeServer, FakeSource};

    struct World {
        _dir: tempfile::TempDir,
        config: Config,
        source: FakeSource,
        fetcher: FakeFetcher,
    }

    impl World {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = test_config(dir.path());
            fs::create_dir_all(config.plugins_dir()).unwrap();
            Self {
                _dir: dir,
                config,
                source: FakeSource::default(),
                fetcher: FakeFetcher::default(),
            }
        }

        fn publish(&self, identity: &str, version: &str) {
            let url = format!("https://cdn.example.org/{identity}-{version}.jar");
            self.fetcher
                .serve(&url, plugin_jar(identity, version, 2048));
            self.source.offer(
                identity,
                CandidateArtifact::new(url, format!("{identity}-{version}.jar"))
                    .with_version(version),
            );
        }

        fn ledger(&self) -> VersionLedger {
            VersionLedger::load(&self.config.ledger_path()).unwrap()
        }
    }

    #[tokio::test]
    async fn failures_are_isolated_per_identity() {
        let world = World::new();
        world.publish("X", "1");
        world.source.fail("Y", "HTTP 503");
        world.publish("Z", "3");
        let server = FakeServer::default();
        let reconciler = Reconciler::new(
            &world.config,
            &world.source,
            &world.fetcher,
            &server,
            CancelToken::new(),
        );
        let mut ledger = world.ledger();

        let report = reconciler.run_cycle(&mut ledger).await;

        let updated: Vec<&str> = report.updated.iter().map(|u| u.identity.as_str()).collect();
        assert_eq!(updated, vec!["X", "Z"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "Y");
        assert_eq!(report.unavailable, vec!["purpur"]);
        assert!(ledger.get("Y").is_none());
        assert_eq!(world.ledger().get("Z").unwrap().installed_version, "3");
    }

    #[tokio::test]
    async fn server_restarts_only_when_files_change() {
        let world = World::new();
        world.publish("X", "1");
        let server = FakeServer::running();
        let reconciler = Reconciler::new(
            &world.config,
            &world.source,
            &world.fetcher,
            &server,
            CancelToken::new(),
        );
        let mut ledger = world.ledger();

        let first = reconciler.run_cycle(&mut ledger).await;
        assert!(first.server_stopped && first.server_started);
        assert_eq!(server.stops.load(Ordering::SeqCst), 1);
        assert_eq!(server.starts.load(Ordering::SeqCst), 1);

        let second = reconciler.run_cycle(&mut ledger).await;
        assert_eq!(second.up_to_date, vec!["X"]);
        assert!(!second.server_stopped);
        assert_eq!(server.stops.load(Ordering::SeqCst), 1);
        assert!(server.running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn restore_swaps_back_around_one_restart() {
        let world = World::new();
        let server = FakeServer::running();
        let reconciler = Reconciler::new(
            &world.config,
            &world.source,
            &world.fetcher,
            &server,
            CancelToken::new(),
        );
        let mut ledger = world.ledger();
        world.publish("X", "1");
        reconciler.run_cycle(&mut ledger).await;
        world.publish("X", "2");
        reconciler.run_cycle(&mut ledger).await;
        assert_eq!(server.stops.load(Ordering::SeqCst), 2);

        let outcome = reconciler.restore(&mut ledger, "X").await.unwrap();

        assert!(matches!(
            outcome,
            Some(InstallOutcome::Installed { ref filename, .. }) if filename == "X-1.jar"
        ));
        assert_eq!(world.ledger().get("X").unwrap().installed_filename, "X-1.jar");
        assert!(world.config.plugins_dir().join("X-1.jar").is_file());
        assert!(!world.config.plugins_dir().join("X-2.jar").exists());
        assert_eq!(server.stops.load(Ordering::SeqCst), 3);
        assert_eq!(server.starts.load(Ordering::SeqCst), 3);
        assert!(server.running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn restore_needs_a_configured_identity_and_a_backup() {
        let world = World::new();
        let server = FakeServer::running();
        let reconciler = Reconciler::new(
            &world.config,
            &world.source,
            &world.fetcher,
            &server,
            CancelToken::new(),
        );
        let mut ledger = world.ledger();

        let err = reconciler.restore(&mut ledger, "Nope").await.unwrap_err();
        assert!(matches!(err, PlugsyncError::Config(_)));
        assert!(reconciler.restore(&mut ledger, "X").await.unwrap().is_none());
        assert_eq!(server.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stopped_server_is_left_stopped() {
        let world = World::new();
        world.publish("X", "1");
        let server = FakeServer::default();
        let reconciler = Reconciler::new(
            &world.config,
            &world.source,
            &world.fetcher,
            &server,
            CancelToken::new(),
        );
        let report = reconciler.run_cycle(&mut world.ledger()).await;
        assert_eq!(report.updated.len(), 1);
        assert_eq!(server.stops.load(Ordering::SeqCst), 0);
        assert_eq!(server.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refusing_server_blocks_swaps() {
        let world = World::new();
        world.publish("X", "1");
        let server = FakeServer::running();
        server.refuse_stop.store(true, Ordering::SeqCst);
        let reconciler = Reconciler::new(
            &world.config,
            &world.source,
            &world.fetcher,
            &server,
            CancelToken::new(),
        );
        let mut ledger = world.ledger();

        let report = reconciler.run_cycle(&mut ledger).await;

        assert!(report.updated.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert!(ledger.is_empty());
        assert!(fs::read_dir(world.config.plugins_dir()).unwrap().next().is_none());
        assert!(fs::read_dir(world.config.staging_dir()).unwrap().next().is_none());
        assert_eq!(server.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_cycle_touches_nothing() {
        let world = World::new();
        world.publish("X", "1");
        let server = FakeServer::running();
        let cancel = CancelToken::new();
        cancel.cancel();
        let reconciler = Reconciler::new(
            &world.config,
            &world.source,
            &world.fetcher,
            &server,
            cancel,
        );
        let mut ledger = world.ledger();

        let report = reconciler.run_cycle(&mut ledger).await;
        assert!(report.cancelled);
        assert_eq!(world.fetcher.fetch_count(), 0);
        assert!(ledger.is_empty());
        assert_eq!(server.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_a_sleep() {
        let token = CancelToken::new();
        assert!(token.sleep(Duration::from_secs(5)).await);

        let waker = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            waker.cancel();
        });
        assert!(!token.sleep(Duration::from_secs(3600)).await);
        assert!(token.is_cancelled());
        // Already cancelled: returns at once.
        token.cancelled().await;
    }

    #[tokio::test]
    async fn ensure_running_starts_a_stopped_server() {
        let world = World::new();
        let server = FakeServer::default();
        let reconciler = Reconciler::new(
            &world.config,
            &world.source,
            &world.fetcher,
            &server,
            CancelToken::new(),
        );
        assert!(reconciler.ensure_running().await);
        assert!(reconciler.ensure_running().await);
        assert_eq!(server.starts.load(Ordering::SeqCst), 1);
    }
}
