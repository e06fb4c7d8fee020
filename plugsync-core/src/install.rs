// plugsync-core/src/install.rs
//! Replaces one live artifact with a verified download, or leaves it alone.
//!
//! Each attempt walks `Idle -> Fetched -> Validated -> BackedUp -> Installed
//! -> Committed`. Any failure returns to `Idle` with the live slot holding
//! either the old file or the new one, never a partial write or nothing,
//! except when the restore after a failed install also fails.

use std::fmt;
use std::path::{Path, PathBuf};

use glob::MatchOptions;
use plugsync_aio::checksum::{sha256_file, sha256_file_if_exists};
use plugsync_aio::fs as afs;
use plugsync_common::config::Config;
use plugsync_common::error::{PlugsyncError, Result};
use plugsync_common::model::{ArtifactKind, ArtifactSpec, CandidateArtifact};
use tracing::{debug, error, info, warn};

use crate::backup::{path_component, BackupEntry, BackupStore};
use crate::fetch::ArtifactFetcher;
use crate::ledger::VersionLedger;
use crate::quarantine::Quarantine;
use crate::validate::validate_artifact;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapState {
    Idle,
    Fetched,
    Validated,
    BackedUp,
    Installed,
    Committed,
}

impl fmt::Display for SwapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SwapState::Idle => "idle",
            SwapState::Fetched => "fetched",
            SwapState::Validated => "validated",
            SwapState::BackedUp => "backed-up",
            SwapState::Installed => "installed",
            SwapState::Committed => "committed",
        };
        f.write_str(name)
    }
}

fn enter(identity: &str, state: SwapState) {
    debug!("{}: -> {}", identity, state);
}

/// A validated download waiting in the staging directory. Dropping it
/// removes the staged file.
#[derive(Debug)]
pub struct StagedArtifact {
    identity: String,
    kind: ArtifactKind,
    candidate: CandidateArtifact,
    path: PathBuf,
    sha256: String,
    size_bytes: u64,
}

impl StagedArtifact {
    pub fn version_token(&self) -> String {
        self.candidate.version_token(&self.sha256)
    }
}

impl Drop for StagedArtifact {
    fn drop(&mut self) {
        if let Err(e) = afs::remove_file_if_exists(&self.path) {
            warn!(
                "{}: could not remove staged file {}: {}",
                self.identity,
                self.path.display(),
                e
            );
        }
    }
}

/// Result of the download half of an attempt.
#[derive(Debug)]
pub enum Preparation {
    UpToDate,
    /// The live file already holds the downloaded bytes; only the ledger
    /// has to catch up.
    LedgerOnly {
        version: String,
        hash: String,
        filename: String,
    },
    Staged(StagedArtifact),
}

impl Preparation {
    /// Whether finishing this touches a live file.
    pub fn needs_swap(&self) -> bool {
        matches!(self, Preparation::Staged(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    UpToDate,
    Installed {
        previous_version: Option<String>,
        version: String,
        filename: String,
        backup: Option<PathBuf>,
    },
    /// Nothing was swapped; the ledger was brought in line with the live file.
    Reconciled { version: String },
}

pub struct SafeSwapInstaller<'a, F> {
    config: &'a Config,
    fetcher: &'a F,
    quarantine: Quarantine,
}

impl<'a, F: ArtifactFetcher> SafeSwapInstaller<'a, F> {
    pub fn new(config: &'a Config, fetcher: &'a F) -> Self {
        Self {
            config,
            fetcher,
            quarantine: Quarantine::new(config.quarantine_dir()),
        }
    }

    pub fn backups(&self, kind: ArtifactKind) -> BackupStore {
        BackupStore::new(self.config.backup_root(kind))
    }

    /// Full attempt for one identity.
    pub async fn reconcile(
        &self,
        ledger: &mut VersionLedger,
        spec: &ArtifactSpec,
        candidate: &CandidateArtifact,
    ) -> Result<InstallOutcome> {
        let preparation = self.prepare(ledger, spec, candidate).await?;
        self.finish(ledger, spec, preparation)
    }

    /// Fetches and validates `candidate` without touching any live file.
    pub async fn prepare(
        &self,
        ledger: &VersionLedger,
        spec: &ArtifactSpec,
        candidate: &CandidateArtifact,
    ) -> Result<Preparation> {
        let identity = spec.name.as_str();
        let kind = spec.kind;
        let live_dir = self.config.live_dir(kind);
        let url = candidate.download_url.as_str();

        if ledger.is_up_to_date(identity, candidate, &live_dir) {
            info!(
                "{} is up to date ({})",
                identity,
                candidate.declared_version.as_deref().unwrap_or("hash match")
            );
            return Ok(Preparation::UpToDate);
        }
        check_filename(&candidate.filename).map_err(|reason| {
            PlugsyncError::Fetch(identity.to_string(), url.to_string(), reason)
        })?;

        let staging_dir = self.config.staging_dir();
        afs::create_dir_all(&staging_dir)?;
        let staged_path = staging_dir.join(format!(
            "{}-{}.partial",
            path_component(identity),
            candidate.filename
        ));
        if afs::remove_file_if_exists(&staged_path)? {
            debug!("Removed stale staging file {}", staged_path.display());
        }

        info!("Downloading {} from {}", identity, url);
        let downloaded = self
            .fetcher
            .fetch(url, &staged_path, self.config.limits.max_artifact_bytes)
            .await?;
        let staged = StagedArtifact {
            identity: identity.to_string(),
            kind,
            candidate: candidate.clone(),
            path: downloaded.path,
            sha256: downloaded.sha256.to_ascii_lowercase(),
            size_bytes: downloaded.size_bytes,
        };

        let floor = self.config.min_artifact_bytes(kind);
        if staged.size_bytes < floor {
            return Err(PlugsyncError::Fetch(
                identity.to_string(),
                url.to_string(),
                format!(
                    "download is only {} bytes, expected at least {floor}",
                    staged.size_bytes
                ),
            ));
        }
        if let Some(expected) = &candidate.declared_hash {
            if !expected.eq_ignore_ascii_case(&staged.sha256) {
                return Err(PlugsyncError::Fetch(
                    identity.to_string(),
                    url.to_string(),
                    format!(
                        "content hash {} does not match the published {}",
                        staged.sha256, expected
                    ),
                ));
            }
        }
        enter(identity, SwapState::Fetched);

        if candidate.declared_version.is_none()
            && ledger.matches_content(identity, &staged.sha256, &live_dir)
        {
            info!("{} is up to date (content unchanged)", identity);
            return Ok(Preparation::UpToDate);
        }

        if let Err(e) = validate_artifact(&staged.path, kind) {
            let reason = match e {
                PlugsyncError::Validation(reason) => reason,
                other => other.to_string(),
            };
            if let Err(q) = self
                .quarantine
                .isolate(identity, candidate, &staged.path, &reason)
            {
                error!("{}: quarantine failed: {}", identity, q);
            }
            return Err(PlugsyncError::Validation(format!("{identity}: {reason}")));
        }
        enter(identity, SwapState::Validated);

        let target = live_dir.join(&candidate.filename);
        let displaces_other_file = self
            .current_file(ledger, spec, &live_dir, &candidate.filename)
            .is_some_and(|current| current != target);
        if !displaces_other_file
            && sha256_file_if_exists(&target)?.as_deref() == Some(staged.sha256.as_str())
        {
            info!(
                "{}: {} already holds this download, updating the ledger only",
                identity,
                target.display()
            );
            return Ok(Preparation::LedgerOnly {
                version: staged.version_token(),
                hash: staged.sha256.clone(),
                filename: candidate.filename.clone(),
            });
        }

        Ok(Preparation::Staged(staged))
    }

    /// Stages the newest backup of `spec` for `finish`. `finish` backs up
    /// the file being replaced, so a second restore undoes the first.
    /// `Ok(None)` when there is no backup.
    pub fn prepare_restore(
        &self,
        ledger: &VersionLedger,
        spec: &ArtifactSpec,
    ) -> Result<Option<Preparation>> {
        let identity = spec.name.as_str();
        let Some(source) = self.backups(spec.kind).latest(identity)? else {
            return Ok(None);
        };
        let filename = source.original_filename.clone();
        check_filename(&filename)
            .map_err(|reason| PlugsyncError::Swap(format!("{identity}: {reason}")))?;
        let hash = sha256_file(&source.path)?;
        let candidate = CandidateArtifact::new(source.path.to_string_lossy(), filename.clone());

        let live_dir = self.config.live_dir(spec.kind);
        let target = live_dir.join(&filename);
        let current = self.current_file(ledger, spec, &live_dir, &filename);
        if current.as_ref() == Some(&target)
            && sha256_file_if_exists(&target)?.as_deref() == Some(hash.as_str())
        {
            info!("{}: {} already matches its newest backup", identity, filename);
            return Ok(Some(Preparation::LedgerOnly {
                version: candidate.version_token(&hash),
                hash,
                filename,
            }));
        }

        let staged_path = self.config.staging_dir().join(format!(
            "{}-{}.restore",
            path_component(identity),
            filename
        ));
        let size_bytes = match afs::copy_file(&source.path, &staged_path) {
            Ok(n) => n,
            Err(e) => {
                afs::remove_file_if_exists(&staged_path)?;
                return Err(PlugsyncError::Swap(format!(
                    "{identity}: cannot stage backup {}: {e}",
                    source.path.display()
                )));
            }
        };
        info!(
            "{}: restoring {} from {}",
            identity,
            filename,
            source.path.display()
        );
        Ok(Some(Preparation::Staged(StagedArtifact {
            identity: identity.to_string(),
            kind: spec.kind,
            candidate,
            path: staged_path,
            sha256: hash,
            size_bytes,
        })))
    }

    /// Backs up, swaps in and commits a prepared artifact. Callers that
    /// need the server down must stop it before calling this.
    pub fn finish(
        &self,
        ledger: &mut VersionLedger,
        spec: &ArtifactSpec,
        preparation: Preparation,
    ) -> Result<InstallOutcome> {
        let identity = spec.name.as_str();
        let staged = match preparation {
            Preparation::UpToDate => return Ok(InstallOutcome::UpToDate),
            Preparation::LedgerOnly {
                version,
                hash,
                filename,
            } => {
                ledger.commit(identity, &version, &hash, &filename)?;
                enter(identity, SwapState::Committed);
                return Ok(InstallOutcome::Reconciled { version });
            }
            Preparation::Staged(staged) => staged,
        };

        let live_dir = self.config.live_dir(staged.kind);
        afs::create_dir_all(&live_dir)
            .map_err(|e| PlugsyncError::Swap(format!("{identity}: {e}")))?;
        let target = live_dir.join(&staged.candidate.filename);
        let current = self.current_file(ledger, spec, &live_dir, &staged.candidate.filename);
        let previous_version = ledger.get(identity).map(|r| r.installed_version.clone());

        let backup = match &current {
            Some(live) => Some(self.backups(staged.kind).create(identity, live).map_err(|e| {
                PlugsyncError::Swap(format!(
                    "{identity}: backup of {} failed: {e}",
                    live.display()
                ))
            })?),
            None => None,
        };
        enter(identity, SwapState::BackedUp);

        if let Err(cause) = swap_in(current.as_deref(), &staged, &target) {
            return Err(roll_back(
                identity,
                current.as_deref(),
                backup.as_ref(),
                &target,
                cause,
            ));
        }
        enter(identity, SwapState::Installed);

        let version = staged.version_token();
        ledger.commit(
            identity,
            &version,
            &staged.sha256,
            &staged.candidate.filename,
        )?;
        enter(identity, SwapState::Committed);

        info!(
            "Updated {}: {} -> {}",
            identity,
            previous_version.as_deref().unwrap_or("untracked"),
            version
        );
        Ok(InstallOutcome::Installed {
            previous_version,
            version,
            filename: staged.candidate.filename.clone(),
            backup: backup.map(|b| b.path),
        })
    }

    /// The live file this identity currently occupies: the ledger's file if
    /// present, else the newest match of `file_pattern`, else a file already
    /// named like the candidate.
    pub fn current_file(
        &self,
        ledger: &VersionLedger,
        spec: &ArtifactSpec,
        live_dir: &Path,
        candidate_filename: &str,
    ) -> Option<PathBuf> {
        if let Some(record) = ledger.get(&spec.name) {
            let recorded = live_dir.join(&record.installed_filename);
            if recorded.is_file() {
                return Some(recorded);
            }
        }
        if let Some(pattern) = &spec.file_pattern {
            if let Some(found) = find_by_pattern(live_dir, pattern) {
                info!(
                    "{}: adopting untracked {} as the installed copy",
                    spec.name,
                    found.display()
                );
                return Some(found);
            }
        }
        let same_name = live_dir.join(candidate_filename);
        same_name.is_file().then_some(same_name)
    }
}

fn check_filename(name: &str) -> std::result::Result<(), String> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
    {
        return Err(format!("refusing unsafe file name '{name}'"));
    }
    Ok(())
}

/// Case-insensitive glob in `dir`; the most recently modified match wins.
fn find_by_pattern(dir: &Path, pattern: &str) -> Option<PathBuf> {
    let full = format!(
        "{}/{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        pattern
    );
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };
    let paths = match glob::glob_with(&full, options) {
        Ok(paths) => paths,
        Err(e) => {
            warn!("Invalid file pattern '{}': {}", pattern, e);
            return None;
        }
    };
    let mut matches: Vec<(PathBuf, std::time::SystemTime)> = paths
        .flatten()
        .filter(|p| p.is_file())
        .map(|p| {
            let modified = p
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::UNIX_EPOCH);
            (p, modified)
        })
        .collect();
    if matches.len() > 1 {
        warn!(
            "Pattern '{}' matches {} files in {}; using the newest",
            pattern,
            matches.len(),
            dir.display()
        );
    }
    matches.sort_by(|a, b| b.1.cmp(&a.1));
    matches.into_iter().next().map(|(p, _)| p)
}

fn swap_in(current: Option<&Path>, staged: &StagedArtifact, target: &Path) -> Result<()> {
    if let Some(old) = current {
        afs::remove_file(old)?;
    }
    afs::move_file(&staged.path, target)?;
    let installed = sha256_file(target)?;
    if installed != staged.sha256 {
        return Err(PlugsyncError::Swap(format!(
            "{} hashes to {installed} after the move, expected {}",
            target.display(),
            staged.sha256
        )));
    }
    Ok(())
}

/// Puts the backed-up file back after a failed install.
fn roll_back(
    identity: &str,
    current: Option<&Path>,
    backup: Option<&BackupEntry>,
    target: &Path,
    cause: PlugsyncError,
) -> PlugsyncError {
    warn!("{}: install failed ({}), rolling back", identity, cause);
    if let Err(e) = afs::remove_file_if_exists(target) {
        warn!("{}: could not remove {}: {}", identity, target.display(), e);
    }
    let (Some(old), Some(backup)) = (current, backup) else {
        return PlugsyncError::Swap(format!("{identity}: install failed: {cause}"));
    };
    match afs::copy_file(&backup.path, old) {
        Ok(_) => {
            info!("{}: restored {} from backup", identity, old.display());
            PlugsyncError::Swap(format!(
                "{identity}: install failed ({cause}); previous file restored"
            ))
        }
        Err(e) => {
            error!(
                "{}: RESTORE FAILED, {} is missing. Copy {} back by hand.",
                identity,
                old.display(),
                backup.path.display()
            );
            PlugsyncError::RestoreFailed(
                identity.to_string(),
                format!(
                    "install failed ({cause}) and restoring {} from {} failed: {e}",
                    old.display(),
                    backup.path.display()
                ),
            )
        }
    }
}
