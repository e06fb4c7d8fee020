// plugsync-core/src/backup.rs
//! Timestamped copies of live files, taken before they are replaced.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, TimeDelta, Utc};
use plugsync_aio::fs as afs;
use plugsync_common::config::RetentionConfig;
use plugsync_common::error::{PlugsyncError, Result};
use tracing::{debug, info, warn};

/// Sortable UTC timestamp that prefixes backup and quarantine file names.
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";
const FILE_TIMESTAMP_LEN: usize = 22;

pub fn file_timestamp(at: DateTime<Utc>) -> String {
    at.format(FILE_TIMESTAMP_FORMAT).to_string()
}

/// Maps an identity onto a single safe path component.
pub fn path_component(identity: &str) -> String {
    identity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

/// The live file name a backup was taken of, if `file_name` follows the
/// `<timestamp>_<name>` layout.
pub fn original_name(file_name: &str) -> Option<&str> {
    let (stamp, rest) = (
        file_name.get(..FILE_TIMESTAMP_LEN)?,
        file_name.get(FILE_TIMESTAMP_LEN..)?,
    );
    if !stamp.bytes().all(|b| b.is_ascii_digit() || b == b'_') {
        return None;
    }
    rest.strip_prefix('_').filter(|r| !r.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub original_filename: String,
    pub created: SystemTime,
}

#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Backups kept per identity, newest first.
    pub keep: usize,
    /// Older backups are removed even when fewer than `keep` exist.
    pub max_age: Duration,
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(cfg: &RetentionConfig) -> Self {
        Self {
            keep: cfg.keep.max(1),
            max_age: cfg.max_age,
        }
    }
}

#[derive(Debug, Default)]
pub struct PruneReport {
    pub removed: Vec<PathBuf>,
    pub kept: usize,
}

/// Backups live in `<root>/<identity>/<timestamp>_<filename>`.
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn identity_dir(&self, identity: &str) -> PathBuf {
        self.root.join(path_component(identity))
    }

    pub fn create(&self, identity: &str, live_file: &Path) -> Result<BackupEntry> {
        self.create_at(identity, live_file, Utc::now())
    }

    /// Copies `live_file` into the store and checks the copy is complete.
    pub fn create_at(
        &self,
        identity: &str,
        live_file: &Path,
        at: DateTime<Utc>,
    ) -> Result<BackupEntry> {
        let file_name = live_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                PlugsyncError::Swap(format!("{} has no file name", live_file.display()))
            })?;
        let dir = self.identity_dir(identity);
        afs::create_dir_all(&dir)?;

        let mut at = at;
        let mut dest = dir.join(format!("{}_{file_name}", file_timestamp(at)));
        while dest.exists() {
            at += TimeDelta::microseconds(1);
            dest = dir.join(format!("{}_{file_name}", file_timestamp(at)));
        }

        let expected = std::fs::metadata(live_file)?.len();
        let copied = afs::copy_file(live_file, &dest)?;
        if copied != expected {
            let _ = afs::remove_file_if_exists(&dest);
            return Err(PlugsyncError::Swap(format!(
                "backup of {} is incomplete ({copied} of {expected} bytes)",
                live_file.display()
            )));
        }
        info!("Backed up {} to {}", live_file.display(), dest.display());
        Ok(BackupEntry {
            path: dest,
            original_filename: file_name,
            created: SystemTime::now(),
        })
    }

    /// Backups of `identity`, newest first.
    pub fn list(&self, identity: &str) -> Result<Vec<BackupEntry>> {
        list_dir(&self.identity_dir(identity))
    }

    pub fn latest(&self, identity: &str) -> Result<Option<BackupEntry>> {
        Ok(self.list(identity)?.into_iter().next())
    }

    /// Applies `policy` to every identity directory. The newest backup of an
    /// identity always survives.
    pub fn prune(&self, policy: &RetentionPolicy, now: SystemTime) -> Result<PruneReport> {
        let mut report = PruneReport::default();
        for (name, dir) in afs::list_subdirs(&self.root)? {
            let entries = list_dir(&dir)?;
            for (index, entry) in entries.into_iter().enumerate() {
                let age = now.duration_since(entry.created).unwrap_or(Duration::ZERO);
                let expired = index >= policy.keep.max(1) || age > policy.max_age;
                if index == 0 || !expired {
                    report.kept += 1;
                    continue;
                }
                match afs::remove_file(&entry.path) {
                    Ok(()) => {
                        debug!("Pruned backup {}", entry.path.display());
                        report.removed.push(entry.path);
                    }
                    Err(e) => {
                        warn!("Could not prune {} ({}): {}", entry.path.display(), name, e);
                        report.kept += 1;
                    }
                }
            }
        }
        if !report.removed.is_empty() {
            info!(
                "Pruned {} backups under {}",
                report.removed.len(),
                self.root.display()
            );
        }
        Ok(report)
    }
}

fn list_dir(dir: &Path) -> Result<Vec<BackupEntry>> {
    let mut entries: Vec<BackupEntry> = afs::list_files(dir)?
        .into_iter()
        .filter_map(|(name, path, modified)| {
            Some(BackupEntry {
                original_filename: original_name(&name)?.to_string(),
                path,
                created: modified,
            })
        })
        .collect();
    // Names start with a fixed-width UTC timestamp.
    entries.sort_by(|a, b| b.path.file_name().cmp(&a.path.file_name()));
    Ok(entries)
}
