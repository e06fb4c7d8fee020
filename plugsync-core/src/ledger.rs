// plugsync-core/src/ledger.rs
//! Durable record of what is installed: identity -> `{version, hash, filename}`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use plugsync_aio::checksum::sha256_file_if_exists;
use plugsync_aio::fs as afs;
use plugsync_aio::json_io::{read_json_sync, write_json_atomic};
use plugsync_common::error::{PlugsyncError, Result};
use plugsync_common::model::{ArtifactRecord, CandidateArtifact};
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub struct VersionLedger {
    path: PathBuf,
    records: BTreeMap<String, ArtifactRecord>,
}

impl VersionLedger {
    /// Reads the ledger at `path`. A missing file is an empty ledger. A file
    /// that cannot be parsed is renamed to `<path>.corrupt-<timestamp>` and
    /// also yields an empty ledger; failing to set it aside is an error. A
    /// file that cannot be read at all is left in place and the read error
    /// is returned.
    pub fn load(path: &Path) -> Result<Self> {
        let records = if !path.exists() {
            debug!("No ledger at {}, starting empty", path.display());
            BTreeMap::new()
        } else {
            match read_json_sync::<BTreeMap<String, ArtifactRecord>>(path) {
                Ok(records) => {
                    debug!("Loaded {} ledger records from {}", records.len(), path.display());
                    records
                }
                Err(PlugsyncError::Json(e)) if !e.is_io() => {
                    let aside = corrupt_path(path);
                    warn!(
                        "Ledger {} is unreadable ({}); moving it to {} and starting empty",
                        path.display(),
                        e,
                        aside.display()
                    );
                    afs::move_file(path, &aside).map_err(|move_err| {
                        error!("Could not set the corrupt ledger aside: {}", move_err);
                        PlugsyncError::LedgerCorrupt(format!(
                            "{} is unreadable ({e}) and could not be moved aside: {move_err}",
                            path.display()
                        ))
                    })?;
                    BTreeMap::new()
                }
                Err(e) => {
                    error!("Cannot read ledger {}: {}", path.display(), e);
                    return Err(e);
                }
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    pub fn get(&self, identity: &str) -> Option<&ArtifactRecord> {
        self.records.get(identity)
    }

    pub fn records(&self) -> impl Iterator<Item = (&String, &ArtifactRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether `candidate` is already what is installed for `identity`.
    ///
    /// A version token, when the candidate has one, decides; the live file
    /// must still hash to the recorded value so local drift is reinstalled.
    /// Without a token the declared hash is compared instead. Anything else is
    /// "not up to date".
    pub fn is_up_to_date(
        &self,
        identity: &str,
        candidate: &CandidateArtifact,
        live_dir: &Path,
    ) -> bool {
        let Some(record) = self.records.get(identity) else {
            return false;
        };

        if let Some(declared) = &candidate.declared_version {
            if &record.installed_version != declared {
                debug!(
                    "{}: installed {} differs from candidate {}",
                    identity, record.installed_version, declared
                );
                return false;
            }
            return self.live_file_matches(identity, record, live_dir);
        }

        match &candidate.declared_hash {
            Some(hash) if hash.eq_ignore_ascii_case(&record.content_hash) => {
                self.live_file_matches(identity, record, live_dir)
            }
            _ => false,
        }
    }

    /// Whether `hash` is what the ledger records for `identity` and the live
    /// file still carries it. Used to compare a fresh download.
    pub fn matches_content(&self, identity: &str, hash: &str, live_dir: &Path) -> bool {
        match self.records.get(identity) {
            Some(record) if record.content_hash.eq_ignore_ascii_case(hash) => {
                self.live_file_matches(identity, record, live_dir)
            }
            _ => false,
        }
    }

    fn live_file_matches(&self, identity: &str, record: &ArtifactRecord, live_dir: &Path) -> bool {
        let live = live_dir.join(&record.installed_filename);
        match sha256_file_if_exists(&live) {
            Ok(Some(actual)) if actual.eq_ignore_ascii_case(&record.content_hash) => true,
            Ok(Some(actual)) => {
                warn!(
                    "{}: {} was modified outside plugsync (hash {} != recorded {})",
                    identity,
                    live.display(),
                    actual,
                    record.content_hash
                );
                false
            }
            Ok(None) => {
                warn!("{}: recorded file {} is missing", identity, live.display());
                false
            }
            Err(e) => {
                warn!("{}: cannot hash {}: {}", identity, live.display(), e);
                false
            }
        }
    }

    /// Records a completed swap and persists the ledger. Call only once the
    /// new file is on disk with `hash`. On a persist failure the in-memory
    /// record is reverted and `LedgerPersist` is returned.
    pub fn commit(
        &mut self,
        identity: &str,
        version: &str,
        hash: &str,
        filename: &str,
    ) -> Result<()> {
        let record = ArtifactRecord {
            installed_version: version.to_string(),
            content_hash: hash.to_ascii_lowercase(),
            installed_filename: filename.to_string(),
        };
        if self.records.get(identity) == Some(&record) {
            debug!("{}: ledger already records {}", identity, version);
            return Ok(());
        }

        let previous = self.records.insert(identity.to_string(), record);
        if let Err(e) = self.persist() {
            match previous {
                Some(prev) => self.records.insert(identity.to_string(), prev),
                None => self.records.remove(identity),
            };
            return Err(e);
        }
        info!("{}: ledger now records {} ({})", identity, version, filename);
        Ok(())
    }

    /// Drops the record for `identity`. Returns whether one existed.
    pub fn forget(&mut self, identity: &str) -> Result<bool> {
        let Some(previous) = self.records.remove(identity) else {
            return Ok(false);
        };
        if let Err(e) = self.persist() {
            self.records.insert(identity.to_string(), previous);
            return Err(e);
        }
        Ok(true)
    }

    pub fn persist(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.records).map_err(|e| {
            error!("Failed to persist ledger {}: {}", self.path.display(), e);
            PlugsyncError::LedgerPersist(format!("{}: {e}", self.path.display()))
        })
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "ledger.json".to_string());
    path.with_file_name(format!("{name}.corrupt-{stamp}"))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use plugsync_aio::sha256_bytes;

    use super::*;

    fn setup() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let ledger_path = dir.path().join("state").join("ledger.json");
        let live = dir.path().join("plugins");
        fs::create_dir_all(&live).unwrap();
        (dir, ledger_path, live)
    }

    fn candidate(version: Option<&str>, hash: Option<&str>) -> CandidateArtifact {
        let mut c = CandidateArtifact::new("https://example.org/X.jar", "X.jar");
        c.declared_version = version.map(str::to_string);
        c.declared_hash = hash.map(str::to_string);
        c
    }

    #[test]
    fn missing_file_is_empty() {
        let (_dir, path, _live) = setup();
        let ledger = VersionLedger::load(&path).unwrap();
        assert!(ledger.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_file_is_set_aside() {
        let (_dir, path, _live) = setup();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"{ half a ledger").unwrap();

        let ledger = VersionLedger::load(&path).unwrap();
        assert!(ledger.is_empty());
        assert!(!path.exists());
        let aside: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with("ledger.json.corrupt-"))
            .collect();
        assert_eq!(aside.len(), 1);
    }

    #[test]
    fn unreadable_file_is_left_in_place() {
        let (_dir, path, _live) = setup();
        // A directory opens but fails on read, like a file without read access.
        fs::create_dir_all(&path).unwrap();

        assert!(VersionLedger::load(&path).is_err());
        assert!(path.is_dir());
        let siblings = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(siblings, 1);
    }

    #[test]
    fn commit_persists_in_the_documented_shape() {
        let (_dir, path, _live) = setup();
        let mut ledger = VersionLedger::load(&path).unwrap();
        ledger.commit("TAB", "4.1.2", "ABCDEF", "TAB.jar").unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!({"TAB": {"version": "4.1.2", "hash": "abcdef", "filename": "TAB.jar"}})
        );

        let reloaded = VersionLedger::load(&path).unwrap();
        assert_eq!(reloaded.get("TAB").unwrap().installed_version, "4.1.2");
    }

    #[test]
    fn failed_persist_leaves_memory_untouched() {
        let (dir, _path, _live) = setup();
        // The ledger's parent is a regular file, so the write must fail.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let mut ledger = VersionLedger::load(&blocker.join("ledger.json")).unwrap();

        let err = ledger.commit("TAB", "1", "aa", "TAB.jar").unwrap_err();
        assert!(matches!(err, PlugsyncError::LedgerPersist(_)));
        assert!(ledger.get("TAB").is_none());
    }

    #[test]
    fn version_match_requires_untouched_live_file() {
        let (_dir, path, live) = setup();
        let h0 = sha256_bytes(b"original");
        fs::write(live.join("X.jar"), b"original").unwrap();
        let mut ledger = VersionLedger::load(&path).unwrap();
        ledger.commit("X", "1.0", &h0, "X.jar").unwrap();

        assert!(ledger.is_up_to_date("X", &candidate(Some("1.0"), None), &live));
        assert!(!ledger.is_up_to_date("X", &candidate(Some("1.1"), None), &live));

        // Local drift: same version token, different bytes on disk.
        fs::write(live.join("X.jar"), b"edited by hand").unwrap();
        assert!(!ledger.is_up_to_date("X", &candidate(Some("1.0"), None), &live));

        fs::remove_file(live.join("X.jar")).unwrap();
        assert!(!ledger.is_up_to_date("X", &candidate(Some("1.0"), None), &live));
    }

    #[test]
    fn version_token_wins_over_hash() {
        let (_dir, path, live) = setup();
        let h0 = sha256_bytes(b"original");
        fs::write(live.join("X.jar"), b"original").unwrap();
        let mut ledger = VersionLedger::load(&path).unwrap();
        ledger.commit("X", "1.0", &h0, "X.jar").unwrap();

        // Same hash but a newer token: the token decides.
        assert!(!ledger.is_up_to_date("X", &candidate(Some("2.0"), Some(&h0)), &live));
    }

    #[test]
    fn hash_only_candidates_compare_hashes() {
        let (_dir, path, live) = setup();
        let h0 = sha256_bytes(b"original");
        fs::write(live.join("X.jar"), b"original").unwrap();
        let mut ledger = VersionLedger::load(&path).unwrap();
        ledger.commit("X", "hash_abc", &h0, "X.jar").unwrap();

        assert!(ledger.is_up_to_date("X", &candidate(None, Some(&h0.to_uppercase())), &live));
        assert!(!ledger.is_up_to_date("X", &candidate(None, Some("ff")), &live));
        // Neither token nor hash: the installer has to download and compare.
        assert!(!ledger.is_up_to_date("X", &candidate(None, None), &live));
        assert!(ledger.matches_content("X", &h0, &live));
        assert!(!ledger.matches_content("Y", &h0, &live));
    }

    #[test]
    fn forget_removes_and_persists() {
        let (_dir, path, _live) = setup();
        let mut ledger = VersionLedger::load(&path).unwrap();
        ledger.commit("X", "1", "aa", "X.jar").unwrap();
        assert!(ledger.forget("X").unwrap());
        assert!(!ledger.forget("X").unwrap());
        assert!(VersionLedger::load(&path).unwrap().is_empty());
    }
}
