// plugsync-core/src/quarantine.rs
//! Holding area for downloads that failed validation, with a report each.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use plugsync_aio::fs as afs;
use plugsync_common::error::Result;
use plugsync_common::model::CandidateArtifact;
use tracing::{error, warn};

use crate::backup::{file_timestamp, path_component};

#[derive(Debug, Clone)]
pub struct QuarantineEntry {
    /// Where the rejected file went, if it could be moved.
    pub artifact: Option<PathBuf>,
    pub report: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Quarantine {
    dir: PathBuf,
}

impl Quarantine {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn isolate(
        &self,
        identity: &str,
        candidate: &CandidateArtifact,
        staged: &Path,
        reason: &str,
    ) -> Result<QuarantineEntry> {
        self.isolate_at(identity, candidate, staged, reason, Utc::now())
    }

    /// Moves `staged` into the quarantine directory and writes the error
    /// report next to it. The staged file is gone afterwards either way.
    pub fn isolate_at(
        &self,
        identity: &str,
        candidate: &CandidateArtifact,
        staged: &Path,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<QuarantineEntry> {
        afs::create_dir_all(&self.dir)?;
        let prefix = format!("{}_{}", file_timestamp(at), path_component(identity));
        let target = self
            .dir
            .join(format!("{prefix}_{}", path_component(&candidate.filename)));
        let report = self.dir.join(format!("{prefix}_error.txt"));

        let artifact = match afs::move_file(staged, &target) {
            Ok(()) => Some(target),
            Err(e) => {
                warn!(
                    "Could not move {} into quarantine: {}; discarding it",
                    staged.display(),
                    e
                );
                let _ = afs::remove_file_if_exists(staged);
                None
            }
        };

        let body = render_report(identity, candidate, reason, at);
        if let Err(e) = afs::atomic_write_file(&report, body.as_bytes()) {
            error!("Failed to write quarantine report {}: {}", report.display(), e);
            return Err(e);
        }
        error!(
            "{}: rejected download quarantined ({}); see {}",
            identity,
            reason,
            report.display()
        );
        Ok(QuarantineEntry { artifact, report })
    }
}

fn render_report(
    identity: &str,
    candidate: &CandidateArtifact,
    reason: &str,
    at: DateTime<Utc>,
) -> String {
    format!(
        "Identity: {identity}\n\
         Declared version: {}\n\
         Timestamp (UTC): {}\n\
         Reason: {reason}\n\
         Source URL: {}\n",
        candidate.declared_version.as_deref().unwrap_or("none"),
        at.to_rfc3339_opts(SecondsFormat::Secs, true),
        candidate.download_url,
    )
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::TimeZone;

    use super::*;

    #[test]
    fn moves_file_and_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("X-X-2.jar.partial");
        fs::write(&staged, b"garbage").unwrap();
        let q = Quarantine::new(dir.path().join("pluginerrors"));
        let candidate =
            CandidateArtifact::new("https://cdn.example.org/X-2.jar", "X-2.jar").with_version("2");
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap();

        let entry = q
            .isolate_at("X", &candidate, &staged, "missing plugin.yml", at)
            .unwrap();

        assert!(!staged.exists());
        let artifact = entry.artifact.unwrap();
        assert_eq!(
            artifact.file_name().unwrap(),
            "20261019_083000_000000_X_X-2.jar"
        );
        assert_eq!(fs::read(&artifact).unwrap(), b"garbage");

        let report = fs::read_to_string(&entry.report).unwrap();
        assert!(report.contains("Identity: X\n"));
        assert!(report.contains("Declared version: 2\n"));
        assert!(report.contains("Timestamp (UTC): 2026-10-19T08:30:00Z\n"));
        assert!(report.contains("Reason: missing plugin.yml\n"));
        assert!(report.contains("Source URL: https://cdn.example.org/X-2.jar\n"));
    }

    #[test]
    fn report_survives_a_missing_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        let q = Quarantine::new(dir.path().join("q"));
        let candidate = CandidateArtifact::new("https://example.org/y", "Y.jar");
        let entry = q
            .isolate("Y", &candidate, &dir.path().join("gone"), "bad")
            .unwrap();
        assert!(entry.artifact.is_none());
        assert!(fs::read_to_string(entry.report)
            .unwrap()
            .contains("Declared version: none"));
    }
}
