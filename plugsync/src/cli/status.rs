// plugsync/src/cli/status.rs
use clap::Args;
use colored::Colorize;
use plugsync_aio::sha256_file_if_exists;
use plugsync_common::{ArtifactRecord, Config};
use plugsync_core::VersionLedger;

#[derive(Args, Debug)]
pub struct Status;

#[derive(Debug, PartialEq, Eq)]
enum Drift {
    Clean,
    Modified,
    Missing,
    Untracked,
}

impl Status {
    pub fn run(&self, config: &Config) -> anyhow::Result<()> {
        let ledger = VersionLedger::load(&config.ledger_path())?;
        if config.artifacts.is_empty() {
            println!("{}", "No artifacts configured".yellow());
            return Ok(());
        }

        let width = config
            .artifacts
            .iter()
            .map(|a| a.name.len())
            .max()
            .unwrap_or(0);
        println!(
            "{:<width$}  {:<8}  {:<10}  {}",
            "Name".bold(),
            "Source".bold(),
            "Version".bold(),
            "File".bold()
        );
        for spec in &config.artifacts {
            let record = ledger.get(&spec.name);
            let drift = drift_of(record, &config.live_dir(spec.kind));
            let name = if spec.enabled {
                spec.name.normal()
            } else {
                spec.name.dimmed()
            };
            let (version, file) = match record {
                Some(r) => (r.installed_version.as_str(), r.installed_filename.as_str()),
                None => ("-", "-"),
            };
            let marker = match drift {
                Drift::Clean => "".normal(),
                Drift::Modified => "modified on disk".red(),
                Drift::Missing => "file missing".red(),
                Drift::Untracked => "not installed by plugsync".yellow(),
            };
            println!(
                "{:<width$}  {:<8}  {:<10}  {} {}",
                name,
                spec.source.label(),
                version,
                file,
                marker
            );
        }

        let orphans: Vec<&String> = ledger
            .records()
            .map(|(identity, _)| identity)
            .filter(|identity| config.artifact(identity).is_none())
            .collect();
        for identity in orphans {
            println!(
                "{} ledger record '{}' has no [[artifact]] entry (use `plugsync reset {}`)",
                "Note:".yellow(),
                identity,
                identity
            );
        }
        Ok(())
    }
}

fn drift_of(record: Option<&ArtifactRecord>, live_dir: &std::path::Path) -> Drift {
    let Some(record) = record else {
        return Drift::Untracked;
    };
    match sha256_file_if_exists(&live_dir.join(&record.installed_filename)) {
        Ok(Some(hash)) if hash.eq_ignore_ascii_case(&record.content_hash) => Drift::Clean,
        Ok(Some(_)) => Drift::Modified,
        Ok(None) => Drift::Missing,
        Err(_) => Drift::Modified,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use plugsync_aio::sha256_bytes;

    use super::*;

    #[test]
    fn drift_markers() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("X.jar"), b"installed").unwrap();
        let mut record = ArtifactRecord {
            installed_version: "1".into(),
            content_hash: sha256_bytes(b"installed"),
            installed_filename: "X.jar".into(),
        };
        assert_eq!(drift_of(Some(&record), dir.path()), Drift::Clean);
        assert_eq!(drift_of(None, dir.path()), Drift::Untracked);

        record.content_hash = sha256_bytes(b"other");
        assert_eq!(drift_of(Some(&record), dir.path()), Drift::Modified);

        record.installed_filename = "gone.jar".into();
        assert_eq!(drift_of(Some(&record), dir.path()), Drift::Missing);
    }
}
