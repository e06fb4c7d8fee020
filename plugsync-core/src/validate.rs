// plugsync-core/src/validate.rs
//! Structural checks on a staged artifact before it may replace a live file.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use plugsync_common::error::{PlugsyncError, Result};
use plugsync_common::model::ArtifactKind;
use serde::Deserialize;
use tracing::debug;
use zip::ZipArchive;

const DESCRIPTOR_NAMES: [&str; 2] = ["plugin.yml", "paper-plugin.yml"];
const MAX_DESCRIPTOR_BYTES: u64 = 1024 * 1024;

/// The top-level keys of a plugin descriptor that plugsync cares about.
/// Everything else in the file is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub loader: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    pub entries: usize,
    pub descriptor: Option<PluginDescriptor>,
}

/// Confirms `path` is a well-formed JAR. Plugins must also carry a
/// descriptor that names the plugin and its entry point.
pub fn validate_artifact(path: &Path, kind: ArtifactKind) -> Result<ArchiveSummary> {
    let detected = infer::get_from_path(path)
        .map_err(|e| PlugsyncError::Validation(format!("cannot read {}: {e}", path.display())))?;
    match detected.map(|t| t.extension()) {
        Some("zip") | Some("jar") => {}
        Some(other) => {
            return Err(PlugsyncError::Validation(format!(
                "not a JAR archive (content looks like {other})"
            )))
        }
        None => {
            return Err(PlugsyncError::Validation(
                "not a JAR archive (unrecognised content)".to_string(),
            ))
        }
    }

    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| PlugsyncError::Validation(format!("invalid JAR: {e}")))?;
    if archive.is_empty() {
        return Err(PlugsyncError::Validation("JAR has no entries".to_string()));
    }
    let entries = archive.len();

    let descriptor = match kind {
        ArtifactKind::Server => None,
        ArtifactKind::Plugin => Some(read_descriptor(&mut archive)?),
    };
    debug!(
        "{} is a valid {} archive with {} entries",
        path.display(),
        kind,
        entries
    );
    Ok(ArchiveSummary {
        entries,
        descriptor,
    })
}

fn read_descriptor<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<PluginDescriptor> {
    for name in DESCRIPTOR_NAMES {
        let Ok(entry) = archive.by_name(name) else {
            continue;
        };
        let mut raw = Vec::new();
        entry
            .take(MAX_DESCRIPTOR_BYTES)
            .read_to_end(&mut raw)
            .map_err(|e| PlugsyncError::Validation(format!("unreadable {name}: {e}")))?;
        let text = String::from_utf8_lossy(&raw);
        return parse_descriptor(&text)
            .map_err(|reason| PlugsyncError::Validation(format!("{name}: {reason}")));
    }
    Err(PlugsyncError::Validation(
        "missing plugin.yml or paper-plugin.yml".to_string(),
    ))
}

pub fn parse_descriptor(text: &str) -> std::result::Result<PluginDescriptor, String> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let descriptor: PluginDescriptor =
        serde_yaml::from_str(text).map_err(|e| format!("malformed descriptor: {e}"))?;
    if descriptor.name.trim().is_empty() {
        return Err("empty 'name' entry".to_string());
    }
    let has_entry_point = [&descriptor.main, &descriptor.loader]
        .iter()
        .any(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()));
    if !has_entry_point {
        return Err("no 'main' or 'loader' entry".to_string());
    }
    Ok(descriptor)
}
