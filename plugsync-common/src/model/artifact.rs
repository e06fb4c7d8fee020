// plugsync-common/src/model/artifact.rs
use serde::{Deserialize, Serialize};

/// Prefix of version tokens synthesized from a content hash when the upstream
/// has no version concept.
pub const HASH_VERSION_PREFIX: &str = "hash_";
const HASH_VERSION_LEN: usize = 12;

/// What a managed artifact is. Decides where it lives and how strictly it is
/// validated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    #[default]
    Plugin,
    Server,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::Plugin => write!(f, "plugin"),
            ArtifactKind::Server => write!(f, "server"),
        }
    }
}

/// One ledger entry. The identity is the key of the ledger map.
///
/// `content_hash` always describes the file currently at `installed_filename`
/// in the live directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    #[serde(rename = "version")]
    pub installed_version: String,
    #[serde(rename = "hash")]
    pub content_hash: String,
    #[serde(rename = "filename")]
    pub installed_filename: String,
}

/// A remote artifact considered for install during one reconciliation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateArtifact {
    pub download_url: String,
    pub filename: String,
    pub declared_version: Option<String>,
    /// Lowercase hex SHA-256 published by the registry, if any.
    pub declared_hash: Option<String>,
}

impl CandidateArtifact {
    pub fn new(download_url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            download_url: download_url.into(),
            filename: filename.into(),
            declared_version: None,
            declared_hash: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.declared_version = Some(version.into());
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.declared_hash = Some(hash.into().to_ascii_lowercase());
        self
    }

    /// The version token to record once this candidate is installed with the
    /// given content hash.
    pub fn version_token(&self, content_hash: &str) -> String {
        match &self.declared_version {
            Some(v) => v.clone(),
            None => synthesized_version(content_hash),
        }
    }
}

/// `hash_<prefix>` token for upstreams without versions.
pub fn synthesized_version(content_hash: &str) -> String {
    let prefix: String = content_hash.chars().take(HASH_VERSION_LEN).collect();
    format!("{HASH_VERSION_PREFIX}{prefix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_with_short_keys() {
        let record = ArtifactRecord {
            installed_version: "5.4.1".into(),
            content_hash: "ab".repeat(32),
            installed_filename: "LuckPerms-Bukkit-5.4.1.jar".into(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["version"], "5.4.1");
        assert_eq!(value["filename"], "LuckPerms-Bukkit-5.4.1.jar");
        assert!(value.get("installed_version").is_none());
    }

    #[test]
    fn version_token_falls_back_to_hash_prefix() {
        let hash = "0123456789abcdef0123";
        let unversioned = CandidateArtifact::new("https://example.org/a.jar", "a.jar");
        assert_eq!(unversioned.version_token(hash), "hash_0123456789ab");

        let versioned = unversioned.with_version("2.0");
        assert_eq!(versioned.version_token(hash), "2.0");
    }
}
