// plugsync-common/src/model/source.rs
use serde::{Deserialize, Serialize};

use super::artifact::ArtifactKind;

/// Where the latest version of an artifact is published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceSpec {
    Modrinth {
        project_id: String,
    },
    /// SpigotMC resource, resolved through the Spiget API.
    Spigot {
        resource_id: String,
    },
    Github {
        /// `owner/name`
        repo: String,
        /// Substring an asset name must contain. Defaults to the first `.jar`
        /// that is not a sources jar.
        #[serde(default)]
        asset_pattern: Option<String>,
    },
    /// Purpur server builds for the configured Minecraft version.
    Purpur,
    /// A fixed URL without any version metadata.
    Direct { url: String, filename: String },
}

impl SourceSpec {
    pub fn label(&self) -> &'static str {
        match self {
            SourceSpec::Modrinth { .. } => "modrinth",
            SourceSpec::Spigot { .. } => "spigot",
            SourceSpec::Github { .. } => "github",
            SourceSpec::Purpur => "purpur",
            SourceSpec::Direct { .. } => "direct",
        }
    }
}

/// One `[[artifact]]` entry of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    /// Ledger identity.
    pub name: String,
    #[serde(default)]
    pub kind: ArtifactKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Glob used once to find an already installed file that the ledger does
    /// not know about yet, e.g. `LuckPerms-Bukkit-*.jar`.
    #[serde(default)]
    pub file_pattern: Option<String>,
    pub source: SourceSpec,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_sources() {
        let spec: ArtifactSpec = toml::from_str(
            r#"
            name = "Vault"
            file_pattern = "Vault*.jar"
            source = { type = "github", repo = "milkbowl/Vault" }
            "#,
        )
        .unwrap();
        assert_eq!(spec.kind, ArtifactKind::Plugin);
        assert!(spec.enabled);
        assert_eq!(
            spec.source,
            SourceSpec::Github {
                repo: "milkbowl/Vault".into(),
                asset_pattern: None
            }
        );

        let server: ArtifactSpec = toml::from_str(
            r#"
            name = "purpur"
            kind = "server"
            source = { type = "purpur" }
            "#,
        )
        .unwrap();
        assert_eq!(server.kind, ArtifactKind::Server);
        assert_eq!(server.source.label(), "purpur");
    }
}
