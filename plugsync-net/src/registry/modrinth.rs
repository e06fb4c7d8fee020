// plugsync-net/src/registry/modrinth.rs
use std::collections::HashMap;

use plugsync_common::config::Config;
use plugsync_common::error::Result;
use plugsync_common::model::CandidateArtifact;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use crate::http::get_json;

#[derive(Debug, Deserialize)]
pub struct ModrinthVersion {
    pub id: String,
    pub version_number: String,
    #[serde(default)]
    pub files: Vec<ModrinthFile>,
}

#[derive(Debug, Deserialize)]
pub struct ModrinthFile {
    pub url: String,
    pub filename: String,
    #[serde(default)]
    pub primary: bool,
    /// Modrinth publishes sha1 and sha512 only.
    #[serde(default)]
    pub hashes: HashMap<String, String>,
}

/// JSON array literal Modrinth expects in its facet query parameters.
fn json_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

pub async fn latest(
    client: &Client,
    config: &Config,
    project_id: &str,
) -> Result<Option<CandidateArtifact>> {
    let url = format!("{}/project/{}/version", config.api.modrinth, project_id);
    let query = [
        (
            "game_versions",
            json_list(std::slice::from_ref(&config.minecraft_version)),
        ),
        ("loaders", json_list(&config.loaders)),
    ];
    let versions: Option<Vec<ModrinthVersion>> = get_json(client, &url, &query, None).await?;
    let candidate = versions.as_deref().and_then(select_candidate);
    if candidate.is_none() {
        info!(
            "Modrinth has no version of {} for Minecraft {}",
            project_id, config.minecraft_version
        );
    }
    Ok(candidate)
}

/// Newest version first, as returned by the API; its primary file, or the
/// first file when none is flagged primary.
pub fn select_candidate(versions: &[ModrinthVersion]) -> Option<CandidateArtifact> {
    let latest = versions.first()?;
    let file = latest
        .files
        .iter()
        .find(|f| f.primary)
        .or_else(|| latest.files.first())?;
    Some(
        CandidateArtifact::new(file.url.clone(), file.filename.clone())
            .with_version(latest.version_number.clone()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn versions(value: serde_json::Value) -> Vec<ModrinthVersion> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn prefers_primary_file_of_newest_version() {
        let list = versions(serde_json::json!([
            {
                "id": "abc",
                "version_number": "5.4.141",
                "files": [
                    {"url": "https://cdn.modrinth.com/x/sources.jar", "filename": "sources.jar", "primary": false, "hashes": {}},
                    {"url": "https://cdn.modrinth.com/x/LuckPerms-Bukkit-5.4.141.jar", "filename": "LuckPerms-Bukkit-5.4.141.jar", "primary": true, "hashes": {"sha1": "00"}}
                ]
            },
            {"id": "old", "version_number": "5.4.140", "files": []}
        ]));
        let candidate = select_candidate(&list).unwrap();
        assert_eq!(candidate.filename, "LuckPerms-Bukkit-5.4.141.jar");
        assert_eq!(candidate.declared_version.as_deref(), Some("5.4.141"));
        assert_eq!(candidate.declared_hash, None);
    }

    #[test]
    fn falls_back_to_first_file_and_handles_empty() {
        let list = versions(serde_json::json!([
            {"id": "a", "version_number": "1.0", "files": [
                {"url": "https://cdn.modrinth.com/a.jar", "filename": "a.jar"}
            ]}
        ]));
        assert_eq!(select_candidate(&list).unwrap().filename, "a.jar");
        assert!(select_candidate(&[]).is_none());

        let no_files = versions(serde_json::json!([{"id": "a", "version_number": "1.0"}]));
        assert!(select_candidate(&no_files).is_none());
    }

    #[test]
    fn facets_are_json_arrays() {
        assert_eq!(json_list(&["1.21.1".to_string()]), r#"["1.21.1"]"#);
    }
}
