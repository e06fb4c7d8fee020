// plugsync-net/src/registry/github.rs
use plugsync_common::config::Config;
use plugsync_common::error::Result;
use plugsync_common::model::CandidateArtifact;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use crate::http::get_json;

#[derive(Debug, Deserialize)]
pub struct GithubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
pub struct GithubAsset {
    pub name: String,
    pub browser_download_url: String,
}

pub async fn latest(
    client: &Client,
    config: &Config,
    repo: &str,
    asset_pattern: Option<&str>,
) -> Result<Option<CandidateArtifact>> {
    let url = format!("{}/repos/{}/releases/latest", config.api.github, repo);
    let release: Option<GithubRelease> =
        get_json(client, &url, &[], config.github_api_token.as_deref()).await?;
    let Some(release) = release else {
        info!("GitHub repository {} has no published release", repo);
        return Ok(None);
    };
    let candidate = select_candidate(&release, asset_pattern);
    if candidate.is_none() {
        info!(
            "Release {} of {} has no matching jar asset",
            release.tag_name, repo
        );
    }
    Ok(candidate)
}

pub fn select_candidate(
    release: &GithubRelease,
    asset_pattern: Option<&str>,
) -> Option<CandidateArtifact> {
    let asset = release.assets.iter().find(|asset| {
        let name = asset.name.to_lowercase();
        if !name.ends_with(".jar") {
            return false;
        }
        match asset_pattern {
            Some(pattern) => name.contains(&pattern.to_lowercase()),
            None => !name.contains("source"),
        }
    })?;
    Some(
        CandidateArtifact::new(asset.browser_download_url.clone(), asset.name.clone())
            .with_version(release.tag_name.clone()),
    )
}
