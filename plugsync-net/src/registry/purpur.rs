// plugsync-net/src/registry/purpur.rs
use plugsync_common::config::Config;
use plugsync_common::error::Result;
use plugsync_common::model::CandidateArtifact;
use reqwest::Client;
use serde_json::Value;
use tracing::warn;

use crate::http::get_json;

pub async fn latest(client: &Client, config: &Config) -> Result<Option<CandidateArtifact>> {
    let mc = &config.minecraft_version;
    let url = format!("{}/purpur/{}/latest", config.api.purpur, mc);
    let Some(body) = get_json::<Value>(client, &url, &[], None).await? else {
        warn!("Purpur has no builds for Minecraft {}", mc);
        return Ok(None);
    };
    let Some(build) = build_number(&body) else {
        warn!("Purpur response for {} carries no build number", mc);
        return Ok(None);
    };
    Ok(Some(candidate_for(config, &build)))
}

/// The API has served `build` both as a string and as a number.
pub fn build_number(body: &Value) -> Option<String> {
    match body.get("build")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn candidate_for(config: &Config, build: &str) -> CandidateArtifact {
    let mc = &config.minecraft_version;
    CandidateArtifact::new(
        format!("{}/purpur/{}/{}/download", config.api.purpur, mc, build),
        config.server.jar.clone(),
    )
    .with_version(format!("{mc}-{build}"))
}
