// plugsync-net/src/registry/spiget.rs
use plugsync_common::config::Config;
use plugsync_common::error::Result;
use plugsync_common::model::CandidateArtifact;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::http::get_json;

#[derive(Debug, Deserialize)]
pub struct SpigetResource {
    #[serde(default)]
    pub external: bool,
    #[serde(default)]
    pub premium: bool,
}

#[derive(Debug, Deserialize)]
pub struct SpigetVersion {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

impl SpigetVersion {
    pub fn token(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.id.to_string(),
        }
    }
}

pub async fn latest(
    client: &Client,
    config: &Config,
    identity: &str,
    resource_id: &str,
) -> Result<Option<CandidateArtifact>> {
    let base = format!("{}/resources/{}", config.api.spiget, resource_id);

    let Some(resource) = get_json::<SpigetResource>(client, &base, &[], None).await? else {
        warn!("Spiget does not know resource {} ({})", resource_id, identity);
        return Ok(None);
    };
    if resource.external || resource.premium {
        warn!(
            "SpigotMC resource {} is hosted externally or premium; update it by hand: https://www.spigotmc.org/resources/{}/",
            identity, resource_id
        );
        return Ok(None);
    }

    let version_url = format!("{base}/versions/latest");
    let Some(version) = get_json::<SpigetVersion>(client, &version_url, &[], None).await? else {
        return Ok(None);
    };
    Ok(Some(candidate_for(&base, identity, &version)))
}

pub fn candidate_for(resource_base: &str, identity: &str, version: &SpigetVersion) -> CandidateArtifact {
    CandidateArtifact::new(format!("{resource_base}/download"), format!("{identity}.jar"))
        .with_version(version.token())
}
