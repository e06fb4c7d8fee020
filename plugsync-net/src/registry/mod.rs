// plugsync-net/src/registry/mod.rs
//! Clients for the upstream registries. Each one answers "what is the latest
//! compatible artifact?" with a `CandidateArtifact`, or `None` when the
//! registry has nothing suitable.

pub mod github;
pub mod modrinth;
pub mod purpur;
pub mod spiget;

use plugsync_common::config::Config;
use plugsync_common::error::Result;
use plugsync_common::model::{ArtifactSpec, CandidateArtifact, SourceSpec};
use reqwest::Client;
use tracing::debug;

use crate::http::build_http_client;

#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: Client,
    config: Config,
}

impl RegistryClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config)?,
            config: config.clone(),
        })
    }

    /// The shared HTTP client, also used for artifact downloads.
    pub fn http(&self) -> &Client {
        &self.client
    }

    pub async fn fetch_latest(&self, spec: &ArtifactSpec) -> Result<Option<CandidateArtifact>> {
        debug!(
            "Querying {} for the latest '{}'",
            spec.source.label(),
            spec.name
        );
        match &spec.source {
            SourceSpec::Modrinth { project_id } => {
                modrinth::latest(&self.client, &self.config, project_id).await
            }
            SourceSpec::Spigot { resource_id } => {
                spiget::latest(&self.client, &self.config, &spec.name, resource_id).await
            }
            SourceSpec::Github {
                repo,
                asset_pattern,
            } => github::latest(&self.client, &self.config, repo, asset_pattern.as_deref()).await,
            SourceSpec::Purpur => purpur::latest(&self.client, &self.config).await,
            SourceSpec::Direct { url, filename } => {
                Ok(Some(CandidateArtifact::new(url.clone(), filename.clone())))
            }
        }
    }
}
