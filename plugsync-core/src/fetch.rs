// plugsync-core/src/fetch.rs
//! The two network seams of a cycle: metadata lookup and artifact download.

use std::path::Path;

use plugsync_common::error::Result;
use plugsync_common::model::{ArtifactSpec, CandidateArtifact};
use plugsync_net::{download_to_file, DownloadedFile, RegistryClient};

/// Resolves the newest published artifact for a configured identity.
/// `Ok(None)` means there is nothing installable right now.
#[allow(async_fn_in_trait)]
pub trait CandidateSource {
    async fn latest(&self, spec: &ArtifactSpec) -> Result<Option<CandidateArtifact>>;
}

/// Downloads `url` to `dest`, never writing more than `max_bytes`.
/// Implementations remove `dest` when they fail.
#[allow(async_fn_in_trait)]
pub trait ArtifactFetcher {
    async fn fetch(&self, url: &str, dest: &Path, max_bytes: u64) -> Result<DownloadedFile>;
}

impl CandidateSource for RegistryClient {
    async fn latest(&self, spec: &ArtifactSpec) -> Result<Option<CandidateArtifact>> {
        self.fetch_latest(spec).await
    }
}

impl ArtifactFetcher for RegistryClient {
    async fn fetch(&self, url: &str, dest: &Path, max_bytes: u64) -> Result<DownloadedFile> {
        download_to_file(self.http(), url, dest, max_bytes).await
    }
}
