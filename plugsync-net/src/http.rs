use std::path::{Path, PathBuf};

use futures::StreamExt;
use plugsync_common::config::Config;
use plugsync_common::error::{PlugsyncError, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tokio::fs::File as TokioFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

use crate::validation::validate_url;

/// A file written by `download_to_file`.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Lowercase hex SHA-256 of the bytes written.
    pub sha256: String,
}

pub fn build_http_client(config: &Config) -> Result<Client> {
    let mut headers = HeaderMap::new();
    let agent = HeaderValue::from_str(&config.http.user_agent).map_err(|e| {
        PlugsyncError::Config(format!("Invalid user agent '{}': {e}", config.http.user_agent))
    })?;
    headers.insert(USER_AGENT, agent);
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    Client::builder()
        .timeout(config.http.timeout)
        .connect_timeout(config.http.connect_timeout)
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| PlugsyncError::Generic(format!("Failed to build HTTP client: {e}")))
}

fn fetch_error(what: &str, url: &str, reason: impl Into<String>) -> PlugsyncError {
    PlugsyncError::Fetch(what.to_string(), url.to_string(), reason.into())
}

/// GETs a JSON document. A 404 is `Ok(None)`: the registry has nothing for
/// this query.
pub async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    query: &[(&str, String)],
    bearer: Option<&str>,
) -> Result<Option<T>> {
    validate_url(url).map_err(|reason| fetch_error("metadata", url, reason))?;
    let mut request = client.get(url).header(ACCEPT, "application/json");
    if !query.is_empty() {
        request = request.query(query);
    }
    if let Some(token) = bearer {
        request = request.header(AUTHORIZATION, format!("Bearer {token}"));
    }

    let response = request.send().await.map_err(|e| {
        debug!("HTTP request failed for {url}: {e}");
        fetch_error("metadata", url, format!("HTTP request failed: {e}"))
    })?;
    let status = response.status();
    debug!("Received HTTP status: {} for {}", status, url);

    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        let body_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read response body".to_string());
        error!("HTTP error {} for URL {}: {}", status, url, body_text);
        return Err(fetch_error("metadata", url, format!("HTTP error {status}")));
    }

    let value = response
        .json::<T>()
        .await
        .map_err(|e| fetch_error("metadata", url, format!("Malformed JSON response: {e}")))?;
    Ok(Some(value))
}

/// Streams `url` into `dest`, hashing on the fly. Transfers larger than
/// `max_bytes` are aborted. On any failure `dest` is removed.
pub async fn download_to_file(
    client: &Client,
    url: &str,
    dest: &Path,
    max_bytes: u64,
) -> Result<DownloadedFile> {
    let what = dest
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    validate_url(url).map_err(|reason| fetch_error(&what, url, reason))?;

    let result = stream_to_file(client, url, dest, max_bytes, &what).await;
    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(dest).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    "Could not remove partial download {}: {}",
                    dest.display(),
                    e
                );
            }
        }
    }
    result
}

async fn stream_to_file(
    client: &Client,
    url: &str,
    dest: &Path,
    max_bytes: u64,
    what: &str,
) -> Result<DownloadedFile> {
    debug!("Downloading {} to {}", url, dest.display());
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| fetch_error(what, url, format!("HTTP request failed: {e}")))?;
    let status = response.status();
    if !status.is_success() {
        return Err(match status {
            StatusCode::NOT_FOUND => fetch_error(what, url, "Resource not found (404)"),
            StatusCode::FORBIDDEN => fetch_error(what, url, "Access forbidden (403)"),
            _ => fetch_error(what, url, format!("HTTP error {status}")),
        });
    }
    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return Err(fetch_error(
                what,
                url,
                format!("Announced size {len} exceeds limit of {max_bytes} bytes"),
            ));
        }
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut out = TokioFile::create(dest).await.map_err(|e| {
        PlugsyncError::IoError(format!("Failed to create {}: {}", dest.display(), e))
    })?;

    let mut hasher = Sha256::new();
    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let bytes =
            chunk.map_err(|e| fetch_error(what, url, format!("Transfer interrupted: {e}")))?;
        written += bytes.len() as u64;
        if written > max_bytes {
            return Err(fetch_error(
                what,
                url,
                format!("Transfer exceeds limit of {max_bytes} bytes"),
            ));
        }
        hasher.update(&bytes);
        out.write_all(&bytes).await.map_err(|e| {
            PlugsyncError::IoError(format!("Failed to write {}: {}", dest.display(), e))
        })?;
    }
    out.flush().await?;
    out.sync_all().await?;
    drop(out);

    let sha256 = hex::encode(hasher.finalize());
    debug!(
        "Finished download of {} ({} bytes, sha256 {})",
        url, written, sha256
    );
    Ok(DownloadedFile {
        path: dest.to_path_buf(),
        size_bytes: written,
        sha256,
    })
}
