// plugsync-core/src/testutil.rs
//! Fixtures shared by the unit tests of this crate.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use plugsync_aio::sha256_bytes;
use plugsync_common::config::Config;
use plugsync_common::error::{PlugsyncError, Result};
use plugsync_common::model::{ArtifactSpec, CandidateArtifact};
use plugsync_net::DownloadedFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::fetch::{ArtifactFetcher, CandidateSource};
use crate::server::ServerControl;

pub fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Deterministic filler that differs per `seed`, stored uncompressed so the
/// archive size grows with it.
fn filler(seed: &str, len: usize) -> Vec<u8> {
    seed.bytes().cycle().take(len).collect()
}

pub fn plugin_jar(name: &str, version: &str, padding: usize) -> Vec<u8> {
    let descriptor = format!("name: {name}\nversion: {version}\nmain: org.example.{name}\n");
    let body = filler(&format!("{name}-{version}"), padding);
    zip_with(&[
        ("plugin.yml", descriptor.as_bytes()),
        ("org/example/Main.class", &body),
    ])
}

pub fn server_jar(padding: usize) -> Vec<u8> {
    let body = filler("server", padding);
    zip_with(&[
        ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n".as_slice()),
        ("io/papermc/paperclip/Main.class", &body),
    ])
}

pub fn test_config(root: &Path) -> Config {
    let raw = format!(
        r#"
        server_dir = "{root}/server"
        minecraft_version = "1.21.1"

        [http]
        rate_limit_delay = "0s"

        [limits]
        min_plugin_bytes = 1024
        min_server_bytes = 2048

        [retention]
        keep = 3

        [server]
        jar = "server.jar"
        announce_minutes = 0
        stop_timeout = "1s"
        start_wait = "0s"

        [[artifact]]
        name = "X"
        file_pattern = "X-*.jar"
        source = {{ type = "modrinth", project_id = "x" }}

        [[artifact]]
        name = "Y"
        source = {{ type = "modrinth", project_id = "y" }}

        [[artifact]]
        name = "Z"
        source = {{ type = "modrinth", project_id = "z" }}

        [[artifact]]
        name = "purpur"
        kind = "server"
        source = {{ type = "purpur" }}
        "#,
        root = root.display()
    );
    Config::from_toml_str(&raw).unwrap()
}

/// Serves fixed bytes per URL and counts downloads.
#[derive(Default)]
pub struct FakeFetcher {
    pub bodies: Mutex<HashMap<String, Vec<u8>>>,
    pub fetches: AtomicUsize,
}

impl FakeFetcher {
    pub fn serve(&self, url: &str, bytes: Vec<u8>) {
        self.bodies.lock().unwrap().insert(url.to_string(), bytes);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ArtifactFetcher for FakeFetcher {
    async fn fetch(&self, url: &str, dest: &Path, max_bytes: u64) -> Result<DownloadedFile> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let body = self.bodies.lock().unwrap().get(url).cloned();
        let Some(body) = body else {
            return Err(PlugsyncError::Fetch(
                "artifact".into(),
                url.into(),
                "HTTP 404".into(),
            ));
        };
        if body.len() as u64 > max_bytes {
            return Err(PlugsyncError::Fetch(
                "artifact".into(),
                url.into(),
                "too large".into(),
            ));
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, &body)?;
        Ok(DownloadedFile {
            path: dest.to_path_buf(),
            size_bytes: body.len() as u64,
            sha256: sha256_bytes(&body),
        })
    }
}

/// Answers metadata lookups from a table keyed by identity.
#[derive(Default)]
pub struct FakeSource {
    pub candidates: Mutex<HashMap<String, Result<Option<CandidateArtifact>>>>,
}

impl FakeSource {
    pub fn offer(&self, identity: &str, candidate: CandidateArtifact) {
        self.candidates
            .lock()
            .unwrap()
            .insert(identity.to_string(), Ok(Some(candidate)));
    }

    pub fn fail(&self, identity: &str, reason: &str) {
        self.candidates.lock().unwrap().insert(
            identity.to_string(),
            Err(PlugsyncError::Fetch(
                identity.into(),
                "https://api.example.org".into(),
                reason.into(),
            )),
        );
    }
}

impl CandidateSource for FakeSource {
    async fn latest(&self, spec: &ArtifactSpec) -> Result<Option<CandidateArtifact>> {
        self.candidates
            .lock()
            .unwrap()
            .get(&spec.name)
            .cloned()
            .unwrap_or(Ok(None))
    }
}

/// Records lifecycle calls instead of driving a real process.
#[derive(Default)]
pub struct FakeServer {
    pub running: AtomicBool,
    pub stops: AtomicUsize,
    pub starts: AtomicUsize,
    pub announcements: Mutex<Vec<String>>,
    /// Makes `stop` report that the server would not go down.
    pub refuse_stop: AtomicBool,
}

impl FakeServer {
    pub fn running() -> Self {
        let server = Self::default();
        server.running.store(true, Ordering::SeqCst);
        server
    }
}

impl ServerControl for FakeServer {
    async fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn stop(&self, _grace: Duration) -> bool {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.refuse_stop.load(Ordering::SeqCst) {
            return false;
        }
        self.running.store(false, Ordering::SeqCst);
        true
    }

    async fn start(&self) -> bool {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        true
    }

    async fn announce(&self, message: &str) -> bool {
        self.announcements.lock().unwrap().push(message.to_string());
        true
    }
}
