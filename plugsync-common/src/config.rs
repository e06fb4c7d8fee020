// plugsync-common/src/config.rs
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;
use tracing::debug;

use super::error::{PlugsyncError, Result};
use super::model::{ArtifactKind, ArtifactSpec};

const CONFIG_ENV_VAR: &str = "PLUGSYNC_CONFIG";
const GITHUB_TOKEN_ENV_VAR: &str = "PLUGSYNC_GITHUB_TOKEN";
const LEDGER_FILENAME: &str = "ledger.json";
const LAST_CHECK_FILENAME: &str = ".plugsync_last_check";

const DEFAULT_USER_AGENT: &str = "plugsync (Rust; Minecraft plugin updater)";
const DEFAULT_MODRINTH_API: &str = "https://api.modrinth.com/v2";
const DEFAULT_SPIGET_API: &str = "https://api.spiget.org/v2";
const DEFAULT_PURPUR_API: &str = "https://api.purpurmc.org/v2";
const DEFAULT_GITHUB_API: &str = "https://api.github.com";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub server_dir: PathBuf,
    #[serde(default)]
    pub plugins_dir: Option<PathBuf>,
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
    #[serde(default)]
    pub server_backup_dir: Option<PathBuf>,
    #[serde(default)]
    pub quarantine_dir: Option<PathBuf>,

    pub minecraft_version: String,
    #[serde(default = "default_loaders")]
    pub loaders: Vec<String>,
    #[serde(default = "default_check_interval", with = "humantime_serde")]
    pub check_interval: Duration,

    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiEndpoints,

    #[serde(default, rename = "artifact")]
    pub artifacts: Vec<ArtifactSpec>,

    /// Filled from the environment, never from the file.
    #[serde(skip)]
    pub github_api_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub user_agent: String,
    /// Pause between two identities of the same cycle.
    #[serde(with = "humantime_serde")]
    pub rate_limit_delay: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            timeout: Duration::from_secs(300),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            rate_limit_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub min_plugin_bytes: u64,
    pub min_server_bytes: u64,
    pub max_artifact_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min_plugin_bytes: 1024,
            min_server_bytes: 1024 * 1024,
            max_artifact_bytes: 256 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Backups kept per identity.
    pub keep: usize,
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep: 5,
            max_age: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub screen_name: String,
    pub jar: String,
    pub java: String,
    pub jvm_args: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub stop_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub start_wait: Duration,
    /// Countdown broadcast before a restart, 0 disables it.
    pub announce_minutes: u64,
    pub restart_on_update: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            screen_name: "minecraft".to_string(),
            jar: "server.jar".to_string(),
            java: "java".to_string(),
            jvm_args: vec!["-Xmx4G".to_string(), "-Xms2G".to_string()],
            stop_timeout: Duration::from_secs(60),
            start_wait: Duration::from_secs(10),
            announce_minutes: 5,
            restart_on_update: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiEndpoints {
    pub modrinth: String,
    pub spiget: String,
    pub purpur: String,
    pub github: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            modrinth: DEFAULT_MODRINTH_API.to_string(),
            spiget: DEFAULT_SPIGET_API.to_string(),
            purpur: DEFAULT_PURPUR_API.to_string(),
            github: DEFAULT_GITHUB_API.to_string(),
        }
    }
}

fn default_loaders() -> Vec<String> {
    ["purpur", "paper", "spigot", "bukkit"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_check_interval() -> Duration {
    Duration::from_secs(10 * 3600)
}

impl Config {
    /// Loads the config from `path`, or from `$PLUGSYNC_CONFIG`, or from the
    /// platform config directory.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path()?,
        };
        debug!("Loading plugsync configuration from {}", path.display());

        let raw = std::fs::read_to_string(&path).map_err(|e| {
            PlugsyncError::Config(format!("Cannot read config {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.github_api_token = env::var(GITHUB_TOKEN_ENV_VAR)
            .ok()
            .filter(|s| !s.is_empty());

        debug!("Configuration loaded successfully.");
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for artifact in &self.artifacts {
            if artifact.name.trim().is_empty() {
                return Err(PlugsyncError::Config(
                    "artifact with an empty name".to_string(),
                ));
            }
            if !seen.insert(artifact.name.as_str()) {
                return Err(PlugsyncError::Config(format!(
                    "artifact '{}' is configured twice",
                    artifact.name
                )));
            }
        }
        if self.retention.keep == 0 {
            return Err(PlugsyncError::Config(
                "retention.keep must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn server_dir(&self) -> &Path {
        &self.server_dir
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.plugins_dir
            .clone()
            .unwrap_or_else(|| self.server_dir.join("plugins"))
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| self.server_dir.join(".plugsync"))
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.state_dir().join(LEDGER_FILENAME)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.state_dir().join("staging")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir().join("logs")
    }

    pub fn last_check_path(&self) -> PathBuf {
        self.state_dir().join(LAST_CHECK_FILENAME)
    }

    pub fn plugin_backup_dir(&self) -> PathBuf {
        self.backup_dir
            .clone()
            .unwrap_or_else(|| self.server_dir.join("pluginsold"))
    }

    pub fn server_backup_dir(&self) -> PathBuf {
        self.server_backup_dir
            .clone()
            .unwrap_or_else(|| self.server_dir.join("server_backups"))
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.quarantine_dir
            .clone()
            .unwrap_or_else(|| self.server_dir.join("pluginerrors"))
    }

    /// Directory the running server reads this kind of artifact from.
    pub fn live_dir(&self, kind: ArtifactKind) -> PathBuf {
        match kind {
            ArtifactKind::Plugin => self.plugins_dir(),
            ArtifactKind::Server => self.server_dir.clone(),
        }
    }

    pub fn backup_root(&self, kind: ArtifactKind) -> PathBuf {
        match kind {
            ArtifactKind::Plugin => self.plugin_backup_dir(),
            ArtifactKind::Server => self.server_backup_dir(),
        }
    }

    pub fn min_artifact_bytes(&self, kind: ArtifactKind) -> u64 {
        match kind {
            ArtifactKind::Plugin => self.limits.min_plugin_bytes,
            ArtifactKind::Server => self.limits.min_server_bytes,
        }
    }

    /// Every directory plugsync writes to.
    pub fn managed_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.plugins_dir(),
            self.state_dir(),
            self.staging_dir(),
            self.logs_dir(),
            self.plugin_backup_dir(),
            self.server_backup_dir(),
            self.quarantine_dir(),
        ]
    }

    pub fn enabled_artifacts(&self) -> impl Iterator<Item = &ArtifactSpec> {
        self.artifacts.iter().filter(|a| a.enabled)
    }

    pub fn artifact(&self, name: &str) -> Option<&ArtifactSpec> {
        self.artifacts.iter().find(|a| a.name == name)
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    if let Some(p) = env::var_os(CONFIG_ENV_VAR).filter(|s| !s.is_empty()) {
        return Ok(PathBuf::from(p));
    }
    ProjectDirs::from("", "", "plugsync")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .ok_or_else(|| {
            PlugsyncError::Config(format!(
                "No home directory found; set {CONFIG_ENV_VAR} to the config path"
            ))
        })
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        server_dir = "/srv/mc"
        minecraft_version = "1.21.1"
    "#;

    #[test]
    fn minimal_config_fills_defaults() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.plugins_dir(), PathBuf::from("/srv/mc/plugins"));
        assert_eq!(
            config.ledger_path(),
            PathBuf::from("/srv/mc/.plugsync/ledger.json")
        );
        assert_eq!(config.check_interval, Duration::from_secs(36000));
        assert_eq!(config.limits.min_plugin_bytes, 1024);
        assert_eq!(config.retention.keep, 5);
        assert_eq!(config.loaders.len(), 4);
        assert_eq!(config.live_dir(ArtifactKind::Server), PathBuf::from("/srv/mc"));
    }

    #[test]
    fn durations_and_artifacts_parse() {
        let raw = format!(
            r#"{MINIMAL}
            check_interval = "2h 30m"

            [retention]
            keep = 3
            max_age = "3days"

            [[artifact]]
            name = "LuckPerms"
            file_pattern = "LuckPerms-Bukkit-*.jar"
            source = {{ type = "modrinth", project_id = "Vebnzrzj" }}

            [[artifact]]
            name = "Skript"
            enabled = false
            source = {{ type = "spigot", resource_id = "114544" }}
            "#
        );
        let config = Config::from_toml_str(&raw).unwrap();
        assert_eq!(config.check_interval, Duration::from_secs(9000));
        assert_eq!(config.retention.max_age, Duration::from_secs(3 * 86400));
        assert_eq!(config.artifacts.len(), 2);
        assert_eq!(config.enabled_artifacts().count(), 1);
        assert!(config.artifact("Skript").is_some());
    }

    #[test]
    fn duplicate_identities_are_rejected() {
        let raw = format!(
            r#"{MINIMAL}
            [[artifact]]
            name = "TAB"
            source = {{ type = "modrinth", project_id = "gG7VFbG0" }}
            [[artifact]]
            name = "TAB"
            source = {{ type = "modrinth", project_id = "gG7VFbG0" }}
            "#
        );
        let err = Config::from_toml_str(&raw).unwrap_err();
        assert!(matches!(err, PlugsyncError::Config(_)));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.minecraft_version, "1.21.1");

        let missing = Config::load(Some(&dir.path().join("nope.toml")));
        assert!(matches!(missing, Err(PlugsyncError::Config(_))));
    }
}
