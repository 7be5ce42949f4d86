//! Runtime configuration, read from a TOML file.
//!
//! Every field has a default, so a missing file or an empty one yields a
//! working local setup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Local,
    Remote,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "remote" => Ok(BackendKind::Remote),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendKind,

    /// SQLite file holding the local key/value store.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// YAML list of measures used instead of the built-in seed set.
    #[serde(default)]
    pub seed_file: Option<PathBuf>,

    /// "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub documents: DocumentsConfig,

    #[serde(default)]
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_url")]
    pub base_url: String,

    /// Falls back to the `token` entry of the local store when unset.
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentsConfig {
    #[serde(default = "default_documents_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("votum.db")
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_remote_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_documents_url() -> String {
    "https://search.dip.bundestag.de/api/v1".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    30
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_remote_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            base_url: default_documents_url(),
            api_key: None,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            db_path: default_db_path(),
            seed_file: None,
            log_format: default_log_format(),
            log_level: default_log_level(),
            remote: RemoteConfig::default(),
            documents: DocumentsConfig::default(),
            polling: PollingConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Defaults when the file does not exist; parse errors still fail.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_toml_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_secs)
    }

    pub fn poll_interval(&self) -> time::Duration {
        time::Duration::seconds(self.polling.interval_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.backend, BackendKind::Local);
        assert_eq!(config.poll_interval(), time::Duration::seconds(30));
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::from_toml_str(
            r#"
            backend = "remote"
            db_path = "/tmp/votum-test.db"
            log_format = "json"

            [remote]
            base_url = "https://api.example.org"
            token = "secret"

            [polling]
            interval_secs = 120
            "#,
        )
        .unwrap();

        assert_eq!(config.backend, BackendKind::Remote);
        assert_eq!(config.db_path, PathBuf::from("/tmp/votum-test.db"));
        assert_eq!(config.remote.token.as_deref(), Some("secret"));
        assert_eq!(config.remote.timeout_secs, 10);
        assert_eq!(config.poll_interval(), time::Duration::minutes(2));
        assert_eq!(config.documents, DocumentsConfig::default());
    }

    #[test]
    fn unknown_backend_is_an_error() {
        assert!(Config::from_toml_str(r#"backend = "carrier-pigeon""#).is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }
}
