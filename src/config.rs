use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const FILENAME: &str = "config.toml";
pub const API_URL_ENV: &str = "VIBEDIT_API_URL";
const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Client settings stored in `~/.vibedit/config.toml`.
///
/// ```toml
/// api_base_url = "https://agent.example.com/api"
/// request_timeout_secs = 180
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    /// Agent service endpoint. `VIBEDIT_API_URL` wins over the file.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Per-request timeout; agent turns can take minutes.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Where snapshots are written for "Open in browser".
    #[serde(default = "default_preview_dir")]
    pub preview_dir: PathBuf,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_preview_dir() -> PathBuf {
    app_dir().join("preview")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            preview_dir: default_preview_dir(),
        }
    }
}

pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("USERPROFILE").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn app_dir() -> PathBuf {
    home_dir().join(".vibedit")
}

impl Config {
    /// Loads `config.toml` from `dir`, then applies the environment override.
    ///
    /// A missing file means defaults; a malformed one is an error.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(FILENAME);
        let config = match fs::read_to_string(&path) {
            Ok(contents) => {
                toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Config::default(),
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        Ok(config.with_api_url_override(std::env::var(API_URL_ENV).ok()))
    }

    pub fn with_api_url_override(mut self, api_url: Option<String>) -> Self {
        if let Some(url) = api_url.filter(|url| !url.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        self.api_base_url = self.api_base_url.trim_end_matches('/').to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, ConfigError};
    use std::fs;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let config = Config::load(dir.path()).expect("missing config should load");
        assert_eq!(config.request_timeout_secs, 120);
        assert!(config.api_base_url.starts_with("http"));
    }

    #[test]
    fn partial_file_fills_remaining_keys() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        fs::write(
            dir.path().join("config.toml"),
            "request_timeout_secs = 30\n",
        )
        .expect("config should write");

        let config = Config::load(dir.path()).expect("partial config should load");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.preview_dir, Config::default().preview_dir);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        fs::write(dir.path().join("config.toml"), "request_timeout_secs = \"soon\"")
            .expect("config should write");

        let error = Config::load(dir.path()).expect_err("bad config should fail");
        assert!(matches!(error, ConfigError::Parse { .. }));
    }

    #[test]
    fn api_url_override_replaces_file_value_and_trims_slash() {
        let config = Config {
            api_base_url: "https://deployed.example.com/api/".to_string(),
            ..Config::default()
        };

        let kept = config.clone().with_api_url_override(None);
        assert_eq!(kept.api_base_url, "https://deployed.example.com/api");

        let overridden = config.with_api_url_override(Some("http://127.0.0.1:9000/".to_string()));
        assert_eq!(overridden.api_base_url, "http://127.0.0.1:9000");
    }
}
