//! Configuration, read from `~/.config/tributary/config.toml` at startup.
//!
//! A default file with comments is created on first run. Missing fields
//! fall back to defaults, so a partial file is fine.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::fetcher::http_fetcher::DEFAULT_TIMEOUT_SECS;
use crate::scheduler::DEFAULT_WORKERS;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Size of the sync worker pool.
    pub workers: usize,
    /// Per-request fetch timeout in seconds.
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    /// Database path; defaults to the platform data directory.
    pub database: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            fetch_timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: concat!("tributary/", env!("CARGO_PKG_VERSION")).to_string(),
            database: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl Config {
    /// Load configuration from the default path, creating a commented
    /// default file when none exists.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::Io {
            path: config_path.clone(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path,
            source: e,
        })?;

        Ok(config)
    }

    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("tributary").join("config.toml"))
    }

    fn create_default_config(path: &PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.clone(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;

        Ok(())
    }

    fn default_config_content() -> String {
        format!(
            r#"# Tributary configuration
#
# workers: number of parallel sync workers (default {DEFAULT_WORKERS})
# fetch_timeout_secs: per-request HTTP timeout (default {DEFAULT_TIMEOUT_SECS})
# user_agent: User-Agent header sent with fetches
# database: path to the SQLite database (default: platform data dir)

# workers = {DEFAULT_WORKERS}
# fetch_timeout_secs = {DEFAULT_TIMEOUT_SECS}
# user_agent = "tributary/{version}"
# database = "/path/to/tributary.db"
"#,
            version = env!("CARGO_PKG_VERSION"),
        )
    }
}
