use serde::Deserialize;
use std::{env, fs, net::SocketAddr, path::Path, path::PathBuf, time::Duration};
use thiserror::Error;

use crate::autosave::AutosaveConfig;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/designs.db?mode=rwc";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3001";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_AUTOSAVE_DELAY_MS: u64 = 3000;
pub const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Keys accepted in the TOML config file. Every key is optional.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub database_url: Option<String>,
    pub listen_addr: Option<String>,
    pub log_dir: Option<String>,
    pub autosave_delay_ms: Option<u64>,
    pub max_body_bytes: Option<usize>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub log_dir: PathBuf,
    /// Debounce delay for autosave coordinators. The HTTP server never spawns
    /// one; processes embedding the library read it through
    /// [`ServerConfig::autosave`].
    pub autosave_delay_ms: u64,
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Loads the config file at `config_path` (if any), then lets environment
    /// variables override it. Missing values fall back to the defaults.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match config_path {
            Some(path) => FileConfig::from_path(path)?,
            None => FileConfig::default(),
        };
        Self::from_sources(file, |key| env::var(key).ok())
    }

    pub fn from_sources(
        file: FileConfig,
        env_var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let database_url = env_var("DATABASE_URL")
            .or(file.database_url)
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_owned());

        let listen_addr = env_var("LISTEN_ADDR")
            .or(file.listen_addr)
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_owned());
        let listen_addr = listen_addr.parse().map_err(|_| ConfigError::Invalid {
            key: "listen_addr",
            value: listen_addr.clone(),
        })?;

        let log_dir = env_var("LOG_DIR")
            .or(file.log_dir)
            .unwrap_or_else(|| DEFAULT_LOG_DIR.to_owned())
            .into();

        let autosave_delay_ms = match env_var("AUTOSAVE_DELAY_MS") {
            Some(raw) => parse_number("autosave_delay_ms", raw)?,
            None => file.autosave_delay_ms.unwrap_or(DEFAULT_AUTOSAVE_DELAY_MS),
        };
        let max_body_bytes = match env_var("MAX_BODY_BYTES") {
            Some(raw) => parse_number("max_body_bytes", raw)?,
            None => file.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES),
        };

        Ok(ServerConfig {
            database_url,
            listen_addr,
            log_dir,
            autosave_delay_ms,
            max_body_bytes,
        })
    }

    /// Settings to pass to [`crate::autosave::AutosaveCoordinator::spawn`] for
    /// documents edited by an embedding process.
    pub fn autosave(&self) -> AutosaveConfig {
        AutosaveConfig {
            delay: Duration::from_millis(self.autosave_delay_ms),
            ..Default::default()
        }
    }

    /// Directory holding the SQLite file, when the database is file-backed.
    pub fn sqlite_data_dir(&self) -> Option<PathBuf> {
        let path = self
            .database_url
            .strip_prefix("sqlite://")
            .or_else(|| self.database_url.strip_prefix("sqlite:"))?;
        let path = path.split('?').next().unwrap_or(path);
        if path.is_empty() || path.contains(":memory:") {
            return None;
        }
        Path::new(path)
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value: raw })
}
