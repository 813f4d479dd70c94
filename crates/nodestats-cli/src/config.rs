//! Configuration file support.
//!
//! Settings live in `~/.config/nodestats/config.toml` (Linux) or the
//! platform equivalent. `NODESTATS_CONFIG_DIR` points at a different
//! directory, which the integration tests rely on.
//!
//! ```toml
//! base_url = "http://collector.example:8005"
//! timeout_secs = 10
//! page_size = 100
//! graph_type = "deltaBytesPerSec"
//! graph_step = 5
//! data_interval = 5000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use nodestats_core::RouteParams;
use nodestats_core::query::DEFAULT_PAGE_SIZE;
use nodestats_core::route::{DEFAULT_DATA_INTERVAL_MS, DEFAULT_GRAPH_STEP_SECS, DEFAULT_GRAPH_TYPE};

/// Environment variable overriding the configuration directory.
pub const CONFIG_DIR_ENV: &str = "NODESTATS_CONFIG_DIR";

const DEFAULT_BASE_URL: &str = "http://localhost:8005";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid backend URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Failed to find config directory")]
    NoConfigDir,
}

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root URL of the stats backend.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Default rows per page.
    pub page_size: usize,
    /// Default aggregate chart metric.
    pub graph_type: String,
    /// Default aggregate chart step in seconds.
    pub graph_step: u64,
    /// Default summary refresh interval in milliseconds.
    pub data_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            page_size: DEFAULT_PAGE_SIZE,
            graph_type: DEFAULT_GRAPH_TYPE.to_string(),
            graph_step: DEFAULT_GRAPH_STEP_SECS,
            data_interval: DEFAULT_DATA_INTERVAL_MS,
        }
    }
}

impl Config {
    /// Load from the default location; a missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_dir()?.join("config.toml"))
    }

    /// Load from an explicit path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Backend root, with `override_url` taking precedence over the file.
    pub fn backend_url(&self, override_url: Option<&str>) -> Result<Url, ConfigError> {
        let raw = override_url.unwrap_or(&self.base_url);
        let mut url = Url::parse(raw).map_err(|source| ConfigError::InvalidUrl {
            url: raw.to_string(),
            source,
        })?;
        // Joining relative paths needs a trailing slash on the base.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Route parameters a fresh view starts from.
    pub fn default_route(&self) -> RouteParams {
        RouteParams {
            length: self.page_size,
            graph_type: self.graph_type.clone(),
            graph_step: self.graph_step,
            data_interval: self.data_interval,
        }
    }
}

/// Directory holding `config.toml` and `view.json`.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    directories::ProjectDirs::from("", "", "nodestats")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or(ConfigError::NoConfigDir)
}
