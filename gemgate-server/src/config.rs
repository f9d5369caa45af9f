//! # Configuration Management
//!
//! Server configuration is a JSON document with one section per concern:
//!
//! - [`ServerConfig`]: listen address defaults
//! - [`StorageConfig`]: data directory and the key of the index snapshot
//! - [`UpstreamSettings`]: the public registry gemgate falls back to
//! - [`LimitsConfig`]: upload size limit
//! - `logging`: [`LoggingConfig`] from `gemgate-logging`
//!
//! Every section and field has a default, so a partial file (or none at all)
//! is valid. `config.json` next to the crate manifest documents the defaults.
//!
//! ```rust,no_run
//! use gemgate_server::config::Config;
//!
//! // Falls back to defaults when the file does not exist
//! let config = Config::load_or_default("gemgate.json")?;
//! # Ok::<(), gemgate_server::AppError>(())
//! ```
//!
//! CLI flags and environment variables are applied on top by `main`.

use gemgate_logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AppResult;
use crate::upstream::UpstreamConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub upstream: UpstreamSettings,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub default_host: String,
    pub default_port: u16,
    /// Scheme shown in the startup banner, e.g. `https` behind a TLS proxy
    pub scheme: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            default_host: "0.0.0.0".to_string(),
            default_port: 3000,
            scheme: "http".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub default_data_dir: PathBuf,
    /// Blob key of the JSON index snapshot
    pub index_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            default_data_dir: PathBuf::from("./data"),
            index_key: "api/v1/dependencies.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    pub url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        let defaults = UpstreamConfig::default();
        UpstreamSettings {
            url: defaults.url,
            timeout_secs: defaults.timeout.as_secs(),
            user_agent: defaults.user_agent,
        }
    }
}

impl UpstreamSettings {
    /// Client settings; `max_body_size` bounds proxied request bodies.
    pub fn client_config(&self, max_body_size: usize) -> UpstreamConfig {
        UpstreamConfig {
            url: self.url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            user_agent: self.user_agent.clone(),
            max_body_size,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_upload_size_mb: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            max_upload_size_mb: 100,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config_str = fs::read_to_string(path)?;
        let config = serde_json::from_str(&config_str)?;
        Ok(config)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn max_upload_size_bytes(&self) -> usize {
        self.limits.max_upload_size_mb * 1024 * 1024
    }
}
