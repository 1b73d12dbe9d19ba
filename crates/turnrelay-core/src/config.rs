//! Relay configuration
//!
//! Loaded once from `~/.turnrelay/config.toml` (or an explicit path) and
//! threaded through constructors. A missing file yields defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants;

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub agent: AgentConfig,
    pub aggregator: AggregatorConfig,
    pub chat: ChatConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Externally reachable base URL, used for "view full output" links
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: constants::http::DEFAULT_BIND.to_string(),
            public_url: constants::http::DEFAULT_PUBLIC_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file; defaults to `~/.turnrelay/turnrelay.db`
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join(constants::paths::DATABASE_FILE_NAME)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub command: String,
    pub args: Vec<String>,
    pub turn_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: constants::agent::DEFAULT_COMMAND.to_string(),
            args: Vec::new(),
            turn_timeout_secs: constants::agent::TURN_TIMEOUT_SECS,
        }
    }
}

impl AgentConfig {
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub flush_fragment_threshold: usize,
    pub display_cap: usize,
    pub newline_retain_ratio: f64,
    /// Base URL for plan links; falls back to `server.public_url`
    pub link_base_url: Option<String>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            flush_fragment_threshold: constants::aggregator::FLUSH_FRAGMENT_THRESHOLD,
            display_cap: constants::aggregator::DISPLAY_CAP,
            newline_retain_ratio: constants::aggregator::NEWLINE_RETAIN_RATIO,
            link_base_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub api_base: String,
    /// Bearer token; prefer `token_env` over storing it in the file
    pub token: Option<String>,
    pub token_env: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base: constants::chat::DEFAULT_API_BASE.to_string(),
            token: None,
            token_env: constants::chat::DEFAULT_TOKEN_ENV.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay server the CLI client talks to
    pub base_url: String,
    pub not_ready_retry_delay_ms: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: constants::http::DEFAULT_PUBLIC_URL.to_string(),
            not_ready_retry_delay_ms: constants::http::NOT_READY_RETRY_DELAY.as_millis() as u64,
            connect_timeout_secs: constants::http::CONNECT_TIMEOUT.as_secs(),
        }
    }
}

impl ClientConfig {
    pub fn not_ready_retry_delay(&self) -> Duration {
        Duration::from_millis(self.not_ready_retry_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// `~/.turnrelay`
pub fn data_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(constants::paths::DATA_DIR_NAME))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(data_dir()?.join(constants::paths::CONFIG_FILE_NAME))
}

impl RelayConfig {
    /// Load configuration from `path`, or the default location when `None`
    ///
    /// A missing file yields defaults; a file that exists but does not parse
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path()?,
        };

        if !path.exists() {
            debug!("No config at {:?}, using defaults", path);
            let mut config = Self::default();
            config.resolve_secrets();
            return Ok(config);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        let mut config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", path))?;
        config.resolve_secrets();

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Fill the chat token from its environment variable when not set inline
    pub fn resolve_secrets(&mut self) {
        if self.chat.token.is_none() {
            self.chat.token = std::env::var(&self.chat.token_env)
                .ok()
                .filter(|t| !t.trim().is_empty());
        }
    }

    /// Base URL used to build plan links
    pub fn link_base_url(&self) -> &str {
        self.aggregator
            .link_base_url
            .as_deref()
            .unwrap_or(&self.server.public_url)
    }
}
