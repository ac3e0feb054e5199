use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tollgate_scripting_host::{ScriptObjects, ScriptOptions};
use tracing::info;

use crate::paths::ProjectPaths;

pub const APP_NAME: &str = "tollgate";

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Config file not found")]
    NotFound,
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("IO error reading config: {0}")]
    IoError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigSaveError {
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("IO error writing config: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Address the game client connects to
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Address of the game server
    #[serde(default)]
    pub server_address: Option<String>,
}

fn default_listen_address() -> String {
    "127.0.0.1:33333".to_string()
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            server_address: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Timeout used by `wait_any` when a script passes none (no timeout if unset)
    #[serde(default)]
    pub default_timeout_ms: Option<u64>,
}

impl JournalConfig {
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptingConfig {
    /// Whether scripting is enabled (default: true)
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Script loaded at startup
    #[serde(default)]
    pub script_path: Option<PathBuf>,

    /// Reload the script when its file changes (default: true)
    #[serde(default = "default_hot_reload")]
    pub hot_reload: bool,

    /// Hot reload check interval in milliseconds (default: 1000ms)
    #[serde(default = "default_hot_reload_interval")]
    pub hot_reload_interval_ms: u64,

    /// Named object ids remembered between sessions
    #[serde(default)]
    pub objects: ScriptObjects,

    #[serde(default)]
    pub options: ScriptOptions,
}

fn default_enabled() -> bool {
    true
}

fn default_hot_reload() -> bool {
    true
}

fn default_hot_reload_interval() -> u64 {
    1000
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            script_path: None,
            hot_reload: default_hot_reload(),
            hot_reload_interval_ms: default_hot_reload_interval(),
            objects: ScriptObjects::new(),
            options: ScriptOptions::default(),
        }
    }
}

impl ScriptingConfig {
    pub fn hot_reload_interval(&self) -> Duration {
        Duration::from_millis(self.hot_reload_interval_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also log to `<data_dir>/logs/<component>.log`
    #[serde(default)]
    pub file: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TollgateConfig {
    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub journal: JournalConfig,

    #[serde(default)]
    pub scripting: ScriptingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TollgateConfig {
    pub fn config_path() -> Option<PathBuf> {
        ProjectPaths::new(APP_NAME).map(|paths| paths.config_dir().join("config.toml"))
    }

    pub fn load() -> Result<Self, ConfigLoadError> {
        let path = Self::config_path().ok_or(ConfigLoadError::NotFound)?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigLoadError> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound);
        }

        let content =
            fs::read_to_string(path).map_err(|e| ConfigLoadError::IoError(e.to_string()))?;
        let config =
            toml::from_str(&content).map_err(|e| ConfigLoadError::ParseError(e.to_string()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigSaveError> {
        let path = Self::config_path().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "Failed to find home directory")
        })?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigSaveError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        info!("Saved config to {}", path.display());
        Ok(())
    }
}
