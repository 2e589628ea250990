//! Configuration module for the watch server.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `FE_` and use double underscores
//! to separate nested levels:
//! - `FE_WATCH__BACKEND=poll` sets `watch.backend`
//! - `FE_WATCH__POLL_INTERVAL_MS=250` sets `watch.poll_interval_ms`
//! - `FE_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::watcher::BackendKind;

const CONFIG_DIR: &str = ".file-events";
const CONFIG_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    /// Watch server settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Notification mechanism: "native" or "poll"
    #[serde(default)]
    pub backend: BackendKind,

    /// Scan interval for the poll backend
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Watch whole subtrees instead of direct children
    #[serde(default)]
    pub recursive: bool,

    /// How long a close waits for the watch thread
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Level for everything not listed in `modules`
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `file_events = "debug"`
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

// Default value functions
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_shutdown_timeout_ms() -> u64 {
    5000
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            poll_interval_ms: default_poll_interval_ms(),
            recursive: false,
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels
            .merge(Env::prefixed("FE_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find the settings file by looking for a `.file-events` directory
    /// from the current directory up to the root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(CONFIG_FILE));
            }
        }

        None
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }
}
