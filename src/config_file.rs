//! Configuration file management
//!
//! This module handles loading and saving the optional `config.toml`. Every
//! field has a default, so a missing file (or a partial one) is fine.

use crate::constants::{
    APP_BLOCK_POLL_INTERVAL_SECS, APP_BLOCK_POLL_MAX_SECS, APP_BLOCK_POLL_MIN_SECS, APP_DIR_NAME,
    DEFAULT_HOSTS_FILE, SETTINGS_POLL_INTERVAL_SECS, SETTINGS_POLL_MAX_SECS,
    SETTINGS_POLL_MIN_SECS, SNAPSHOT_CACHE_TTL_MS,
};
use crate::store::Store;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Application configuration stored in config.toml
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory holding savedPreferences.json and blockData.json
    pub data_dir: PathBuf,
    /// Hosts file used for website blocking and safe search
    pub hosts_file: PathBuf,
    /// Blocked-app poll interval in seconds (default: 8)
    pub app_block_poll_secs: u64,
    /// Settings-protection poll interval in seconds (default: 12)
    pub settings_poll_secs: u64,
    /// Process snapshot reuse window in milliseconds (default: 3000)
    pub snapshot_cache_ms: u64,
    /// Show a desktop notification when an overlay is raised
    pub notifications: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: Store::default_data_dir(),
            hosts_file: PathBuf::from(DEFAULT_HOSTS_FILE),
            app_block_poll_secs: APP_BLOCK_POLL_INTERVAL_SECS,
            settings_poll_secs: SETTINGS_POLL_INTERVAL_SECS,
            snapshot_cache_ms: SNAPSHOT_CACHE_TTL_MS,
            notifications: true,
        }
    }
}

impl Config {
    /// Get the standard config file path
    ///
    /// - Windows: `%APPDATA%\eagleblock\config.toml`
    /// - Linux: `~/.config/eagleblock/config.toml`
    /// - macOS: `~/Library/Application Support/eagleblock/config.toml`
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
            .join("config.toml")
    }

    /// Load config from standard location, defaults if there is none
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_path())
    }

    /// Load config from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, is not valid
    /// TOML, or has a poll interval outside its allowed range.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(APP_BLOCK_POLL_MIN_SECS..=APP_BLOCK_POLL_MAX_SECS).contains(&self.app_block_poll_secs)
        {
            anyhow::bail!(
                "app_block_poll_secs must be {}-{} (got {})",
                APP_BLOCK_POLL_MIN_SECS,
                APP_BLOCK_POLL_MAX_SECS,
                self.app_block_poll_secs
            );
        }
        if !(SETTINGS_POLL_MIN_SECS..=SETTINGS_POLL_MAX_SECS).contains(&self.settings_poll_secs) {
            anyhow::bail!(
                "settings_poll_secs must be {}-{} (got {})",
                SETTINGS_POLL_MIN_SECS,
                SETTINGS_POLL_MAX_SECS,
                self.settings_poll_secs
            );
        }
        Ok(())
    }

    /// Save config to standard location
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_path())
    }

    /// Save config to a specific path, creating its directory if needed
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        log::info!("Configuration saved to: {}", path.display());
        Ok(())
    }
}
