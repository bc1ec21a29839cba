//! Configuration parsing for EagleBlock
//!
//! This module handles parsing of environment variables that can optionally
//! override settings from the config file (see config_file module).
//!
//! Environment variables (all optional):
//! - EAGLEBLOCK_DATA_DIR: Override the data directory
//! - EAGLEBLOCK_APP_POLL_SECS: Override the blocked-app poll interval
//! - EAGLEBLOCK_SETTINGS_POLL_SECS: Override the settings-protection poll interval

use crate::config_file::Config;
use crate::constants::{
    APP_BLOCK_POLL_MAX_SECS, APP_BLOCK_POLL_MIN_SECS, SETTINGS_POLL_MAX_SECS,
    SETTINGS_POLL_MIN_SECS,
};
use log::{debug, info, warn};
use std::env;
use std::path::PathBuf;

pub const DATA_DIR_VAR: &str = "EAGLEBLOCK_DATA_DIR";
pub const APP_POLL_VAR: &str = "EAGLEBLOCK_APP_POLL_SECS";
pub const SETTINGS_POLL_VAR: &str = "EAGLEBLOCK_SETTINGS_POLL_SECS";

fn parse_bounded_secs(var: &str, min: u64, max: u64) -> Option<u64> {
    match env::var(var) {
        Ok(val) => match val.trim().parse::<u64>() {
            Ok(seconds) if (min..=max).contains(&seconds) => {
                info!("{} set via environment variable: {} seconds", var, seconds);
                Some(seconds)
            }
            Ok(seconds) => {
                warn!(
                    "Invalid {}: {} (must be {}-{} seconds). Using configured value.",
                    var, seconds, min, max
                );
                None
            }
            Err(e) => {
                warn!("Failed to parse {}: {}. Using configured value.", var, e);
                None
            }
        },
        Err(_) => {
            debug!("{} not set.", var);
            None
        }
    }
}

/// Parse the EAGLEBLOCK_APP_POLL_SECS environment variable
///
/// Returns Some(seconds) if valid (2-60 seconds), None if not set or invalid
pub fn parse_app_poll_secs() -> Option<u64> {
    parse_bounded_secs(APP_POLL_VAR, APP_BLOCK_POLL_MIN_SECS, APP_BLOCK_POLL_MAX_SECS)
}

/// Parse the EAGLEBLOCK_SETTINGS_POLL_SECS environment variable
///
/// Returns Some(seconds) if valid (2-120 seconds), None if not set or invalid
pub fn parse_settings_poll_secs() -> Option<u64> {
    parse_bounded_secs(SETTINGS_POLL_VAR, SETTINGS_POLL_MIN_SECS, SETTINGS_POLL_MAX_SECS)
}

/// Parse the EAGLEBLOCK_DATA_DIR environment variable
pub fn parse_data_dir() -> Option<PathBuf> {
    match env::var(DATA_DIR_VAR) {
        Ok(val) if !val.trim().is_empty() => {
            info!("Data directory set via environment variable: {}", val);
            Some(PathBuf::from(val.trim()))
        }
        Ok(_) => {
            warn!("{} is empty. Using configured data directory.", DATA_DIR_VAR);
            None
        }
        Err(_) => None,
    }
}

/// Apply environment overrides on top of a loaded config
pub fn apply_env_overrides(mut config: Config) -> Config {
    if let Some(dir) = parse_data_dir() {
        config.data_dir = dir;
    }
    if let Some(secs) = parse_app_poll_secs() {
        config.app_block_poll_secs = secs;
    }
    if let Some(secs) = parse_settings_poll_secs() {
        config.settings_poll_secs = secs;
    }
    config
}
