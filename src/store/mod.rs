//! Durable key-value store backed by two pretty-printed JSON documents.
//!
//! Reads never fail: a missing, empty or unparseable document yields the
//! default document so that protections can always be inspected and
//! disabled. Writes go through one lock per document and always re-read the
//! latest file before applying a change, so concurrent writers in this
//! process cannot lose each other's updates.

mod blocklist;
mod documents;

pub use documents::{
    normalize_process_name, BlockData, BlockedApp, Category, Preferences, TimerRecord,
};

use crate::constants::{APP_DIR_NAME, BLOCK_DATA_FILE, PREFERENCES_FILE};
use anyhow::{Context, Result};
use log::{debug, warn};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub struct Store {
    data_dir: PathBuf,
    preferences_writer: Mutex<()>,
    block_data_writer: Mutex<()>,
}

impl Store {
    /// Open (and create if needed) the data directory
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Self {
            data_dir,
            preferences_writer: Mutex::new(()),
            block_data_writer: Mutex::new(()),
        })
    }

    /// Get the standard data directory
    ///
    /// - Windows: `%APPDATA%\eagleblock\data`
    /// - Linux: `~/.local/share/eagleblock/data`
    /// - macOS: `~/Library/Application Support/eagleblock/data`
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
            .join("data")
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.data_dir.join(PREFERENCES_FILE)
    }

    pub fn block_data_path(&self) -> PathBuf {
        self.data_dir.join(BLOCK_DATA_FILE)
    }

    pub fn read_preferences(&self) -> Preferences {
        read_document(&self.preferences_path())
    }

    /// Read-modify-write the preferences document
    pub fn update_preferences<R>(&self, change: impl FnOnce(&mut Preferences) -> R) -> Result<R> {
        let _writer = self.preferences_writer.lock();
        let path = self.preferences_path();
        let mut prefs: Preferences = read_document(&path);
        let result = change(&mut prefs);
        write_document(&path, &prefs)?;
        Ok(result)
    }

    pub fn read_block_data(&self) -> BlockData {
        read_document(&self.block_data_path())
    }

    /// Read-modify-write the block lists document
    pub fn update_block_data<R>(&self, change: impl FnOnce(&mut BlockData) -> R) -> Result<R> {
        let _writer = self.block_data_writer.lock();
        let path = self.block_data_path();
        let mut data: BlockData = read_document(&path);
        let result = change(&mut data);
        write_document(&path, &data)?;
        Ok(result)
    }

    /// Convenience for a single boolean preference
    pub fn is_enabled(&self, key: &str) -> bool {
        self.read_preferences().is_enabled(key)
    }

    pub fn set_toggle(&self, key: &str, enabled: bool) -> Result<()> {
        self.update_preferences(|prefs| prefs.set_toggle(key, enabled))
            .with_context(|| format!("Failed to save preference '{}'", key))
    }

    pub fn delay_timeout_ms(&self) -> u64 {
        self.read_preferences().delay_timeout_ms()
    }
}

fn read_document<T: DeserializeOwned + Default>(path: &Path) -> T {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
            } else {
                debug!("{} does not exist yet, using defaults", path.display());
            }
            return T::default();
        }
    };

    if contents.trim().is_empty() {
        return T::default();
    }

    match serde_json::from_str(&contents) {
        Ok(document) => document,
        Err(e) => {
            warn!(
                "Failed to parse {}: {}. Treating it as missing.",
                path.display(),
                e
            );
            T::default()
        }
    }
}

fn write_document<T: Serialize>(path: &Path, document: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(document).context("Failed to serialize document")?;

    // Write next to the target and rename so readers never see a torn file
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    debug!("Wrote {}", path.display());
    Ok(())
}
