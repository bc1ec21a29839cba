//! Typed views of the two persisted JSON documents.

use crate::constants::{APP_CATEGORY, DEFAULT_DELAY_TIMEOUT_MS, SITE_CATEGORY};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// `savedPreferences.json`
///
/// Feature toggles are kept as a flat map next to the named fields so that
/// keys written by other versions survive a read-modify-write cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Global accountability delay (ms)
    #[serde(rename = "delayTimeout", default, skip_serializing_if = "Option::is_none")]
    pub delay_timeout: Option<u64>,
    /// Persisted snapshots of in-flight countdown timers
    #[serde(rename = "timerInfo", default)]
    pub timer_info: BTreeMap<String, TimerRecord>,
    /// Last accepted manual overlay close (epoch ms)
    #[serde(
        rename = "lastManualChangeTimestamp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_manual_change: Option<u64>,
    /// Manual overlay close asked for from the command line (process name),
    /// picked up by the running daemon
    #[serde(
        rename = "manualCloseRequest",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub manual_close_request: Option<String>,
    #[serde(flatten)]
    pub toggles: BTreeMap<String, Value>,
}

impl Preferences {
    /// Effective accountability delay; unset or zero falls back to the default
    pub fn delay_timeout_ms(&self) -> u64 {
        match self.delay_timeout {
            Some(ms) if ms > 0 => ms,
            _ => DEFAULT_DELAY_TIMEOUT_MS,
        }
    }

    /// Whether a boolean feature toggle is on (missing or non-boolean = off)
    pub fn is_enabled(&self, key: &str) -> bool {
        self.toggles.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn set_toggle(&mut self, key: &str, enabled: bool) {
        self.toggles.insert(key.to_string(), Value::Bool(enabled));
    }
}

/// One persisted countdown timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerRecord {
    #[serde(rename = "delayTimeout")]
    pub delay_timeout_ms: u64,
    #[serde(rename = "startTimeStamp")]
    pub start_timestamp_ms: u64,
    #[serde(rename = "targetTimeout", default)]
    pub target_value: Option<u64>,
}

impl TimerRecord {
    pub fn end_time_ms(&self) -> u64 {
        self.start_timestamp_ms.saturating_add(self.delay_timeout_ms)
    }

    /// Time left at `now_ms`, zero once expired.
    ///
    /// A start timestamp in the future (wall clock moved backwards) counts as
    /// no time elapsed, so the remaining time never exceeds the duration.
    pub fn remaining_at(&self, now_ms: u64) -> u64 {
        let elapsed = now_ms.saturating_sub(self.start_timestamp_ms);
        self.delay_timeout_ms.saturating_sub(elapsed)
    }
}

/// `blockData.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockData {
    #[serde(default)]
    pub blocked_apps: Vec<BlockedApp>,
    #[serde(default)]
    pub blocked_websites: Vec<String>,
    #[serde(default)]
    pub allowed_for_unblock_websites: Vec<String>,
    #[serde(default)]
    pub allowed_for_unblock_apps: Vec<String>,
}

impl BlockData {
    /// The allow-list that a finished deletion timer of `category` feeds
    pub fn allowed_for_unblock_mut(&mut self, category: Category) -> &mut Vec<String> {
        match category {
            Category::Site => &mut self.allowed_for_unblock_websites,
            Category::App => &mut self.allowed_for_unblock_apps,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedApp {
    pub display_name: String,
    pub process_name: String,
}

impl BlockedApp {
    pub fn new(display_name: impl Into<String>, process_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            process_name: process_name.into(),
        }
    }

    /// Process name used for matching: `.exe` stripped, lower-cased
    pub fn normalized_process_name(&self) -> String {
        normalize_process_name(&self.process_name)
    }
}

/// Strip a trailing `.exe` (any case) and lower-case
pub fn normalize_process_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

/// Which block list an allow-listing timer refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Site,
    App,
}

impl Category {
    /// `"site"` maps to websites, every other prefix to applications
    pub fn from_prefix(prefix: &str) -> Self {
        if prefix == SITE_CATEGORY {
            Category::Site
        } else {
            Category::App
        }
    }

    pub fn as_prefix(&self) -> &'static str {
        match self {
            Category::Site => SITE_CATEGORY,
            Category::App => APP_CATEGORY,
        }
    }
}
