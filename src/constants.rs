//! Centralized constants for EagleBlock
//!
//! This module contains all configurable numerical values and well-known
//! keys used throughout the application. Each constant includes
//! documentation on its purpose, unit, and recommended value range.

// ============================================================================
// ACCOUNTABILITY DELAY
// ============================================================================

/// Default accountability delay when no `delayTimeout` preference is saved.
/// Unit: milliseconds
/// Recommended range: 60_000-3_600_000 (1-60 minutes)
pub const DEFAULT_DELAY_TIMEOUT_MS: u64 = 3 * 60 * 1000;

/// Interval between countdown timer ticks.
/// Unit: milliseconds
/// Range: Fixed, status queries and expiry resolution depend on it
pub const TIMER_TICK_INTERVAL_MS: u64 = 1000;

/// Separator between category and item in allow-listing timer ids
/// (e.g. `site-->example.com`).
pub const SETTING_ID_DELIMITER: &str = "-->";

/// Category prefix used for website allow-listing timers.
pub const SITE_CATEGORY: &str = "site";

/// Category prefix used for application allow-listing timers.
pub const APP_CATEGORY: &str = "app";

// ============================================================================
// PREFERENCE KEYS
// ============================================================================

/// Global accountability delay preference (number, ms).
pub const DELAY_TIMEOUT_KEY: &str = "delayTimeout";

/// Toggle: detect blocked applications and raise the overlay.
pub const OVERLAY_RESTRICTED_CONTENT: &str = "overlayRestrictedContent";

/// Toggle: guard Control Panel, Task Manager, Task Scheduler and the hosts file.
pub const BLOCK_SETTINGS_SWITCH: &str = "blockSettingsSwitch";

/// Toggle: safe-search hosts entries are enforced.
pub const ENFORCE_SAFE_SEARCH: &str = "enforceSafeSearch";

// ============================================================================
// PERSISTED DOCUMENTS
// ============================================================================

/// Preferences document file name (inside the data directory).
pub const PREFERENCES_FILE: &str = "savedPreferences.json";

/// Block lists document file name (inside the data directory).
pub const BLOCK_DATA_FILE: &str = "blockData.json";

/// Application directory name under the platform config/data directories.
pub const APP_DIR_NAME: &str = "eagleblock";

// ============================================================================
// SURVEILLANCE POLLING
// ============================================================================

/// Blocked-application poll interval.
/// Unit: seconds
/// Recommended range: 2-60 (lower = faster detection, higher = less CPU)
pub const APP_BLOCK_POLL_INTERVAL_SECS: u64 = 8;

/// Minimum accepted blocked-application poll interval.
/// Unit: seconds
pub const APP_BLOCK_POLL_MIN_SECS: u64 = 2;

/// Maximum accepted blocked-application poll interval.
/// Unit: seconds
pub const APP_BLOCK_POLL_MAX_SECS: u64 = 60;

/// Restricted system surface poll interval.
/// Unit: seconds
/// Recommended range: 2-120
pub const SETTINGS_POLL_INTERVAL_SECS: u64 = 12;

/// Minimum accepted settings-protection poll interval.
/// Unit: seconds
pub const SETTINGS_POLL_MIN_SECS: u64 = 2;

/// Maximum accepted settings-protection poll interval.
/// Unit: seconds
pub const SETTINGS_POLL_MAX_SECS: u64 = 120;

/// How long one process snapshot is reused before the OS is queried again.
/// Unit: milliseconds
/// Recommended range: 1000-5000 (must be shorter than both poll intervals)
pub const SNAPSHOT_CACHE_TTL_MS: u64 = 3000;

// ============================================================================
// RESTRICTED SYSTEM SURFACES
// ============================================================================

/// Window title fragment identifying Control Panel (case-insensitive).
pub const CONTROL_PANEL_TITLE: &str = "control panel";

/// Window title fragment identifying Task Scheduler (case-insensitive).
pub const TASK_SCHEDULER_TITLE: &str = "task scheduler";

/// Window title fragment of an editor that has the hosts file open.
pub const HOSTS_FILE_TITLE: &str = "hosts";

/// Process used to edit the hosts file.
pub const HOSTS_EDITOR_PROCESS: &str = "notepad.exe";

/// Process hosting Control Panel.
pub const CONTROL_PANEL_PROCESS: &str = "control.exe";

/// Task Manager process.
pub const TASK_MANAGER_PROCESS: &str = "Taskmgr.exe";

/// Management console process hosting Task Scheduler.
pub const TASK_SCHEDULER_PROCESS: &str = "mmc.exe";

/// Prefix of active-overlay keys for restricted surfaces, keeping them apart
/// from blocked apps that share a process (e.g. a blocked Notepad).
pub const SURFACE_KEY_PREFIX: &str = "surface:";

// ============================================================================
// MANUAL OVERRIDE THROTTLING
// ============================================================================

/// Suppression window for new overlays after a manual change.
/// Unit: milliseconds
/// Range: Fixed, prevents overlay flicker right after a manual close
pub const REFLAG_THROTTLE_MS: u64 = 30 * 1000;

/// Minimum spacing between two accepted manual overlay closes.
/// Unit: milliseconds
/// Range: Fixed (8 hours)
pub const MANUAL_OVERRIDE_COOLDOWN_MS: u64 = 8 * 60 * 60 * 1000;

/// Delay before re-checking an app whose overlay was manually closed.
/// Unit: milliseconds
pub const MANUAL_CLOSE_RECHECK_MS: u64 = 30 * 1000;

/// How long an overlay that offers the manual override stays up before the
/// daemon closes the app behind it.
/// Unit: milliseconds
/// Recommended range: 10_000-60_000 (must exceed the daemon sync interval)
pub const OVERRIDE_DECISION_WINDOW_MS: u64 = 20 * 1000;

// ============================================================================
// ENFORCEMENT
// ============================================================================

/// Wait between the graceful close request and force termination.
/// Unit: milliseconds
/// Recommended range: 1000-5000
pub const GRACEFUL_CLOSE_GRACE_MS: u64 = 2000;

/// Interval between "is it gone yet" checks after a close request.
/// Unit: milliseconds
pub const CLOSE_CONFIRM_POLL_MS: u64 = 5000;

/// Upper bound on waiting for a closed process to disappear.
/// Unit: milliseconds
pub const CLOSE_CONFIRM_TIMEOUT_MS: u64 = 60 * 1000;

/// Processes hosting restricted system surfaces. These skip the graceful
/// close request and are force-terminated directly.
pub const SYSTEM_CRITICAL_PROCESSES: &[&str] = &["control", "taskmgr", "mmc", "systemsettings"];

// ============================================================================
// HOSTS FILE
// ============================================================================

/// Default hosts file location on Windows.
pub const DEFAULT_HOSTS_FILE: &str = r"C:\Windows\System32\drivers\etc\hosts";

/// Loopback address used for blocked domains.
pub const BLOCK_ADDRESS: &str = "127.0.0.1";

/// Hosts entries that force safe-search endpoints.
pub const SAFE_SEARCH_ENTRIES: &[&str] = &[
    "216.239.38.120 www.google.com",
    "216.239.38.120 google.com",
    "204.79.197.220 bing.com",
    "204.79.197.220 www.bing.com",
    "213.180.193.56 yandex.ru",
    "213.180.204.92 www.yandex.com",
    "127.0.0.1 yandex.com/images",
];

// ============================================================================
// NOTIFICATION TIMEOUTS
// ============================================================================

/// Blocked-app notification display duration.
/// Unit: milliseconds
/// Recommended range: 3000-10000
pub const NOTIFICATION_TIMEOUT_MS: u32 = 5000;
