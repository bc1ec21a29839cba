// Library interface for EagleBlock
// This allows the CLI, tests and other front ends to drive the same core

pub mod clock;
pub mod config;
pub mod config_file;
pub mod constants;
pub mod enforcement;
pub mod hosts;
pub mod overlay;
pub mod process;
pub mod store;
pub mod surveillance;
pub mod timers;
pub mod ui;

use anyhow::{Context, Result};
use clock::{Clock, SystemClock};
use config_file::Config;
use constants::{
    BLOCK_SETTINGS_SWITCH, DELAY_TIMEOUT_KEY, ENFORCE_SAFE_SEARCH, OVERLAY_RESTRICTED_CONTENT,
};
use enforcement::CloseOutcome;
use hosts::HostsFile;
use log::{info, warn};
use overlay::{ManualOverrideThrottle, OverlayController, OverlayPresenter};
use process::{ProcessControl, ProcessQuery, SystemProcesses};
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;
use store::{normalize_process_name, BlockedApp, Category, Store};
use surveillance::{Surveillance, SurveillanceConfig};
use timers::{SettingKey, TimerDriver, TimerEvent, TimerRegistry, TimerStatus};

/// Where the core keeps its files and how it schedules work
#[derive(Debug, Clone)]
pub struct CoreOptions {
    pub data_dir: PathBuf,
    pub hosts_file: PathBuf,
    pub timer_driver: TimerDriver,
    pub surveillance: SurveillanceConfig,
}

impl CoreOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            hosts_file: config.hosts_file.clone(),
            timer_driver: TimerDriver::default(),
            surveillance: SurveillanceConfig {
                app_poll_interval: Duration::from_secs(config.app_block_poll_secs),
                settings_poll_interval: Duration::from_secs(config.settings_poll_secs),
                snapshot_ttl_ms: config.snapshot_cache_ms,
                ..SurveillanceConfig::default()
            },
        }
    }
}

/// Outside world the core talks to
#[derive(Clone)]
pub struct CorePorts {
    pub clock: Arc<dyn Clock>,
    pub query: Arc<dyn ProcessQuery>,
    pub control: Arc<dyn ProcessControl>,
    pub presenter: Arc<dyn OverlayPresenter>,
}

impl CorePorts {
    /// Real clock and real processes
    pub fn system(presenter: Arc<dyn OverlayPresenter>) -> Self {
        let processes = Arc::new(SystemProcesses::new());
        Self {
            clock: Arc::new(SystemClock),
            query: processes.clone(),
            control: processes,
            presenter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableRequest {
    /// The protection was already off
    AlreadyOff,
    /// A disable is already counting down, with this much time left
    AlreadyPending(u64),
    /// The accountability delay started; the protection switches off after it
    Started(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayChange {
    /// A longer delay takes effect right away
    Applied(u64),
    /// A shorter delay takes effect once the current delay has passed
    Pending { wait_ms: u64 },
}

/// Core EagleBlock functionality shared between the CLI and other front ends
pub struct EagleBlockCore {
    store: Arc<Store>,
    timers: TimerRegistry,
    overlay: OverlayController,
    surveillance: Surveillance,
    hosts: HostsFile,
}

impl EagleBlockCore {
    /// Create the core; nothing runs until `start`
    pub fn new(options: CoreOptions, ports: CorePorts, events: Sender<TimerEvent>) -> Result<Self> {
        let store = Arc::new(Store::open(&options.data_dir).context("Failed to open data store")?);

        let timers = TimerRegistry::new(
            store.clone(),
            ports.clock.clone(),
            options.timer_driver,
            events,
        );
        let throttle = ManualOverrideThrottle::new(store.clone(), ports.clock.clone());
        let overlay = OverlayController::new(
            ports.presenter,
            throttle,
            ports.clock.clone(),
            options.surveillance.driver,
        );
        let surveillance = Surveillance::new(
            store.clone(),
            ports.clock,
            ports.query,
            ports.control,
            overlay.clone(),
            options.surveillance,
        );

        Ok(Self {
            store,
            timers,
            overlay,
            surveillance,
            hosts: HostsFile::new(options.hosts_file),
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    pub fn overlay(&self) -> &OverlayController {
        &self.overlay
    }

    pub fn surveillance(&self) -> &Surveillance {
        &self.surveillance
    }

    pub fn hosts(&self) -> &HostsFile {
        &self.hosts
    }

    /// Resume persisted timers, then arm the protection loops
    pub fn start(&self) {
        self.timers.reactivate_all_timers();

        let apps = self.surveillance.start_app_block_protection();
        let settings = self.surveillance.start_settings_protection();
        info!(
            "EagleBlock started (app blocking: {}, settings protection: {})",
            if apps { "on" } else { "off" },
            if settings { "on" } else { "off" }
        );
    }

    /// Pick up changes other processes made to the data files
    ///
    /// Timers started or cancelled from the command line are adopted or
    /// dropped, and loops for newly enabled protections are armed.
    pub fn sync(&self) {
        self.timers.sync_with_store();
        self.surveillance.arm_enabled_loops();
    }

    /// Disarm the loops and stop ticking; persisted timers resume on next start
    pub fn shutdown(&self) {
        self.surveillance.stop();
        self.timers.shutdown();
        info!("EagleBlock shut down");
    }

    fn toggle_key(key: &str) -> Result<&str> {
        match SettingKey::parse(key) {
            SettingKey::Toggle(_) => Ok(key),
            other => anyhow::bail!("'{}' is not a protection switch", other),
        }
    }

    /// Turn a protection on; strengthening never waits
    ///
    /// A pending disable of the same protection is cancelled.
    pub fn enable_protection(&self, key: &str) -> Result<()> {
        let key = Self::toggle_key(key)?;

        if key == ENFORCE_SAFE_SEARCH {
            self.hosts
                .enforce_safe_search()
                .context("Failed to enforce safe search")?;
        }

        if self.timers.cancel_timer(key)? {
            info!("Pending disable of {} cancelled", key);
        }
        self.store.set_toggle(key, true)?;
        info!("Protection {} enabled", key);

        match key {
            OVERLAY_RESTRICTED_CONTENT => {
                self.surveillance.start_app_block_protection();
            }
            BLOCK_SETTINGS_SWITCH => {
                self.surveillance.start_settings_protection();
            }
            _ => {}
        }
        Ok(())
    }

    /// Ask to turn a protection off; it happens once the delay has passed
    pub fn request_disable(&self, key: &str) -> Result<DisableRequest> {
        let key = Self::toggle_key(key)?;

        if !self.store.is_enabled(key) {
            return Ok(DisableRequest::AlreadyOff);
        }
        if let Some(remaining) = self.timers.remaining_ms(key) {
            return Ok(DisableRequest::AlreadyPending(remaining));
        }

        let delay = self.store.delay_timeout_ms();
        self.timers.start_countdown_timer(key, Some(delay), None)?;
        Ok(DisableRequest::Started(delay))
    }

    /// Change the accountability delay
    ///
    /// Lengthening applies immediately; shortening waits out the current delay.
    pub fn start_delay_timeout_change(&self, new_delay_ms: u64) -> Result<DelayChange> {
        if new_delay_ms == 0 {
            anyhow::bail!("Delay must be greater than zero");
        }

        let current = self.store.delay_timeout_ms();
        if new_delay_ms >= current {
            self.timers.cancel_timer(DELAY_TIMEOUT_KEY)?;
            self.store
                .update_preferences(|prefs| prefs.delay_timeout = Some(new_delay_ms))
                .context("Failed to save delay")?;
            info!("Accountability delay raised to {} ms", new_delay_ms);
            return Ok(DelayChange::Applied(new_delay_ms));
        }

        self.timers
            .start_countdown_timer(DELAY_TIMEOUT_KEY, Some(current), Some(new_delay_ms))?;
        Ok(DelayChange::Pending { wait_ms: current })
    }

    pub fn get_delay_change_status(&self) -> TimerStatus {
        self.timers.get_timer_status(DELAY_TIMEOUT_KEY)
    }

    pub fn get_timer_status(&self, setting_id: &str) -> TimerStatus {
        self.timers.get_timer_status(setting_id)
    }

    /// Abandon a pending change; nothing is committed
    pub fn cancel_delay_change(&self, setting_id: &str) -> Result<bool> {
        self.timers.cancel_timer(setting_id)
    }

    /// Start the deletion delay for a blocked app or website
    pub fn prime_block_for_deletion(&self, category: Category, item: &str) -> Result<String> {
        let data = self.store.read_block_data();
        let blocked = match category {
            Category::App => {
                let key = normalize_process_name(item);
                data.blocked_apps
                    .iter()
                    .any(|a| a.normalized_process_name() == key)
            }
            Category::Site => data
                .blocked_websites
                .iter()
                .any(|d| d.eq_ignore_ascii_case(item.trim())),
        };
        if !blocked {
            anyhow::bail!("'{}' is not on the block list", item);
        }

        let setting_id = SettingKey::allow_listing_id(category, item.trim());
        self.timers.start_countdown_timer(&setting_id, None, None)?;
        Ok(setting_id)
    }

    pub fn block_app(&self, display_name: &str, process_name: &str) -> Result<bool> {
        self.store
            .add_blocked_app(BlockedApp::new(display_name, process_name))
    }

    /// Returns false until the app's deletion delay has passed
    pub fn unblock_app(&self, process_name: &str) -> Result<bool> {
        self.store.remove_blocked_app(process_name)
    }

    /// Block in the hosts file first; the list is only updated on success
    pub fn block_website(&self, domain: &str) -> Result<bool> {
        self.hosts
            .block_domain(domain)
            .with_context(|| format!("Failed to block website {}", domain))?;
        self.store.add_blocked_website(domain)
    }

    /// Returns false until the website's deletion delay has passed
    pub fn unblock_website(&self, domain: &str) -> Result<bool> {
        let allowed = self
            .store
            .read_block_data()
            .allowed_for_unblock_websites
            .iter()
            .any(|d| d.eq_ignore_ascii_case(domain.trim()));
        if !allowed {
            warn!("Refusing to unblock {}: deletion delay has not elapsed", domain);
            return Ok(false);
        }

        self.hosts
            .unblock_domain(domain)
            .with_context(|| format!("Failed to unblock website {}", domain))?;
        self.store.remove_blocked_website(domain)
    }

    /// Save a manual close for the running daemon to pick up
    ///
    /// Refused (false) while the 8 hour window is active. Whether the
    /// overlay showing is the one for `process_name` is decided by the daemon.
    pub fn request_manual_close(&self, process_name: &str) -> Result<bool> {
        let process_name = process_name.trim();
        if process_name.is_empty() {
            anyhow::bail!("Process name must not be empty");
        }
        if !self.overlay.throttle().can_allow_manual_closure() {
            warn!(
                "Manual close of {} refused: last override was less than 8 hours ago",
                process_name
            );
            return Ok(false);
        }

        self.store
            .update_preferences(|prefs| prefs.manual_close_request = Some(process_name.to_string()))
            .context("Failed to save manual close request")?;
        info!("Manual close of {} requested", process_name);
        Ok(true)
    }

    /// Take a saved manual close request, if any, and try to accept it
    ///
    /// Returns whether the override was granted, `None` when nothing was waiting.
    pub fn honor_manual_close_request(&self) -> Result<Option<bool>> {
        if self.store.read_preferences().manual_close_request.is_none() {
            return Ok(None);
        }
        let taken = self
            .store
            .update_preferences(|prefs| prefs.manual_close_request.take())
            .context("Failed to clear manual close request")?;
        let Some(process_name) = taken else {
            return Ok(None);
        };

        let accepted = self.surveillance.accept_manual_close(&process_name)?;
        if accepted {
            info!("Manual close of {} granted", process_name);
        }
        Ok(Some(accepted))
    }

    /// Close the app behind the current overlay, if any
    ///
    /// A waiting manual close request is honored first; an overlay that
    /// offers the override is only enforced after its decision window.
    pub fn enforce_current_overlay(&self) -> Option<CloseOutcome> {
        if let Err(e) = self.honor_manual_close_request() {
            warn!("Manual close request failed: {:#}", e);
        }
        self.surveillance.enforce_current_overlay()
    }
}
