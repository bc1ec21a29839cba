//! Countdown timer engine behind the accountability delay.
//!
//! Every change that weakens a protection is parked behind a named timer.
//! Timers are persisted under `timerInfo` before they start ticking and are
//! computed from wall-clock timestamps, so a restart (or crash) resumes them
//! with the correct remaining time, or resolves them immediately when the
//! expiry moment already passed.
//!
//! At most one timer is live per setting id. Starting a timer for an id that
//! is already counting down replaces the old one.

mod setting_key;

pub use setting_key::SettingKey;

use crate::clock::Clock;
use crate::constants::TIMER_TICK_INTERVAL_MS;
use crate::store::{Store, TimerRecord};
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Notifications for the UI layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// The setting's pending change was committed
    Resolved(String),
    /// An allow-list changed; block tables should be re-rendered
    BlockTableChanged,
}

/// Who calls `tick`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerDriver {
    /// One background thread per live timer, ticking at the given interval
    Threaded(Duration),
    /// The owner drives `tick`/`tick_all` itself
    External,
}

impl Default for TimerDriver {
    fn default() -> Self {
        TimerDriver::Threaded(Duration::from_millis(TIMER_TICK_INTERVAL_MS))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Still counting down, with the remaining milliseconds
    Pending(u64),
    /// This tick observed expiry and ran the expiry handling
    Expired,
    /// No live timer (never started, cancelled, replaced or already expired)
    Inactive,
}

/// Current value of a setting as shown next to its progress bar
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SettingValue {
    Number(u64),
    Flag(bool),
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerStatus {
    pub current_value: SettingValue,
    pub is_changing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_value: Option<u64>,
}

struct ActiveTimer {
    generation: u64,
    end_time_ms: u64,
    remaining_ms: u64,
    target_value: Option<u64>,
}

/// Table of live countdown timers
#[derive(Clone)]
pub struct TimerRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    driver: TimerDriver,
    events: Sender<TimerEvent>,
    timers: Mutex<HashMap<String, ActiveTimer>>,
    /// Expired ids whose change is being committed (locked after `timers`)
    resolving: Mutex<HashSet<String>>,
    next_generation: AtomicU64,
}

impl TimerRegistry {
    pub fn new(
        store: Arc<Store>,
        clock: Arc<dyn Clock>,
        driver: TimerDriver,
        events: Sender<TimerEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                store,
                clock,
                driver,
                events,
                timers: Mutex::new(HashMap::new()),
                resolving: Mutex::new(HashSet::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Start (or restart) the countdown for `setting_id`
    ///
    /// `remaining_ms` overrides the duration; otherwise the configured
    /// accountability delay is used. The timer record is written before the
    /// timer goes live, so an error here means no timer was started.
    pub fn start_countdown_timer(
        &self,
        setting_id: &str,
        remaining_ms: Option<u64>,
        target_value: Option<u64>,
    ) -> Result<()> {
        let inner = &self.inner;

        if inner.timers.lock().remove(setting_id).is_some() {
            info!("Replacing running timer for {}", setting_id);
        }

        let duration_ms = remaining_ms.unwrap_or_else(|| inner.store.delay_timeout_ms());
        let record = TimerRecord {
            delay_timeout_ms: duration_ms,
            start_timestamp_ms: inner.clock.now_ms(),
            target_value,
        };

        inner
            .store
            .update_preferences(|prefs| {
                prefs.timer_info.insert(setting_id.to_string(), record);
            })
            .with_context(|| format!("Failed to persist timer for '{}'", setting_id))?;

        let generation = inner.next_generation.fetch_add(1, Ordering::SeqCst);
        inner.timers.lock().insert(
            setting_id.to_string(),
            ActiveTimer {
                generation,
                end_time_ms: record.end_time_ms(),
                remaining_ms: duration_ms,
                target_value,
            },
        );
        info!("Started timer for {} ({} ms)", setting_id, duration_ms);

        if let TimerDriver::Threaded(interval) = inner.driver {
            self.spawn_ticker(setting_id.to_string(), generation, interval);
        }
        Ok(())
    }

    fn spawn_ticker(&self, setting_id: String, generation: u64, interval: Duration) {
        let registry = self.clone();
        thread::Builder::new()
            .name(format!("timer-{}", setting_id))
            .spawn(move || loop {
                thread::sleep(interval);
                match registry.tick_generation(&setting_id, Some(generation)) {
                    TickOutcome::Pending(_) => continue,
                    TickOutcome::Expired | TickOutcome::Inactive => break,
                }
            })
            .expect("Failed to spawn timer thread");
    }

    /// Advance one timer; safe to call from several places at once
    pub fn tick(&self, setting_id: &str) -> TickOutcome {
        self.tick_generation(setting_id, None)
    }

    /// Advance every live timer, returning the ids that expired
    pub fn tick_all(&self) -> Vec<String> {
        self.active_timer_ids()
            .into_iter()
            .filter(|id| self.tick(id) == TickOutcome::Expired)
            .collect()
    }

    fn tick_generation(&self, setting_id: &str, generation: Option<u64>) -> TickOutcome {
        let now = self.inner.clock.now_ms();

        let target_value = {
            let mut timers = self.inner.timers.lock();
            let Some(timer) = timers.get_mut(setting_id) else {
                return TickOutcome::Inactive;
            };
            if generation.is_some_and(|g| g != timer.generation) {
                return TickOutcome::Inactive;
            }

            let remaining = timer.end_time_ms.saturating_sub(now);
            if remaining > 0 {
                timer.remaining_ms = remaining;
                debug!("{}: {} ms remaining", setting_id, remaining);
                return TickOutcome::Pending(remaining);
            }

            let target_value = timer.target_value;
            timers.remove(setting_id);
            self.inner.resolving.lock().insert(setting_id.to_string());
            target_value
        };

        self.finish(setting_id, target_value);
        TickOutcome::Expired
    }

    /// Stop a pending change without committing it
    ///
    /// Returns true if a live timer was stopped.
    pub fn cancel_timer(&self, setting_id: &str) -> Result<bool> {
        let was_live = self.inner.timers.lock().remove(setting_id).is_some();
        let had_record = self
            .inner
            .store
            .update_preferences(|prefs| prefs.timer_info.remove(setting_id).is_some())
            .with_context(|| format!("Failed to remove timer record for '{}'", setting_id))?;

        if was_live || had_record {
            info!("Cancelled pending change for {}", setting_id);
        }
        Ok(was_live)
    }

    /// Resume persisted timers after a (re)start
    ///
    /// Timers whose expiry moment passed while the process was down are
    /// resolved immediately.
    pub fn reactivate_all_timers(&self) {
        info!("Reactivating persisted timers");
        self.sync_with_store();
    }

    /// Bring the live table in line with `timerInfo`
    ///
    /// Records without a live timer are resumed, or resolved if already
    /// expired. Live timers whose record disappeared were cancelled by
    /// another process and are dropped.
    pub fn sync_with_store(&self) {
        let now = self.inner.clock.now_ms();
        let records = self.inner.store.read_preferences().timer_info;

        {
            let mut timers = self.inner.timers.lock();
            timers.retain(|id, _| {
                let keep = records.contains_key(id);
                if !keep {
                    info!("Timer for {} was cancelled elsewhere", id);
                }
                keep
            });
        }

        for (setting_id, record) in records {
            {
                let timers = self.inner.timers.lock();
                if timers.contains_key(&setting_id)
                    || self.inner.resolving.lock().contains(&setting_id)
                {
                    continue;
                }
            }

            let remaining = record.remaining_at(now);
            if remaining > 0 {
                info!("Resuming timer for {} with {} ms remaining", setting_id, remaining);
                if let Err(e) =
                    self.start_countdown_timer(&setting_id, Some(remaining), record.target_value)
                {
                    error!("Failed to resume timer for {}: {:#}", setting_id, e);
                }
                continue;
            }

            // Whoever removes the record resolves it
            match self
                .inner
                .store
                .update_preferences(|prefs| prefs.timer_info.remove(&setting_id).is_some())
            {
                Ok(true) => {
                    info!("Timer for {} expired while not running", setting_id);
                    self.resolve(&setting_id, record.target_value);
                }
                Ok(false) => debug!("Timer for {} already resolved", setting_id),
                Err(e) => warn!("Failed to claim expired timer {}: {:#}", setting_id, e),
            }
        }
    }

    /// Read-only status for progress displays
    pub fn get_timer_status(&self, setting_id: &str) -> TimerStatus {
        let prefs = self.inner.store.read_preferences();
        let current_value = match SettingKey::parse(setting_id) {
            SettingKey::DelayTimeout => SettingValue::Number(prefs.delay_timeout_ms()),
            SettingKey::Toggle(name) => SettingValue::Flag(prefs.is_enabled(&name)),
            SettingKey::AllowListing { .. } => SettingValue::None,
        };

        let now = self.inner.clock.now_ms();
        match self.inner.timers.lock().get(setting_id) {
            Some(timer) => TimerStatus {
                current_value,
                is_changing: true,
                time_remaining: Some(timer.end_time_ms.saturating_sub(now)),
                target_value: timer.target_value,
            },
            None => TimerStatus {
                current_value,
                is_changing: false,
                time_remaining: None,
                target_value: None,
            },
        }
    }

    /// Remaining time of a live timer, as of its last tick
    pub fn remaining_ms(&self, setting_id: &str) -> Option<u64> {
        self.inner
            .timers
            .lock()
            .get(setting_id)
            .map(|timer| timer.remaining_ms)
    }

    pub fn is_active(&self, setting_id: &str) -> bool {
        self.inner.timers.lock().contains_key(setting_id)
    }

    pub fn active_timer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.timers.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop all tickers but keep the persisted records for the next start
    pub fn shutdown(&self) {
        let mut timers = self.inner.timers.lock();
        if !timers.is_empty() {
            info!("Suspending {} timer(s) until next start", timers.len());
        }
        timers.clear();
    }

    /// Drop the persisted record, then resolve
    fn finish(&self, setting_id: &str, target_value: Option<u64>) {
        info!("Timer for {} expired", setting_id);

        if let Err(e) = self.inner.store.update_preferences(|prefs| {
            prefs.timer_info.remove(setting_id);
        }) {
            warn!("Failed to remove timer record for {}: {:#}", setting_id, e);
        }

        self.resolve(setting_id, target_value);
        self.inner.resolving.lock().remove(setting_id);
    }

    /// Commit the pending change and notify observers
    fn resolve(&self, setting_id: &str, target_value: Option<u64>) {
        if let Err(e) = self.apply_expiry(setting_id, target_value) {
            error!("Failed to commit expired change for {}: {:#}", setting_id, e);
        }
        self.notify(TimerEvent::Resolved(setting_id.to_string()));
    }

    fn apply_expiry(&self, setting_id: &str, target_value: Option<u64>) -> Result<()> {
        let store = &self.inner.store;
        match SettingKey::parse(setting_id) {
            SettingKey::DelayTimeout => match target_value {
                Some(delay_ms) => {
                    store.update_preferences(|prefs| prefs.delay_timeout = Some(delay_ms))?;
                    info!("Accountability delay is now {} ms", delay_ms);
                }
                None => warn!("Delay change expired without a target value, keeping current delay"),
            },
            SettingKey::AllowListing { category, item } => {
                store.allow_for_unblock(category, &item)?;
                info!("{} may now be removed from the block list", item);
                self.notify(TimerEvent::BlockTableChanged);
            }
            SettingKey::Toggle(name) => {
                store.set_toggle(&name, false)?;
                info!("Protection {} switched off", name);
            }
        }
        Ok(())
    }

    fn notify(&self, event: TimerEvent) {
        if self.inner.events.send(event).is_err() {
            debug!("No listener for timer events");
        }
    }
}
