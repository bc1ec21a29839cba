//! Process surveillance and enforcement loops.
//!
//! Two polling loops run while their preference is on:
//! - app block protection: flags blocked apps that are running
//! - settings protection: flags the hosts-file editor, Control Panel,
//!   Task Scheduler and Task Manager, first match wins
//!
//! Each loop re-reads its preference at the top of every tick and disarms
//! itself once the preference is off. A failing tick is logged and the next
//! one runs as usual.

mod snapshot;

pub use snapshot::{ProcessSnapshot, SnapshotCache};

use crate::clock::Clock;
use crate::constants::{
    APP_BLOCK_POLL_INTERVAL_SECS, BLOCK_SETTINGS_SWITCH, CONTROL_PANEL_PROCESS,
    CONTROL_PANEL_TITLE, HOSTS_EDITOR_PROCESS, MANUAL_CLOSE_RECHECK_MS,
    OVERLAY_RESTRICTED_CONTENT, OVERRIDE_DECISION_WINDOW_MS, SETTINGS_POLL_INTERVAL_SECS,
    SNAPSHOT_CACHE_TTL_MS, SURFACE_KEY_PREFIX, TASK_MANAGER_PROCESS, TASK_SCHEDULER_PROCESS,
    TASK_SCHEDULER_TITLE,
};
use crate::enforcement::{self, CloseOutcome, CloseTarget, EnforcementTiming};
use crate::overlay::{FlagRequest, OverlayController};
use crate::process::{ProcessControl, ProcessQuery};
use crate::store::{normalize_process_name, Store};
use crate::timers::TimerDriver;
use anyhow::Result;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// System surfaces guarded by settings protection, in check order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestrictedSurface {
    HostsEditor,
    ControlPanel,
    TaskScheduler,
    TaskManager,
}

impl RestrictedSurface {
    pub const ALL: [RestrictedSurface; 4] = [
        RestrictedSurface::HostsEditor,
        RestrictedSurface::ControlPanel,
        RestrictedSurface::TaskScheduler,
        RestrictedSurface::TaskManager,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            RestrictedSurface::HostsEditor => "Hosts file editor",
            RestrictedSurface::ControlPanel => "Control Panel",
            RestrictedSurface::TaskScheduler => "Task Scheduler",
            RestrictedSurface::TaskManager => "Task Manager",
        }
    }

    pub fn process_name(&self) -> &'static str {
        match self {
            RestrictedSurface::HostsEditor => HOSTS_EDITOR_PROCESS,
            RestrictedSurface::ControlPanel => CONTROL_PANEL_PROCESS,
            RestrictedSurface::TaskScheduler => TASK_SCHEDULER_PROCESS,
            RestrictedSurface::TaskManager => TASK_MANAGER_PROCESS,
        }
    }

    /// Active-overlay key, distinct from a blocked app with the same process
    pub fn overlay_key(&self) -> String {
        format!(
            "{}{}",
            SURFACE_KEY_PREFIX,
            normalize_process_name(self.process_name())
        )
    }

    pub fn from_overlay_key(key: &str) -> Option<RestrictedSurface> {
        Self::ALL.into_iter().find(|surface| surface.overlay_key() == key)
    }

    pub fn is_open(&self, snapshot: &ProcessSnapshot) -> bool {
        match self {
            RestrictedSurface::HostsEditor => snapshot.notepad_on_hosts_open,
            RestrictedSurface::ControlPanel => snapshot.control_panel_open,
            RestrictedSurface::TaskScheduler => snapshot.task_scheduler_open,
            RestrictedSurface::TaskManager => snapshot.task_manager_open,
        }
    }

    /// What to close for the surface as `snapshot` sees it
    ///
    /// Control Panel lives inside Explorer, so only its windows are closed.
    pub fn close_target(&self, snapshot: &ProcessSnapshot) -> CloseTarget {
        match self {
            RestrictedSurface::HostsEditor => CloseTarget::Pids(snapshot.hosts_editor_pids()),
            RestrictedSurface::ControlPanel => {
                CloseTarget::WindowTitle(CONTROL_PANEL_TITLE.to_string())
            }
            RestrictedSurface::TaskScheduler => {
                let consoles = snapshot.pids_named(TASK_SCHEDULER_PROCESS);
                let pids: Vec<u32> = snapshot
                    .pids_titled(TASK_SCHEDULER_TITLE)
                    .into_iter()
                    .filter(|pid| consoles.contains(pid))
                    .collect();
                if pids.is_empty() {
                    CloseTarget::WindowTitle(TASK_SCHEDULER_TITLE.to_string())
                } else {
                    CloseTarget::Pids(pids)
                }
            }
            RestrictedSurface::TaskManager => {
                CloseTarget::Pids(snapshot.pids_named(TASK_MANAGER_PROCESS))
            }
        }
    }

    fn flag_request(&self, snapshot: &ProcessSnapshot) -> FlagRequest {
        FlagRequest::new(self.display_name(), self.process_name())
            .with_key(self.overlay_key())
            .with_target(self.close_target(snapshot))
    }
}

/// Result of one poll tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The owning preference is off; the loop should disarm
    Disabled,
    /// Checked; this many new flags were raised
    Checked(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurveillanceConfig {
    pub app_poll_interval: Duration,
    pub settings_poll_interval: Duration,
    pub snapshot_ttl_ms: u64,
    pub enforcement: EnforcementTiming,
    /// How long an overlay offering the manual override stays up before enforcement
    pub override_window_ms: u64,
    /// `External` leaves polling and rechecks to the caller
    pub driver: TimerDriver,
}

impl Default for SurveillanceConfig {
    fn default() -> Self {
        Self {
            app_poll_interval: Duration::from_secs(APP_BLOCK_POLL_INTERVAL_SECS),
            settings_poll_interval: Duration::from_secs(SETTINGS_POLL_INTERVAL_SECS),
            snapshot_ttl_ms: SNAPSHOT_CACHE_TTL_MS,
            enforcement: EnforcementTiming::default(),
            override_window_ms: OVERRIDE_DECISION_WINDOW_MS,
            driver: TimerDriver::default(),
        }
    }
}

struct Recheck {
    due_ms: u64,
    request: FlagRequest,
}

#[derive(Clone)]
pub struct Surveillance {
    inner: Arc<SurveillanceInner>,
}

struct SurveillanceInner {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    snapshots: SnapshotCache,
    control: Arc<dyn ProcessControl>,
    overlay: OverlayController,
    config: SurveillanceConfig,
    /// Overlay keys (normalized process names, `surface:` for system
    /// surfaces) that currently have an overlay raised
    active_overlays: Mutex<HashSet<String>>,
    app_loop: Mutex<Option<Arc<AtomicBool>>>,
    settings_loop: Mutex<Option<Arc<AtomicBool>>>,
    rechecks: Mutex<Vec<Recheck>>,
}

impl Surveillance {
    pub fn new(
        store: Arc<Store>,
        clock: Arc<dyn Clock>,
        query: Arc<dyn ProcessQuery>,
        control: Arc<dyn ProcessControl>,
        overlay: OverlayController,
        config: SurveillanceConfig,
    ) -> Self {
        let snapshots = SnapshotCache::new(query, clock.clone(), config.snapshot_ttl_ms);
        Self {
            inner: Arc::new(SurveillanceInner {
                store,
                clock,
                snapshots,
                control,
                overlay,
                config,
                active_overlays: Mutex::new(HashSet::new()),
                app_loop: Mutex::new(None),
                settings_loop: Mutex::new(None),
                rechecks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn overlay(&self) -> &OverlayController {
        &self.inner.overlay
    }

    /// Check once now, then keep polling while the preference stays on
    ///
    /// Returns false if the preference is off.
    pub fn start_app_block_protection(&self) -> bool {
        if !self.inner.store.is_enabled(OVERLAY_RESTRICTED_CONTENT) {
            info!("App block protection is off");
            return false;
        }

        if let Err(e) = self.check_blocked_apps() {
            warn!("Blocked app check failed: {:#}", e);
        }

        if let TimerDriver::Threaded(_) = self.inner.config.driver {
            let interval = self.inner.config.app_poll_interval;
            self.arm_loop(
                &self.inner.app_loop,
                "app-block-poll",
                interval,
                Surveillance::poll_app_block_protection,
            );
        }
        true
    }

    /// Keep polling the restricted system surfaces while the preference stays on
    ///
    /// Returns false if the preference is off.
    pub fn start_settings_protection(&self) -> bool {
        if !self.inner.store.is_enabled(BLOCK_SETTINGS_SWITCH) {
            info!("Settings protection is off");
            return false;
        }

        if let TimerDriver::Threaded(_) = self.inner.config.driver {
            let interval = self.inner.config.settings_poll_interval;
            self.arm_loop(
                &self.inner.settings_loop,
                "settings-poll",
                interval,
                Surveillance::poll_settings_protection,
            );
        }
        true
    }

    /// Arm loops whose preference was switched on since the last start
    pub fn arm_enabled_loops(&self) {
        if !Self::is_armed(&self.inner.app_loop) && self.inner.store.is_enabled(OVERLAY_RESTRICTED_CONTENT) {
            self.start_app_block_protection();
        }
        if !Self::is_armed(&self.inner.settings_loop) && self.inner.store.is_enabled(BLOCK_SETTINGS_SWITCH) {
            self.start_settings_protection();
        }
    }

    fn is_armed(slot: &Mutex<Option<Arc<AtomicBool>>>) -> bool {
        slot.lock()
            .as_ref()
            .is_some_and(|running| running.load(Ordering::SeqCst))
    }

    fn arm_loop(
        &self,
        slot: &Mutex<Option<Arc<AtomicBool>>>,
        name: &str,
        interval: Duration,
        poll: fn(&Surveillance) -> Result<PollOutcome>,
    ) {
        let mut slot = slot.lock();
        if slot.as_ref().is_some_and(|running| running.load(Ordering::SeqCst)) {
            debug!("{} already armed", name);
            return;
        }

        let running = Arc::new(AtomicBool::new(true));
        *slot = Some(running.clone());

        let surveillance = self.clone();
        let thread_name = name.to_string();
        thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                info!("{} armed ({:?})", thread_name, interval);
                loop {
                    thread::sleep(interval);
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    match poll(&surveillance) {
                        Ok(PollOutcome::Disabled) => {
                            running.store(false, Ordering::SeqCst);
                            break;
                        }
                        Ok(PollOutcome::Checked(_)) => {}
                        Err(e) => warn!("{} tick failed: {:#}", thread_name, e),
                    }
                }
                info!("{} disarmed", thread_name);
            })
            .expect("Failed to spawn surveillance thread");
    }

    /// One app block protection tick
    pub fn poll_app_block_protection(&self) -> Result<PollOutcome> {
        if !self.inner.store.is_enabled(OVERLAY_RESTRICTED_CONTENT) {
            let cleared = {
                let mut active = self.inner.active_overlays.lock();
                let count = active.len();
                active.clear();
                count
            };
            info!(
                "App block protection switched off; cleared {} active overlay(s)",
                cleared
            );
            return Ok(PollOutcome::Disabled);
        }
        Ok(PollOutcome::Checked(self.check_blocked_apps()?))
    }

    /// One settings protection tick
    pub fn poll_settings_protection(&self) -> Result<PollOutcome> {
        if !self.inner.store.is_enabled(BLOCK_SETTINGS_SWITCH) {
            let mut active = self.inner.active_overlays.lock();
            for surface in RestrictedSurface::ALL {
                active.remove(&surface.overlay_key());
            }
            info!("Settings protection switched off");
            return Ok(PollOutcome::Disabled);
        }
        let (_, flagged) = self.flag_first_open_surface()?;
        Ok(PollOutcome::Checked(flagged))
    }

    /// Flag every blocked app that is running and not yet flagged
    pub fn check_blocked_apps(&self) -> Result<usize> {
        let apps = self.inner.store.blocked_apps();
        if apps.is_empty() {
            return Ok(0);
        }

        let snapshot = self.inner.snapshots.get()?;
        let mut flagged = 0;
        for app in apps {
            let pids = snapshot.app_pids(&app);
            let request = FlagRequest::new(&app.display_name, &app.process_name);
            if self.track(&request.overlay_key, !pids.is_empty()) {
                warn!(
                    "Blocked app {} ({}) is running as pid(s) {:?}",
                    app.display_name, app.process_name, pids
                );
                self.inner
                    .overlay
                    .flag(request.with_target(CloseTarget::Pids(pids)));
                flagged += 1;
            }
        }
        Ok(flagged)
    }

    /// Flag the first open restricted surface, skipping the remaining checks
    pub fn check_restricted_surfaces(&self) -> Result<Option<RestrictedSurface>> {
        Ok(self.flag_first_open_surface()?.0)
    }

    /// The open surface, if any, and whether it was newly flagged
    fn flag_first_open_surface(&self) -> Result<(Option<RestrictedSurface>, usize)> {
        let snapshot = self.inner.snapshots.get()?;

        for surface in RestrictedSurface::ALL {
            let open = surface.is_open(&snapshot);
            let newly = self.track(&surface.overlay_key(), open);
            if !open {
                continue;
            }

            if newly {
                warn!("{} is open", surface.display_name());
                self.inner.overlay.flag(surface.flag_request(&snapshot));
            }
            return Ok((Some(surface), usize::from(newly)));
        }
        Ok((None, 0))
    }

    /// Update the active-overlay set; true if the key just became flagged
    ///
    /// A process that stopped running is dropped silently; its overlay (if
    /// still shown) is left for an explicit close.
    fn track(&self, overlay_key: &str, running: bool) -> bool {
        let mut active = self.inner.active_overlays.lock();
        if running {
            active.insert(overlay_key.to_string())
        } else {
            if active.remove(overlay_key) {
                debug!("{} no longer flagged", overlay_key);
            }
            false
        }
    }

    /// Whether the blocked app `process_name` has an overlay raised
    pub fn is_flagged(&self, process_name: &str) -> bool {
        self.inner
            .active_overlays
            .lock()
            .contains(&normalize_process_name(process_name))
    }

    pub fn is_surface_flagged(&self, surface: RestrictedSurface) -> bool {
        self.inner
            .active_overlays
            .lock()
            .contains(&surface.overlay_key())
    }

    /// The user dismissed an overlay with the manual-close button
    ///
    /// Denied (false) while the 8 hour window is active, or when the overlay
    /// showing belongs to another app. Otherwise the manual change is
    /// recorded, the overlay closes and the app is checked again 30 seconds
    /// later.
    pub fn accept_manual_close(&self, process_name: &str) -> Result<bool> {
        let overlay = &self.inner.overlay;
        if !overlay.throttle().can_allow_manual_closure() {
            warn!(
                "Manual close of {} denied: last override was less than 8 hours ago",
                process_name
            );
            return Ok(false);
        }

        let Some(request) = overlay.close_for_manual_override(process_name)? else {
            warn!(
                "Manual close of {} denied: no overlay is showing for it",
                process_name
            );
            return Ok(false);
        };

        let due_ms = self.inner.clock.now_ms() + MANUAL_CLOSE_RECHECK_MS;
        info!(
            "Manual close of {} accepted; rechecking in {} ms",
            request.display_name, MANUAL_CLOSE_RECHECK_MS
        );
        self.inner.rechecks.lock().push(Recheck { due_ms, request });
        self.schedule_recheck(MANUAL_CLOSE_RECHECK_MS);
        Ok(true)
    }

    fn schedule_recheck(&self, delay_ms: u64) {
        if self.inner.config.driver == TimerDriver::External {
            return;
        }

        let surveillance = self.clone();
        thread::Builder::new()
            .name("manual-close-recheck".to_string())
            .spawn(move || {
                thread::sleep(Duration::from_millis(delay_ms));
                surveillance.run_due_rechecks();
            })
            .expect("Failed to spawn recheck thread");
    }

    /// Run the rechecks whose time has come; returns how many re-flagged
    pub fn run_due_rechecks(&self) -> usize {
        let now = self.inner.clock.now_ms();
        let due: Vec<Recheck> = {
            let mut rechecks = self.inner.rechecks.lock();
            let (due, pending): (Vec<Recheck>, Vec<Recheck>) = std::mem::take(&mut *rechecks)
                .into_iter()
                .partition(|r| r.due_ms <= now);
            *rechecks = pending;
            due
        };

        let mut reflagged = 0;
        for recheck in due {
            match self.check_if_app_is_still_open_and_flag(&recheck.request) {
                Ok(true) => reflagged += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    "Recheck of {} failed: {:#}",
                    recheck.request.display_name, e
                ),
            }
        }
        reflagged
    }

    pub fn pending_rechecks(&self) -> usize {
        self.inner.rechecks.lock().len()
    }

    /// Re-flag the app if it is still running; true if flagged again
    pub fn check_if_app_is_still_open_and_flag(&self, request: &FlagRequest) -> Result<bool> {
        self.inner.snapshots.invalidate();
        let snapshot = self.inner.snapshots.get()?;

        let Some(target) = Self::locate(request, &snapshot) else {
            info!("{} was closed", request.display_name);
            self.track(&request.overlay_key, false);
            return Ok(false);
        };

        warn!("{} still open after manual close", request.display_name);
        self.track(&request.overlay_key, true);
        if self.inner.overlay.is_pending(&request.overlay_key) {
            debug!("{} already flagged again", request.display_name);
        } else {
            self.inner.overlay.flag(request.clone().with_target(target));
        }
        Ok(true)
    }

    /// Where the flagged app or surface is now, if still open
    fn locate(request: &FlagRequest, snapshot: &ProcessSnapshot) -> Option<CloseTarget> {
        if let Some(surface) = RestrictedSurface::from_overlay_key(&request.overlay_key) {
            return surface
                .is_open(snapshot)
                .then(|| surface.close_target(snapshot));
        }
        let pids = snapshot.pids_matching(&request.process_name, &request.display_name);
        (!pids.is_empty()).then_some(CloseTarget::Pids(pids))
    }

    /// Close the flagged app, then its overlay
    ///
    /// Either way the flag is spent: an app that survived is flagged again
    /// as a new sighting by the next check.
    pub fn close_app_and_overlay(&self, request: &FlagRequest) -> CloseOutcome {
        let outcome = enforcement::close_app(
            self.inner.snapshots.query().as_ref(),
            self.inner.control.as_ref(),
            &request.process_name,
            &request.target,
            &self.inner.config.enforcement,
        );

        self.inner.snapshots.invalidate();
        if !outcome.is_closed() {
            warn!(
                "{} is still open; it will be flagged again on the next check",
                request.display_name
            );
        }
        self.track(&request.overlay_key, false);
        self.inner.overlay.close_overlay_for_key(&request.overlay_key);
        outcome
    }

    /// Close the app behind the current overlay, if any
    ///
    /// An overlay that offers the manual override stays up for the decision
    /// window first; `None` until then or when nothing is showing.
    pub fn enforce_current_overlay(&self) -> Option<CloseOutcome> {
        let (request, shown_for_ms) = self.inner.overlay.current_with_age()?;
        let window_ms = self.inner.config.override_window_ms;
        if request.is_manual_override_allowed && shown_for_ms < window_ms {
            debug!(
                "Waiting {} ms for a manual override of {}",
                window_ms - shown_for_ms,
                request.display_name
            );
            return None;
        }
        Some(self.close_app_and_overlay(&request))
    }

    /// Disarm both polling loops
    pub fn stop(&self) {
        for slot in [&self.inner.app_loop, &self.inner.settings_loop] {
            if let Some(running) = slot.lock().take() {
                running.store(false, Ordering::SeqCst);
            }
        }
        self.inner.active_overlays.lock().clear();
        info!("Surveillance stopped");
    }
}
