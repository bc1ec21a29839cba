//! Closing blocked applications.
//!
//! Enforcement acts on what a snapshot actually matched, described by a
//! [`CloseTarget`]. A regular app first gets a graceful close request, then a
//! short grace period, then force termination. Restricted system processes go
//! straight to force termination. Surfaces hosted by a shared process (such
//! as Control Panel inside Explorer) only have their windows closed. Either
//! way the caller only sees success once the target has actually
//! disappeared, or failure after the confirmation ceiling.

use crate::constants::{
    CLOSE_CONFIRM_POLL_MS, CLOSE_CONFIRM_TIMEOUT_MS, GRACEFUL_CLOSE_GRACE_MS,
    SYSTEM_CRITICAL_PROCESSES,
};
use crate::process::{ProcessControl, ProcessQuery};
use crate::store::normalize_process_name;
use log::{info, warn};
use std::thread;
use std::time::{Duration, Instant};

/// Waits used while closing an app
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnforcementTiming {
    /// Between the graceful close request and force termination
    pub grace: Duration,
    /// Between "is it gone yet" checks
    pub confirm_poll: Duration,
    /// Give up waiting after this long
    pub confirm_timeout: Duration,
}

impl Default for EnforcementTiming {
    fn default() -> Self {
        Self {
            grace: Duration::from_millis(GRACEFUL_CLOSE_GRACE_MS),
            confirm_poll: Duration::from_millis(CLOSE_CONFIRM_POLL_MS),
            confirm_timeout: Duration::from_millis(CLOSE_CONFIRM_TIMEOUT_MS),
        }
    }
}

/// What to close for a flagged app
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseTarget {
    /// Every process carrying the request's process name, resolved at close time
    ProcessName,
    /// The processes a snapshot matched, by name or by window title
    Pids(Vec<u32>),
    /// Windows whose title contains this text; their host process is left alone
    WindowTitle(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    StillRunning,
}

impl CloseOutcome {
    pub fn is_closed(&self) -> bool {
        *self == CloseOutcome::Closed
    }
}

pub fn is_system_critical(process_name: &str) -> bool {
    let name = normalize_process_name(process_name);
    SYSTEM_CRITICAL_PROCESSES.contains(&name.as_str())
}

/// Query failures count as "still open"
fn still_open(label: &str, check: impl FnOnce() -> anyhow::Result<bool>) -> bool {
    check().unwrap_or_else(|e| {
        warn!("Failed to query {}: {:#}", label, e);
        true
    })
}

/// Close what `target` describes for the app `process_name`
pub fn close_app(
    query: &dyn ProcessQuery,
    control: &dyn ProcessControl,
    process_name: &str,
    target: &CloseTarget,
    timing: &EnforcementTiming,
) -> CloseOutcome {
    match target {
        CloseTarget::WindowTitle(title) => close_windows(query, control, title, timing),
        CloseTarget::Pids(pids) => close_processes(query, control, process_name, pids, timing),
        CloseTarget::ProcessName => {
            let pids = match query.pids_named(process_name) {
                Ok(pids) => pids,
                Err(e) => {
                    warn!("Failed to look up {}: {:#}", process_name, e);
                    return CloseOutcome::StillRunning;
                }
            };
            close_processes(query, control, process_name, &pids, timing)
        }
    }
}

fn close_processes(
    query: &dyn ProcessQuery,
    control: &dyn ProcessControl,
    process_name: &str,
    pids: &[u32],
    timing: &EnforcementTiming,
) -> CloseOutcome {
    let alive = || still_open(process_name, || query.any_alive(pids));
    if !alive() {
        info!("{} is not running", process_name);
        return CloseOutcome::Closed;
    }

    if is_system_critical(process_name) {
        info!("Force-closing system surface {}", process_name);
        force_terminate(control, process_name, pids);
    } else {
        let asked = control.request_close(pids).unwrap_or_else(|e| {
            warn!("Graceful close of {} failed: {:#}", process_name, e);
            false
        });
        if asked {
            thread::sleep(timing.grace);
        }
        if alive() {
            warn!("{} still running, force killing", process_name);
            force_terminate(control, process_name, pids);
        }
    }

    wait_until_gone(process_name, timing, alive)
}

fn force_terminate(control: &dyn ProcessControl, process_name: &str, pids: &[u32]) {
    match control.force_terminate(pids) {
        Ok(true) => {}
        Ok(false) => warn!("No {} process could be terminated", process_name),
        Err(e) => warn!("Failed to terminate {}: {:#}", process_name, e),
    }
}

fn close_windows(
    query: &dyn ProcessQuery,
    control: &dyn ProcessControl,
    title: &str,
    timing: &EnforcementTiming,
) -> CloseOutcome {
    let open = || still_open(title, || query.any_window_titled(title));
    if !open() {
        info!("No '{}' window is open", title);
        return CloseOutcome::Closed;
    }

    match control.close_windows_titled(title) {
        Ok(true) => info!("Asked '{}' windows to close", title),
        Ok(false) => warn!("No '{}' window accepted the close request", title),
        Err(e) => warn!("Failed to close '{}' windows: {:#}", title, e),
    }
    wait_until_gone(title, timing, open)
}

fn wait_until_gone(
    label: &str,
    timing: &EnforcementTiming,
    is_open: impl Fn() -> bool,
) -> CloseOutcome {
    let deadline = Instant::now() + timing.confirm_timeout;
    loop {
        if !is_open() {
            info!("{} closed", label);
            return CloseOutcome::Closed;
        }

        let now = Instant::now();
        if now >= deadline {
            warn!("{} still open after {:?}", label, timing.confirm_timeout);
            return CloseOutcome::StillRunning;
        }
        thread::sleep(timing.confirm_poll.min(deadline - now));
    }
}
