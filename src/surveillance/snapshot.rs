//! Cached point-in-time view of running processes.

use crate::clock::Clock;
use crate::constants::{
    CONTROL_PANEL_TITLE, HOSTS_EDITOR_PROCESS, HOSTS_FILE_TITLE, TASK_MANAGER_PROCESS,
    TASK_SCHEDULER_TITLE,
};
use crate::process::{ProcessInfo, ProcessQuery};
use crate::store::BlockedApp;
use anyhow::{Context, Result};
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ProcessSnapshot {
    processes: Vec<ProcessInfo>,
    taken_at_ms: u64,
    pub control_panel_open: bool,
    pub notepad_on_hosts_open: bool,
    pub task_scheduler_open: bool,
    pub task_manager_open: bool,
}

impl ProcessSnapshot {
    pub fn new(processes: Vec<ProcessInfo>, taken_at_ms: u64) -> Self {
        let title_contains = |needle: &str| {
            processes
                .iter()
                .any(|p| p.window_title.to_lowercase().contains(needle))
        };
        let control_panel_open = title_contains(CONTROL_PANEL_TITLE);
        let task_scheduler_open = title_contains(TASK_SCHEDULER_TITLE);
        let notepad_on_hosts_open = processes.iter().any(|p| {
            p.matches_name(HOSTS_EDITOR_PROCESS)
                && p.window_title.to_lowercase().contains(HOSTS_FILE_TITLE)
        });
        let task_manager_open = processes.iter().any(|p| p.matches_name(TASK_MANAGER_PROCESS));

        Self {
            processes,
            taken_at_ms,
            control_panel_open,
            notepad_on_hosts_open,
            task_scheduler_open,
            task_manager_open,
        }
    }

    pub fn pids_named(&self, process_name: &str) -> Vec<u32> {
        self.pids_where(|p| p.matches_name(process_name))
    }

    pub fn pids_titled(&self, text: &str) -> Vec<u32> {
        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return Vec::new();
        }
        self.pids_where(|p| p.window_title.to_lowercase().contains(&text))
    }

    /// Processes matched by exact name, then by a window title containing the
    /// display name (catches launchers whose process name differs from the
    /// configured one). Title matching is case-insensitive.
    pub fn pids_matching(&self, process_name: &str, display_name: &str) -> Vec<u32> {
        let mut pids = self.pids_named(process_name);
        for pid in self.pids_titled(display_name) {
            if !pids.contains(&pid) {
                pids.push(pid);
            }
        }
        pids
    }

    pub fn app_pids(&self, app: &BlockedApp) -> Vec<u32> {
        self.pids_matching(&app.process_name, &app.display_name)
    }

    /// Editor processes that have the hosts file open
    pub fn hosts_editor_pids(&self) -> Vec<u32> {
        self.pids_where(|p| {
            p.matches_name(HOSTS_EDITOR_PROCESS)
                && p.window_title.to_lowercase().contains(HOSTS_FILE_TITLE)
        })
    }

    fn pids_where(&self, filter: impl Fn(&ProcessInfo) -> bool) -> Vec<u32> {
        self.processes
            .iter()
            .filter(|p| filter(p))
            .map(|p| p.pid)
            .collect()
    }
}

/// Reuses one snapshot for a short window so that all checks in a poll
/// cycle see the same processes
pub struct SnapshotCache {
    query: Arc<dyn ProcessQuery>,
    clock: Arc<dyn Clock>,
    ttl_ms: u64,
    cached: Mutex<Option<Arc<ProcessSnapshot>>>,
}

impl SnapshotCache {
    pub fn new(query: Arc<dyn ProcessQuery>, clock: Arc<dyn Clock>, ttl_ms: u64) -> Self {
        Self {
            query,
            clock,
            ttl_ms,
            cached: Mutex::new(None),
        }
    }

    pub fn query(&self) -> &Arc<dyn ProcessQuery> {
        &self.query
    }

    pub fn get(&self) -> Result<Arc<ProcessSnapshot>> {
        let now = self.clock.now_ms();
        let mut cached = self.cached.lock();

        if let Some(snapshot) = cached.as_ref() {
            if now.saturating_sub(snapshot.taken_at_ms) < self.ttl_ms {
                return Ok(snapshot.clone());
            }
        }

        let processes = self
            .query
            .list_processes()
            .context("Failed to enumerate processes")?;
        let snapshot = Arc::new(ProcessSnapshot::new(processes, now));
        debug!("New process snapshot with {} entries", snapshot.processes.len());
        *cached = Some(snapshot.clone());
        Ok(snapshot)
    }

    pub fn invalidate(&self) {
        *self.cached.lock() = None;
    }
}
