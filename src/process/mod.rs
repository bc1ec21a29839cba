//! Operating system process access.
//!
//! Surveillance and enforcement only talk to the OS through [`ProcessQuery`]
//! and [`ProcessControl`]. [`SystemProcesses`] implements both against the
//! real machine; tests substitute in-memory fakes.

mod system;
#[cfg(windows)]
mod win32;

pub use system::SystemProcesses;

use crate::store::normalize_process_name;
use anyhow::Result;

/// One running process as seen by a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    /// Executable name as reported by the OS (e.g. `Steam.exe`)
    pub name: String,
    /// Title of the process' main window, empty when it has none
    pub window_title: String,
    pub pid: u32,
}

impl ProcessInfo {
    pub fn new(name: impl Into<String>, window_title: impl Into<String>, pid: u32) -> Self {
        Self {
            name: name.into(),
            window_title: window_title.into(),
            pid,
        }
    }

    pub fn matches_name(&self, process_name: &str) -> bool {
        normalize_process_name(&self.name) == normalize_process_name(process_name)
    }
}

/// Point-in-time process enumeration
pub trait ProcessQuery: Send + Sync {
    fn list_processes(&self) -> Result<Vec<ProcessInfo>>;

    /// Processes with this name (`.exe` and case ignored)
    fn pids_named(&self, process_name: &str) -> Result<Vec<u32>> {
        Ok(self
            .list_processes()?
            .iter()
            .filter(|p| p.matches_name(process_name))
            .map(|p| p.pid)
            .collect())
    }

    fn any_alive(&self, pids: &[u32]) -> Result<bool> {
        Ok(self
            .list_processes()?
            .iter()
            .any(|p| pids.contains(&p.pid)))
    }

    /// Whether any window title contains `text` (case-insensitive)
    fn any_window_titled(&self, text: &str) -> Result<bool> {
        let text = text.to_lowercase();
        Ok(self
            .list_processes()?
            .iter()
            .any(|p| p.window_title.to_lowercase().contains(&text)))
    }
}

/// Process termination
pub trait ProcessControl: Send + Sync {
    /// Ask the windows of these processes to close. Returns false if nothing was asked.
    fn request_close(&self, pids: &[u32]) -> Result<bool>;

    /// Ask every window whose title contains `text` to close, leaving its
    /// process running. Returns false if no window was asked.
    fn close_windows_titled(&self, text: &str) -> Result<bool>;

    /// Kill these processes. Returns false if none was killed.
    fn force_terminate(&self, pids: &[u32]) -> Result<bool>;
}
