use super::{ProcessControl, ProcessInfo, ProcessQuery};
use anyhow::Result;
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::HashMap;
use sysinfo::{Pid, System};

/// Process access backed by `sysinfo`, plus top-level window handling on
/// Windows
pub struct SystemProcesses {
    system: Mutex<System>,
}

impl SystemProcesses {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemProcesses {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(windows)]
fn window_titles() -> HashMap<u32, String> {
    super::win32::window_titles()
}

#[cfg(not(windows))]
fn window_titles() -> HashMap<u32, String> {
    HashMap::new()
}

impl ProcessQuery for SystemProcesses {
    fn list_processes(&self) -> Result<Vec<ProcessInfo>> {
        let titles = window_titles();
        let mut system = self.system.lock();
        system.refresh_processes();

        let processes: Vec<ProcessInfo> = system
            .processes()
            .values()
            .map(|p| {
                let pid = p.pid().as_u32();
                ProcessInfo {
                    name: p.name().to_string(),
                    window_title: titles.get(&pid).cloned().unwrap_or_default(),
                    pid,
                }
            })
            .collect();

        debug!(
            "Enumerated {} processes ({} with windows)",
            processes.len(),
            titles.len()
        );
        Ok(processes)
    }
}

impl ProcessControl for SystemProcesses {
    fn request_close(&self, pids: &[u32]) -> Result<bool> {
        if pids.is_empty() {
            return Ok(false);
        }

        #[cfg(windows)]
        let asked = super::win32::post_close(pids) > 0;

        #[cfg(not(windows))]
        let asked = {
            let mut system = self.system.lock();
            system.refresh_processes();
            pids.iter()
                .filter_map(|pid| system.process(Pid::from_u32(*pid)))
                .filter_map(|p| p.kill_with(sysinfo::Signal::Term))
                .fold(false, |any, sent| any || sent)
        };

        if asked {
            info!("Asked {} process(es) to close", pids.len());
        }
        Ok(asked)
    }

    #[cfg(windows)]
    fn close_windows_titled(&self, text: &str) -> Result<bool> {
        let asked = super::win32::post_close_titled(text);
        debug!("Posted close to {} '{}' window(s)", asked, text);
        Ok(asked > 0)
    }

    #[cfg(not(windows))]
    fn close_windows_titled(&self, text: &str) -> Result<bool> {
        debug!("No window handling on this platform; '{}' left open", text);
        Ok(false)
    }

    fn force_terminate(&self, pids: &[u32]) -> Result<bool> {
        let mut system = self.system.lock();
        system.refresh_processes();

        let mut killed = false;
        for pid in pids {
            if let Some(process) = system.process(Pid::from_u32(*pid)) {
                if process.kill() {
                    info!("Force-terminated {} ({})", process.name(), pid);
                    killed = true;
                }
            }
        }
        Ok(killed)
    }
}
