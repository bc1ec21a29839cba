#![allow(dead_code)]

use anyhow::Result;
use eagleblock::clock::ManualClock;
use eagleblock::constants::OVERRIDE_DECISION_WINDOW_MS;
use eagleblock::enforcement::EnforcementTiming;
use eagleblock::overlay::{FlagRequest, OverlayPresenter};
use eagleblock::process::{ProcessControl, ProcessInfo, ProcessQuery};
use eagleblock::surveillance::SurveillanceConfig;
use eagleblock::timers::{TimerDriver, TimerEvent};
use eagleblock::{CoreOptions, CorePorts, EagleBlockCore};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Epoch ms the manual clock starts at
pub const START_MS: u64 = 1_700_000_000_000;

/// In-memory process table
#[derive(Default)]
pub struct FakeProcesses {
    running: Mutex<Vec<ProcessInfo>>,
    next_pid: AtomicU32,
    close_requests: Mutex<Vec<String>>,
    window_closes: Mutex<Vec<String>>,
    kills: Mutex<Vec<String>>,
    /// Processes that ignore graceful close requests
    stubborn: Mutex<Vec<String>>,
    /// Processes that survive force termination
    unkillable: Mutex<Vec<String>>,
}

impl FakeProcesses {
    pub fn launch(&self, name: &str, title: &str) -> u32 {
        let pid = 1000 + self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.running.lock().push(ProcessInfo::new(name, title, pid));
        pid
    }

    pub fn quit(&self, name: &str) {
        self.running.lock().retain(|p| !p.matches_name(name));
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.running.lock().iter().any(|p| p.matches_name(name))
    }

    pub fn title_of(&self, name: &str) -> Option<String> {
        self.running
            .lock()
            .iter()
            .find(|p| p.matches_name(name))
            .map(|p| p.window_title.clone())
    }

    pub fn ignore_close_requests(&self, name: &str) {
        self.stubborn.lock().push(name.to_string());
    }

    pub fn survive_kills(&self, name: &str) {
        self.unkillable.lock().push(name.to_string());
    }

    /// Names of the processes asked to close
    pub fn close_requests(&self) -> Vec<String> {
        self.close_requests.lock().clone()
    }

    /// Title fragments whose windows were asked to close
    pub fn window_closes(&self) -> Vec<String> {
        self.window_closes.lock().clone()
    }

    /// Names of the processes killed (or attempted)
    pub fn kills(&self) -> Vec<String> {
        self.kills.lock().clone()
    }

    fn listed(list: &Mutex<Vec<String>>, process: &ProcessInfo) -> bool {
        list.lock().iter().any(|name| process.matches_name(name))
    }

    fn with_pids(&self, pids: &[u32]) -> Vec<ProcessInfo> {
        self.running
            .lock()
            .iter()
            .filter(|p| pids.contains(&p.pid))
            .cloned()
            .collect()
    }

    fn remove(&self, pid: u32) {
        self.running.lock().retain(|p| p.pid != pid);
    }
}

impl ProcessQuery for FakeProcesses {
    fn list_processes(&self) -> Result<Vec<ProcessInfo>> {
        Ok(self.running.lock().clone())
    }
}

impl ProcessControl for FakeProcesses {
    fn request_close(&self, pids: &[u32]) -> Result<bool> {
        let targets = self.with_pids(pids);
        for process in &targets {
            self.close_requests.lock().push(process.name.clone());
            if !Self::listed(&self.stubborn, process) {
                self.remove(process.pid);
            }
        }
        Ok(!targets.is_empty())
    }

    /// Closing a window blanks its title; the host process keeps running
    fn close_windows_titled(&self, text: &str) -> Result<bool> {
        self.window_closes.lock().push(text.to_string());
        let text = text.to_lowercase();
        let stubborn = self.stubborn.lock().clone();
        let mut closed = false;
        for process in self.running.lock().iter_mut() {
            let ignores = stubborn.iter().any(|name| process.matches_name(name));
            if process.window_title.to_lowercase().contains(&text) && !ignores {
                process.window_title.clear();
                closed = true;
            }
        }
        Ok(closed)
    }

    fn force_terminate(&self, pids: &[u32]) -> Result<bool> {
        let mut killed = false;
        for process in self.with_pids(pids) {
            self.kills.lock().push(process.name.clone());
            if !Self::listed(&self.unkillable, &process) {
                self.remove(process.pid);
                killed = true;
            }
        }
        Ok(killed)
    }
}

/// Remembers what the overlay showed
#[derive(Default)]
pub struct RecordingPresenter {
    presented: Mutex<Vec<FlagRequest>>,
    closes: Mutex<usize>,
}

impl RecordingPresenter {
    pub fn presented(&self) -> Vec<FlagRequest> {
        self.presented.lock().clone()
    }

    pub fn presented_names(&self) -> Vec<String> {
        self.presented
            .lock()
            .iter()
            .map(|r| r.display_name.clone())
            .collect()
    }

    pub fn close_count(&self) -> usize {
        *self.closes.lock()
    }
}

impl OverlayPresenter for RecordingPresenter {
    fn present(&self, request: &FlagRequest) -> Result<()> {
        self.presented.lock().push(request.clone());
        Ok(())
    }

    fn close(&self) -> Result<()> {
        *self.closes.lock() += 1;
        Ok(())
    }
}

fn build_core(
    dir: &TempDir,
    clock: Arc<ManualClock>,
    processes: Arc<FakeProcesses>,
    presenter: Arc<RecordingPresenter>,
    events: Sender<TimerEvent>,
) -> EagleBlockCore {
    let options = CoreOptions {
        data_dir: dir.path().join("data"),
        hosts_file: dir.path().join("hosts"),
        timer_driver: TimerDriver::External,
        surveillance: SurveillanceConfig {
            snapshot_ttl_ms: 0,
            enforcement: EnforcementTiming {
                grace: Duration::ZERO,
                confirm_poll: Duration::from_millis(1),
                confirm_timeout: Duration::from_millis(20),
            },
            driver: TimerDriver::External,
            ..SurveillanceConfig::default()
        },
    };
    let ports = CorePorts {
        clock,
        query: processes.clone(),
        control: processes,
        presenter,
    };
    EagleBlockCore::new(options, ports, events).unwrap()
}

/// A core wired to fakes, with every timer driven by hand
pub struct Harness {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub processes: Arc<FakeProcesses>,
    pub presenter: Arc<RecordingPresenter>,
    pub core: EagleBlockCore,
    pub events: Receiver<TimerEvent>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self::in_dir(dir)
    }

    /// Build a fresh core over an existing data directory (simulates a restart)
    pub fn in_dir(dir: TempDir) -> Self {
        Self::in_dir_at(dir, START_MS)
    }

    pub fn in_dir_at(dir: TempDir, now_ms: u64) -> Self {
        let clock = Arc::new(ManualClock::new(now_ms));
        let processes = Arc::new(FakeProcesses::default());
        let presenter = Arc::new(RecordingPresenter::default());

        let (tx, events) = mpsc::channel();
        let core = build_core(&dir, clock.clone(), processes.clone(), presenter.clone(), tx);

        Self {
            dir,
            clock,
            processes,
            presenter,
            core,
            events,
        }
    }

    /// A second core over the same files, like a one-shot CLI command
    pub fn other_process(&self) -> EagleBlockCore {
        let (tx, _events) = mpsc::channel();
        build_core(
            &self.dir,
            self.clock.clone(),
            Arc::new(FakeProcesses::default()),
            Arc::new(RecordingPresenter::default()),
            tx,
        )
    }

    /// Let the manual override decision window of the current overlay pass
    pub fn past_override_window(&self) {
        self.clock.advance(OVERRIDE_DECISION_WINDOW_MS);
    }

    /// Tear down the core but keep its files
    pub fn restart_at(self, now_ms: u64) -> Self {
        self.core.shutdown();
        Self::in_dir_at(self.dir, now_ms)
    }

    pub fn hosts_content(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("hosts")).unwrap_or_default()
    }

    pub fn drain_events(&self) -> Vec<TimerEvent> {
        self.events.try_iter().collect()
    }
}
