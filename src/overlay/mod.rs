//! Overlay flag queue.
//!
//! At most one overlay is shown at a time. Flags raised while one is
//! showing wait in a FIFO queue; closing the current overlay presents the
//! next one. While the re-flag throttle is active the next presentation is
//! parked in a single deferred slot until the throttle elapses.

mod throttle;

pub use throttle::{manual_closure_allowed_at, reflag_wait_at, ManualOverrideThrottle};

use crate::clock::Clock;
use crate::enforcement::CloseTarget;
use crate::store::normalize_process_name;
use crate::timers::TimerDriver;
use anyhow::Result;
use log::{debug, error, info};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A blocked app (or restricted surface) that needs an overlay
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagRequest {
    pub display_name: String,
    pub process_name: String,
    /// Whether the overlay may offer the manual-close button
    pub is_manual_override_allowed: bool,
    /// Entry in the active-overlay set
    #[serde(skip)]
    pub overlay_key: String,
    /// What enforcement closes for this flag
    #[serde(skip)]
    pub target: CloseTarget,
}

impl FlagRequest {
    /// Keyed by the normalized process name, closed by that name
    pub fn new(display_name: impl Into<String>, process_name: impl Into<String>) -> Self {
        let process_name = process_name.into();
        Self {
            display_name: display_name.into(),
            overlay_key: normalize_process_name(&process_name),
            process_name,
            is_manual_override_allowed: false,
            target: CloseTarget::ProcessName,
        }
    }

    pub fn with_key(mut self, overlay_key: impl Into<String>) -> Self {
        self.overlay_key = overlay_key.into();
        self
    }

    pub fn with_target(mut self, target: CloseTarget) -> Self {
        self.target = target;
        self
    }

    pub fn is_for_process(&self, process_name: &str) -> bool {
        normalize_process_name(&self.process_name) == normalize_process_name(process_name)
    }
}

/// UI primitives the controller drives
///
/// Implementations must not call back into the controller.
pub trait OverlayPresenter: Send + Sync {
    fn present(&self, request: &FlagRequest) -> Result<()>;
    fn close(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagOutcome {
    Presented,
    /// Waiting behind the current (or deferred) overlay at this queue position
    Queued(usize),
    /// Held back by the re-flag throttle for this many milliseconds
    Deferred(u64),
}

#[derive(Default)]
struct OverlayState {
    current: Option<FlagRequest>,
    /// When the current overlay was presented (epoch ms)
    shown_at_ms: u64,
    deferred: Option<(u64, FlagRequest)>,
    queue: VecDeque<FlagRequest>,
}

#[derive(Clone)]
pub struct OverlayController {
    inner: Arc<OverlayInner>,
}

struct OverlayInner {
    presenter: Arc<dyn OverlayPresenter>,
    throttle: ManualOverrideThrottle,
    clock: Arc<dyn Clock>,
    driver: TimerDriver,
    state: Mutex<OverlayState>,
}

impl OverlayController {
    pub fn new(
        presenter: Arc<dyn OverlayPresenter>,
        throttle: ManualOverrideThrottle,
        clock: Arc<dyn Clock>,
        driver: TimerDriver,
    ) -> Self {
        Self {
            inner: Arc::new(OverlayInner {
                presenter,
                throttle,
                clock,
                driver,
                state: Mutex::new(OverlayState::default()),
            }),
        }
    }

    pub fn throttle(&self) -> &ManualOverrideThrottle {
        &self.inner.throttle
    }

    pub fn flag_app_with_overlay(&self, display_name: &str, process_name: &str) -> FlagOutcome {
        self.flag(FlagRequest::new(display_name, process_name))
    }

    /// Show, queue or defer an overlay; the override flag is decided here
    pub fn flag(&self, mut request: FlagRequest) -> FlagOutcome {
        request.is_manual_override_allowed = self.inner.throttle.can_allow_manual_closure();

        let mut state = self.inner.state.lock();
        if state.current.is_some() || state.deferred.is_some() {
            debug!(
                "Queued overlay for {} ({} waiting)",
                request.display_name,
                state.queue.len() + 1
            );
            state.queue.push_back(request);
            return FlagOutcome::Queued(state.queue.len());
        }

        self.present_or_defer(&mut state, request)
    }

    /// Dismiss the current overlay and move on to the next queued one
    ///
    /// Returns the request whose overlay was closed.
    pub fn close_overlay_window(&self) -> Option<FlagRequest> {
        let mut state = self.inner.state.lock();
        self.close_current(&mut state)
    }

    /// Close the current overlay only if it was raised under `overlay_key`
    pub fn close_overlay_for_key(&self, overlay_key: &str) -> Option<FlagRequest> {
        let mut state = self.inner.state.lock();
        if !state.current.as_ref().is_some_and(|r| r.overlay_key == overlay_key) {
            return None;
        }
        self.close_current(&mut state)
    }

    /// Close the overlay showing for `process_name` through the manual override
    ///
    /// Returns `None` when the current overlay belongs to another app. The
    /// manual change is recorded before the next overlay is considered, so
    /// that one waits out the re-flag throttle.
    pub fn close_for_manual_override(&self, process_name: &str) -> Result<Option<FlagRequest>> {
        let mut state = self.inner.state.lock();
        if !state.current.as_ref().is_some_and(|r| r.is_for_process(process_name)) {
            return Ok(None);
        }
        self.inner.throttle.record_manual_change()?;
        Ok(self.close_current(&mut state))
    }

    fn close_current(&self, state: &mut OverlayState) -> Option<FlagRequest> {
        let closed = state.current.take();

        if let Some(ref request) = closed {
            info!("Closing overlay for {}", request.display_name);
            if let Err(e) = self.inner.presenter.close() {
                error!("Failed to close overlay: {:#}", e);
            }
        }

        if state.deferred.is_none() {
            if let Some(next) = state.queue.pop_front() {
                self.present_or_defer(state, next);
            }
        }
        closed
    }

    /// Present the deferred request if the throttle has elapsed
    pub fn present_deferred_if_due(&self) -> bool {
        let now = self.inner.clock.now_ms();
        let mut state = self.inner.state.lock();

        match state.deferred {
            Some((due_ms, _)) if now >= due_ms => {}
            _ => return false,
        }
        let Some((_, request)) = state.deferred.take() else {
            return false;
        };

        // A manual change while deferred restarts the wait
        self.present_or_defer(&mut state, request) == FlagOutcome::Presented
    }

    pub fn current(&self) -> Option<FlagRequest> {
        self.inner.state.lock().current.clone()
    }

    pub fn deferred(&self) -> Option<FlagRequest> {
        self.inner
            .state
            .lock()
            .deferred
            .as_ref()
            .map(|(_, request)| request.clone())
    }

    pub fn queued(&self) -> Vec<FlagRequest> {
        self.inner.state.lock().queue.iter().cloned().collect()
    }

    pub fn is_showing(&self) -> bool {
        self.inner.state.lock().current.is_some()
    }

    /// Whether a flag under `overlay_key` is showing, deferred or queued
    pub fn is_pending(&self, overlay_key: &str) -> bool {
        let state = self.inner.state.lock();
        state
            .current
            .iter()
            .chain(state.deferred.as_ref().map(|(_, request)| request))
            .chain(state.queue.iter())
            .any(|r| r.overlay_key == overlay_key)
    }

    /// The current request and how long its overlay has been up (ms)
    pub fn current_with_age(&self) -> Option<(FlagRequest, u64)> {
        let state = self.inner.state.lock();
        let age = self.inner.clock.now_ms().saturating_sub(state.shown_at_ms);
        state.current.clone().map(|request| (request, age))
    }

    fn present_or_defer(&self, state: &mut OverlayState, request: FlagRequest) -> FlagOutcome {
        let wait_ms = self.inner.throttle.reflag_wait_ms();
        if wait_ms > 0 {
            info!(
                "Deferring overlay for {} by {} ms (recent manual change)",
                request.display_name, wait_ms
            );
            state.deferred = Some((self.inner.clock.now_ms() + wait_ms, request));
            self.schedule_deferred(wait_ms);
            return FlagOutcome::Deferred(wait_ms);
        }

        info!("Showing overlay for {}", request.display_name);
        if let Err(e) = self.inner.presenter.present(&request) {
            error!("Failed to present overlay for {}: {:#}", request.display_name, e);
        }
        state.current = Some(request);
        state.shown_at_ms = self.inner.clock.now_ms();
        FlagOutcome::Presented
    }

    fn schedule_deferred(&self, wait_ms: u64) {
        if self.inner.driver == TimerDriver::External {
            return;
        }

        let controller = self.clone();
        thread::Builder::new()
            .name("overlay-deferred".to_string())
            .spawn(move || {
                thread::sleep(Duration::from_millis(wait_ms));
                controller.present_deferred_if_due();
            })
            .expect("Failed to spawn deferred overlay thread");
    }
}
