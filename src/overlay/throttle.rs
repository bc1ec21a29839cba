//! Manual-override cool-downs.
//!
//! Both windows hang off the persisted `lastManualChangeTimestamp`:
//! new overlays are held back for 30 seconds after a manual change, and the
//! manual-close affordance is offered at most once every 8 hours.

use crate::clock::Clock;
use crate::constants::{MANUAL_OVERRIDE_COOLDOWN_MS, REFLAG_THROTTLE_MS};
use crate::store::Store;
use anyhow::{Context, Result};
use log::info;
use std::sync::Arc;

/// How long new overlays must still wait at `now_ms`
pub fn reflag_wait_at(last_manual_change: Option<u64>, now_ms: u64) -> u64 {
    match last_manual_change {
        Some(last) => last
            .saturating_add(REFLAG_THROTTLE_MS)
            .saturating_sub(now_ms)
            .min(REFLAG_THROTTLE_MS),
        None => 0,
    }
}

/// Whether the manual-close affordance may be offered at `now_ms`
pub fn manual_closure_allowed_at(last_manual_change: Option<u64>, now_ms: u64) -> bool {
    match last_manual_change {
        Some(last) => now_ms.saturating_sub(last) >= MANUAL_OVERRIDE_COOLDOWN_MS,
        None => true,
    }
}

#[derive(Clone)]
pub struct ManualOverrideThrottle {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
}

impl ManualOverrideThrottle {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn last_manual_change(&self) -> Option<u64> {
        self.store.read_preferences().last_manual_change
    }

    pub fn can_flag_now(&self) -> bool {
        self.reflag_wait_ms() == 0
    }

    /// Milliseconds left in the re-flag throttle, zero if not throttled
    pub fn reflag_wait_ms(&self) -> u64 {
        reflag_wait_at(self.last_manual_change(), self.clock.now_ms())
    }

    pub fn can_allow_manual_closure(&self) -> bool {
        manual_closure_allowed_at(self.last_manual_change(), self.clock.now_ms())
    }

    /// Re-arm both cool-downs from now
    pub fn record_manual_change(&self) -> Result<u64> {
        let now = self.clock.now_ms();
        self.store
            .update_preferences(|prefs| prefs.last_manual_change = Some(now))
            .context("Failed to record manual change")?;
        info!("Manual override recorded; next one allowed in 8 hours");
        Ok(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: u64 = 60 * 60 * 1000;

    #[test]
    fn test_reflag_wait() {
        assert_eq!(reflag_wait_at(None, 1_000), 0);
        assert_eq!(reflag_wait_at(Some(100_000), 110_000), 20_000);
        assert_eq!(reflag_wait_at(Some(100_000), 130_000), 0);
        // Clock moved backwards: never wait longer than the throttle itself
        assert_eq!(reflag_wait_at(Some(100_000), 10_000), REFLAG_THROTTLE_MS);
    }

    #[test]
    fn test_manual_closure_window() {
        let t = 10 * HOUR_MS;
        assert!(manual_closure_allowed_at(None, t));
        assert!(!manual_closure_allowed_at(Some(t), t + HOUR_MS));
        assert!(!manual_closure_allowed_at(Some(t), t + 8 * HOUR_MS - 1));
        assert!(manual_closure_allowed_at(Some(t), t + 8 * HOUR_MS));
    }

    #[test]
    fn test_record_manual_change_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path()).unwrap());
        let clock = Arc::new(crate::clock::ManualClock::new(5_000));
        let throttle = ManualOverrideThrottle::new(store.clone(), clock.clone());

        assert!(throttle.can_flag_now());
        assert!(throttle.can_allow_manual_closure());

        throttle.record_manual_change().unwrap();
        assert_eq!(store.read_preferences().last_manual_change, Some(5_000));
        assert!(!throttle.can_flag_now());
        assert!(!throttle.can_allow_manual_closure());

        clock.advance(REFLAG_THROTTLE_MS);
        assert!(throttle.can_flag_now());
    }
}
