use crate::constants::{NOTIFICATION_TIMEOUT_MS, OVERRIDE_DECISION_WINDOW_MS};
use crate::overlay::{FlagRequest, OverlayPresenter};
use anyhow::{Context, Result};
use log::{info, warn};

/// Presents overlays as desktop notifications
#[derive(Debug, Default, Clone, Copy)]
pub struct NotificationPresenter;

impl NotificationPresenter {
    fn body(request: &FlagRequest) -> String {
        let mut body = format!(
            "{} is blocked and will be closed.",
            request.display_name
        );
        if request.is_manual_override_allowed {
            body.push_str(&format!(
                "\nTo keep it open, run `eagleblock override {}` within {} seconds \
                 (once every 8 hours).",
                request.process_name,
                OVERRIDE_DECISION_WINDOW_MS / 1000
            ));
        }
        body
    }
}

impl OverlayPresenter for NotificationPresenter {
    fn present(&self, request: &FlagRequest) -> Result<()> {
        notify_rust::Notification::new()
            .summary("EagleBlock - Blocked")
            .body(&Self::body(request))
            .timeout(notify_rust::Timeout::Milliseconds(NOTIFICATION_TIMEOUT_MS))
            .show()
            .context("Failed to show notification")?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        // Notifications expire on their own
        Ok(())
    }
}

/// Only logs; used when notifications are turned off
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl OverlayPresenter for LogPresenter {
    fn present(&self, request: &FlagRequest) -> Result<()> {
        warn!(
            "BLOCKED: {} ({})",
            request.display_name, request.process_name
        );
        Ok(())
    }

    fn close(&self) -> Result<()> {
        info!("Overlay dismissed");
        Ok(())
    }
}
