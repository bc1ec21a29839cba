mod common;

use common::Harness;
use eagleblock::clock::Clock;
use eagleblock::constants::{
    BLOCK_SETTINGS_SWITCH, MANUAL_CLOSE_RECHECK_MS, OVERLAY_RESTRICTED_CONTENT,
    OVERRIDE_DECISION_WINDOW_MS, REFLAG_THROTTLE_MS,
};
use eagleblock::enforcement::CloseOutcome;
use eagleblock::overlay::FlagOutcome;
use eagleblock::surveillance::{PollOutcome, RestrictedSurface};

const HOUR_MS: u64 = 60 * 60 * 1000;

fn block_three_apps(h: &Harness) {
    h.core.block_app("Alpha", "alpha.exe").unwrap();
    h.core.block_app("Bravo", "bravo.exe").unwrap();
    h.core.block_app("Charlie", "charlie.exe").unwrap();
}

#[test]
fn test_overlays_are_shown_one_at_a_time_in_order() {
    let h = Harness::new();
    block_three_apps(&h);
    h.processes.launch("alpha.exe", "Alpha");
    h.processes.launch("bravo.exe", "Bravo");
    h.processes.launch("charlie.exe", "Charlie");

    h.core.enable_protection(OVERLAY_RESTRICTED_CONTENT).unwrap();

    let overlay = h.core.overlay();
    assert_eq!(h.presenter.presented_names(), vec!["Alpha"]);
    assert_eq!(overlay.queued().len(), 2);

    overlay.close_overlay_window();
    assert_eq!(overlay.current().unwrap().display_name, "Bravo");
    overlay.close_overlay_window();
    overlay.close_overlay_window();

    assert_eq!(h.presenter.presented_names(), vec!["Alpha", "Bravo", "Charlie"]);
    assert_eq!(h.presenter.close_count(), 3);
    assert!(!overlay.is_showing());
}

#[test]
fn test_running_app_is_flagged_once() {
    let h = Harness::new();
    h.core.block_app("Steam", "steam.exe").unwrap();
    h.core.enable_protection(OVERLAY_RESTRICTED_CONTENT).unwrap();
    let surveillance = h.core.surveillance();

    h.processes.launch("Steam.exe", "Steam");
    assert_eq!(
        surveillance.poll_app_block_protection().unwrap(),
        PollOutcome::Checked(1)
    );
    assert_eq!(
        surveillance.poll_app_block_protection().unwrap(),
        PollOutcome::Checked(0)
    );
    assert!(surveillance.is_flagged("steam"));

    // Quitting and relaunching counts as a new sighting
    h.processes.quit("steam.exe");
    surveillance.poll_app_block_protection().unwrap();
    assert!(!surveillance.is_flagged("steam.exe"));
    h.processes.launch("steam.exe", "Steam");
    assert_eq!(
        surveillance.poll_app_block_protection().unwrap(),
        PollOutcome::Checked(1)
    );
}

#[test]
fn test_app_matched_by_window_title() {
    let h = Harness::new();
    h.core.block_app("Minecraft", "minecraft.exe").unwrap();
    h.core.enable_protection(OVERLAY_RESTRICTED_CONTENT).unwrap();

    h.processes.launch("javaw.exe", "Minecraft 1.20.4");

    assert_eq!(h.core.surveillance().check_blocked_apps().unwrap(), 1);
    assert_eq!(h.presenter.presented_names(), vec!["Minecraft"]);
}

#[test]
fn test_switching_protection_off_disarms_and_clears() {
    let h = Harness::new();
    h.core.block_app("Steam", "steam.exe").unwrap();
    h.processes.launch("steam.exe", "Steam");
    h.core.enable_protection(OVERLAY_RESTRICTED_CONTENT).unwrap();
    assert!(h.core.surveillance().is_flagged("steam.exe"));

    h.core
        .store()
        .set_toggle(OVERLAY_RESTRICTED_CONTENT, false)
        .unwrap();

    assert_eq!(
        h.core.surveillance().poll_app_block_protection().unwrap(),
        PollOutcome::Disabled
    );
    assert!(!h.core.surveillance().is_flagged("steam.exe"));
}

#[test]
fn test_settings_protection_flags_first_open_surface_only() {
    let h = Harness::new();
    h.processes.launch("notepad.exe", "hosts - Notepad");
    h.processes.launch("Taskmgr.exe", "Task Manager");
    h.core.enable_protection(BLOCK_SETTINGS_SWITCH).unwrap();
    let surveillance = h.core.surveillance();

    assert_eq!(
        surveillance.check_restricted_surfaces().unwrap(),
        Some(RestrictedSurface::HostsEditor)
    );
    assert_eq!(h.presenter.presented_names(), vec!["Hosts file editor"]);

    // Still open: no second flag
    assert_eq!(
        surveillance.poll_settings_protection().unwrap(),
        PollOutcome::Checked(0)
    );

    h.processes.quit("notepad.exe");
    assert_eq!(
        surveillance.check_restricted_surfaces().unwrap(),
        Some(RestrictedSurface::TaskManager)
    );
    assert!(surveillance.is_surface_flagged(RestrictedSurface::TaskManager));
    assert!(!surveillance.is_surface_flagged(RestrictedSurface::HostsEditor));
}

#[test]
fn test_plain_notepad_is_not_a_restricted_surface() {
    let h = Harness::new();
    h.processes.launch("notepad.exe", "shopping list.txt - Notepad");
    h.core.enable_protection(BLOCK_SETTINGS_SWITCH).unwrap();

    assert_eq!(h.core.surveillance().check_restricted_surfaces().unwrap(), None);
    assert!(h.presenter.presented().is_empty());
}

#[test]
fn test_manual_close_denied_within_cooldown() {
    let h = Harness::new();
    h.core
        .store()
        .update_preferences(|prefs| prefs.last_manual_change = Some(h.clock.now_ms() - HOUR_MS))
        .unwrap();
    h.core.block_app("Steam", "steam.exe").unwrap();
    h.processes.launch("steam.exe", "Steam");
    h.core.enable_protection(OVERLAY_RESTRICTED_CONTENT).unwrap();

    let shown = h.presenter.presented();
    assert!(!shown[0].is_manual_override_allowed);
    assert!(!h.core.surveillance().accept_manual_close("steam.exe").unwrap());
    assert!(h.core.overlay().is_showing());
    assert_eq!(h.core.surveillance().pending_rechecks(), 0);
}

#[test]
fn test_manual_close_defers_new_overlays_and_rechecks() {
    let h = Harness::new();
    h.core.block_app("Steam", "steam.exe").unwrap();
    h.core.block_app("Discord", "discord.exe").unwrap();
    h.processes.launch("steam.exe", "Steam");
    h.core.enable_protection(OVERLAY_RESTRICTED_CONTENT).unwrap();
    assert!(h.presenter.presented()[0].is_manual_override_allowed);

    let accepted_at = h.clock.now_ms();
    assert!(h.core.surveillance().accept_manual_close("steam.exe").unwrap());
    assert_eq!(
        h.core.store().read_preferences().last_manual_change,
        Some(accepted_at)
    );
    assert!(!h.core.overlay().is_showing());
    assert_eq!(h.core.surveillance().pending_rechecks(), 1);

    // Ten seconds later another blocked app starts
    h.clock.advance(10_000);
    h.processes.launch("discord.exe", "Discord");
    h.core.surveillance().check_blocked_apps().unwrap();
    let overlay = h.core.overlay();
    assert_eq!(overlay.deferred().unwrap().display_name, "Discord");
    assert!(!overlay.present_deferred_if_due());
    assert_eq!(h.presenter.presented_names(), vec!["Steam"]);

    h.clock.set(accepted_at + REFLAG_THROTTLE_MS);
    assert!(overlay.present_deferred_if_due());
    assert_eq!(h.presenter.presented_names(), vec!["Steam", "Discord"]);
    assert!(!h.presenter.presented()[1].is_manual_override_allowed);

    // Steam is still running when its recheck comes due
    h.clock.set(accepted_at + MANUAL_CLOSE_RECHECK_MS);
    assert_eq!(h.core.surveillance().run_due_rechecks(), 1);
    assert_eq!(overlay.queued()[0].display_name, "Steam");
    assert_eq!(h.core.surveillance().pending_rechecks(), 0);
}

#[test]
fn test_recheck_skips_app_that_was_closed() {
    let h = Harness::new();
    h.core.block_app("Steam", "steam.exe").unwrap();
    h.processes.launch("steam.exe", "Steam");
    h.core.enable_protection(OVERLAY_RESTRICTED_CONTENT).unwrap();
    h.core.surveillance().accept_manual_close("steam.exe").unwrap();

    h.processes.quit("steam.exe");
    h.clock.advance(MANUAL_CLOSE_RECHECK_MS - 1);
    assert_eq!(h.core.surveillance().run_due_rechecks(), 0);
    assert_eq!(h.core.surveillance().pending_rechecks(), 1);

    h.clock.advance(1);
    assert_eq!(h.core.surveillance().run_due_rechecks(), 0);
    assert_eq!(h.core.surveillance().pending_rechecks(), 0);
    assert!(!h.core.surveillance().is_flagged("steam.exe"));
}

#[test]
fn test_flag_outcomes_while_overlay_shown() {
    let h = Harness::new();
    let overlay = h.core.overlay();

    assert_eq!(overlay.flag_app_with_overlay("Alpha", "alpha.exe"), FlagOutcome::Presented);
    assert_eq!(overlay.flag_app_with_overlay("Bravo", "bravo.exe"), FlagOutcome::Queued(1));
    assert_eq!(overlay.flag_app_with_overlay("Charlie", "charlie.exe"), FlagOutcome::Queued(2));
}

#[test]
fn test_enforcement_closes_gracefully_then_moves_on() {
    let h = Harness::new();
    block_three_apps(&h);
    h.processes.launch("alpha.exe", "Alpha");
    h.processes.launch("bravo.exe", "Bravo");
    h.processes.ignore_close_requests("bravo.exe");
    h.core.enable_protection(OVERLAY_RESTRICTED_CONTENT).unwrap();

    h.past_override_window();
    assert_eq!(h.core.enforce_current_overlay(), Some(CloseOutcome::Closed));
    assert_eq!(h.processes.close_requests(), vec!["alpha.exe"]);
    assert!(h.processes.kills().is_empty());
    assert_eq!(h.core.overlay().current().unwrap().display_name, "Bravo");

    // Bravo ignores the polite request and gets killed
    h.past_override_window();
    assert_eq!(h.core.enforce_current_overlay(), Some(CloseOutcome::Closed));
    assert_eq!(h.processes.kills(), vec!["bravo.exe"]);
    assert_eq!(h.core.enforce_current_overlay(), None);
}

#[test]
fn test_system_surface_is_force_closed() {
    let h = Harness::new();
    h.processes.launch("Taskmgr.exe", "Task Manager");
    h.core.enable_protection(BLOCK_SETTINGS_SWITCH).unwrap();
    h.core.surveillance().check_restricted_surfaces().unwrap();

    h.past_override_window();
    assert_eq!(h.core.enforce_current_overlay(), Some(CloseOutcome::Closed));
    assert!(h.processes.close_requests().is_empty());
    assert_eq!(h.processes.kills(), vec!["Taskmgr.exe"]);
}

#[test]
fn test_app_that_survives_enforcement_is_flagged_again() {
    let h = Harness::new();
    h.core.block_app("Steam", "steam.exe").unwrap();
    h.processes.launch("Steam.exe", "Steam");
    h.processes.ignore_close_requests("steam.exe");
    h.processes.survive_kills("steam.exe");
    h.core.enable_protection(OVERLAY_RESTRICTED_CONTENT).unwrap();

    h.past_override_window();
    assert_eq!(
        h.core.enforce_current_overlay(),
        Some(CloseOutcome::StillRunning)
    );
    assert!(!h.core.overlay().is_showing());
    assert!(!h.core.surveillance().is_flagged("steam.exe"));

    assert_eq!(
        h.core.surveillance().poll_app_block_protection().unwrap(),
        PollOutcome::Checked(1),
        "A survivor counts as a new sighting"
    );
    assert_eq!(h.presenter.presented_names(), vec!["Steam", "Steam"]);
}

#[test]
fn test_title_matched_app_is_closed_by_pid() {
    let h = Harness::new();
    h.core.block_app("Minecraft", "minecraft.exe").unwrap();
    h.processes.launch("javaw.exe", "Minecraft 1.20.4");
    h.processes.launch("javaw.exe", "");
    h.core.enable_protection(OVERLAY_RESTRICTED_CONTENT).unwrap();

    h.past_override_window();
    assert_eq!(h.core.enforce_current_overlay(), Some(CloseOutcome::Closed));
    assert_eq!(h.processes.close_requests(), vec!["javaw.exe"]);
    assert!(
        h.processes.is_running("javaw.exe"),
        "Only the matched java process is closed"
    );
    assert_eq!(h.processes.title_of("javaw.exe").unwrap(), "");
}

#[test]
fn test_control_panel_windows_close_but_explorer_keeps_running() {
    let h = Harness::new();
    h.processes
        .launch("explorer.exe", "Control Panel\\All Control Panel Items");
    h.core.enable_protection(BLOCK_SETTINGS_SWITCH).unwrap();
    assert_eq!(
        h.core.surveillance().check_restricted_surfaces().unwrap(),
        Some(RestrictedSurface::ControlPanel)
    );

    h.past_override_window();
    assert_eq!(h.core.enforce_current_overlay(), Some(CloseOutcome::Closed));
    assert_eq!(h.processes.window_closes(), vec!["control panel"]);
    assert!(h.processes.close_requests().is_empty());
    assert!(h.processes.kills().is_empty());
    assert!(h.processes.is_running("explorer.exe"));
    assert_eq!(h.processes.title_of("explorer.exe").unwrap(), "");
}

#[test]
fn test_control_panel_that_stays_open_is_reported() {
    let h = Harness::new();
    h.processes.launch("explorer.exe", "Control Panel");
    h.processes.ignore_close_requests("explorer.exe");
    h.core.enable_protection(BLOCK_SETTINGS_SWITCH).unwrap();
    h.core.surveillance().check_restricted_surfaces().unwrap();

    h.past_override_window();
    assert_eq!(
        h.core.enforce_current_overlay(),
        Some(CloseOutcome::StillRunning)
    );
    assert!(h.processes.kills().is_empty());
    assert!(!h
        .core
        .surveillance()
        .is_surface_flagged(RestrictedSurface::ControlPanel));
}

#[test]
fn test_manual_close_only_applies_to_the_overlay_showing() {
    let h = Harness::new();
    h.core.block_app("Alpha", "alpha.exe").unwrap();
    h.core.block_app("Bravo", "bravo.exe").unwrap();
    h.processes.launch("alpha.exe", "Alpha");
    h.processes.launch("bravo.exe", "Bravo");
    h.core.enable_protection(OVERLAY_RESTRICTED_CONTENT).unwrap();
    let surveillance = h.core.surveillance();

    assert!(!surveillance.accept_manual_close("bravo.exe").unwrap());
    assert_eq!(h.core.overlay().current().unwrap().display_name, "Alpha");
    assert_eq!(h.core.store().read_preferences().last_manual_change, None);
    assert_eq!(surveillance.pending_rechecks(), 0);

    assert!(surveillance.accept_manual_close("alpha.exe").unwrap());
    assert_eq!(h.core.overlay().deferred().unwrap().display_name, "Bravo");
}

#[test]
fn test_override_window_holds_enforcement() {
    let h = Harness::new();
    h.core.block_app("Steam", "steam.exe").unwrap();
    h.processes.launch("steam.exe", "Steam");
    h.core.enable_protection(OVERLAY_RESTRICTED_CONTENT).unwrap();

    assert_eq!(h.core.enforce_current_overlay(), None);
    h.clock.advance(OVERRIDE_DECISION_WINDOW_MS - 1);
    assert_eq!(h.core.enforce_current_overlay(), None);
    assert!(h.core.overlay().is_showing());
    assert!(h.processes.close_requests().is_empty());

    h.clock.advance(1);
    assert_eq!(h.core.enforce_current_overlay(), Some(CloseOutcome::Closed));
}

#[test]
fn test_overlay_without_override_is_enforced_at_once() {
    let h = Harness::new();
    h.core
        .store()
        .update_preferences(|prefs| prefs.last_manual_change = Some(h.clock.now_ms() - HOUR_MS))
        .unwrap();
    h.core.block_app("Steam", "steam.exe").unwrap();
    h.processes.launch("steam.exe", "Steam");
    h.core.enable_protection(OVERLAY_RESTRICTED_CONTENT).unwrap();

    assert_eq!(h.core.enforce_current_overlay(), Some(CloseOutcome::Closed));
}

#[test]
fn test_override_from_another_process_is_honored() {
    let h = Harness::new();
    h.core.block_app("Steam", "steam.exe").unwrap();
    h.processes.launch("steam.exe", "Steam");
    h.core.enable_protection(OVERLAY_RESTRICTED_CONTENT).unwrap();

    let cli = h.other_process();
    assert!(cli.request_manual_close("steam.exe").unwrap());
    assert_eq!(
        h.core.store().read_preferences().manual_close_request.as_deref(),
        Some("steam.exe")
    );

    assert_eq!(h.core.enforce_current_overlay(), None);
    assert!(!h.core.overlay().is_showing());
    assert!(h.processes.close_requests().is_empty());
    assert!(h.processes.is_running("steam.exe"));
    assert_eq!(h.core.surveillance().pending_rechecks(), 1);
    assert_eq!(h.core.store().read_preferences().manual_close_request, None);

    // The override is spent for the next 8 hours
    assert!(!cli.request_manual_close("steam.exe").unwrap());
    assert_eq!(h.core.store().read_preferences().manual_close_request, None);
}

#[test]
fn test_override_for_another_app_is_dropped() {
    let h = Harness::new();
    h.core.block_app("Steam", "steam.exe").unwrap();
    h.processes.launch("steam.exe", "Steam");
    h.core.enable_protection(OVERLAY_RESTRICTED_CONTENT).unwrap();

    h.other_process().request_manual_close("discord.exe").unwrap();

    assert_eq!(h.core.honor_manual_close_request().unwrap(), Some(false));
    assert_eq!(h.core.honor_manual_close_request().unwrap(), None);
    assert_eq!(h.core.overlay().current().unwrap().display_name, "Steam");
    assert!(h.core.overlay().throttle().can_allow_manual_closure());
}

#[test]
fn test_blocked_notepad_and_hosts_editor_are_tracked_apart() {
    let h = Harness::new();
    h.core.block_app("Notepad", "notepad.exe").unwrap();
    h.processes.launch("notepad.exe", "hosts - Notepad");
    h.core.enable_protection(OVERLAY_RESTRICTED_CONTENT).unwrap();
    h.core.enable_protection(BLOCK_SETTINGS_SWITCH).unwrap();
    let surveillance = h.core.surveillance();

    assert_eq!(
        surveillance.check_restricted_surfaces().unwrap(),
        Some(RestrictedSurface::HostsEditor)
    );
    assert!(surveillance.is_flagged("notepad.exe"));
    assert!(surveillance.is_surface_flagged(RestrictedSurface::HostsEditor));
    assert_eq!(h.presenter.presented_names(), vec!["Notepad"]);
    assert_eq!(
        h.core.overlay().queued()[0].display_name,
        "Hosts file editor"
    );

    h.core
        .store()
        .set_toggle(BLOCK_SETTINGS_SWITCH, false)
        .unwrap();
    assert_eq!(
        surveillance.poll_settings_protection().unwrap(),
        PollOutcome::Disabled
    );
    assert!(!surveillance.is_surface_flagged(RestrictedSurface::HostsEditor));
    assert!(surveillance.is_flagged("notepad.exe"));
}
