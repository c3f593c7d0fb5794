//! Provisioning portal lifecycle driven through the full service:
//! open via button hold, credential trial connect, persistence, reboot,
//! and the auto-close windows.

use airnode::app::events::{DebugEvent, ProvisioningCloseReason};
use airnode::connectivity::{Mode, StationState};
use airnode::events::Event;
use airnode::settings::SettingsStore;

use crate::mock_hw::{booted_service, hardware, SimHardware};
use airnode::app::service::NodeService;

/// Button hold that opens the portal at `now_ms`.
fn open_portal(svc: &mut NodeService, hw: &mut SimHardware, now_ms: u64) {
    svc.handle_button_edge(
        Event::ButtonDown,
        &mut hw.radio,
        &mut hw.bus,
        &mut hw.display,
        &mut hw.events,
        now_ms.saturating_sub(6_000),
    );
    svc.handle_button_edge(
        Event::ButtonUp,
        &mut hw.radio,
        &mut hw.bus,
        &mut hw.display,
        &mut hw.events,
        now_ms,
    );
    assert_eq!(svc.connectivity().mode(), Mode::Provisioning);
}

#[test]
fn successful_submission_persists_and_schedules_reboot() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    open_portal(&mut svc, &mut hw, 10_000);
    hw.radio.sim_ap_clients = 1;

    svc.submit_provisioning("NewNet", "newpassword", 20_000).expect("submission accepted");
    svc.tick(&mut hw, 20_100); // trial connect issued
    hw.radio.sim_station_up = true;
    svc.tick(&mut hw, 21_000); // trial verified

    assert!(hw.events.events.contains(&DebugEvent::ProvisioningSaved));
    let stored = SettingsStore::new(&mut hw.storage).load_credentials().expect("persisted");
    assert_eq!(stored.ssid.as_str(), "NewNet");

    // Reboot is deferred so the portal can render the success page.
    assert!(!svc.ctx().reboot_requested);
    svc.tick(&mut hw, 21_000 + 1_200);
    assert!(svc.ctx().reboot_requested);
}

#[test]
fn failed_trial_returns_to_the_portal() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    open_portal(&mut svc, &mut hw, 10_000);
    hw.radio.sim_ap_clients = 1;

    svc.submit_provisioning("NewNet", "wrongpassword", 20_000).expect("submission accepted");
    svc.tick(&mut hw, 20_100); // trial connect issued, 15s deadline
    svc.tick(&mut hw, 35_200);

    assert!(hw.events.events.contains(&DebugEvent::ProvisioningFailed));
    assert_eq!(svc.connectivity().mode(), Mode::Provisioning);

    // Once the failure notice expires the portal accepts a resubmission.
    svc.tick(&mut hw, 37_300);
    svc.submit_provisioning("NewNet", "rightpassword", 37_400).expect("resubmission accepted");
}

#[test]
fn portal_autocloses_without_a_client() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    open_portal(&mut svc, &mut hw, 10_000);

    svc.tick(&mut hw, 10_000 + 179_999);
    assert_eq!(svc.connectivity().mode(), Mode::Provisioning);

    svc.tick(&mut hw, 10_000 + 180_000);
    assert_eq!(svc.connectivity().mode(), Mode::Station);
    assert!(hw.events.events.contains(&DebugEvent::ProvisioningClosed {
        reason: ProvisioningCloseReason::NoClient
    }));
    // Normal station duty resumes with the stored credentials.
    assert!(matches!(
        svc.connectivity().station_state(),
        StationState::Attempting { .. }
    ));
}

#[test]
fn connected_client_extends_to_the_submission_window() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    open_portal(&mut svc, &mut hw, 10_000);
    hw.radio.sim_ap_clients = 1;

    svc.tick(&mut hw, 10_000 + 299_999);
    assert_eq!(svc.connectivity().mode(), Mode::Provisioning);

    svc.tick(&mut hw, 10_000 + 300_000);
    assert_eq!(svc.connectivity().mode(), Mode::Station);
    assert!(hw.events.events.contains(&DebugEvent::ProvisioningClosed {
        reason: ProvisioningCloseReason::NoSubmission
    }));
}

#[test]
fn invalid_submission_is_rejected_at_the_portal() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    open_portal(&mut svc, &mut hw, 10_000);

    assert!(svc.submit_provisioning("", "password1", 11_000).is_err());
    assert!(svc.submit_provisioning("NewNet", "short", 11_000).is_err());
    // Portal still open and waiting.
    assert_eq!(svc.connectivity().mode(), Mode::Provisioning);
}
