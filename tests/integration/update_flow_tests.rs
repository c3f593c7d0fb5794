//! Firmware update sessions triggered over the bus and by the button,
//! including the failure classifications that must leave the node
//! running.

use airnode::app::events::DebugEvent;
use airnode::UpdateError;
use airnode::app::ports::BusIncoming;
use airnode::events::Event;
use airnode::update::UpdateState;

use crate::mock_hw::{booted_service, go_online, hardware, published_on, push_message};

const FW_URL: &str = "http://fw.example.com/airnode.bin";

#[test]
fn direct_url_trigger_streams_flashes_and_reboots() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    go_online(&mut svc, &mut hw, 10_000);

    hw.http.sim_body = vec![0xA5; 2_048 + 512];
    let trigger = svc.session().topics().cmd_update_now.clone();
    push_message(&mut hw, &trigger, FW_URL.as_bytes());
    svc.tick(&mut hw, 11_000);

    assert!(hw.flash.sim_finalized);
    assert_eq!(hw.flash.sim_written.len(), 2_048 + 512);
    assert_eq!(svc.update_engine().state(), UpdateState::Succeeded);
    assert!(svc.ctx().reboot_requested);
    assert!(hw
        .events
        .events
        .contains(&DebugEvent::UpdateSucceeded { bytes: 2_048 + 512 }));

    // Presence handed over before the reboot.
    let status = svc.session().topics().status.clone();
    assert_eq!(published_on(&hw, &status).last(), Some(&b"offline".as_slice()));
}

#[test]
fn bare_trigger_uses_the_stored_url() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    go_online(&mut svc, &mut hw, 10_000);

    let set_url = svc.session().topics().cmd_update_url.clone();
    push_message(&mut hw, &set_url, FW_URL.as_bytes());
    svc.tick(&mut hw, 11_000);
    assert_eq!(svc.ctx().update_url.as_deref(), Some(FW_URL));

    let stored = airnode::settings::SettingsStore::new(&mut hw.storage).load_settings();
    assert_eq!(stored.update_url.as_ref().map(|u| u.as_str()), Some(FW_URL));

    hw.http.sim_body = vec![0x5A; 1_024];
    let trigger = svc.session().topics().cmd_update_now.clone();
    push_message(&mut hw, &trigger, b"update");
    svc.tick(&mut hw, 12_000);

    assert!(hw.flash.sim_finalized);
    assert!(svc.ctx().reboot_requested);
}

#[test]
fn legacy_marker_payload_is_accepted() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    go_online(&mut svc, &mut hw, 10_000);

    hw.http.sim_body = vec![0x11; 700];
    let trigger = svc.session().topics().cmd_update_now.clone();
    push_message(&mut hw, &trigger, b"http://fw.example.com/airnode.bin*update");
    svc.tick(&mut hw, 11_000);

    assert!(hw.flash.sim_finalized);
    assert!(hw.events.events.contains(&DebugEvent::UpdateSucceeded { bytes: 700 }));
}

#[test]
fn https_source_is_refused() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    go_online(&mut svc, &mut hw, 10_000);

    let trigger = svc.session().topics().cmd_update_now.clone();
    push_message(&mut hw, &trigger, b"https://fw.example.com/airnode.bin");
    svc.tick(&mut hw, 11_000);

    assert!(!hw.flash.sim_finalized);
    assert!(!svc.ctx().reboot_requested);
    assert_eq!(svc.update_engine().last_failure(), Some(UpdateError::UnsupportedScheme));
    assert_eq!(svc.update_engine().state(), UpdateState::Idle);
    assert!(hw.events.events.contains(&DebugEvent::UpdateFailed {
        reason: UpdateError::UnsupportedScheme
    }));
}

#[test]
fn loopback_source_is_refused() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    go_online(&mut svc, &mut hw, 10_000);

    let trigger = svc.session().topics().cmd_update_now.clone();
    push_message(&mut hw, &trigger, b"http://127.0.0.1:8080/airnode.bin");
    svc.tick(&mut hw, 11_000);

    assert_eq!(svc.update_engine().last_failure(), Some(UpdateError::LoopbackHost));
    assert!(!hw.flash.sim_finalized);
}

#[test]
fn http_error_status_fails_the_session() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    go_online(&mut svc, &mut hw, 10_000);

    hw.http.sim_status = 404;
    let trigger = svc.session().topics().cmd_update_now.clone();
    push_message(&mut hw, &trigger, FW_URL.as_bytes());
    svc.tick(&mut hw, 11_000);

    assert_eq!(svc.update_engine().last_failure(), Some(UpdateError::HttpStatus(404)));
    assert!(!svc.ctx().reboot_requested);
    // The node keeps running and the session stays up.
    assert!(svc.session().is_connected());
}

#[test]
fn ten_second_hold_runs_the_stored_update() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    go_online(&mut svc, &mut hw, 10_000);
    svc.ctx_mut().update_url = Some(FW_URL.to_string());
    hw.http.sim_body = vec![0x77; 3_000];

    svc.handle_button_edge(
        Event::ButtonDown, &mut hw.radio, &mut hw.bus, &mut hw.display, &mut hw.events, 11_000,
    );
    // Still held at the 10s mark: the action fires without a release.
    svc.tick(&mut hw, 21_000);

    assert!(hw.flash.sim_finalized);
    assert!(svc.ctx().reboot_requested);
    assert!(hw.events.events.contains(&DebugEvent::UpdateStarted));
}

#[test]
fn mid_transfer_drop_backs_off_from_the_transfer_clock() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    go_online(&mut svc, &mut hw, 10_000);
    svc.ctx_mut().update_url = Some(FW_URL.to_string());
    hw.http.sim_body = vec![0x42; 2_048];

    svc.handle_button_edge(
        Event::ButtonDown, &mut hw.radio, &mut hw.bus, &mut hw.display, &mut hw.events, 11_000,
    );

    // The broker drops us while flash chunks are streaming: hold the
    // event back past the tick's own drain, and let the wall clock sit
    // far ahead of the tick-start time so a stale timestamp would show.
    hw.bus.sim_incoming.push_back(BusIncoming::Disconnected);
    hw.bus.sim_defer_polls = 1;
    hw.clock.sim_now_ms = Some(50_000);
    svc.tick(&mut hw, 21_000);

    // The transfer itself still completes.
    assert!(hw.flash.sim_finalized);
    assert!(svc.ctx().reboot_requested);
    assert!(!svc.session().is_connected());

    // Retry must be scheduled from the in-transfer time (~51s), not the
    // tick-start time (~22s).
    svc.tick(&mut hw, 25_000);
    svc.tick(&mut hw, 25_001);
    assert!(!svc.session().is_connected(), "retry fired off the stale tick timestamp");

    svc.tick(&mut hw, 52_500); // backoff floor + jitter has elapsed
    svc.tick(&mut hw, 52_501);
    assert!(svc.session().is_connected());
}

#[test]
fn trigger_while_offline_fails_cleanly() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    svc.ctx_mut().update_url = Some(FW_URL.to_string());

    svc.handle_button_edge(
        Event::ButtonDown, &mut hw.radio, &mut hw.bus, &mut hw.display, &mut hw.events, 5_000,
    );
    svc.tick(&mut hw, 15_000);

    assert_eq!(svc.update_engine().last_failure(), Some(UpdateError::NotConnected));
    assert!(!hw.flash.sim_finalized);
    assert!(!svc.ctx().reboot_requested);
    assert!(hw.events.events.contains(&DebugEvent::UpdateFailed {
        reason: UpdateError::NotConnected
    }));
}
