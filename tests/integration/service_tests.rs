//! Orchestrator behaviour: telemetry gating, command handling, station
//! retry policy, battery shutdown, and button routing.

use airnode::app::events::DebugEvent;
use airnode::app::ports::RadioPort;
use airnode::connectivity::{Mode, StationState};
use airnode::events::Event;
use airnode::sensors::particulate::build_frame;

use crate::mock_hw::{booted_service, go_online, hardware, published_on, push_message, raw_for, DEVICE_ID};

#[test]
fn boot_issues_the_first_station_attempt() {
    let mut hw = hardware();
    let svc = booted_service(&mut hw, 0);
    assert_eq!(
        svc.connectivity().station_state(),
        StationState::Attempting { deadline_ms: 30_000 }
    );
}

#[test]
fn online_flow_publishes_telemetry_with_sensor_data() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    go_online(&mut svc, &mut hw, 10_000);

    // A particulate frame arrives; the next due telemetry carries it.
    hw.serial.sim_rx.extend(build_frame(5, 12, 20));
    svc.tick(&mut hw, 20_010);

    let data_topic = svc.session().topics().data.clone();
    let frames = published_on(&hw, &data_topic);
    let last = frames.last().expect("telemetry published");
    let json: serde_json::Value = serde_json::from_slice(last).expect("valid JSON");

    assert_eq!(json["id"], DEVICE_ID);
    assert_eq!(json["fw"], "0.3.1");
    assert_eq!(json["pm25"], 12);
    assert_eq!(json["pm10"], 20);
    assert!(json["aqi"].is_u64(), "aqi should be present: {json}");
    assert!(json["t"].is_number(), "env temperature should be present");
    assert!(json["vbat"].is_number(), "battery voltage should be present");
}

#[test]
fn telemetry_respects_the_publish_interval() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    go_online(&mut svc, &mut hw, 10_000);
    let data_topic = svc.session().topics().data.clone();
    let count = |hw: &_| published_on(hw, &data_topic).len();

    // go_online published the first sample (gate was fully open).
    assert_eq!(count(&hw), 1);
    svc.tick(&mut hw, 15_000);
    assert_eq!(count(&hw), 1, "interval (10s) not yet elapsed");
    svc.tick(&mut hw, 20_010);
    assert_eq!(count(&hw), 2);
}

#[test]
fn telemetry_suppressed_during_splash() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    // Online at 1s: still inside the 3s splash window.
    go_online(&mut svc, &mut hw, 1_000);

    let data_topic = svc.session().topics().data.clone();
    assert!(published_on(&hw, &data_topic).is_empty());

    svc.tick(&mut hw, 2_500);
    assert!(published_on(&hw, &data_topic).is_empty());
    svc.tick(&mut hw, 3_500);
    assert_eq!(published_on(&hw, &data_topic).len(), 1);
}

#[test]
fn telemetry_stops_when_consumer_goes_offline() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    go_online(&mut svc, &mut hw, 10_000);
    let data_topic = svc.session().topics().data.clone();
    let web_status = svc.session().topics().web_status.clone();

    push_message(&mut hw, &web_status, b"offline");
    svc.tick(&mut hw, 30_000);
    let published = published_on(&hw, &data_topic).len();

    // Readings keep accumulating but nothing further is published.
    for t in (40_000..120_000).step_by(10_000) {
        svc.tick(&mut hw, t);
    }
    assert_eq!(published_on(&hw, &data_topic).len(), published);

    push_message(&mut hw, &web_status, b"online");
    svc.tick(&mut hw, 130_000);
    assert_eq!(published_on(&hw, &data_topic).len(), published + 1);
}

#[test]
fn interval_command_is_clamped_and_persisted() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    go_online(&mut svc, &mut hw, 10_000);
    let cmd_interval = svc.session().topics().cmd_interval.clone();

    push_message(&mut hw, &cmd_interval, b"200");
    svc.tick(&mut hw, 11_000);
    assert_eq!(svc.ctx().publish_interval_ms(), 500);

    push_message(&mut hw, &cmd_interval, b"9000000");
    svc.tick(&mut hw, 12_000);
    assert_eq!(svc.ctx().publish_interval_ms(), 600_000);

    let stored = airnode::settings::SettingsStore::new(&mut hw.storage).load_settings();
    assert_eq!(stored.publish_interval_ms, 600_000);
}

#[test]
fn time_sync_command_anchors_wall_clock() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    go_online(&mut svc, &mut hw, 10_000);
    let cmd_time = svc.session().topics().cmd_time.clone();

    push_message(&mut hw, &cmd_time, b"1756200000");
    svc.tick(&mut hw, 11_000);
    assert_eq!(svc.ctx().wall_clock_secs(11_000), Some(1_756_200_000));
    assert_eq!(svc.ctx().wall_clock_secs(71_000), Some(1_756_200_060));
}

#[test]
fn station_timeout_is_retried_after_the_hold_off() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);

    // Never associates: abandoned at the 30s deadline.
    svc.tick(&mut hw, 30_000);
    assert_eq!(svc.connectivity().station_state(), StationState::Idle);
    assert!(hw
        .events
        .events
        .iter()
        .any(|e| matches!(e, DebugEvent::StationTimeout { .. })));

    // Not retried during the 60s hold-off...
    svc.tick(&mut hw, 89_000);
    assert_eq!(svc.connectivity().station_state(), StationState::Idle);
    // ...then a fresh attempt is issued.
    svc.tick(&mut hw, 90_000);
    assert!(matches!(
        svc.connectivity().station_state(),
        StationState::Attempting { .. }
    ));
}

#[test]
fn station_loss_resets_session_and_retries_immediately() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    go_online(&mut svc, &mut hw, 10_000);

    hw.radio.sim_station_up = false;
    svc.tick(&mut hw, 20_000);

    assert!(hw.events.events.contains(&DebugEvent::StationLost));
    assert!(!svc.session().is_connected());
    // Link loss retries in the very same tick, no hold-off.
    assert!(matches!(
        svc.connectivity().station_state(),
        StationState::Attempting { .. }
    ));
}

#[test]
fn low_battery_latches_a_graceful_shutdown() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    go_online(&mut svc, &mut hw, 10_000);
    let status = svc.session().topics().status.clone();

    hw.battery_adc.sim_raw = raw_for(3.20);
    svc.tick(&mut hw, 70_000); // next battery sample is due here

    assert!(svc.ctx().halted);
    assert!(hw
        .events
        .events
        .iter()
        .any(|e| matches!(e, DebugEvent::LowBatteryShutdown { millivolts } if *millivolts < 3_300)));

    // Graceful handover: exactly one retained "offline".
    let offline = published_on(&hw, &status).iter().filter(|p| **p == b"offline").count();
    assert_eq!(offline, 1);
    assert!(!hw.radio.station_connected(), "radio should be powered off");

    // Halted for good: later ticks do nothing.
    let total = hw.bus.sim_published.len();
    svc.tick(&mut hw, 200_000);
    svc.tick(&mut hw, 400_000);
    assert_eq!(hw.bus.sim_published.len(), total);
}

#[test]
fn battery_above_floor_does_not_halt() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);
    hw.battery_adc.sim_raw = raw_for(3.31);
    svc.tick(&mut hw, 100);
    assert!(!svc.ctx().halted);
    assert_eq!(svc.battery().level(), 1);
}

#[test]
fn five_second_hold_enters_provisioning() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);

    svc.handle_button_edge(
        Event::ButtonDown, &mut hw.radio, &mut hw.bus, &mut hw.display, &mut hw.events, 1_000,
    );
    svc.handle_button_edge(
        Event::ButtonUp, &mut hw.radio, &mut hw.bus, &mut hw.display, &mut hw.events, 6_500,
    );

    assert_eq!(svc.connectivity().mode(), Mode::Provisioning);
    assert!(hw.events.events.contains(&DebugEvent::ProvisioningOpened));
}

#[test]
fn short_press_does_not_enter_provisioning() {
    let mut hw = hardware();
    let mut svc = booted_service(&mut hw, 0);

    svc.handle_button_edge(
        Event::ButtonDown, &mut hw.radio, &mut hw.bus, &mut hw.display, &mut hw.events, 1_000,
    );
    svc.handle_button_edge(
        Event::ButtonUp, &mut hw.radio, &mut hw.bus, &mut hw.display, &mut hw.events, 1_700,
    );

    assert_eq!(svc.connectivity().mode(), Mode::Station);
    assert!(hw.events.events.is_empty());
}
