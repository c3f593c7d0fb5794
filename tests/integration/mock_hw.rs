//! Shared harness: a full [`Hardware`] bundle built from the simulation
//! adapters, plus helpers that walk the service through the common boot
//! and bring-online sequences.

use airnode::adapters::hardware::{
    BatteryAdcAdapter, BusAdapter, ClockAdapter, DisplayAdapter, EnvSensorAdapter, FlashAdapter,
    HttpAdapter, RadioAdapter, SerialAdapter,
};
use airnode::adapters::log_sink::RecordingEventSink;
use airnode::adapters::nvs::NvsAdapter;
use airnode::app::ports::BusIncoming;
use airnode::app::service::{Hardware, NodeService};
use airnode::config::NodeConfig;
use airnode::settings::{NetworkCredentials, SettingsStore};

pub const DEVICE_ID: &str = "airnode-a1b2c3";
pub const FW_VERSION: &str = "0.3.1";

pub type SimHardware = Hardware<
    RadioAdapter,
    BusAdapter,
    SerialAdapter,
    EnvSensorAdapter,
    BatteryAdcAdapter,
    HttpAdapter,
    FlashAdapter,
    DisplayAdapter,
    ClockAdapter,
    NvsAdapter,
    RecordingEventSink,
>;

pub fn hardware() -> SimHardware {
    Hardware {
        radio: RadioAdapter::new(),
        bus: BusAdapter::new("mqtt://sim-broker"),
        serial: SerialAdapter::new(),
        env: EnvSensorAdapter::new(),
        battery_adc: BatteryAdcAdapter::new(),
        http: HttpAdapter::new(),
        flash: FlashAdapter::new(),
        display: DisplayAdapter::new(),
        clock: ClockAdapter::new(),
        storage: NvsAdapter::new().expect("host NVS init"),
        events: RecordingEventSink::default(),
    }
}

/// Service with stored credentials, booted at `now_ms`. The boot issues
/// the first station attempt and wakes the particulate sensor.
pub fn booted_service(hw: &mut SimHardware, now_ms: u64) -> NodeService {
    let creds = NetworkCredentials::new("HomeNet", "password1").expect("valid creds");
    SettingsStore::new(&mut hw.storage).save_credentials(&creds).expect("persist creds");
    let mut svc = NodeService::new(
        NodeConfig::default(),
        DEVICE_ID.to_string(),
        FW_VERSION,
        &mut hw.storage,
        now_ms,
    );
    svc.boot(&mut hw.radio, &mut hw.serial, now_ms);
    svc
}

/// Bring the station link up, let the bus session connect, and deliver
/// the broker's presence echo plus a consumer "online". After this the
/// telemetry gate is open (outside the splash window).
pub fn go_online(svc: &mut NodeService, hw: &mut SimHardware, now_ms: u64) {
    hw.radio.sim_station_up = true;
    svc.tick(hw, now_ms); // station up; session issues the connect
    svc.tick(hw, now_ms + 1); // Connected event: subscribe + presence

    let status = svc.session().topics().status.clone();
    let web_status = svc.session().topics().web_status.clone();
    hw.bus.sim_incoming.push_back(BusIncoming::Message {
        topic: status,
        payload: b"online".to_vec(),
    });
    hw.bus.sim_incoming.push_back(BusIncoming::Message {
        topic: web_status,
        payload: b"online".to_vec(),
    });
    svc.tick(hw, now_ms + 2);

    assert!(svc.session().is_connected(), "session should be up");
    assert!(svc.session().presence_confirmed(), "echo should be consumed");
}

/// Queue one inbound bus message for the next tick.
pub fn push_message(hw: &mut SimHardware, topic: &str, payload: &[u8]) {
    hw.bus.sim_incoming.push_back(BusIncoming::Message {
        topic: topic.to_string(),
        payload: payload.to_vec(),
    });
}

/// Publishes recorded on one topic, in order.
pub fn published_on<'a>(hw: &'a SimHardware, topic: &str) -> Vec<&'a [u8]> {
    hw.bus
        .sim_published
        .iter()
        .filter(|(t, _)| t == topic)
        .map(|(_, p)| p.as_slice())
        .collect()
}

/// Raw ADC count scaling to the given battery voltage with the default
/// divider (2.0) and calibration (1.1).
pub fn raw_for(volts: f32) -> u16 {
    (volts / (3.3 * 2.0 * 1.1) * 4095.0).round() as u16
}
