//! The orchestrator: one cooperative tick over every subsystem.
//!
//! Tick order is fixed: input gestures, battery policy, connectivity,
//! bus session, sensor ingest, the telemetry gate, and finally any
//! pending update request. Every step is non-blocking except an update
//! session, which is an intentional bounded busy-loop that keeps the bus
//! serviced per chunk.

use crate::app::context::DeviceContext;
use crate::app::events::DebugEvent;
use crate::app::ports::{
    BatteryAdcPort, BusPort, ClockPort, DisplayPort, EnvSensorPort, EventSink, FirmwareSink,
    HttpPort, RadioPort, SerialPort, StoragePort,
};
use crate::bus::commands::BusCommand;
use crate::bus::{MessageBusSession, SessionState};
use crate::config::NodeConfig;
use crate::connectivity::{ConnEvent, ConnectivityManager, Mode, StationState};
use crate::drivers::button::{ButtonAction, ButtonGestures};
use crate::events::Event;
use crate::power::{BatteryMonitor, PowerEvent};
use crate::sensors::particulate::WatchdogAction;
use crate::sensors::SensorIngestPipeline;
use crate::settings::{NetworkCredentials, Settings, SettingsStore};
use crate::telemetry;
use crate::update::UpdateEngine;

/// All driven adapters, owned by the main loop and lent to the service
/// each tick. Plain fields so disjoint ports can be borrowed at once.
pub struct Hardware<R, B, S, E, A, H, F, D, C, St, Ev> {
    pub radio: R,
    pub bus: B,
    pub serial: S,
    pub env: E,
    pub battery_adc: A,
    pub http: H,
    pub flash: F,
    pub display: D,
    pub clock: C,
    pub storage: St,
    pub events: Ev,
}

/// A queued update request, resolved to a URL when the session starts.
enum UpdateRequest {
    StoredUrl,
    Url(String),
}

pub struct NodeService {
    ctx: DeviceContext,
    conn: ConnectivityManager,
    session: MessageBusSession,
    sensors: SensorIngestPipeline,
    update: UpdateEngine,
    battery: BatteryMonitor,
    button: ButtonGestures,

    credentials: Option<NetworkCredentials>,
    station_retry_at_ms: Option<u64>,
    pending_update: Option<UpdateRequest>,
}

impl NodeService {
    /// Build the service, loading persisted settings and credentials.
    pub fn new<St: StoragePort>(
        config: NodeConfig,
        device_id: String,
        fw_version: &'static str,
        storage: &mut St,
        now_ms: u64,
    ) -> Self {
        let store = SettingsStore::new(storage);
        let settings = store.load_settings();
        let credentials = store.load_credentials();

        let conn = ConnectivityManager::new(&config);
        let session = MessageBusSession::new(&config, &device_id);
        let sensors = SensorIngestPipeline::new(&config, now_ms);
        let battery = BatteryMonitor::new(&config);

        let mut ctx = DeviceContext::new(config, device_id, fw_version, now_ms);
        ctx.set_publish_interval(settings.publish_interval_ms);
        ctx.update_url = settings.update_url.as_ref().map(|u| u.as_str().to_string());
        ctx.tz_offset_min = settings.tz_offset_min;

        Self {
            ctx,
            conn,
            session,
            sensors,
            update: UpdateEngine::new(),
            battery,
            button: ButtonGestures::new(),
            credentials,
            station_retry_at_ms: None,
            pending_update: None,
        }
    }

    pub fn ctx(&self) -> &DeviceContext {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut DeviceContext {
        &mut self.ctx
    }

    pub fn session(&self) -> &MessageBusSession {
        &self.session
    }

    pub fn connectivity(&self) -> &ConnectivityManager {
        &self.conn
    }

    pub fn update_engine(&self) -> &UpdateEngine {
        &self.update
    }

    pub fn battery(&self) -> &BatteryMonitor {
        &self.battery
    }

    /// Portal handler entry: a credential submission from the setup AP.
    pub fn submit_provisioning(
        &mut self,
        ssid: &str,
        password: &str,
        now_ms: u64,
    ) -> Result<(), crate::error::ConnectivityError> {
        self.conn.submit_credentials(ssid, password, now_ms)
    }

    /// Wake the particulate sensor and start the first station attempt.
    pub fn boot<R: RadioPort, S: SerialPort>(
        &mut self,
        radio: &mut R,
        serial: &mut S,
        now_ms: u64,
    ) {
        log::info!(
            "boot: device '{}' fw {} starting",
            self.ctx.device_id,
            self.ctx.fw_version
        );
        self.sensors.start(serial, now_ms);
        if let Some(creds) = self.credentials.clone() {
            if let Err(e) = self.conn.begin_station(radio, &creds, now_ms) {
                log::warn!("boot: station attempt failed to start: {e}");
            }
        } else {
            log::info!("boot: no stored credentials, staying offline");
        }
    }

    /// One cooperative step over every subsystem.
    #[allow(clippy::type_complexity)]
    pub fn tick<R, B, S, E, A, H, F, D, C, St, Ev>(
        &mut self,
        hw: &mut Hardware<R, B, S, E, A, H, F, D, C, St, Ev>,
        now_ms: u64,
    ) where
        R: RadioPort,
        B: BusPort,
        S: SerialPort,
        E: EnvSensorPort,
        A: BatteryAdcPort,
        H: HttpPort,
        F: FirmwareSink,
        D: DisplayPort,
        C: ClockPort,
        St: StoragePort,
        Ev: EventSink,
    {
        if self.ctx.halted {
            return;
        }

        // Input: held-duration check for the long-press action.
        if let Some(action) = self.button.tick(now_ms) {
            self.apply_button(action, &mut hw.radio, &mut hw.bus, &mut hw.display, &mut hw.events, now_ms);
        }

        // Power policy runs before everything else; a latched shutdown
        // ends the tick (and every future one).
        if let Some(PowerEvent::ShutdownLatched { millivolts }) =
            self.battery.tick(&mut hw.battery_adc, now_ms)
        {
            self.shutdown(&mut hw.radio, &mut hw.bus, &mut hw.events, millivolts);
            return;
        }

        // Connectivity.
        if let Some(ev) = self.conn.tick(&mut hw.radio, now_ms) {
            self.handle_conn_event(ev, &mut hw.bus, &mut hw.storage, &mut hw.events, now_ms);
        }
        if self.conn.reboot_due() {
            self.ctx.reboot_requested = true;
        }
        self.maybe_retry_station(&mut hw.radio, now_ms);

        // Bus session, only while the station link is up.
        if self.conn.station_connected() {
            let mut cmds = Vec::new();
            self.session.tick(&mut hw.bus, now_ms, |cmd| cmds.push(cmd));
            for cmd in cmds {
                self.handle_command(cmd, &mut hw.storage, now_ms);
            }
        } else if self.session.state() != SessionState::Disconnected {
            self.session.reset(&mut hw.bus);
        }

        // Sensor ingest always runs; readings accumulate even offline.
        if let Some(WatchdogAction::Reinitialised { checksum_failures }) =
            self.sensors.tick(&mut hw.serial, &mut hw.env, now_ms)
        {
            self.emit(&mut hw.events, &mut hw.bus, DebugEvent::SensorReinit { checksum_failures });
        }

        // Telemetry gate.
        if self.session.is_connected() && self.ctx.telemetry_due(now_ms) {
            let payload = telemetry::to_json(
                &self.ctx.device_id,
                self.ctx.fw_version,
                self.sensors.particulate(),
                self.sensors.environment(),
                self.battery.millivolts(),
            );
            if self.session.publish_telemetry(&mut hw.bus, payload.as_bytes()).is_ok() {
                self.ctx.mark_published(now_ms);
            }
        }

        // A queued update request runs last, after the session was
        // serviced this tick.
        if let Some(req) = self.pending_update.take() {
            self.run_update(req, &mut hw.http, &mut hw.flash, &mut hw.bus, &mut hw.display, &hw.clock, &mut hw.events);
        }
    }

    /// Forward one ISR edge from the main loop's queue drain.
    pub fn handle_button_edge<R, B, D, Ev>(
        &mut self,
        edge: Event,
        radio: &mut R,
        bus: &mut B,
        display: &mut D,
        events: &mut Ev,
        now_ms: u64,
    ) where
        R: RadioPort,
        B: BusPort,
        D: DisplayPort,
        Ev: EventSink,
    {
        match edge {
            Event::ButtonDown => self.button.on_down(now_ms),
            Event::ButtonUp => {
                if let Some(action) = self.button.on_up(now_ms) {
                    self.apply_button(action, radio, bus, display, events, now_ms);
                }
            }
        }
    }

    // ── Internals ─────────────────────────────────────────────

    fn apply_button<R, B, D, Ev>(
        &mut self,
        action: ButtonAction,
        radio: &mut R,
        bus: &mut B,
        display: &mut D,
        events: &mut Ev,
        now_ms: u64,
    ) where
        R: RadioPort,
        B: BusPort,
        D: DisplayPort,
        Ev: EventSink,
    {
        match action {
            ButtonAction::ShortPress => {
                if display.is_awake() {
                    display.next_mode();
                } else {
                    display.wake();
                }
            }
            ButtonAction::EnterProvisioning => {
                self.enter_provisioning(radio, bus, events, now_ms);
            }
            ButtonAction::TriggerUpdate => {
                self.pending_update = Some(UpdateRequest::StoredUrl);
            }
        }
    }

    fn enter_provisioning<R, B, Ev>(
        &mut self,
        radio: &mut R,
        bus: &mut B,
        events: &mut Ev,
        now_ms: u64,
    ) where
        R: RadioPort,
        B: BusPort,
        Ev: EventSink,
    {
        self.session.reset(bus);
        let ap_ssid = self.ctx.device_id.clone();
        match self.conn.enter_provisioning(radio, &ap_ssid, now_ms) {
            Ok(()) => self.emit(events, bus, DebugEvent::ProvisioningOpened),
            Err(e) => log::warn!("provisioning: failed to open AP: {e}"),
        }
    }

    fn maybe_retry_station<R: RadioPort>(&mut self, radio: &mut R, now_ms: u64) {
        if self.conn.mode() != Mode::Station
            || self.conn.station_state() != StationState::Idle
        {
            return;
        }
        let Some(at) = self.station_retry_at_ms else { return };
        if now_ms < at {
            return;
        }
        self.station_retry_at_ms = None;
        if let Some(creds) = self.credentials.clone() {
            if let Err(e) = self.conn.begin_station(radio, &creds, now_ms) {
                log::warn!("connectivity: retry failed to start: {e}");
            }
        }
    }

    fn handle_conn_event<B, St, Ev>(
        &mut self,
        ev: ConnEvent,
        bus: &mut B,
        storage: &mut St,
        events: &mut Ev,
        now_ms: u64,
    ) where
        B: BusPort,
        St: StoragePort,
        Ev: EventSink,
    {
        match ev {
            ConnEvent::StationUp => self.emit(events, bus, DebugEvent::StationConnected),
            ConnEvent::StationLost => {
                self.session.reset(bus);
                self.emit(events, bus, DebugEvent::StationLost);
                // A dropped link is retried immediately; only an
                // abandoned attempt waits out the retry period.
                self.station_retry_at_ms = Some(now_ms);
            }
            ConnEvent::StationTimeout => {
                let mut ssid = heapless::String::new();
                if let Some(creds) = &self.credentials {
                    let _ = ssid.push_str(&creds.ssid);
                }
                self.emit(events, bus, DebugEvent::StationTimeout { ssid });
                let retry_ms = u64::from(self.ctx.config.station_retry_secs) * 1000;
                self.station_retry_at_ms = Some(now_ms + retry_ms);
            }
            ConnEvent::ProvisioningSucceeded(creds) => {
                let mut store = SettingsStore::new(storage);
                if let Err(e) = store.save_credentials(&creds) {
                    log::error!("provisioning: credential persist failed: {e}");
                }
                self.credentials = Some(creds);
                self.emit(events, bus, DebugEvent::ProvisioningSaved);
            }
            ConnEvent::ProvisioningFailed => {
                self.emit(events, bus, DebugEvent::ProvisioningFailed);
            }
            ConnEvent::ProvisioningClosed(reason) => {
                self.emit(events, bus, DebugEvent::ProvisioningClosed { reason });
                // Resume normal station behaviour with whatever
                // credentials we had.
                self.station_retry_at_ms = Some(now_ms);
            }
        }
    }

    fn handle_command<St: StoragePort>(&mut self, cmd: BusCommand, storage: &mut St, now_ms: u64) {
        match cmd {
            BusCommand::TimeSync(epoch) => {
                log::info!("cmd: time sync to epoch {epoch}");
                self.ctx.sync_time(epoch, now_ms);
            }
            BusCommand::SetInterval(ms) => {
                log::info!("cmd: telemetry interval {ms}ms");
                self.ctx.set_publish_interval(ms);
                self.persist_settings(storage);
            }
            BusCommand::SetUpdateUrl(url) => {
                log::info!("cmd: update URL stored");
                self.ctx.update_url = Some(url);
                self.persist_settings(storage);
            }
            BusCommand::TriggerUpdate { url } => {
                self.pending_update = Some(match url {
                    Some(u) => UpdateRequest::Url(u),
                    None => UpdateRequest::StoredUrl,
                });
            }
            BusCommand::ConsumerPresence { online } => {
                if self.ctx.consumer_online != online {
                    log::info!("cmd: consumer {}", if online { "online" } else { "offline" });
                }
                self.ctx.consumer_online = online;
            }
            // The session consumes echoes before dispatch.
            BusCommand::PresenceEcho => {}
        }
    }

    fn persist_settings<St: StoragePort>(&mut self, storage: &mut St) {
        let update_url = self.ctx.update_url.as_deref().and_then(|u| {
            let mut s = heapless::String::new();
            s.push_str(u).ok().map(|()| s)
        });
        let settings = Settings {
            publish_interval_ms: self.ctx.publish_interval_ms(),
            update_url,
            tz_offset_min: self.ctx.tz_offset_min,
        };
        let mut store = SettingsStore::new(storage);
        if let Err(e) = store.save_settings(&settings) {
            log::error!("settings: persist failed: {e}");
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_update<H, F, B, D, C, Ev>(
        &mut self,
        req: UpdateRequest,
        http: &mut H,
        flash: &mut F,
        bus: &mut B,
        display: &mut D,
        clock: &C,
        events: &mut Ev,
    ) where
        H: HttpPort,
        F: FirmwareSink,
        B: BusPort,
        D: DisplayPort,
        C: ClockPort,
        Ev: EventSink,
    {
        let url = match req {
            UpdateRequest::Url(u) => Some(u),
            UpdateRequest::StoredUrl => self.ctx.update_url.clone(),
        };
        let Some(url) = url else {
            log::warn!("update: triggered with no stored URL");
            return;
        };

        self.emit(events, bus, DebugEvent::UpdateStarted);
        let station_connected = self.conn.station_connected();
        // The transfer blocks the tick for seconds; the engine needs a
        // live clock, not the tick-start time.
        let result = self.update.run(
            &url,
            station_connected,
            http,
            flash,
            &mut self.session,
            bus,
            display,
            || clock.now_ms(),
        );
        match result {
            Ok(bytes) => {
                self.emit(events, bus, DebugEvent::UpdateSucceeded { bytes });
                // Clean presence handover before the reboot.
                self.session.publish_offline(bus);
                self.ctx.reboot_requested = true;
            }
            Err(reason) => {
                self.emit(events, bus, DebugEvent::UpdateFailed { reason });
            }
        }
    }

    fn shutdown<R, B, Ev>(&mut self, radio: &mut R, bus: &mut B, events: &mut Ev, millivolts: u16)
    where
        R: RadioPort,
        B: BusPort,
        Ev: EventSink,
    {
        log::error!("power: graceful shutdown at {millivolts}mV");
        self.emit(events, bus, DebugEvent::LowBatteryShutdown { millivolts });
        self.session.publish_offline(bus);
        self.session.reset(bus);
        radio.power_off();
        self.ctx.halted = true;
    }

    fn emit<Ev: EventSink, B: BusPort>(&mut self, events: &mut Ev, bus: &mut B, event: DebugEvent) {
        events.emit(&event);
        if self.session.is_connected() {
            if let Ok(json) = serde_json::to_vec(&event) {
                self.session.publish_debug(bus, &json);
            }
        }
    }
}
