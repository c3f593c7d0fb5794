//! Hardware port adapters.
//!
//! Every driven port gets one adapter with a cfg-gated platform layer:
//!
//! - **`target_os = "espidf"`**: real ESP-IDF driver calls.
//! - **all other targets**: simulation backends so the whole firmware
//!   runs on the host.
//!
//! The domain never sees the difference; it talks to the port traits
//! only.

use log::info;

use crate::app::ports::{
    BatteryAdcPort, BusConnectOpts, BusIncoming, BusPort, ClockPort, DisplayPort, EnvSample,
    EnvSensorPort, FirmwareSink, HttpPort, RadioPort, SerialPort, UpdateSource,
};
use crate::error::{BusError, ConnectivityError, UpdateError};

#[cfg(target_os = "espidf")]
use crate::error::{Error, SensorError};

#[cfg(target_os = "espidf")]
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{
        adc::{
            attenuation::DB_11,
            oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
            ADC1,
        },
        delay::Delay,
        gpio::{AnyIOPin, Gpio21, Gpio22, Gpio34},
        i2c::{I2cConfig, I2cDriver, I2C0},
        uart::UartDriver,
        units::Hertz,
    },
    http::client::{Configuration as HttpConfiguration, EspHttpConnection},
    mqtt::client::{EspMqttClient, EspMqttEvent, EventPayload, MqttClientConfiguration, QoS},
    nvs::EspDefaultNvsPartition,
    wifi::{
        AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration as WifiConfig,
        EspWifi,
    },
};

#[cfg(target_os = "espidf")]
use bme280_rs::{Bme280, Configuration as BmeConfiguration, Oversampling, SensorMode};

// ───────────────────────────────────────────────────────────────
// Radio (WiFi station + provisioning AP)
// ───────────────────────────────────────────────────────────────

pub struct RadioAdapter {
    #[cfg(target_os = "espidf")]
    wifi: EspWifi<'static>,
    #[cfg(target_os = "espidf")]
    sta_active: bool,
    #[cfg(target_os = "espidf")]
    ap_active: bool,

    /// Simulation knobs, driven by the demo loop.
    #[cfg(not(target_os = "espidf"))]
    pub sim_station_up: bool,
    #[cfg(not(target_os = "espidf"))]
    pub sim_ap_clients: u8,
    #[cfg(not(target_os = "espidf"))]
    powered_off: bool,
}

impl RadioAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(
        modem: esp_idf_svc::hal::modem::Modem,
        sysloop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
    ) -> anyhow::Result<Self> {
        let wifi = EspWifi::new(modem, sysloop, Some(nvs))?;
        Ok(Self { wifi, sta_active: false, ap_active: false })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        info!("Radio(sim): simulation backend");
        Self { sim_station_up: false, sim_ap_clients: 0, powered_off: false }
    }
}

#[cfg(target_os = "espidf")]
impl RadioPort for RadioAdapter {
    fn start_station(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError> {
        let auth = if password.is_empty() { AuthMethod::None } else { AuthMethod::WPA2Personal };
        let client = ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| ConnectivityError::InvalidSsid)?,
            password: password.try_into().map_err(|_| ConnectivityError::InvalidPassword)?,
            auth_method: auth,
            ..Default::default()
        };
        // Mixed mode while a provisioning trial connect runs.
        let config = if self.ap_active {
            let ap = match self.wifi.get_configuration() {
                Ok(WifiConfig::AccessPoint(ap)) | Ok(WifiConfig::Mixed(_, ap)) => ap,
                _ => AccessPointConfiguration::default(),
            };
            WifiConfig::Mixed(client, ap)
        } else {
            WifiConfig::Client(client)
        };
        self.wifi.set_configuration(&config).map_err(|_| ConnectivityError::ConnectFailed)?;
        if !self.wifi.is_started().unwrap_or(false) {
            self.wifi.start().map_err(|_| ConnectivityError::ConnectFailed)?;
        }
        self.wifi.connect().map_err(|_| ConnectivityError::ConnectFailed)?;
        self.sta_active = true;
        Ok(())
    }

    fn station_connected(&self) -> bool {
        self.sta_active
            && self.wifi.is_connected().unwrap_or(false)
            && self.wifi.sta_netif().get_ip_info().map(|i| !i.ip.is_unspecified()).unwrap_or(false)
    }

    fn stop_station(&mut self) {
        if self.sta_active {
            let _ = self.wifi.disconnect();
            self.sta_active = false;
        }
        if !self.ap_active {
            let _ = self.wifi.stop();
        }
    }

    fn start_access_point(&mut self, ssid: &str) -> Result<(), ConnectivityError> {
        let ap = AccessPointConfiguration {
            ssid: ssid.try_into().map_err(|_| ConnectivityError::InvalidSsid)?,
            auth_method: AuthMethod::None,
            ..Default::default()
        };
        self.wifi
            .set_configuration(&WifiConfig::AccessPoint(ap))
            .map_err(|_| ConnectivityError::ConnectFailed)?;
        self.wifi.start().map_err(|_| ConnectivityError::ConnectFailed)?;
        self.ap_active = true;
        Ok(())
    }

    fn stop_access_point(&mut self) {
        if self.ap_active {
            self.ap_active = false;
            let _ = self.wifi.stop();
        }
    }

    fn ap_client_count(&self) -> u8 {
        if !self.ap_active {
            return 0;
        }
        // SAFETY: read-only query of the AP station list from the main task.
        let mut list = esp_idf_svc::sys::wifi_sta_list_t::default();
        let ret = unsafe { esp_idf_svc::sys::esp_wifi_ap_get_sta_list(&mut list) };
        if ret == esp_idf_svc::sys::ESP_OK {
            list.num.clamp(0, i32::from(u8::MAX)) as u8
        } else {
            0
        }
    }

    fn power_off(&mut self) {
        let _ = self.wifi.stop();
        self.sta_active = false;
        self.ap_active = false;
    }
}

#[cfg(not(target_os = "espidf"))]
impl RadioPort for RadioAdapter {
    fn start_station(&mut self, ssid: &str, _password: &str) -> Result<(), ConnectivityError> {
        if self.powered_off {
            return Err(ConnectivityError::ConnectFailed);
        }
        info!("Radio(sim): station connect to '{ssid}'");
        Ok(())
    }

    fn station_connected(&self) -> bool {
        !self.powered_off && self.sim_station_up
    }

    fn stop_station(&mut self) {
        info!("Radio(sim): station stopped");
        self.sim_station_up = false;
    }

    fn start_access_point(&mut self, ssid: &str) -> Result<(), ConnectivityError> {
        info!("Radio(sim): AP '{ssid}' open");
        Ok(())
    }

    fn stop_access_point(&mut self) {
        info!("Radio(sim): AP closed");
        self.sim_ap_clients = 0;
    }

    fn ap_client_count(&self) -> u8 {
        self.sim_ap_clients
    }

    fn power_off(&mut self) {
        info!("Radio(sim): powered off");
        self.powered_off = true;
        self.sim_station_up = false;
    }
}

// ───────────────────────────────────────────────────────────────
// Message bus (MQTT)
// ───────────────────────────────────────────────────────────────

/// MQTT client adapter. The ESP-IDF client is callback-driven; events
/// are funnelled through a channel so [`BusPort::poll`] stays a plain
/// non-blocking pop on the main task.
pub struct BusAdapter {
    #[cfg(target_os = "espidf")]
    broker_url: String,
    #[cfg(target_os = "espidf")]
    client: Option<EspMqttClient<'static>>,
    #[cfg(target_os = "espidf")]
    rx: Option<std::sync::mpsc::Receiver<BusIncoming>>,

    #[cfg(not(target_os = "espidf"))]
    pub sim_incoming: std::collections::VecDeque<BusIncoming>,
    #[cfg(not(target_os = "espidf"))]
    pub sim_published: Vec<(String, Vec<u8>)>,
    /// Holds queued events back for this many polls, so a test can land
    /// an event mid-transfer rather than at the tick's drain.
    #[cfg(not(target_os = "espidf"))]
    pub sim_defer_polls: u32,
}

impl BusAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(broker_url: &str) -> Self {
        Self { broker_url: broker_url.to_string(), client: None, rx: None }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new(_broker_url: &str) -> Self {
        info!("Bus(sim): simulation backend");
        Self {
            sim_incoming: std::collections::VecDeque::new(),
            sim_published: Vec::new(),
            sim_defer_polls: 0,
        }
    }
}

#[cfg(target_os = "espidf")]
impl BusPort for BusAdapter {
    fn connect(&mut self, opts: &BusConnectOpts<'_>) -> Result<(), BusError> {
        let (tx, rx) = std::sync::mpsc::channel();
        let config = MqttClientConfiguration {
            client_id: Some(opts.client_id),
            lwt: Some(esp_idf_svc::mqtt::client::LwtConfiguration {
                topic: opts.will_topic,
                payload: opts.will_payload,
                qos: QoS::AtLeastOnce,
                retain: true,
            }),
            ..Default::default()
        };
        let client = EspMqttClient::new_cb(&self.broker_url, &config, move |event: EspMqttEvent| {
            let incoming = match event.payload() {
                EventPayload::Connected(_) => Some(BusIncoming::Connected),
                EventPayload::Disconnected => Some(BusIncoming::Disconnected),
                EventPayload::Received { topic, data, .. } => topic.map(|t| BusIncoming::Message {
                    topic: t.to_string(),
                    payload: data.to_vec(),
                }),
                _ => None,
            };
            if let Some(msg) = incoming {
                let _ = tx.send(msg);
            }
        })
        .map_err(|_| BusError::ConnectFailed)?;
        self.client = Some(client);
        self.rx = Some(rx);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.client = None;
        self.rx = None;
    }

    fn subscribe(&mut self, topic: &str, qos: u8) -> Result<(), BusError> {
        let qos = if qos == 0 { QoS::AtMostOnce } else { QoS::AtLeastOnce };
        self.client
            .as_mut()
            .ok_or(BusError::NotConnected)?
            .subscribe(topic, qos)
            .map(|_| ())
            .map_err(|_| BusError::SubscribeFailed)
    }

    fn publish(
        &mut self,
        topic: &str,
        qos: u8,
        retained: bool,
        payload: &[u8],
    ) -> Result<(), BusError> {
        let qos = if qos == 0 { QoS::AtMostOnce } else { QoS::AtLeastOnce };
        self.client
            .as_mut()
            .ok_or(BusError::NotConnected)?
            .enqueue(topic, qos, retained, payload)
            .map(|_| ())
            .map_err(|_| BusError::PublishFailed)
    }

    fn poll(&mut self) -> Option<BusIncoming> {
        self.rx.as_ref()?.try_recv().ok()
    }
}

#[cfg(not(target_os = "espidf"))]
impl BusPort for BusAdapter {
    fn connect(&mut self, opts: &BusConnectOpts<'_>) -> Result<(), BusError> {
        info!("Bus(sim): connect as '{}'", opts.client_id);
        self.sim_incoming.push_back(BusIncoming::Connected);
        Ok(())
    }

    fn disconnect(&mut self) {
        info!("Bus(sim): disconnected");
    }

    fn subscribe(&mut self, topic: &str, _qos: u8) -> Result<(), BusError> {
        info!("Bus(sim): subscribed '{topic}'");
        Ok(())
    }

    fn publish(
        &mut self,
        topic: &str,
        _qos: u8,
        _retained: bool,
        payload: &[u8],
    ) -> Result<(), BusError> {
        self.sim_published.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    fn poll(&mut self) -> Option<BusIncoming> {
        if self.sim_defer_polls > 0 {
            self.sim_defer_polls -= 1;
            return None;
        }
        self.sim_incoming.pop_front()
    }
}

// ───────────────────────────────────────────────────────────────
// Particulate serial line (UART)
// ───────────────────────────────────────────────────────────────

pub struct SerialAdapter {
    #[cfg(target_os = "espidf")]
    uart: UartDriver<'static>,

    #[cfg(not(target_os = "espidf"))]
    pub sim_rx: std::collections::VecDeque<u8>,
    #[cfg(not(target_os = "espidf"))]
    pub sim_reinits: u32,
}

impl SerialAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(uart: UartDriver<'static>) -> Self {
        Self { uart }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self { sim_rx: std::collections::VecDeque::new(), sim_reinits: 0 }
    }
}

#[cfg(target_os = "espidf")]
impl SerialPort for SerialAdapter {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        // NON_BLOCK: returns immediately with whatever is buffered.
        self.uart.read(buf, 0).unwrap_or(0)
    }

    fn write(&mut self, data: &[u8]) {
        if let Err(e) = self.uart.write(data) {
            log::warn!("serial: write failed: {e}");
        }
    }

    fn reinit(&mut self) {
        let _ = self.uart.clear_rx();
    }
}

#[cfg(not(target_os = "espidf"))]
impl SerialPort for SerialAdapter {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.sim_rx.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.sim_rx.pop_front().unwrap_or(0);
        }
        n
    }

    fn write(&mut self, _data: &[u8]) {}

    fn reinit(&mut self) {
        self.sim_rx.clear();
        self.sim_reinits += 1;
        info!("Serial(sim): reinitialised");
    }
}

// ───────────────────────────────────────────────────────────────
// Environmental sensor (I2C T/H/P)
// ───────────────────────────────────────────────────────────────

pub struct EnvSensorAdapter {
    #[cfg(target_os = "espidf")]
    bme: Bme280<I2cDriver<'static>, Delay>,

    #[cfg(not(target_os = "espidf"))]
    pub sim_sample: EnvSample,
}

impl EnvSensorAdapter {
    /// Bring up the I2C bus and probe the BME280. A missing or
    /// unresponsive sensor fails boot.
    #[cfg(target_os = "espidf")]
    pub fn new(i2c: I2C0, sda: Gpio21, scl: Gpio22) -> Result<Self, Error> {
        let config = I2cConfig::new().baudrate(Hertz(100_000));
        let i2c = I2cDriver::new(i2c, sda, scl, &config).map_err(|e| {
            log::error!("env: I2C bus init failed: {e}");
            Error::Init("environment sensor I2C bus")
        })?;
        let mut bme =
            Bme280::new_with_address(i2c, crate::pins::ENV_I2C_ADDR, Delay::new_default());
        bme.init().map_err(|_| Error::Init("BME280 probe"))?;
        bme.set_sampling_configuration(
            BmeConfiguration::default()
                .with_temperature_oversampling(Oversampling::Oversample1)
                .with_humidity_oversampling(Oversampling::Oversample1)
                .with_pressure_oversampling(Oversampling::Oversample1)
                .with_sensor_mode(SensorMode::Normal),
        )
        .map_err(|_| Error::Init("BME280 configuration"))?;
        info!("env: BME280 online at 0x{:02x}", crate::pins::ENV_I2C_ADDR);
        Ok(Self { bme })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            sim_sample: EnvSample { temperature_c: 21.0, humidity_pct: 45.0, pressure_hpa: 1013.0 },
        }
    }
}

impl EnvSensorPort for EnvSensorAdapter {
    #[cfg(target_os = "espidf")]
    fn sample(&mut self) -> Result<EnvSample, SensorError> {
        let t = self.bme.read_temperature().map_err(|_| SensorError::I2cReadFailed)?;
        let h = self.bme.read_humidity().map_err(|_| SensorError::I2cReadFailed)?;
        let p = self.bme.read_pressure().map_err(|_| SensorError::I2cReadFailed)?;
        // All three are None until the first conversion completes.
        match (t, h, p) {
            (Some(t), Some(h), Some(p)) => Ok(EnvSample {
                temperature_c: t,
                humidity_pct: h,
                pressure_hpa: p / 100.0,
            }),
            _ => Err(SensorError::WarmingUp),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn sample(&mut self) -> Result<EnvSample, crate::error::SensorError> {
        Ok(self.sim_sample)
    }
}

// ───────────────────────────────────────────────────────────────
// Battery ADC
// ───────────────────────────────────────────────────────────────

pub struct BatteryAdcAdapter {
    #[cfg(target_os = "espidf")]
    channel: AdcChannelDriver<'static, Gpio34, AdcDriver<'static, ADC1>>,

    #[cfg(not(target_os = "espidf"))]
    pub sim_raw: u16,
}

impl BatteryAdcAdapter {
    /// Oneshot ADC on the battery-sense divider (`pins::VBAT_ADC_GPIO`),
    /// 11 dB attenuation for the full divider output range.
    #[cfg(target_os = "espidf")]
    pub fn new(adc: ADC1, pin: Gpio34) -> Result<Self, Error> {
        let driver = AdcDriver::new(adc).map_err(|_| Error::Init("battery ADC unit"))?;
        let config = AdcChannelConfig { attenuation: DB_11, ..Default::default() };
        let channel = AdcChannelDriver::new(driver, pin, &config)
            .map_err(|_| Error::Init("battery ADC channel"))?;
        Ok(Self { channel })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        // Roughly 3.8V with the default divider and calibration.
        Self { sim_raw: 2150 }
    }
}

impl BatteryAdcPort for BatteryAdcAdapter {
    #[cfg(target_os = "espidf")]
    fn read_raw(&mut self) -> u16 {
        // A read error reports full-scale so the shutdown floor never
        // false-triggers on a driver fault.
        self.channel.read_raw().unwrap_or(4095)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_raw(&mut self) -> u16 {
        self.sim_raw
    }
}

// ───────────────────────────────────────────────────────────────
// Monotonic clock
// ───────────────────────────────────────────────────────────────

pub struct ClockAdapter {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
    /// When set, the clock reports this fixed value instead of elapsed
    /// host time.
    #[cfg(not(target_os = "espidf"))]
    pub sim_now_ms: Option<u64>,
}

impl ClockAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new() -> Self {
        Self {}
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self { start: std::time::Instant::now(), sim_now_ms: None }
    }
}

impl Default for ClockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockPort for ClockAdapter {
    #[cfg(target_os = "espidf")]
    fn now_ms(&self) -> u64 {
        // SAFETY: esp_timer_get_time is safe to call from any task.
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() } / 1000) as u64
    }

    #[cfg(not(target_os = "espidf"))]
    fn now_ms(&self) -> u64 {
        self.sim_now_ms.unwrap_or_else(|| self.start.elapsed().as_millis() as u64)
    }
}

// ───────────────────────────────────────────────────────────────
// HTTP download source
// ───────────────────────────────────────────────────────────────

pub struct HttpAdapter {
    #[cfg(not(target_os = "espidf"))]
    pub sim_status: u16,
    #[cfg(not(target_os = "espidf"))]
    pub sim_body: Vec<u8>,
}

impl HttpAdapter {
    pub fn new() -> Self {
        #[cfg(target_os = "espidf")]
        {
            Self {}
        }
        #[cfg(not(target_os = "espidf"))]
        {
            Self { sim_status: 200, sim_body: Vec::new() }
        }
    }
}

impl Default for HttpAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
struct EspHttpSource {
    connection: EspHttpConnection,
    status: u16,
    content_length: Option<u64>,
}

#[cfg(target_os = "espidf")]
impl UpdateSource for EspHttpSource {
    fn status(&self) -> u16 {
        self.status
    }

    fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, UpdateError> {
        self.connection.read(buf).map_err(|_| UpdateError::TransferFailed)
    }
}

#[cfg(target_os = "espidf")]
impl HttpPort for HttpAdapter {
    fn get(&mut self, url: &str) -> Result<Box<dyn UpdateSource>, UpdateError> {
        let mut connection = EspHttpConnection::new(&HttpConfiguration::default())
            .map_err(|_| UpdateError::TransferFailed)?;
        connection
            .initiate_request(esp_idf_svc::http::Method::Get, url, &[])
            .map_err(|_| UpdateError::TransferFailed)?;
        connection.initiate_response().map_err(|_| UpdateError::TransferFailed)?;
        let status = connection.status();
        let content_length = connection
            .header("Content-Length")
            .and_then(|v| v.parse::<u64>().ok());
        Ok(Box::new(EspHttpSource { connection, status, content_length }))
    }
}

#[cfg(not(target_os = "espidf"))]
struct SimHttpSource {
    status: u16,
    body: Vec<u8>,
    offset: usize,
}

#[cfg(not(target_os = "espidf"))]
impl UpdateSource for SimHttpSource {
    fn status(&self) -> u16 {
        self.status
    }

    fn content_length(&self) -> Option<u64> {
        Some(self.body.len() as u64)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, UpdateError> {
        let remaining = &self.body[self.offset..];
        let n = buf.len().min(remaining.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.offset += n;
        Ok(n)
    }
}

#[cfg(not(target_os = "espidf"))]
impl HttpPort for HttpAdapter {
    fn get(&mut self, url: &str) -> Result<Box<dyn UpdateSource>, UpdateError> {
        info!("Http(sim): GET {url}");
        Ok(Box::new(SimHttpSource {
            status: self.sim_status,
            body: self.sim_body.clone(),
            offset: 0,
        }))
    }
}

// ───────────────────────────────────────────────────────────────
// Firmware flash sink (esp-ota)
// ───────────────────────────────────────────────────────────────

pub struct FlashAdapter {
    #[cfg(target_os = "espidf")]
    update: Option<esp_ota::OtaUpdate>,

    #[cfg(not(target_os = "espidf"))]
    pub sim_written: Vec<u8>,
    #[cfg(not(target_os = "espidf"))]
    pub sim_finalized: bool,
}

impl FlashAdapter {
    pub fn new() -> Self {
        #[cfg(target_os = "espidf")]
        {
            Self { update: None }
        }
        #[cfg(not(target_os = "espidf"))]
        {
            Self { sim_written: Vec::new(), sim_finalized: false }
        }
    }
}

impl Default for FlashAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
impl FirmwareSink for FlashAdapter {
    fn begin(&mut self, _expected_size: Option<u64>) -> Result<(), UpdateError> {
        let update = esp_ota::OtaUpdate::begin().map_err(|e| {
            log::warn!("esp-ota begin failed: {e:?}");
            UpdateError::BeginFailed
        })?;
        self.update = Some(update);
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> Result<(), UpdateError> {
        self.update
            .as_mut()
            .ok_or(UpdateError::BeginFailed)?
            .write(chunk)
            .map_err(|e| {
                log::warn!("esp-ota write failed: {e:?}");
                UpdateError::WriteFailed
            })
    }

    fn finalize(&mut self, _total_bytes: u64) -> Result<(), UpdateError> {
        let update = self.update.take().ok_or(UpdateError::BeginFailed)?;
        let mut completed = update.finalize().map_err(|e| {
            log::warn!("esp-ota finalize failed: {e:?}");
            UpdateError::FlashError(e.code())
        })?;
        completed.set_as_boot_partition().map_err(|e| {
            log::warn!("esp-ota set_as_boot_partition failed: {e:?}");
            UpdateError::FlashError(e.code())
        })?;
        Ok(())
    }

    fn abort(&mut self) {
        // esp-ota aborts automatically when OtaUpdate is dropped.
        self.update = None;
    }
}

#[cfg(not(target_os = "espidf"))]
impl FirmwareSink for FlashAdapter {
    fn begin(&mut self, expected_size: Option<u64>) -> Result<(), UpdateError> {
        info!("Flash(sim): begin (expected {expected_size:?})");
        self.sim_written.clear();
        self.sim_finalized = false;
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> Result<(), UpdateError> {
        self.sim_written.extend_from_slice(chunk);
        Ok(())
    }

    fn finalize(&mut self, total_bytes: u64) -> Result<(), UpdateError> {
        if self.sim_written.len() as u64 != total_bytes {
            return Err(UpdateError::SizeMismatch);
        }
        self.sim_finalized = true;
        info!("Flash(sim): finalized {total_bytes} bytes");
        Ok(())
    }

    fn abort(&mut self) {
        self.sim_written.clear();
        info!("Flash(sim): aborted");
    }
}

/// Cancel a pending rollback by marking the running image valid. Must be
/// called once early in boot after an OTA, or the bootloader reverts to
/// the previous partition on the next reset.
#[cfg(target_os = "espidf")]
pub fn check_rollback() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: running image marked valid"),
        Err(e) => log::warn!("OTA: mark_app_valid failed: {e:?}"),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn check_rollback() {
    info!("OTA(sim): rollback check skipped");
}

// ───────────────────────────────────────────────────────────────
// Display notifications
// ───────────────────────────────────────────────────────────────

/// Notification-only display adapter. Actual rendering lives in the
/// display task on target; the simulation just logs.
pub struct DisplayAdapter {
    awake: bool,
    mode: u8,
}

impl DisplayAdapter {
    pub fn new() -> Self {
        Self { awake: true, mode: 0 }
    }
}

impl Default for DisplayAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayPort for DisplayAdapter {
    fn is_awake(&self) -> bool {
        self.awake
    }

    fn wake(&mut self) {
        self.awake = true;
        info!("display: wake");
    }

    fn next_mode(&mut self) {
        self.mode = (self.mode + 1) % 3;
        info!("display: mode {}", self.mode);
    }

    fn update_progress(&mut self, bytes_written: u64, expected: Option<u64>) {
        if let Some(total) = expected {
            if total > 0 && bytes_written % (64 * 1024) < 1024 {
                info!("display: update {}%", bytes_written * 100 / total);
            }
        }
    }
}
