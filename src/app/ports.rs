//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ NodeService (domain)
//! ```
//!
//! Driven adapters (radio, bus client, serial line, sensors, flash,
//! storage, display) implement these traits. The domain consumes them via
//! generics, so the core never touches ESP-IDF directly and every state
//! machine runs unmodified under the host test harness.

use crate::error::{BusError, ConnectivityError, SensorError, StorageError, UpdateError};

// ───────────────────────────────────────────────────────────────
// Radio port (station + provisioning access point)
// ───────────────────────────────────────────────────────────────

/// Single radio owned by the connectivity manager. Normal operation runs
/// either station or access point; during a provisioning trial connect
/// both interfaces are live at once (AP serves the portal while the
/// station attempt runs), so implementations must support mixed mode.
pub trait RadioPort {
    /// Issue a station connect. Non-blocking: completion is observed by
    /// polling [`station_connected`](Self::station_connected).
    fn start_station(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError>;

    /// Whether the station interface currently holds an association + IP.
    fn station_connected(&self) -> bool;

    /// Tear down the station interface.
    fn stop_station(&mut self);

    /// Open the provisioning access point.
    fn start_access_point(&mut self, ssid: &str) -> Result<(), ConnectivityError>;

    /// Close the provisioning access point.
    fn stop_access_point(&mut self);

    /// Number of stations currently associated with our AP.
    fn ap_client_count(&self) -> u8;

    /// Disable the radio entirely (shutdown path). Irreversible until reset.
    fn power_off(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Message-bus port
// ───────────────────────────────────────────────────────────────

/// Connect options, including the Last Will the broker publishes on our
/// behalf if we disconnect uncleanly.
pub struct BusConnectOpts<'a> {
    pub client_id: &'a str,
    pub will_topic: &'a str,
    pub will_payload: &'a [u8],
}

/// Inbound session events surfaced by [`BusPort::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusIncoming {
    /// Broker accepted the connection.
    Connected,
    /// Session dropped (broker restart, link loss).
    Disconnected,
    /// A message arrived on a subscribed topic.
    Message { topic: String, payload: Vec<u8> },
}

/// Outbound bus client. One instance, owned by the session; the update
/// engine only ever calls [`poll`](Self::poll) to keep the event loop
/// serviced during long transfers.
pub trait BusPort {
    /// Open a session. Completion/failure arrives via [`poll`](Self::poll).
    fn connect(&mut self, opts: &BusConnectOpts<'_>) -> Result<(), BusError>;

    /// Drop the session cleanly (broker will NOT publish the will).
    fn disconnect(&mut self);

    fn subscribe(&mut self, topic: &str, qos: u8) -> Result<(), BusError>;

    fn publish(
        &mut self,
        topic: &str,
        qos: u8,
        retained: bool,
        payload: &[u8],
    ) -> Result<(), BusError>;

    /// Service the client event loop. Non-blocking; returns at most one
    /// pending event per call.
    fn poll(&mut self) -> Option<BusIncoming>;
}

// ───────────────────────────────────────────────────────────────
// Sensor ports
// ───────────────────────────────────────────────────────────────

/// One T/H/P sample from the environmental sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvSample {
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub pressure_hpa: f32,
}

/// I2C environmental sensor (temperature / humidity / pressure).
pub trait EnvSensorPort {
    fn sample(&mut self) -> Result<EnvSample, SensorError>;
}

/// Serial line to the particulate sensor. Owned exclusively by the
/// ingest pipeline.
pub trait SerialPort {
    /// Non-blocking read of whatever bytes are buffered; returns the
    /// number of bytes written into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Write a command frame to the sensor.
    fn write(&mut self, data: &[u8]);

    /// Tear the UART down and bring it back up (watchdog recovery).
    fn reinit(&mut self);
}

/// Battery sense ADC.
pub trait BatteryAdcPort {
    /// One raw ADC reading (0..=4095).
    fn read_raw(&mut self) -> u16;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic milliseconds since boot. The tick loop samples it once per
/// tick; the update engine reads it between flash chunks so a
/// multi-second transfer sees time advance.
pub trait ClockPort {
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Update ports (HTTP source + flash sink)
// ───────────────────────────────────────────────────────────────

/// A live firmware download stream.
pub trait UpdateSource {
    /// HTTP status of the response.
    fn status(&self) -> u16;

    /// Announced payload size, when the server sent one.
    fn content_length(&self) -> Option<u64>;

    /// Read the next chunk; `Ok(0)` signals end-of-stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, UpdateError>;
}

/// HTTP client used only by the update engine.
pub trait HttpPort {
    fn get(&mut self, url: &str) -> Result<Box<dyn UpdateSource>, UpdateError>;
}

/// Streaming flash writer for the inactive OTA partition.
pub trait FirmwareSink {
    /// Open the inactive partition for writing.
    fn begin(&mut self, expected_size: Option<u64>) -> Result<(), UpdateError>;

    /// Append one chunk.
    fn write(&mut self, chunk: &[u8]) -> Result<(), UpdateError>;

    /// Validate the image and mark the partition bootable.
    fn finalize(&mut self, total_bytes: u64) -> Result<(), UpdateError>;

    /// Discard a partially written image.
    fn abort(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Display port (presentation layer — notifications only)
// ───────────────────────────────────────────────────────────────

/// Thin notification boundary to the display/LED layer. Rendering lives
/// entirely on the other side; the core only reports intent.
pub trait DisplayPort {
    fn is_awake(&self) -> bool;
    fn wake(&mut self);
    fn next_mode(&mut self);

    /// Progress feedback while an update session is writing flash.
    fn update_progress(&mut self, bytes_written: u64, expected: Option<u64>);
}

// ───────────────────────────────────────────────────────────────
// Storage port (NVS / flash key-value)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for settings and credentials.
///
/// Keys are namespaced to prevent collisions between subsystems. Writes
/// MUST be atomic — the ESP-IDF NVS API guarantees this natively; the
/// in-memory simulation achieves it trivially.
pub trait StoragePort {
    /// Read a value. Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key. Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → logging / debug topic)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`DebugEvent`](super::events::DebugEvent)s
/// through this port. Adapters decide where they go (serial log, the
/// `<base>/debug` bus topic, both).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::DebugEvent);
}
