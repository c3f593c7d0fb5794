//! Unified error types for the AirNode firmware.
//!
//! Follows embedded best practice: a single `Error` enum that every
//! subsystem can convert into, keeping the top-level control loop's error
//! handling uniform. All variants are `Copy`-free only where they must
//! carry a status code or byte count; everything else is cheap to pass
//! through the tick loop without allocation.
//!
//! Taxonomy: *transient* errors (bus disconnect, station timeout, update
//! transfer failure) are retried with backoff or reported and left
//! recoverable; *validation* errors (malformed frame, out-of-range
//! payload) drop the input; *fatal-at-boot* (`Init`) halts before the main
//! loop; the low-battery shutdown is a policy, not an error.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A sensor could not be read or produced invalid data.
    Sensor(SensorError),
    /// WiFi station or provisioning failure.
    Connectivity(ConnectivityError),
    /// Message-bus session failure.
    Bus(BusError),
    /// Firmware update failure.
    Update(UpdateError),
    /// Persistent storage failure.
    Storage(StorageError),
    /// Peripheral initialisation failed (fatal at boot).
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Connectivity(e) => write!(f, "connectivity: {e}"),
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::Update(e) => write!(f, "update: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// I2C transaction with the environmental sensor failed.
    I2cReadFailed,
    /// Sensor has not completed its first conversion yet.
    WarmingUp,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2cReadFailed => write!(f, "I2C read failed"),
            Self::WarmingUp => write!(f, "sensor warming up"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Connectivity errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    /// SSID fails validation (1-32 printable ASCII bytes).
    InvalidSsid,
    /// Password fails validation (8-64 bytes for WPA2, or empty for open).
    InvalidPassword,
    /// The radio driver rejected the connect request.
    ConnectFailed,
    /// Operation requires provisioning mode.
    NotProvisioning,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::ConnectFailed => write!(f, "connect request rejected"),
            Self::NotProvisioning => write!(f, "not in provisioning mode"),
        }
    }
}

impl From<ConnectivityError> for Error {
    fn from(e: ConnectivityError) -> Self {
        Self::Connectivity(e)
    }
}

// ---------------------------------------------------------------------------
// Bus errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// Broker connect failed or was refused.
    ConnectFailed,
    /// Publish was rejected or the client is offline.
    PublishFailed,
    /// Subscribe was rejected.
    SubscribeFailed,
    /// Operation requires a connected session.
    NotConnected,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed => write!(f, "broker connect failed"),
            Self::PublishFailed => write!(f, "publish failed"),
            Self::SubscribeFailed => write!(f, "subscribe failed"),
            Self::NotConnected => write!(f, "session not connected"),
        }
    }
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

// ---------------------------------------------------------------------------
// Update errors
// ---------------------------------------------------------------------------

/// Structured failure reasons for an update session. These map one-to-one
/// onto the terminal `Failed` classification reported over the debug topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateError {
    /// Device is not in station mode with an active connection.
    NotConnected,
    /// Target host is a loopback address.
    LoopbackHost,
    /// URL scheme is not supported by the streaming downloader.
    UnsupportedScheme,
    /// URL could not be parsed at all.
    BadUrl,
    /// Server answered with a non-success status.
    HttpStatus(u16),
    /// Transfer aborted mid-stream.
    TransferFailed,
    /// Opening the inactive flash partition failed.
    BeginFailed,
    /// A chunk write to flash failed.
    WriteFailed,
    /// Stream ended before the announced size was received.
    SizeMismatch,
    /// Flash layer returned an error code during finalisation.
    FlashError(i32),
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected in station mode"),
            Self::LoopbackHost => write!(f, "loopback host rejected"),
            Self::UnsupportedScheme => write!(f, "unsupported URL scheme"),
            Self::BadUrl => write!(f, "malformed URL"),
            Self::HttpStatus(code) => write!(f, "HTTP status {code}"),
            Self::TransferFailed => write!(f, "transfer failed"),
            Self::BeginFailed => write!(f, "flash begin failed"),
            Self::WriteFailed => write!(f, "flash write failed"),
            Self::SizeMismatch => write!(f, "received size does not match expected"),
            Self::FlashError(code) => write!(f, "flash error {code}"),
        }
    }
}

impl From<UpdateError> for Error {
    fn from(e: UpdateError) -> Self {
        Self::Update(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Stored blob failed deserialisation.
    Corrupted,
    /// Generic I/O error.
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::Corrupted => write!(f, "blob corrupted"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
