//! Persistent settings over the storage port.
//!
//! Credentials and runtime settings are postcard-encoded blobs under the
//! `node` namespace. Missing keys fall back to defaults; a blob that no
//! longer deserialises is treated as absent rather than fatal.

use serde::{Deserialize, Serialize};

use crate::app::ports::StoragePort;
use crate::error::{ConnectivityError, StorageError};

const NAMESPACE: &str = "node";
const KEY_CREDENTIALS: &str = "wifi_creds";
const KEY_SETTINGS: &str = "settings";

// Largest postcard blob we round-trip through storage.
const BLOB_MAX: usize = 256;

/// WiFi station credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCredentials {
    pub ssid: heapless::String<32>,
    pub password: heapless::String<64>,
}

impl NetworkCredentials {
    /// Validate and construct. SSID must be 1-32 printable ASCII bytes;
    /// the password 8-64 bytes for WPA2, or empty for an open network.
    pub fn new(ssid: &str, password: &str) -> Result<Self, ConnectivityError> {
        if ssid.is_empty() || ssid.len() > 32 || !ssid.bytes().all(|b| (0x20..0x7f).contains(&b)) {
            return Err(ConnectivityError::InvalidSsid);
        }
        if !password.is_empty() && (password.len() < 8 || password.len() > 64) {
            return Err(ConnectivityError::InvalidPassword);
        }
        let mut s = heapless::String::new();
        let mut p = heapless::String::new();
        s.push_str(ssid).map_err(|_| ConnectivityError::InvalidSsid)?;
        p.push_str(password).map_err(|_| ConnectivityError::InvalidPassword)?;
        Ok(Self { ssid: s, password: p })
    }
}

/// Mutable runtime settings surviving reboots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Telemetry publish interval (milliseconds).
    pub publish_interval_ms: u32,
    /// Stored firmware update URL, if one has been configured.
    pub update_url: Option<heapless::String<128>>,
    /// Timezone offset applied to bus-synchronised wall time (minutes).
    pub tz_offset_min: i16,
}

impl Default for Settings {
    fn default() -> Self {
        Self { publish_interval_ms: 10_000, update_url: None, tz_offset_min: 0 }
    }
}

/// Typed wrapper over the raw key-value port.
pub struct SettingsStore<'a, S: StoragePort> {
    storage: &'a mut S,
}

impl<'a, S: StoragePort> SettingsStore<'a, S> {
    pub fn new(storage: &'a mut S) -> Self {
        Self { storage }
    }

    /// Load stored credentials, if any. A corrupted blob reads as absent.
    pub fn load_credentials(&self) -> Option<NetworkCredentials> {
        self.load_blob(KEY_CREDENTIALS)
    }

    pub fn save_credentials(&mut self, creds: &NetworkCredentials) -> Result<(), StorageError> {
        self.save_blob(KEY_CREDENTIALS, creds)
    }

    /// Drop stored credentials (factory reset path).
    pub fn clear_credentials(&mut self) -> Result<(), StorageError> {
        self.storage.delete(NAMESPACE, KEY_CREDENTIALS)
    }

    /// Load runtime settings, defaulting anything missing or corrupted.
    pub fn load_settings(&self) -> Settings {
        self.load_blob(KEY_SETTINGS).unwrap_or_default()
    }

    pub fn save_settings(&mut self, settings: &Settings) -> Result<(), StorageError> {
        self.save_blob(KEY_SETTINGS, settings)
    }

    fn load_blob<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        let mut buf = [0u8; BLOB_MAX];
        let len = self.storage.read(NAMESPACE, key, &mut buf).ok()?;
        match postcard::from_bytes(&buf[..len]) {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("settings: blob '{key}' failed to deserialise, ignoring");
                None
            }
        }
    }

    fn save_blob<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), StorageError> {
        let mut buf = [0u8; BLOB_MAX];
        let used = postcard::to_slice(value, &mut buf).map_err(|_| StorageError::Full)?;
        self.storage.write(NAMESPACE, key, used)
    }
}
