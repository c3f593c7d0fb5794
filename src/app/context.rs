//! Shared device context: identity, runtime flags, and the telemetry
//! publish gate.

use crate::bus::commands::{INTERVAL_MAX_MS, INTERVAL_MIN_MS};
use crate::config::NodeConfig;

pub struct DeviceContext {
    pub config: NodeConfig,
    pub device_id: String,
    pub fw_version: &'static str,

    publish_interval_ms: u32,
    last_publish_ms: Option<u64>,
    splash_until_ms: u64,

    /// Consumer-presence signal from the dashboard side.
    pub consumer_online: bool,
    /// Administrative publish switch.
    pub publish_enabled: bool,

    /// Stored firmware source URL.
    pub update_url: Option<String>,

    /// Wall-clock sync: epoch seconds minus the monotonic clock at sync.
    epoch_anchor: Option<(u64, u64)>,
    pub tz_offset_min: i16,

    /// Set when the main loop should restart the device.
    pub reboot_requested: bool,
    /// Low-battery latch: the loop stops ticking entirely.
    pub halted: bool,
}

impl DeviceContext {
    pub fn new(config: NodeConfig, device_id: String, fw_version: &'static str, now_ms: u64) -> Self {
        let publish_interval_ms = config.telemetry_interval_ms;
        let splash_until_ms = now_ms + u64::from(config.splash_ms);
        Self {
            config,
            device_id,
            fw_version,
            publish_interval_ms,
            last_publish_ms: None,
            splash_until_ms,
            consumer_online: false,
            publish_enabled: true,
            update_url: None,
            epoch_anchor: None,
            tz_offset_min: 0,
            reboot_requested: false,
            halted: false,
        }
    }

    pub fn publish_interval_ms(&self) -> u32 {
        self.publish_interval_ms
    }

    /// Clamped into the supported interval range.
    pub fn set_publish_interval(&mut self, ms: u32) {
        self.publish_interval_ms = ms.clamp(INTERVAL_MIN_MS, INTERVAL_MAX_MS);
    }

    pub fn in_splash(&self, now_ms: u64) -> bool {
        now_ms < self.splash_until_ms
    }

    /// The telemetry gate: every condition must hold or the publish is
    /// silently suppressed.
    pub fn telemetry_due(&self, now_ms: u64) -> bool {
        if !self.consumer_online || !self.publish_enabled || self.in_splash(now_ms) {
            return false;
        }
        match self.last_publish_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= u64::from(self.publish_interval_ms),
        }
    }

    pub fn mark_published(&mut self, now_ms: u64) {
        self.last_publish_ms = Some(now_ms);
    }

    pub fn sync_time(&mut self, epoch_secs: u64, now_ms: u64) {
        self.epoch_anchor = Some((epoch_secs, now_ms));
    }

    /// Wall-clock seconds (with the timezone offset applied), once a
    /// time-sync command has arrived.
    pub fn wall_clock_secs(&self, now_ms: u64) -> Option<i64> {
        let (epoch, anchor_ms) = self.epoch_anchor?;
        let elapsed = now_ms.saturating_sub(anchor_ms) / 1000;
        Some(epoch as i64 + elapsed as i64 + i64::from(self.tz_offset_min) * 60)
    }
}
