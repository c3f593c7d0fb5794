//! System configuration parameters
//!
//! All tunable parameters for the AirNode firmware. The watchdog and
//! backoff constants are empirical values carried over from field
//! deployments; they are configuration, not invariants, and can be
//! overridden via NVS.

use serde::{Deserialize, Serialize};

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    // --- Message bus ---
    /// Fixed base prefix for every bus topic.
    pub base_topic: heapless::String<32>,
    /// A connect attempt with no broker acknowledgement within this long
    /// is torn down and retried with backoff (milliseconds).
    pub connect_timeout_ms: u32,
    /// Reconnect backoff floor (milliseconds).
    pub backoff_floor_ms: u32,
    /// Reconnect backoff cap (milliseconds).
    pub backoff_cap_ms: u32,
    /// Retained-presence re-publish period until the echo is observed.
    pub presence_retry_ms: u32,
    /// Give up re-asserting presence after this many re-publishes.
    pub presence_retry_max: u8,
    /// Default telemetry publish interval (milliseconds).
    pub telemetry_interval_ms: u32,

    // --- Connectivity ---
    /// Station connect attempt timeout (seconds).
    pub station_timeout_secs: u16,
    /// Orchestrator re-attempts a station connect this long after an
    /// abandoned attempt (seconds).
    pub station_retry_secs: u16,
    /// Provisioning AP auto-close: no associated client for this long.
    pub provision_no_client_secs: u16,
    /// Provisioning AP auto-close: no successful credential submission
    /// this long after the AP opened (resets on each submission).
    pub provision_no_submit_secs: u16,
    /// Inner provisioning connect attempt timeout (seconds).
    pub provision_connect_timeout_secs: u16,
    /// Delay between credential persistence and the reboot (milliseconds).
    pub provision_reboot_delay_ms: u32,
    /// How long the failure signal is surfaced to the portal (milliseconds).
    pub provision_failure_notice_ms: u32,

    // --- Sensor ingest ---
    /// Environmental (T/H/P) sampling period (milliseconds).
    pub env_sample_interval_ms: u32,
    /// EMA smoothing factor for temperature/humidity.
    pub env_ema_alpha: f32,
    /// Re-issue wake/active commands after this long without a valid frame.
    pub watchdog_kick_secs: u16,
    /// Full serial reinitialisation after this long without a valid frame.
    pub watchdog_reinit_secs: u16,
    /// Checksum-failure sliding window length (seconds).
    pub checksum_window_secs: u16,
    /// Failures within the window that force a serial reinitialisation.
    pub checksum_window_max: u8,

    // --- Power ---
    /// Battery sampling period (seconds); also sampled once at boot.
    pub battery_sample_interval_secs: u32,
    /// Resistor divider ratio on the battery sense pin.
    pub battery_divider_ratio: f32,
    /// Per-board ADC calibration constant.
    pub battery_cal: f32,
    /// Discrete level thresholds, highest first (volts).
    pub battery_level_thresholds: [f32; 4],
    /// Hysteresis applied when a level would increase (volts).
    pub battery_hysteresis_v: f32,
    /// Below this voltage the device latches shutdown (volts).
    pub battery_shutdown_floor_v: f32,

    // --- Startup ---
    /// Telemetry is suppressed during the boot splash phase (milliseconds).
    pub splash_ms: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let mut base_topic = heapless::String::new();
        let _ = base_topic.push_str("airnode");
        Self {
            base_topic,
            connect_timeout_ms: 10_000,
            backoff_floor_ms: 1_000,
            backoff_cap_ms: 60_000,
            presence_retry_ms: 3_000,
            presence_retry_max: 10,
            telemetry_interval_ms: 10_000,

            station_timeout_secs: 30,
            station_retry_secs: 60,
            provision_no_client_secs: 180,
            provision_no_submit_secs: 300,
            provision_connect_timeout_secs: 15,
            provision_reboot_delay_ms: 1_200,
            provision_failure_notice_ms: 2_000,

            env_sample_interval_ms: 1_000,
            env_ema_alpha: 0.3,
            watchdog_kick_secs: 5,
            watchdog_reinit_secs: 20,
            checksum_window_secs: 10,
            checksum_window_max: 5,

            battery_sample_interval_secs: 60,
            battery_divider_ratio: 2.0,
            battery_cal: 1.1,
            battery_level_thresholds: [3.90, 3.70, 3.50, 3.30],
            battery_hysteresis_v: 0.05,
            battery_shutdown_floor_v: 3.30,

            splash_ms: 3_000,
        }
    }
}
