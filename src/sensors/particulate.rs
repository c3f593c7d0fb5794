//! Particulate sensor serial ingest.
//!
//! The sensor streams fixed 32-byte frames: a two-byte header, a body of
//! big-endian u16 fields, and a trailing 16-bit checksum that is the
//! plain sum of every preceding byte. The reader is non-blocking: it
//! buffers whatever the UART has, hunts for the header, and only
//! consumes a frame once all 32 bytes are present.
//!
//! A watchdog keeps the line alive: wake/active commands are re-issued
//! after a quiet gap, and the serial line is fully reinitialised after a
//! long silence or a burst of checksum failures.

use crate::app::ports::SerialPort;
use crate::config::NodeConfig;
use crate::telemetry::ParticulateReading;

pub const FRAME_LEN: usize = 32;
const HEADER: [u8; 2] = [0x42, 0x4D];
/// Value of the frame's own length field (bytes after it).
const BODY_LEN: u16 = 28;

/// Host-to-sensor command frames.
const CMD_WAKE: [u8; 7] = [0x42, 0x4D, 0xE4, 0x00, 0x01, 0x01, 0x74];
const CMD_ACTIVE_MODE: [u8; 7] = [0x42, 0x4D, 0xE1, 0x00, 0x01, 0x01, 0x71];

/// What the watchdog did this tick, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogAction {
    /// Wake/active commands re-issued after a quiet gap.
    Kicked,
    /// Serial line torn down and reinitialised.
    Reinitialised { checksum_failures: u8 },
}

pub struct ParticulateSensor {
    buf: Vec<u8>,
    latest: Option<ParticulateReading>,
    last_valid_ms: u64,
    last_kick_ms: u64,
    failure_times: Vec<u64>,

    kick_gap_ms: u64,
    reinit_gap_ms: u64,
    window_ms: u64,
    window_max: u8,
}

impl ParticulateSensor {
    pub fn new(config: &NodeConfig, now_ms: u64) -> Self {
        Self {
            buf: Vec::with_capacity(FRAME_LEN * 4),
            latest: None,
            last_valid_ms: now_ms,
            last_kick_ms: now_ms,
            failure_times: Vec::new(),
            kick_gap_ms: u64::from(config.watchdog_kick_secs) * 1000,
            reinit_gap_ms: u64::from(config.watchdog_reinit_secs) * 1000,
            window_ms: u64::from(config.checksum_window_secs) * 1000,
            window_max: config.checksum_window_max,
        }
    }

    /// Most recent valid reading.
    pub fn latest(&self) -> Option<ParticulateReading> {
        self.latest
    }

    /// Send wake + active-mode commands. Called at boot and by the
    /// watchdog.
    pub fn wake<S: SerialPort>(&mut self, serial: &mut S, now_ms: u64) {
        serial.write(&CMD_WAKE);
        serial.write(&CMD_ACTIVE_MODE);
        self.last_kick_ms = now_ms;
    }

    /// Drain the UART and parse at most the frames it held. Returns the
    /// newest valid non-zero reading consumed this tick, if any.
    pub fn poll<S: SerialPort>(&mut self, serial: &mut S, now_ms: u64) -> Option<ParticulateReading> {
        let mut chunk = [0u8; 64];
        loop {
            let n = serial.read(&mut chunk);
            if n == 0 {
                break;
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }

        let mut newest = None;
        while let Some(reading) = self.consume_frame(now_ms) {
            if let Some(r) = reading {
                newest = Some(r);
            }
        }
        if let Some(r) = newest {
            self.latest = Some(r);
        }
        newest
    }

    /// Liveness and recovery. Call once per tick after [`poll`](Self::poll).
    pub fn watchdog_tick<S: SerialPort>(
        &mut self,
        serial: &mut S,
        now_ms: u64,
    ) -> Option<WatchdogAction> {
        self.prune_window(now_ms);
        let failures = self.failure_times.len() as u8;

        let silent_ms = now_ms.saturating_sub(self.last_valid_ms);
        if silent_ms >= self.reinit_gap_ms || failures >= self.window_max {
            log::warn!(
                "particulate: reinit (silent {}s, {} checksum failures)",
                silent_ms / 1000,
                failures
            );
            serial.reinit();
            self.buf.clear();
            self.failure_times.clear();
            self.last_valid_ms = now_ms;
            self.wake(serial, now_ms);
            return Some(WatchdogAction::Reinitialised { checksum_failures: failures });
        }

        if silent_ms >= self.kick_gap_ms
            && now_ms.saturating_sub(self.last_kick_ms) >= self.kick_gap_ms
        {
            log::debug!("particulate: watchdog kick");
            self.wake(serial, now_ms);
            return Some(WatchdogAction::Kicked);
        }
        None
    }

    // ── Frame parsing ─────────────────────────────────────────

    /// Try to consume one frame from the buffer.
    /// `Some(Some(r))`  valid frame with a usable reading
    /// `Some(None)`     a frame (or garbage) was consumed, keep scanning
    /// `None`           not enough buffered data
    fn consume_frame(&mut self, now_ms: u64) -> Option<Option<ParticulateReading>> {
        // Drop noise in front of the header.
        let start = self
            .buf
            .windows(2)
            .position(|w| w == HEADER)
            .unwrap_or_else(|| self.buf.len().saturating_sub(1));
        if start > 0 {
            self.buf.drain(..start);
        }
        if self.buf.len() < FRAME_LEN {
            return None;
        }

        let frame: [u8; FRAME_LEN] = self.buf[..FRAME_LEN].try_into().ok()?;

        let length = u16::from_be_bytes([frame[2], frame[3]]);
        if length != BODY_LEN {
            // Header bytes that were not actually a frame start; skip the
            // false header and rescan.
            self.buf.drain(..2);
            return Some(None);
        }

        let expected = u16::from_be_bytes([frame[30], frame[31]]);
        if checksum(&frame[..30]) != expected {
            self.buf.drain(..2);
            self.record_failure(now_ms);
            return Some(None);
        }

        self.buf.drain(..FRAME_LEN);
        self.last_valid_ms = now_ms;

        let pm1_0 = u16::from_be_bytes([frame[10], frame[11]]);
        let pm2_5 = u16::from_be_bytes([frame[12], frame[13]]);
        let pm10 = u16::from_be_bytes([frame[14], frame[15]]);

        // An all-zero triple is a warm-up artifact: it proves the line is
        // alive but is not a usable reading.
        if pm1_0 == 0 && pm2_5 == 0 && pm10 == 0 {
            return Some(None);
        }
        Some(Some(ParticulateReading { pm1_0, pm2_5, pm10 }))
    }

    fn record_failure(&mut self, now_ms: u64) {
        log::warn!("particulate: checksum mismatch");
        self.failure_times.push(now_ms);
        self.prune_window(now_ms);
    }

    fn prune_window(&mut self, now_ms: u64) {
        let floor = now_ms.saturating_sub(self.window_ms);
        self.failure_times.retain(|&t| t >= floor);
    }
}

/// 16-bit wrapping sum of the frame body.
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
}

/// Build a well-formed frame for tests and the simulated serial adapter.
#[cfg(any(test, not(target_os = "espidf")))]
pub fn build_frame(pm1_0: u16, pm2_5: u16, pm10: u16) -> [u8; FRAME_LEN] {
    let mut f = [0u8; FRAME_LEN];
    f[0] = HEADER[0];
    f[1] = HEADER[1];
    f[2..4].copy_from_slice(&BODY_LEN.to_be_bytes());
    // Standard-particle fields mirror the atmospheric ones.
    f[4..6].copy_from_slice(&pm1_0.to_be_bytes());
    f[6..8].copy_from_slice(&pm2_5.to_be_bytes());
    f[8..10].copy_from_slice(&pm10.to_be_bytes());
    f[10..12].copy_from_slice(&pm1_0.to_be_bytes());
    f[12..14].copy_from_slice(&pm2_5.to_be_bytes());
    f[14..16].copy_from_slice(&pm10.to_be_bytes());
    let sum = checksum(&f[..30]);
    f[30..32].copy_from_slice(&sum.to_be_bytes());
    f
}
