//! Battery monitoring and the low-battery shutdown latch.
//!
//! Voltage is the mean of 32 successive ADC samples scaled by the
//! divider ratio and a per-board calibration constant. Four thresholds
//! classify a discrete display level with hysteresis on upward moves so
//! the indicator does not flap around a boundary. Below the shutdown
//! floor the monitor latches: the orchestrator then runs the graceful
//! shutdown sequence and the device stays halted until physically reset.

use crate::app::ports::BatteryAdcPort;
use crate::config::NodeConfig;

const SAMPLES: u32 = 32;
const ADC_MAX: f32 = 4095.0;
const ADC_REF_V: f32 = 3.3;

/// Number of display levels above "empty".
pub const LEVEL_MAX: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    /// Voltage fell below the shutdown floor. Latched; fires once.
    ShutdownLatched { millivolts: u16 },
}

pub struct BatteryMonitor {
    interval_ms: u64,
    last_sample_ms: Option<u64>,
    volts: Option<f32>,
    level: u8,
    thresholds: [f32; 4],
    hysteresis_v: f32,
    shutdown_floor_v: f32,
    divider_ratio: f32,
    cal: f32,
    shutdown_latched: bool,
}

impl BatteryMonitor {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            interval_ms: u64::from(config.battery_sample_interval_secs) * 1000,
            last_sample_ms: None,
            volts: None,
            level: 0,
            thresholds: config.battery_level_thresholds,
            hysteresis_v: config.battery_hysteresis_v,
            shutdown_floor_v: config.battery_shutdown_floor_v,
            divider_ratio: config.battery_divider_ratio,
            cal: config.battery_cal,
            shutdown_latched: false,
        }
    }

    pub fn millivolts(&self) -> Option<u16> {
        self.volts.map(|v| (v * 1000.0) as u16)
    }

    /// Discrete display level, `0..=LEVEL_MAX`.
    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn shutdown_latched(&self) -> bool {
        self.shutdown_latched
    }

    /// Sample once at boot and then on the configured period. Once the
    /// shutdown has latched no further events are produced.
    pub fn tick<A: BatteryAdcPort>(&mut self, adc: &mut A, now_ms: u64) -> Option<PowerEvent> {
        if self.shutdown_latched {
            return None;
        }
        let due = match self.last_sample_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.interval_ms,
        };
        if !due {
            return None;
        }
        self.last_sample_ms = Some(now_ms);

        let mut sum: u32 = 0;
        for _ in 0..SAMPLES {
            sum += u32::from(adc.read_raw());
        }
        let mean = sum as f32 / SAMPLES as f32;
        let volts = mean / ADC_MAX * ADC_REF_V * self.divider_ratio * self.cal;
        let first = self.volts.is_none();
        self.volts = Some(volts);
        self.update_level(volts, first);

        if volts < self.shutdown_floor_v {
            log::error!("power: {volts:.2}V below shutdown floor, latching halt");
            self.shutdown_latched = true;
            return Some(PowerEvent::ShutdownLatched { millivolts: (volts * 1000.0) as u16 });
        }
        None
    }

    fn update_level(&mut self, volts: f32, first: bool) {
        let raw = self.classify(volts);
        // The boot reading seeds the level directly; hysteresis only
        // damps later upward moves.
        if first {
            self.level = raw;
        } else if raw > self.level {
            // Rising levels must clear the threshold plus hysteresis;
            // otherwise settle one level short.
            let needed = self.thresholds[usize::from(LEVEL_MAX - raw)] + self.hysteresis_v;
            if volts >= needed {
                self.level = raw;
            } else {
                self.level = self.level.max(raw - 1);
            }
        } else {
            self.level = raw;
        }
    }

    fn classify(&self, volts: f32) -> u8 {
        for (i, &t) in self.thresholds.iter().enumerate() {
            if volts >= t {
                return LEVEL_MAX - i as u8;
            }
        }
        0
    }
}
