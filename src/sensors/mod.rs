//! Sensor ingest: particulate serial stream + environmental sampling.

pub mod environment;
pub mod particulate;

use environment::EnvironmentSampler;
use particulate::{ParticulateSensor, WatchdogAction};

use crate::app::ports::{EnvSensorPort, SerialPort};
use crate::config::NodeConfig;
use crate::telemetry::{EnvironmentReading, ParticulateReading};

/// Owns the serial line and the environmental sensor polling. One tick
/// drains the UART, runs the liveness watchdog, and samples T/H/P on its
/// own period.
pub struct SensorIngestPipeline {
    particulate: ParticulateSensor,
    environment: EnvironmentSampler,
}

impl SensorIngestPipeline {
    pub fn new(config: &NodeConfig, now_ms: u64) -> Self {
        Self {
            particulate: ParticulateSensor::new(config, now_ms),
            environment: EnvironmentSampler::new(config),
        }
    }

    /// Initial wake of the particulate sensor at boot.
    pub fn start<S: SerialPort>(&mut self, serial: &mut S, now_ms: u64) {
        self.particulate.wake(serial, now_ms);
    }

    /// One cooperative step. Returns the watchdog's action when it had to
    /// intervene, so the orchestrator can report it.
    pub fn tick<S: SerialPort, E: EnvSensorPort>(
        &mut self,
        serial: &mut S,
        env: &mut E,
        now_ms: u64,
    ) -> Option<WatchdogAction> {
        self.particulate.poll(serial, now_ms);
        let action = self.particulate.watchdog_tick(serial, now_ms);
        self.environment.tick(env, now_ms);
        action
    }

    pub fn particulate(&self) -> Option<ParticulateReading> {
        self.particulate.latest()
    }

    pub fn environment(&self) -> Option<EnvironmentReading> {
        self.environment.reading()
    }
}
