//! Environmental (T/H/P) sampling with exponential smoothing.
//!
//! Temperature and humidity are smoothed with an EMA so the dashboard
//! does not jitter; pressure is reported raw. The first sample seeds the
//! average directly.

use crate::app::ports::EnvSensorPort;
use crate::config::NodeConfig;
use crate::telemetry::EnvironmentReading;

pub struct EnvironmentSampler {
    reading: Option<EnvironmentReading>,
    last_sample_ms: u64,
    interval_ms: u64,
    alpha: f32,
}

impl EnvironmentSampler {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            reading: None,
            last_sample_ms: 0,
            interval_ms: u64::from(config.env_sample_interval_ms),
            alpha: config.env_ema_alpha,
        }
    }

    pub fn reading(&self) -> Option<EnvironmentReading> {
        self.reading
    }

    /// Sample on the configured period. A read failure keeps the previous
    /// smoothed value and retries next period.
    pub fn tick<E: EnvSensorPort>(&mut self, env: &mut E, now_ms: u64) {
        if self.reading.is_some() && now_ms.saturating_sub(self.last_sample_ms) < self.interval_ms {
            return;
        }
        self.last_sample_ms = now_ms;

        let sample = match env.sample() {
            Ok(s) => s,
            Err(e) => {
                log::warn!("environment: sample failed: {e}");
                return;
            }
        };

        self.reading = Some(match self.reading {
            None => EnvironmentReading::from(sample),
            Some(prev) => EnvironmentReading {
                temperature_c: ema(self.alpha, prev.temperature_c, sample.temperature_c),
                humidity_pct: ema(self.alpha, prev.humidity_pct, sample.humidity_pct),
                pressure_hpa: sample.pressure_hpa,
            },
        });
    }
}

fn ema(alpha: f32, prev: f32, next: f32) -> f32 {
    alpha * next + (1.0 - alpha) * prev
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::EnvSample;
    use crate::error::SensorError;

    struct MockEnv {
        next: Result<EnvSample, SensorError>,
        samples_taken: u32,
    }

    impl EnvSensorPort for MockEnv {
        fn sample(&mut self) -> Result<EnvSample, SensorError> {
            self.samples_taken += 1;
            self.next
        }
    }

    fn sample(t: f32) -> EnvSample {
        EnvSample { temperature_c: t, humidity_pct: 50.0, pressure_hpa: 1013.0 }
    }

    #[test]
    fn first_sample_seeds_directly() {
        let mut s = EnvironmentSampler::new(&NodeConfig::default());
        let mut env = MockEnv { next: Ok(sample(20.0)), samples_taken: 0 };
        s.tick(&mut env, 0);
        let r = s.reading().unwrap();
        assert_eq!(r.temperature_c, 20.0);
        assert_eq!(r.humidity_pct, 50.0);
    }

    #[test]
    fn later_samples_are_smoothed() {
        let mut s = EnvironmentSampler::new(&NodeConfig::default());
        let mut env = MockEnv { next: Ok(sample(20.0)), samples_taken: 0 };
        s.tick(&mut env, 0);
        env.next = Ok(sample(30.0));
        s.tick(&mut env, 1_000);
        let r = s.reading().unwrap();
        // 0.3 * 30 + 0.7 * 20
        assert!((r.temperature_c - 23.0).abs() < 0.001);
        // Pressure is raw, not smoothed.
        assert_eq!(r.pressure_hpa, 1013.0);
    }

    #[test]
    fn respects_the_sample_period() {
        let mut s = EnvironmentSampler::new(&NodeConfig::default());
        let mut env = MockEnv { next: Ok(sample(20.0)), samples_taken: 0 };
        s.tick(&mut env, 0);
        s.tick(&mut env, 400);
        s.tick(&mut env, 900);
        assert_eq!(env.samples_taken, 1);
        s.tick(&mut env, 1_000);
        assert_eq!(env.samples_taken, 2);
    }

    #[test]
    fn read_failure_keeps_previous_reading() {
        let mut s = EnvironmentSampler::new(&NodeConfig::default());
        let mut env = MockEnv { next: Ok(sample(20.0)), samples_taken: 0 };
        s.tick(&mut env, 0);
        env.next = Err(SensorError::I2cReadFailed);
        s.tick(&mut env, 1_000);
        assert_eq!(s.reading().unwrap().temperature_c, 20.0);
    }
}
