//! Telemetry payload assembly.
//!
//! One JSON object per publish, schema fixed so the consumer dashboard
//! can rely on every key being present. Fields without a valid reading
//! are published as JSON `null` rather than omitted.

use serde_json::json;

use crate::aqi;
use crate::app::ports::EnvSample;

/// One decoded particulate frame (atmospheric-environment values, µg/m³).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticulateReading {
    pub pm1_0: u16,
    pub pm2_5: u16,
    pub pm10: u16,
}

/// Smoothed environmental readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentReading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub pressure_hpa: f32,
}

impl From<EnvSample> for EnvironmentReading {
    fn from(s: EnvSample) -> Self {
        Self {
            temperature_c: s.temperature_c,
            humidity_pct: s.humidity_pct,
            pressure_hpa: s.pressure_hpa,
        }
    }
}

/// Assemble the telemetry JSON document.
///
/// `vbat_mv` is millivolts; it is reported in volts with two decimals.
pub fn to_json(
    device_id: &str,
    fw_version: &str,
    particulate: Option<ParticulateReading>,
    environment: Option<EnvironmentReading>,
    vbat_mv: Option<u16>,
) -> String {
    let aqi_value = particulate
        .and_then(|p| aqi::aqi(f32::from(p.pm2_5), f32::from(p.pm10)))
        .map(serde_json::Value::from)
        .unwrap_or(serde_json::Value::Null);

    let round1 = |v: f32| (f64::from(v) * 10.0).round() / 10.0;

    let doc = json!({
        "id": device_id,
        "fw": fw_version,
        "aqi": aqi_value,
        "t": environment.map(|e| round1(e.temperature_c)),
        "h": environment.map(|e| round1(e.humidity_pct)),
        "p": environment.map(|e| round1(e.pressure_hpa)),
        "vbat": vbat_mv.map(|mv| f64::from(mv) / 1000.0),
        "pm1": particulate.map(|p| p.pm1_0),
        "pm25": particulate.map(|p| p.pm2_5),
        "pm10": particulate.map(|p| p.pm10),
    });

    doc.to_string()
}
