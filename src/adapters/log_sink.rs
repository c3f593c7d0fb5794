//! Event sink that mirrors domain events into the serial log.
//!
//! The service also publishes events on the debug topic when the bus is
//! up; this sink is the always-available fallback so a node with no
//! broker in reach still leaves a trace.

use crate::app::events::DebugEvent;
use crate::app::ports::EventSink;

#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &DebugEvent) {
        match event {
            DebugEvent::UpdateFailed { reason } => log::error!("event: update failed: {reason}"),
            DebugEvent::LowBatteryShutdown { millivolts } => {
                log::error!("event: low battery shutdown at {millivolts}mV");
            }
            DebugEvent::StationTimeout { ssid } => {
                log::warn!("event: station timeout (ssid '{ssid}')");
            }
            other => log::info!("event: {other:?}"),
        }
    }
}

/// Test double that records everything it sees.
#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
pub struct RecordingEventSink {
    pub events: Vec<DebugEvent>,
}

#[cfg(not(target_os = "espidf"))]
impl EventSink for RecordingEventSink {
    fn emit(&mut self, event: &DebugEvent) {
        self.events.push(event.clone());
    }
}
