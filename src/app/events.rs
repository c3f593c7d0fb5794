//! Structured debug events.
//!
//! Every noteworthy state change in the domain produces one of these.
//! They are serialised to JSON for the `<base>/debug` topic and mirrored
//! to the serial log, so field issues can be diagnosed from the broker
//! side without a cable attached.

use serde::{Deserialize, Serialize};

use crate::error::UpdateError;

/// A domain-level event worth surfacing outside the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DebugEvent {
    /// Station connect attempt abandoned after the configured timeout.
    StationTimeout { ssid: heapless::String<32> },
    /// Station associated and holds an IP.
    StationConnected,
    /// Station link dropped outside of a deliberate teardown.
    StationLost,
    /// Provisioning access point opened.
    ProvisioningOpened,
    /// Submitted credentials failed their trial connect.
    ProvisioningFailed,
    /// Credentials verified and persisted; reboot pending.
    ProvisioningSaved,
    /// Provisioning AP auto-closed without a successful submission.
    ProvisioningClosed { reason: ProvisioningCloseReason },
    /// Particulate serial line was torn down and reinitialised.
    SensorReinit { checksum_failures: u8 },
    /// Update session started for the given URL host.
    UpdateStarted,
    /// Update session ended in failure.
    UpdateFailed { reason: UpdateError },
    /// Update image written and verified; reboot pending.
    UpdateSucceeded { bytes: u64 },
    /// Battery fell below the shutdown floor; device is halting.
    LowBatteryShutdown { millivolts: u16 },
}

/// Why a provisioning window closed on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningCloseReason {
    /// No client associated within the idle window.
    NoClient,
    /// No credential submission within the overall window.
    NoSubmission,
}

// UpdateError carries into the debug stream as its display string so the
// broker side never needs our enum layout.
impl Serialize for UpdateError {
    fn serialize<S: serde::Serializer>(&self, s: S) -> core::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UpdateError {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> core::result::Result<Self, D::Error> {
        // Inbound deserialisation only occurs in tests and tooling; an
        // unknown string maps to the generic transfer failure.
        let text = <&str as Deserialize>::deserialize(d)?;
        Ok(match text {
            "not connected in station mode" => Self::NotConnected,
            "loopback host rejected" => Self::LoopbackHost,
            "unsupported URL scheme" => Self::UnsupportedScheme,
            "malformed URL" => Self::BadUrl,
            "flash begin failed" => Self::BeginFailed,
            "flash write failed" => Self::WriteFailed,
            "received size does not match expected" => Self::SizeMismatch,
            _ => Self::TransferFailed,
        })
    }
}
