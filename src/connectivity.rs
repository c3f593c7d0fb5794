//! Connectivity arbitration: WiFi station vs. provisioning access point.
//!
//! Exactly one mode owns the radio at a time. Station mode attempts a
//! connect against stored credentials with a hard deadline and never
//! retries on its own; the orchestrator decides when to try again.
//! Provisioning mode opens a setup access point, trial-connects submitted
//! credentials while the portal stays reachable, and auto-closes itself
//! when nobody uses it.
//!
//! ```text
//!            Station                      Provisioning
//!   Idle ─▶ Attempting ─▶ Connected    Idle ─▶ Requested ─▶ Connecting
//!     ▲        │ timeout                 ▲         │             │
//!     └────────┘                         └──── Failed ◀──────────┤
//!                                                            Success ─▶ reboot
//! ```

use crate::app::events::ProvisioningCloseReason;
use crate::app::ports::RadioPort;
use crate::error::ConnectivityError;
use crate::settings::NetworkCredentials;

/// Which role currently owns the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Station,
    Provisioning,
}

/// Station-mode sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationState {
    /// No attempt in flight.
    Idle,
    /// Connect issued, waiting for association or the deadline.
    Attempting { deadline_ms: u64 },
    /// Associated with an IP.
    Connected,
}

/// Provisioning-mode sub-state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningState {
    /// Portal open, waiting for a credential submission.
    Idle,
    /// Credentials accepted from the portal, trial connect not yet issued.
    Requested { creds: NetworkCredentials },
    /// Trial connect in flight.
    Connecting { creds: NetworkCredentials, deadline_ms: u64 },
    /// Trial connect succeeded; reboot pending so the node comes up clean.
    Success { reboot_at_ms: u64 },
    /// Trial connect failed; surfaced to the portal until the notice expires.
    Failed { until_ms: u64 },
}

/// State transitions the orchestrator must react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnEvent {
    /// Station associated and holds an IP.
    StationUp,
    /// Station link dropped outside a deliberate teardown.
    StationLost,
    /// Station attempt abandoned at its deadline. No retry is scheduled
    /// here; that policy belongs to the orchestrator.
    StationTimeout,
    /// Trial connect verified these credentials; persist them.
    ProvisioningSucceeded(NetworkCredentials),
    /// Trial connect failed; portal is showing the failure notice.
    ProvisioningFailed,
    /// The access point auto-closed without a successful submission.
    ProvisioningClosed(ProvisioningCloseReason),
}

pub struct ConnectivityManager {
    mode: Mode,
    station: StationState,
    provisioning: ProvisioningState,

    // Provisioning auto-close bookkeeping.
    ap_opened_ms: u64,
    last_client_ms: u64,
    submit_anchor_ms: u64,

    no_client_timeout_ms: u64,
    no_submit_timeout_ms: u64,
    station_timeout_ms: u64,
    trial_timeout_ms: u64,
    reboot_delay_ms: u64,
    failure_notice_ms: u64,

    reboot_due: bool,
}

impl ConnectivityManager {
    pub fn new(config: &crate::config::NodeConfig) -> Self {
        Self {
            mode: Mode::Station,
            station: StationState::Idle,
            provisioning: ProvisioningState::Idle,
            ap_opened_ms: 0,
            last_client_ms: 0,
            submit_anchor_ms: 0,
            no_client_timeout_ms: u64::from(config.provision_no_client_secs) * 1000,
            no_submit_timeout_ms: u64::from(config.provision_no_submit_secs) * 1000,
            station_timeout_ms: u64::from(config.station_timeout_secs) * 1000,
            trial_timeout_ms: u64::from(config.provision_connect_timeout_secs) * 1000,
            reboot_delay_ms: u64::from(config.provision_reboot_delay_ms),
            failure_notice_ms: u64::from(config.provision_failure_notice_ms),
            reboot_due: false,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn station_state(&self) -> StationState {
        self.station
    }

    pub fn provisioning_state(&self) -> &ProvisioningState {
        &self.provisioning
    }

    pub fn station_connected(&self) -> bool {
        self.mode == Mode::Station && self.station == StationState::Connected
    }

    /// Set once credentials are verified or persisted state demands a
    /// clean restart. The orchestrator performs the actual reboot.
    pub fn reboot_due(&self) -> bool {
        self.reboot_due
    }

    /// Begin a station connect attempt against the given credentials.
    /// Rejected while provisioning owns the radio or an attempt is live.
    pub fn begin_station<R: RadioPort>(
        &mut self,
        radio: &mut R,
        creds: &NetworkCredentials,
        now_ms: u64,
    ) -> Result<(), ConnectivityError> {
        if self.mode != Mode::Station || self.station != StationState::Idle {
            return Err(ConnectivityError::ConnectFailed);
        }
        log::info!("connectivity: station attempt ssid='{}'", creds.ssid);
        radio.start_station(&creds.ssid, &creds.password)?;
        self.station = StationState::Attempting { deadline_ms: now_ms + self.station_timeout_ms };
        Ok(())
    }

    /// Tear down whatever station state exists and open the setup AP.
    pub fn enter_provisioning<R: RadioPort>(
        &mut self,
        radio: &mut R,
        ap_ssid: &str,
        now_ms: u64,
    ) -> Result<(), ConnectivityError> {
        if self.mode == Mode::Provisioning {
            return Ok(());
        }
        radio.stop_station();
        self.station = StationState::Idle;
        radio.start_access_point(ap_ssid)?;
        log::info!("connectivity: provisioning AP '{ap_ssid}' open");
        self.mode = Mode::Provisioning;
        self.provisioning = ProvisioningState::Idle;
        self.ap_opened_ms = now_ms;
        self.last_client_ms = now_ms;
        self.submit_anchor_ms = now_ms;
        Ok(())
    }

    /// Portal handler: accept a credential submission for trial connect.
    /// Each submission restarts the overall provisioning window.
    pub fn submit_credentials(
        &mut self,
        ssid: &str,
        password: &str,
        now_ms: u64,
    ) -> Result<(), ConnectivityError> {
        if self.mode != Mode::Provisioning {
            return Err(ConnectivityError::NotProvisioning);
        }
        match self.provisioning {
            ProvisioningState::Idle | ProvisioningState::Failed { .. } => {}
            _ => return Err(ConnectivityError::NotProvisioning),
        }
        let creds = NetworkCredentials::new(ssid, password)?;
        self.submit_anchor_ms = now_ms;
        self.provisioning = ProvisioningState::Requested { creds };
        Ok(())
    }

    /// Drive the state machine one step. At most one event per tick.
    pub fn tick<R: RadioPort>(&mut self, radio: &mut R, now_ms: u64) -> Option<ConnEvent> {
        match self.mode {
            Mode::Station => self.tick_station(radio, now_ms),
            Mode::Provisioning => self.tick_provisioning(radio, now_ms),
        }
    }

    fn tick_station<R: RadioPort>(&mut self, radio: &mut R, now_ms: u64) -> Option<ConnEvent> {
        match self.station {
            StationState::Idle => None,
            StationState::Attempting { deadline_ms } => {
                if radio.station_connected() {
                    log::info!("connectivity: station connected");
                    self.station = StationState::Connected;
                    Some(ConnEvent::StationUp)
                } else if now_ms >= deadline_ms {
                    log::warn!("connectivity: station attempt abandoned after timeout");
                    radio.stop_station();
                    self.station = StationState::Idle;
                    Some(ConnEvent::StationTimeout)
                } else {
                    None
                }
            }
            StationState::Connected => {
                if radio.station_connected() {
                    None
                } else {
                    log::warn!("connectivity: station link lost");
                    self.station = StationState::Idle;
                    Some(ConnEvent::StationLost)
                }
            }
        }
    }

    fn tick_provisioning<R: RadioPort>(&mut self, radio: &mut R, now_ms: u64) -> Option<ConnEvent> {
        if radio.ap_client_count() > 0 {
            self.last_client_ms = now_ms;
        }

        // Auto-close applies only while the portal is waiting; a live
        // trial connect or a pending reboot is never interrupted.
        let waiting = matches!(
            self.provisioning,
            ProvisioningState::Idle | ProvisioningState::Failed { .. }
        );
        if waiting {
            if now_ms.saturating_sub(self.last_client_ms) >= self.no_client_timeout_ms {
                return Some(self.close_portal(radio, ProvisioningCloseReason::NoClient));
            }
            if now_ms.saturating_sub(self.submit_anchor_ms) >= self.no_submit_timeout_ms {
                return Some(self.close_portal(radio, ProvisioningCloseReason::NoSubmission));
            }
        }

        match core::mem::replace(&mut self.provisioning, ProvisioningState::Idle) {
            ProvisioningState::Idle => None,
            ProvisioningState::Requested { creds } => {
                match radio.start_station(&creds.ssid, &creds.password) {
                    Ok(()) => {
                        self.provisioning = ProvisioningState::Connecting {
                            creds,
                            deadline_ms: now_ms + self.trial_timeout_ms,
                        };
                        None
                    }
                    Err(_) => {
                        self.provisioning =
                            ProvisioningState::Failed { until_ms: now_ms + self.failure_notice_ms };
                        Some(ConnEvent::ProvisioningFailed)
                    }
                }
            }
            ProvisioningState::Connecting { creds, deadline_ms } => {
                if radio.station_connected() {
                    log::info!("connectivity: trial connect verified, reboot pending");
                    self.provisioning =
                        ProvisioningState::Success { reboot_at_ms: now_ms + self.reboot_delay_ms };
                    Some(ConnEvent::ProvisioningSucceeded(creds))
                } else if now_ms >= deadline_ms {
                    log::warn!("connectivity: trial connect failed");
                    radio.stop_station();
                    self.provisioning =
                        ProvisioningState::Failed { until_ms: now_ms + self.failure_notice_ms };
                    Some(ConnEvent::ProvisioningFailed)
                } else {
                    self.provisioning = ProvisioningState::Connecting { creds, deadline_ms };
                    None
                }
            }
            ProvisioningState::Success { reboot_at_ms } => {
                if now_ms >= reboot_at_ms {
                    radio.stop_access_point();
                    self.reboot_due = true;
                }
                self.provisioning = ProvisioningState::Success { reboot_at_ms };
                None
            }
            ProvisioningState::Failed { until_ms } => {
                if now_ms >= until_ms {
                    self.provisioning = ProvisioningState::Idle;
                } else {
                    self.provisioning = ProvisioningState::Failed { until_ms };
                }
                None
            }
        }
    }

    fn close_portal<R: RadioPort>(
        &mut self,
        radio: &mut R,
        reason: ProvisioningCloseReason,
    ) -> ConnEvent {
        log::info!("connectivity: provisioning AP auto-closed ({reason:?})");
        radio.stop_access_point();
        self.mode = Mode::Station;
        self.provisioning = ProvisioningState::Idle;
        self.station = StationState::Idle;
        ConnEvent::ProvisioningClosed(reason)
    }
}
