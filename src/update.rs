//! Streamed firmware update engine.
//!
//! The image is streamed in fixed-size chunks straight into the flash
//! sink; the whole payload is never buffered. The Writing phase is the
//! one deliberate busy-loop in the firmware, and it re-enters the bus
//! session's event service once per chunk so keepalive and the presence
//! protocol stay alive during a multi-second transfer.
//!
//! An update session, once started, runs to `Succeeded` or a classified
//! failure. There is no external cancellation.

use crate::app::ports::{BusPort, DisplayPort, FirmwareSink, HttpPort};
use crate::bus::MessageBusSession;
use crate::error::UpdateError;

/// One flash write per chunk; sized to the flash page budget.
pub const CHUNK_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Validating,
    Downloading,
    Writing,
    Verifying,
    /// Image written and marked bootable; the orchestrator reboots.
    Succeeded,
}

pub struct UpdateEngine {
    state: UpdateState,
    last_failure: Option<UpdateError>,
}

impl Default for UpdateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateEngine {
    pub fn new() -> Self {
        Self { state: UpdateState::Idle, last_failure: None }
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    /// Failure classification of the most recent session, if it failed.
    pub fn last_failure(&self) -> Option<UpdateError> {
        self.last_failure
    }

    /// Run one update session to completion. On success the engine stays
    /// in `Succeeded` (reboot pending); on failure it records the
    /// classification and returns to `Idle`.
    #[allow(clippy::too_many_arguments)]
    pub fn run<H, F, B>(
        &mut self,
        url: &str,
        station_connected: bool,
        http: &mut H,
        sink: &mut F,
        session: &mut MessageBusSession,
        bus: &mut B,
        display: &mut impl DisplayPort,
        mut clock: impl FnMut() -> u64,
    ) -> Result<u64, UpdateError>
    where
        H: HttpPort,
        F: FirmwareSink,
        B: BusPort,
    {
        let result =
            self.run_inner(url, station_connected, http, sink, session, bus, display, &mut clock);
        match &result {
            Ok(bytes) => log::info!("update: succeeded, {bytes} bytes written"),
            Err(e) => {
                log::error!("update: failed: {e}");
                self.last_failure = Some(*e);
                self.state = UpdateState::Idle;
            }
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn run_inner<H, F, B>(
        &mut self,
        url: &str,
        station_connected: bool,
        http: &mut H,
        sink: &mut F,
        session: &mut MessageBusSession,
        bus: &mut B,
        display: &mut impl DisplayPort,
        clock: &mut impl FnMut() -> u64,
    ) -> Result<u64, UpdateError>
    where
        H: HttpPort,
        F: FirmwareSink,
        B: BusPort,
    {
        self.state = UpdateState::Validating;
        self.last_failure = None;
        if !station_connected {
            return Err(UpdateError::NotConnected);
        }
        validate_url(url)?;

        self.state = UpdateState::Downloading;
        log::info!("update: fetching {url}");
        let mut source = http.get(url)?;
        let status = source.status();
        if !(200..300).contains(&status) {
            return Err(UpdateError::HttpStatus(status));
        }
        let expected = source.content_length();

        sink.begin(expected)?;

        self.state = UpdateState::Writing;
        let mut total: u64 = 0;
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    sink.abort();
                    return Err(e);
                }
            };
            if let Err(e) = sink.write(&buf[..n]) {
                sink.abort();
                return Err(e);
            }
            total += n as u64;

            // Keep the session serviced; commands arriving mid-transfer
            // are dropped, an in-flight session is not cancellable.
            session.service_io(bus, clock(), &mut |_| {});
            display.update_progress(total, expected);
        }

        self.state = UpdateState::Verifying;
        if let Some(exp) = expected {
            if total != exp {
                sink.abort();
                return Err(UpdateError::SizeMismatch);
            }
        }
        sink.finalize(total)?;

        self.state = UpdateState::Succeeded;
        Ok(total)
    }
}

/// Host and scheme validation. Only plain HTTP download sources are
/// supported, and loopback targets are refused outright.
pub fn validate_url(url: &str) -> Result<(), UpdateError> {
    let Some((scheme, rest)) = url.split_once("://") else {
        return Err(UpdateError::BadUrl);
    };
    if scheme != "http" {
        return Err(UpdateError::UnsupportedScheme);
    }
    let host = rest.split(['/', ':']).next().unwrap_or("");
    if host.is_empty() {
        return Err(UpdateError::BadUrl);
    }
    if host == "localhost" || host.starts_with("127.") || host == "::1" || host == "[::1]" {
        return Err(UpdateError::LoopbackHost);
    }
    Ok(())
}
