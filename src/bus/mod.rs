//! Message-bus session: connect/reconnect with backoff, presence
//! protocol, command dispatch, telemetry/debug publishing.
//!
//! The session runs only while the station link is up; the orchestrator
//! simply stops ticking it (and resets it) otherwise. Reconnects back
//! off exponentially with jitter so a broker restart does not trigger a
//! synchronized storm across a fleet. The retained "online" presence is
//! re-asserted every few seconds until the broker echoes it back,
//! because a retained publish can race a broker restart and silently
//! vanish.

pub mod commands;
pub mod topics;

use commands::{BusCommand, ParseError};
use topics::{TopicKind, TopicSet};

use crate::app::ports::{BusConnectOpts, BusIncoming, BusPort};
use crate::config::NodeConfig;
use crate::error::BusError;

const PRESENCE_ONLINE: &[u8] = b"online";
const PRESENCE_OFFLINE: &[u8] = b"offline";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

pub struct MessageBusSession {
    state: SessionState,
    topics: TopicSet,
    client_id: String,

    connect_timeout_ms: u32,
    connect_deadline_ms: u64,
    backoff_floor_ms: u32,
    backoff_cap_ms: u32,
    backoff_ms: u32,
    next_attempt_ms: u64,

    presence_retry_ms: u32,
    presence_retry_max: u8,
    presence_confirmed: bool,
    presence_publishes: u8,
    last_presence_ms: u64,

    rng: u32,
}

impl MessageBusSession {
    pub fn new(config: &NodeConfig, device_id: &str) -> Self {
        // Seed the jitter generator from the device identity so two
        // nodes never share a reconnect schedule.
        let mut seed: u32 = 0x9e37_79b9;
        for b in device_id.bytes() {
            seed = seed.wrapping_mul(31).wrapping_add(u32::from(b));
        }
        Self {
            state: SessionState::Disconnected,
            topics: TopicSet::new(&config.base_topic, device_id),
            client_id: device_id.to_string(),
            connect_timeout_ms: config.connect_timeout_ms,
            connect_deadline_ms: 0,
            backoff_floor_ms: config.backoff_floor_ms,
            backoff_cap_ms: config.backoff_cap_ms,
            backoff_ms: config.backoff_floor_ms,
            next_attempt_ms: 0,
            presence_retry_ms: config.presence_retry_ms,
            presence_retry_max: config.presence_retry_max,
            presence_confirmed: false,
            presence_publishes: 0,
            last_presence_ms: 0,
            rng: seed | 1,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn presence_confirmed(&self) -> bool {
        self.presence_confirmed
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    /// Station link dropped; forget the session and reconnect fresh
    /// (from the backoff floor) once the link returns.
    pub fn reset<B: BusPort>(&mut self, bus: &mut B) {
        if self.state != SessionState::Disconnected {
            bus.disconnect();
        }
        self.state = SessionState::Disconnected;
        self.backoff_ms = self.backoff_floor_ms;
        self.next_attempt_ms = 0;
        self.presence_confirmed = false;
        self.presence_publishes = 0;
    }

    /// Advance the session one step: connect with backoff when down,
    /// then service the event loop and the presence protocol.
    pub fn tick<B: BusPort>(
        &mut self,
        bus: &mut B,
        now_ms: u64,
        mut on_cmd: impl FnMut(BusCommand),
    ) {
        match self.state {
            SessionState::Disconnected => {
                if now_ms >= self.next_attempt_ms {
                    self.start_connect(bus, now_ms);
                }
            }
            SessionState::Connecting | SessionState::Connected => {
                self.service_io(bus, now_ms, &mut on_cmd);
                match self.state {
                    // Connect accepted but no acknowledgement: tear the
                    // client down and fall back to the backoff path.
                    SessionState::Connecting if now_ms >= self.connect_deadline_ms => {
                        log::warn!(
                            "bus: no broker ack within {}ms, retry in {}ms",
                            self.connect_timeout_ms,
                            self.backoff_ms
                        );
                        bus.disconnect();
                        self.schedule_retry(now_ms);
                    }
                    SessionState::Connected => self.assert_presence(bus, now_ms),
                    _ => {}
                }
            }
        }
    }

    /// Drain pending bus events and dispatch commands. Also the pump the
    /// update engine calls between flash chunks so keepalive and presence
    /// stay serviced during a long transfer.
    pub fn service_io<B: BusPort>(
        &mut self,
        bus: &mut B,
        now_ms: u64,
        on_cmd: &mut impl FnMut(BusCommand),
    ) {
        while let Some(incoming) = bus.poll() {
            match incoming {
                BusIncoming::Connected => self.on_connected(bus, now_ms),
                BusIncoming::Disconnected => {
                    log::warn!("bus: session dropped, retry in {}ms", self.backoff_ms);
                    self.schedule_retry(now_ms);
                }
                BusIncoming::Message { topic, payload } => {
                    self.dispatch(&topic, &payload, on_cmd);
                }
            }
        }
    }

    /// Retained "offline" on the status topic, for the graceful paths
    /// (low-battery shutdown, pre-update reboot) where the will won't fire.
    pub fn publish_offline<B: BusPort>(&mut self, bus: &mut B) {
        if self.state == SessionState::Connected {
            let _ = bus.publish(&self.topics.status, 1, true, PRESENCE_OFFLINE);
        }
    }

    pub fn publish_telemetry<B: BusPort>(
        &mut self,
        bus: &mut B,
        payload: &[u8],
    ) -> Result<(), BusError> {
        if self.state != SessionState::Connected {
            return Err(BusError::NotConnected);
        }
        bus.publish(&self.topics.data, 0, false, payload)
    }

    pub fn publish_debug<B: BusPort>(&mut self, bus: &mut B, payload: &[u8]) {
        if self.state == SessionState::Connected {
            let _ = bus.publish(&self.topics.debug, 0, false, payload);
        }
    }

    // ── Internals ─────────────────────────────────────────────

    fn start_connect<B: BusPort>(&mut self, bus: &mut B, now_ms: u64) {
        let opts = BusConnectOpts {
            client_id: &self.client_id,
            will_topic: &self.topics.status,
            will_payload: PRESENCE_OFFLINE,
        };
        match bus.connect(&opts) {
            Ok(()) => {
                log::info!("bus: connecting as '{}'", self.client_id);
                self.state = SessionState::Connecting;
                self.connect_deadline_ms = now_ms + u64::from(self.connect_timeout_ms);
            }
            Err(_) => {
                log::warn!("bus: connect rejected, retry in {}ms", self.backoff_ms);
                self.schedule_retry(now_ms);
            }
        }
    }

    fn on_connected<B: BusPort>(&mut self, bus: &mut B, now_ms: u64) {
        log::info!("bus: connected");
        self.state = SessionState::Connected;
        self.backoff_ms = self.backoff_floor_ms;

        for topic in self.topics.subscriptions() {
            if let Err(e) = bus.subscribe(topic, 1) {
                log::warn!("bus: subscribe '{topic}' failed: {e}");
            }
        }
        if let Err(e) = bus.subscribe(self.topics.extra_subscription(), 1) {
            log::warn!("bus: subscribe '{}' failed: {e}", self.topics.extra_subscription());
        }

        self.presence_confirmed = false;
        self.presence_publishes = 0;
        self.publish_presence(bus, now_ms);
    }

    fn publish_presence<B: BusPort>(&mut self, bus: &mut B, now_ms: u64) {
        let _ = bus.publish(&self.topics.status, 1, true, PRESENCE_ONLINE);
        self.presence_publishes = self.presence_publishes.saturating_add(1);
        self.last_presence_ms = now_ms;
    }

    /// Re-publish the retained presence until the echo arrives or the
    /// attempt budget runs out.
    fn assert_presence<B: BusPort>(&mut self, bus: &mut B, now_ms: u64) {
        if self.presence_confirmed || self.presence_publishes >= self.presence_retry_max {
            return;
        }
        if now_ms.saturating_sub(self.last_presence_ms) >= u64::from(self.presence_retry_ms) {
            self.publish_presence(bus, now_ms);
        }
    }

    fn dispatch(&mut self, topic: &str, payload: &[u8], on_cmd: &mut impl FnMut(BusCommand)) {
        let Some(kind) = self.topics.classify(topic) else {
            log::debug!("bus: unclassified topic '{topic}'");
            return;
        };
        match commands::parse(kind, payload) {
            Ok(BusCommand::PresenceEcho) => {
                if !self.presence_confirmed {
                    log::info!("bus: presence confirmed");
                    self.presence_confirmed = true;
                }
            }
            Ok(cmd) => on_cmd(cmd),
            Err(e) => self.reject(kind, e),
        }
    }

    fn reject(&self, kind: TopicKind, err: ParseError) {
        // A stale retained "offline" on our own status topic is expected
        // after an unclean restart, not a malformed command.
        if kind != TopicKind::Status {
            log::warn!("bus: rejected payload on {kind:?}: {err:?}");
        }
    }

    fn schedule_retry(&mut self, now_ms: u64) {
        self.state = SessionState::Disconnected;
        self.presence_confirmed = false;
        let jitter = u64::from(self.next_jitter_ms());
        self.next_attempt_ms = now_ms + u64::from(self.backoff_ms) + jitter;
        self.backoff_ms = (self.backoff_ms.saturating_mul(2)).min(self.backoff_cap_ms);
    }

    /// xorshift32; good enough to decorrelate reconnect schedules.
    fn next_jitter_ms(&mut self) -> u32 {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng = x;
        x % 1_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct MockBus {
        connect_results: VecDeque<Result<(), BusError>>,
        incoming: VecDeque<BusIncoming>,
        published: Vec<(String, bool, Vec<u8>)>,
        subscribed: Vec<String>,
        connects: u32,
        disconnects: u32,
    }

    impl BusPort for MockBus {
        fn connect(&mut self, _opts: &BusConnectOpts<'_>) -> Result<(), BusError> {
            self.connects += 1;
            self.connect_results.pop_front().unwrap_or(Ok(()))
        }
        fn disconnect(&mut self) {
            self.disconnects += 1;
        }
        fn subscribe(&mut self, topic: &str, _qos: u8) -> Result<(), BusError> {
            self.subscribed.push(topic.to_string());
            Ok(())
        }
        fn publish(
            &mut self,
            topic: &str,
            _qos: u8,
            retained: bool,
            payload: &[u8],
        ) -> Result<(), BusError> {
            self.published.push((topic.to_string(), retained, payload.to_vec()));
            Ok(())
        }
        fn poll(&mut self) -> Option<BusIncoming> {
            self.incoming.pop_front()
        }
    }

    fn session() -> MessageBusSession {
        MessageBusSession::new(&NodeConfig::default(), "airnode-a1b2c3")
    }

    fn connect(s: &mut MessageBusSession, bus: &mut MockBus, now: u64) {
        s.tick(bus, now, |_| {});
        bus.incoming.push_back(BusIncoming::Connected);
        s.tick(bus, now + 1, |_| {});
        assert!(s.is_connected());
    }

    #[test]
    fn connect_subscribes_and_announces_presence() {
        let mut s = session();
        let mut bus = MockBus::default();
        connect(&mut s, &mut bus, 0);

        assert!(bus.subscribed.iter().any(|t| t == "airnode/cmd/interval"));
        assert!(bus.subscribed.iter().any(|t| t == "airnode/cmd/update/airnode-a1b2c3"));
        assert_eq!(bus.subscribed.len(), 8);

        let (topic, retained, payload) = &bus.published[0];
        assert_eq!(topic, "airnode/status");
        assert!(*retained);
        assert_eq!(payload, b"online");
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut s = session();
        let mut bus = MockBus::default();
        for _ in 0..10 {
            bus.connect_results.push_back(Err(BusError::ConnectFailed));
        }

        let mut now = 0u64;
        let mut gaps = Vec::new();
        for _ in 0..8 {
            // Advance until the session actually attempts.
            let before = bus.connects;
            let start = now;
            while bus.connects == before {
                s.tick(&mut bus, now, |_| {});
                now += 100;
            }
            gaps.push(now - start);
        }
        // First attempt is immediate; later gaps grow and settle at the
        // cap (60s) plus at most 1s jitter.
        assert!(gaps[1] >= 1_000);
        assert!(gaps[7] >= 59_000 && gaps[7] <= 61_500, "gap {}", gaps[7]);
        for w in gaps[1..].windows(2) {
            assert!(w[1] + 1_100 >= w[0], "backoff shrank: {w:?}");
        }
    }

    #[test]
    fn stalled_connect_times_out_into_backoff() {
        let mut s = session();
        let mut bus = MockBus::default();

        // Connect accepted, but the broker never acknowledges.
        s.tick(&mut bus, 0, |_| {});
        assert_eq!(s.state(), SessionState::Connecting);
        s.tick(&mut bus, 9_999, |_| {});
        assert_eq!(s.state(), SessionState::Connecting);

        s.tick(&mut bus, 10_000, |_| {});
        assert_eq!(s.state(), SessionState::Disconnected);
        assert_eq!(bus.disconnects, 1);

        // The retry waits out the backoff gap, then completes normally.
        let mut now = 10_000u64;
        while bus.connects == 1 {
            now += 100;
            s.tick(&mut bus, now, |_| {});
        }
        assert!(now - 10_000 >= 1_000, "second attempt fired inside the backoff gap");
        bus.incoming.push_back(BusIncoming::Connected);
        s.tick(&mut bus, now + 1, |_| {});
        assert!(s.is_connected());
    }

    #[test]
    fn successful_connect_resets_backoff() {
        let mut s = session();
        let mut bus = MockBus::default();
        bus.connect_results.push_back(Err(BusError::ConnectFailed));
        s.tick(&mut bus, 0, |_| {}); // failed attempt, backoff now 2s
        connect(&mut s, &mut bus, 70_000);
        assert_eq!(s.backoff_ms, s.backoff_floor_ms);
    }

    #[test]
    fn presence_reasserts_until_echo() {
        let mut s = session();
        let mut bus = MockBus::default();
        connect(&mut s, &mut bus, 0);

        let count_presence = |bus: &MockBus| {
            bus.published.iter().filter(|(t, _, p)| t == "airnode/status" && p == b"online").count()
        };
        assert_eq!(count_presence(&bus), 1);

        s.tick(&mut bus, 3_001, |_| {});
        assert_eq!(count_presence(&bus), 2);
        s.tick(&mut bus, 6_002, |_| {});
        assert_eq!(count_presence(&bus), 3);

        // Echo arrives: no further re-publishes.
        bus.incoming.push_back(BusIncoming::Message {
            topic: "airnode/status".to_string(),
            payload: b"online".to_vec(),
        });
        s.tick(&mut bus, 7_000, |_| {});
        assert!(s.presence_confirmed());
        s.tick(&mut bus, 60_000, |_| {});
        assert_eq!(count_presence(&bus), 3);
    }

    #[test]
    fn presence_reassert_gives_up_after_budget() {
        let mut s = session();
        let mut bus = MockBus::default();
        connect(&mut s, &mut bus, 0);

        let mut now = 0;
        for _ in 0..40 {
            now += 3_001;
            s.tick(&mut bus, now, |_| {});
        }
        let presence = bus
            .published
            .iter()
            .filter(|(t, _, p)| t == "airnode/status" && p == b"online")
            .count();
        assert_eq!(presence, 10);
    }

    #[test]
    fn commands_reach_the_dispatch_closure() {
        let mut s = session();
        let mut bus = MockBus::default();
        connect(&mut s, &mut bus, 0);

        bus.incoming.push_back(BusIncoming::Message {
            topic: "airnode/cmd/interval".to_string(),
            payload: b"2500".to_vec(),
        });
        bus.incoming.push_back(BusIncoming::Message {
            topic: "airnode/web/status".to_string(),
            payload: b"online".to_vec(),
        });
        let mut seen = Vec::new();
        s.tick(&mut bus, 100, |cmd| seen.push(cmd));
        assert_eq!(
            seen,
            vec![
                BusCommand::SetInterval(2_500),
                BusCommand::ConsumerPresence { online: true }
            ]
        );
    }

    #[test]
    fn malformed_command_is_dropped() {
        let mut s = session();
        let mut bus = MockBus::default();
        connect(&mut s, &mut bus, 0);

        bus.incoming.push_back(BusIncoming::Message {
            topic: "airnode/cmd/update".to_string(),
            payload: b"not a url".to_vec(),
        });
        let mut seen = Vec::new();
        s.tick(&mut bus, 100, |cmd| seen.push(cmd));
        assert!(seen.is_empty());
        assert!(s.is_connected());
    }

    #[test]
    fn telemetry_requires_connection() {
        let mut s = session();
        let mut bus = MockBus::default();
        assert_eq!(s.publish_telemetry(&mut bus, b"{}"), Err(BusError::NotConnected));
        connect(&mut s, &mut bus, 0);
        assert!(s.publish_telemetry(&mut bus, b"{}").is_ok());
        let (topic, retained, _) = bus.published.last().unwrap();
        assert_eq!(topic, "airnode/data/airnode-a1b2c3");
        assert!(!retained);
    }

    #[test]
    fn reset_disconnects_and_restores_floor() {
        let mut s = session();
        let mut bus = MockBus::default();
        connect(&mut s, &mut bus, 0);
        s.reset(&mut bus);
        assert_eq!(bus.disconnects, 1);
        assert_eq!(s.state(), SessionState::Disconnected);
        assert_eq!(s.backoff_ms, s.backoff_floor_ms);
        assert!(!s.presence_confirmed());
    }
}
