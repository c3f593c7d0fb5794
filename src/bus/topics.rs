//! Bus topic construction and classification.
//!
//! Every topic hangs off a fixed base prefix. Inbound topics are
//! classified once into a [`TopicKind`] so dispatch is an explicit match
//! instead of string comparisons scattered through a handler.

/// Classification of an inbound topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    /// Our own device-presence topic (retained echo readback).
    Status,
    /// Consumer-presence topic, owned by the dashboard side.
    WebStatus,
    /// Epoch time synchronisation.
    CmdTime,
    /// Telemetry interval override.
    CmdInterval,
    /// Store a firmware source URL without triggering.
    CmdUpdateUrl,
    /// Start an update session.
    CmdUpdateNow,
}

/// All topic strings for one device, built once at session setup.
#[derive(Debug, Clone)]
pub struct TopicSet {
    pub status: String,
    pub data: String,
    pub debug: String,
    pub web_status: String,
    pub cmd_time: String,
    pub cmd_interval: String,
    pub cmd_update_url: String,
    pub cmd_update_now: String,
    // Per-device variants let a fleet share the broadcast topics while a
    // single node stays individually addressable.
    pub cmd_update_url_device: String,
    pub cmd_update_now_device: String,
}

impl TopicSet {
    pub fn new(base: &str, device_id: &str) -> Self {
        Self {
            status: format!("{base}/status"),
            data: format!("{base}/data/{device_id}"),
            debug: format!("{base}/debug"),
            web_status: format!("{base}/web/status"),
            cmd_time: format!("{base}/cmd/time"),
            cmd_interval: format!("{base}/cmd/interval"),
            cmd_update_url: format!("{base}/cmd/updateurl"),
            cmd_update_now: format!("{base}/cmd/update"),
            cmd_update_url_device: format!("{base}/cmd/updateurl/{device_id}"),
            cmd_update_now_device: format!("{base}/cmd/update/{device_id}"),
        }
    }

    /// Topics the session subscribes to after a successful connect.
    pub fn subscriptions(&self) -> [&str; 7] {
        [
            &self.status,
            &self.web_status,
            &self.cmd_time,
            &self.cmd_interval,
            &self.cmd_update_url,
            &self.cmd_update_now,
            &self.cmd_update_url_device,
        ]
    }

    /// The device-variant trigger topic is subscribed separately so the
    /// array above stays within the broker's per-packet limit.
    pub fn extra_subscription(&self) -> &str {
        &self.cmd_update_now_device
    }

    pub fn classify(&self, topic: &str) -> Option<TopicKind> {
        if topic == self.status {
            Some(TopicKind::Status)
        } else if topic == self.web_status {
            Some(TopicKind::WebStatus)
        } else if topic == self.cmd_time {
            Some(TopicKind::CmdTime)
        } else if topic == self.cmd_interval {
            Some(TopicKind::CmdInterval)
        } else if topic == self.cmd_update_url || topic == self.cmd_update_url_device {
            Some(TopicKind::CmdUpdateUrl)
        } else if topic == self.cmd_update_now || topic == self.cmd_update_now_device {
            Some(TopicKind::CmdUpdateNow)
        } else {
            None
        }
    }
}
