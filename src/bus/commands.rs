//! Inbound command parsing.
//!
//! Topic + payload become one tagged [`BusCommand`] variant here; the
//! orchestrator dispatches with a plain `match`. Malformed payloads are
//! rejected at this boundary and never reach the domain.

use super::topics::TopicKind;

/// Telemetry interval clamp bounds (milliseconds).
pub const INTERVAL_MIN_MS: u32 = 500;
pub const INTERVAL_MAX_MS: u32 = 600_000;

/// Legacy combined trigger form: `<url>*update`.
const TRIGGER_MARKER: &str = "*update";
/// Bare trigger token: use the stored URL.
const TRIGGER_TOKEN: &str = "update";

/// One parsed inbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusCommand {
    /// Wall-clock synchronisation (epoch seconds).
    TimeSync(u64),
    /// New telemetry interval, already clamped into range.
    SetInterval(u32),
    /// Store a firmware source URL without triggering a session.
    SetUpdateUrl(String),
    /// Start an update session. `None` means "use the stored URL".
    TriggerUpdate { url: Option<String> },
    /// Consumer-presence flip on the dashboard-owned topic.
    ConsumerPresence { online: bool },
    /// Our own retained presence message echoed back by the broker.
    PresenceEcho,
}

/// Why a payload was rejected. Carried into the debug stream only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    NotUtf8,
    NotANumber,
    BadUrl,
    EmptyPayload,
}

/// Parse one classified inbound message.
pub fn parse(kind: TopicKind, payload: &[u8]) -> Result<BusCommand, ParseError> {
    let text = core::str::from_utf8(payload).map_err(|_| ParseError::NotUtf8)?.trim();

    match kind {
        TopicKind::Status => {
            // Only our own "online" echo matters; the retained "offline"
            // from a previous will is not a confirmation.
            if text == "online" {
                Ok(BusCommand::PresenceEcho)
            } else {
                Err(ParseError::EmptyPayload)
            }
        }
        TopicKind::WebStatus => match text {
            "online" => Ok(BusCommand::ConsumerPresence { online: true }),
            "offline" => Ok(BusCommand::ConsumerPresence { online: false }),
            _ => Err(ParseError::EmptyPayload),
        },
        TopicKind::CmdTime => {
            let epoch: u64 = text.parse().map_err(|_| ParseError::NotANumber)?;
            Ok(BusCommand::TimeSync(epoch))
        }
        TopicKind::CmdInterval => {
            let ms: u32 = text.parse().map_err(|_| ParseError::NotANumber)?;
            Ok(BusCommand::SetInterval(ms.clamp(INTERVAL_MIN_MS, INTERVAL_MAX_MS)))
        }
        TopicKind::CmdUpdateUrl => {
            looks_like_url(text)?;
            Ok(BusCommand::SetUpdateUrl(text.to_string()))
        }
        TopicKind::CmdUpdateNow => parse_trigger(text),
    }
}

/// The trigger topic accepts three payload shapes:
///   `update`          -> use the stored URL
///   `<url>*update`    -> legacy combined form, marker stripped
///   `<url>`           -> direct URL
fn parse_trigger(text: &str) -> Result<BusCommand, ParseError> {
    if text == TRIGGER_TOKEN {
        return Ok(BusCommand::TriggerUpdate { url: None });
    }
    if let Some(url) = text.strip_suffix(TRIGGER_MARKER) {
        looks_like_url(url)?;
        return Ok(BusCommand::TriggerUpdate { url: Some(url.to_string()) });
    }
    looks_like_url(text)?;
    Ok(BusCommand::TriggerUpdate { url: Some(text.to_string()) })
}

/// Shape check only. Full host/scheme validation belongs to the update
/// engine; this just keeps obvious garbage out of the dispatch path.
fn looks_like_url(text: &str) -> Result<(), ParseError> {
    if text.is_empty() {
        return Err(ParseError::EmptyPayload);
    }
    let Some((scheme, rest)) = text.split_once("://") else {
        return Err(ParseError::BadUrl);
    };
    if scheme.is_empty() || rest.is_empty() {
        return Err(ParseError::BadUrl);
    }
    Ok(())
}
