//! Dispatch event routing (§4.G).
//!
//! The engine only interprets the handful of dispatch events that affect
//! protocol control: Session State (READY, RESUMED) and the Media Gateway
//! Registry (GUILD_DELETE, VOICE_SERVER_UPDATE, VOICE_STATE_UPDATE).
//! Everything else is forwarded to the application verbatim, name and raw
//! JSON payload intact, since the engine has no business interpreting it
//! (§1, Non-goals).

use crate::payload::{GuildDeleteEvent, ReadyEvent};
use pulse_model::{VoiceServerUpdateEvent, VoiceStateUpdateEvent};

/// A dispatch event routed to the application.
///
/// The five named variants are the ones the protocol driver itself also
/// inspects; `Other` carries everything else unparsed.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DispatchEvent {
    Ready(Box<ReadyEvent>),
    Resumed,
    GuildDelete(GuildDeleteEvent),
    VoiceServerUpdate(VoiceServerUpdateEvent),
    VoiceStateUpdate(VoiceStateUpdateEvent),
    /// Any other event name, forwarded with its raw `d` payload.
    Other { name: String, data: serde_json::Value },
}

impl DispatchEvent {
    /// The wire event name (`t` field), used for `disabled_events`
    /// filtering and for labeling `Other` variants.
    pub fn name(&self) -> &str {
        match self {
            DispatchEvent::Ready(_) => "READY",
            DispatchEvent::Resumed => "RESUMED",
            DispatchEvent::GuildDelete(_) => "GUILD_DELETE",
            DispatchEvent::VoiceServerUpdate(_) => "VOICE_SERVER_UPDATE",
            DispatchEvent::VoiceStateUpdate(_) => "VOICE_STATE_UPDATE",
            DispatchEvent::Other { name, .. } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_event_reports_its_own_name() {
        let event = DispatchEvent::Other {
            name: "MESSAGE_CREATE".to_string(),
            data: serde_json::json!({}),
        };
        assert_eq!(event.name(), "MESSAGE_CREATE");
    }

    #[test]
    fn named_variants_report_the_wire_event_name() {
        assert_eq!(DispatchEvent::Resumed.name(), "RESUMED");
    }
}
