//! Gateway frame and payload shapes.
//!
//! [`GatewayFrame`] is the canonical `{op, d, s, t}` shape every inbound
//! and outbound message takes on the wire (§6); the [`Codec`](crate::codec)
//! only ever produces or consumes this type. The typed payload structs
//! below (`IdentifyPayload`, `ResumePayload`, ...) are what callers build
//! and hand to the send pipeline, which wraps them into a frame.

use crate::opcode::OpCode;
use pulse_model::{Intents, PresenceUpdate, Snowflake, User};
use serde::{Deserialize, Serialize};

/// The wire shape of every frame, decoded or about to be encoded.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayFrame {
    pub op: OpCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayFrame {
    pub fn new(op: OpCode, d: Option<serde_json::Value>) -> Self {
        Self { op, d, s: None, t: None }
    }

    /// Build a frame from any serializable payload, for the send pipeline.
    pub fn from_payload<D: Serialize>(op: OpCode, payload: &D) -> Result<Self, serde_json::Error> {
        Ok(Self {
            op,
            d: Some(serde_json::to_value(payload)?),
            s: None,
            t: None,
        })
    }
}

/// Payload for HELLO (op 10): the server's initial greeting.
#[derive(Debug, Clone, Deserialize)]
pub struct HelloPayload {
    pub heartbeat_interval: u64,
}

/// Payload for IDENTIFY (op 2): opens a fresh session.
#[derive(Debug, Clone, Serialize)]
pub struct IdentifyPayload<'a> {
    pub token: std::borrow::Cow<'a, str>,
    pub intents: Intents,
    pub properties: ConnectionProperties,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compress: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_threshold: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u32; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<PresenceUpdate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_subscriptions: Option<bool>,
}

/// Connection properties sent with IDENTIFY. Assembled once, lazily, on
/// the first identify (§9: "global state... computed lazily").
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: "pulse-gateway".to_string(),
            device: "pulse-gateway".to_string(),
        }
    }
}

/// Returns the process-wide connection properties, computed once.
pub fn connection_properties() -> &'static ConnectionProperties {
    use std::sync::OnceLock;
    static PROPERTIES: OnceLock<ConnectionProperties> = OnceLock::new();
    PROPERTIES.get_or_init(ConnectionProperties::default)
}

/// Payload for RESUME (op 6): re-establishes an existing session.
#[derive(Debug, Clone, Serialize)]
pub struct ResumePayload<'a> {
    pub token: std::borrow::Cow<'a, str>,
    pub session_id: String,
    pub seq: u64,
}

/// The `READY` dispatch payload. Only the fields Session State needs are
/// modeled; the raw dispatch is also forwarded to the application verbatim.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyEvent {
    pub v: u8,
    pub user: User,
    pub session_id: String,
    #[serde(default)]
    pub shard: Option<[u32; 2]>,
    #[serde(default)]
    pub trace: Vec<String>,
}

/// The `VOICE_STATE_UPDATE`/`VOICE_SERVER_UPDATE`-adjacent `GUILD_DELETE`
/// payload: just enough to know which media session to tear down.
#[derive(Debug, Clone, Deserialize)]
pub struct GuildDeleteEvent {
    pub id: Snowflake,
    #[serde(default)]
    pub unavailable: bool,
}

/// Build the HEARTBEAT payload: `{op: 1, d: sequence}`, `d` null if the
/// session has not yet seen a sequenced frame.
pub fn heartbeat_frame(sequence: Option<u64>) -> GatewayFrame {
    GatewayFrame::new(OpCode::Heartbeat, sequence.map(|s| serde_json::json!(s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_payload_parses() {
        let json = r#"{"heartbeat_interval": 41250}"#;
        let payload: HelloPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.heartbeat_interval, 41250);
    }

    #[test]
    fn heartbeat_frame_omits_null_sequence() {
        let frame = heartbeat_frame(None);
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("\"d\""));
    }

    #[test]
    fn heartbeat_frame_carries_sequence() {
        let frame = heartbeat_frame(Some(42));
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"d\":42"));
    }

    #[test]
    fn identify_serializes_with_shard() {
        let identify = IdentifyPayload {
            token: "test-token".into(),
            intents: Intents::GUILDS,
            properties: ConnectionProperties::default(),
            compress: None,
            large_threshold: Some(250),
            shard: Some([0, 1]),
            presence: None,
            guild_subscriptions: Some(true),
        };
        let json = serde_json::to_string(&identify).unwrap();
        assert!(json.contains("test-token"));
        assert!(json.contains("\"shard\":[0,1]"));
    }
}
