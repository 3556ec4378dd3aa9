//! Payload shapes for the two dispatch events the media gateway registry
//! reacts to: `VOICE_SERVER_UPDATE` and `VOICE_STATE_UPDATE`.

use crate::snowflake::Snowflake;
use serde::{Deserialize, Serialize};

/// `VOICE_SERVER_UPDATE` — carries the endpoint and token a media session
/// needs to open its own connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VoiceServerUpdateEvent {
    pub token: String,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    #[serde(default)]
    pub channel_id: Option<Snowflake>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// `VOICE_STATE_UPDATE` — trimmed to the fields the protocol driver
/// inspects when deciding whether to kill, move, or resolve a pending
/// voice-connect promise for a media session.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VoiceStateUpdateEvent {
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    pub channel_id: Option<Snowflake>,
    pub user_id: Snowflake,
    pub session_id: String,
}
