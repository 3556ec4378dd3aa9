//! Gateway opcodes.
//!
//! Opcodes define the type of payload being sent or received over the
//! gateway connection. Concrete numeric values follow the wire protocol.
//! This is a closed `serde_repr` enum: a frame carrying an opcode this
//! list doesn't know about fails to deserialize at the codec layer and
//! is dropped rather than forwarded, so adding a new server-side opcode
//! here is a breaking change for decode.

use serde_repr::{Deserialize_repr, Serialize_repr};

/// Gateway operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum OpCode {
    /// An event was dispatched. Receive only.
    Dispatch = 0,
    /// Keep the connection alive. Send/Receive.
    Heartbeat = 1,
    /// Start a new session. Send only.
    Identify = 2,
    /// Update the client's presence. Send only.
    PresenceUpdate = 3,
    /// Join/leave/move between voice channels. Send only.
    VoiceStateUpdate = 4,
    /// Resume a previous session. Send only.
    Resume = 6,
    /// Server requested a reconnect. Receive only.
    Reconnect = 7,
    /// Request guild member chunks. Send only.
    RequestGuildMembers = 8,
    /// Session has been invalidated. Receive only.
    InvalidSession = 9,
    /// Sent after connecting; carries the heartbeat interval. Receive only.
    Hello = 10,
    /// Acknowledgment of a heartbeat. Receive only.
    HeartbeatAck = 11,
    /// Subscribe to typing/presence updates for specific channels. Send only.
    GuildSubscriptions = 12,
    /// Join a group call. Send only.
    CallConnect = 13,
    /// Join a lobby's voice channel. Send only.
    LobbyConnect = 14,
    /// Leave a lobby's voice channel. Send only.
    LobbyDisconnect = 15,
    /// Push voice state updates for a lobby. Send only.
    LobbyVoiceStatesUpdate = 16,
    /// Start a screen-share/"Go Live" stream. Send only.
    StreamCreate = 18,
    /// Stop a stream. Send only.
    StreamDelete = 19,
    /// Watch another user's stream. Send only.
    StreamWatch = 20,
    /// Keep a stream alive. Send only.
    StreamPing = 21,
    /// Pause or resume a stream. Send only.
    StreamSetPaused = 22,
    /// Ping a voice server without a full voice connection. Send only.
    VoiceServerPing = 5,
}
