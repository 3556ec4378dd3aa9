//! Gateway error types using thiserror.
//!
//! All errors in pulse-gateway are represented by the [`GatewayError`] enum.
//! No `.unwrap()` calls are used outside of tests.

use thiserror::Error;

/// Errors that can occur during gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport connection or protocol error.
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// Failed to decode an inbound frame.
    #[error("decode error: {0}")]
    Decode(String),

    /// Failed to encode an outbound frame.
    #[error("encode error: {0}")]
    Encode(String),

    /// Stream decompression failed; the caller must reconnect.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Session was invalidated by the server. The boolean indicates
    /// whether the server marked it resumable.
    #[error("session invalidated, resumable: {resumable}")]
    InvalidSession { resumable: bool },

    /// Connection was closed.
    #[error("connection closed: code={code}, reason={reason}")]
    Closed { code: u16, reason: String },

    /// A heartbeat ack was not received before the next tick.
    #[error("heartbeat ack never arrived")]
    HeartbeatTimeout,

    /// URL parsing or composition error.
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),

    /// I/O error (decompression, etc).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine is not connected and the call required a live transport.
    #[error("not connected")]
    NotConnected,

    /// The engine has been killed and will not reconnect.
    #[error("engine is dead")]
    Dead,

    /// Construction-time configuration error. The engine never starts.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// `voice_connect` was called with neither a guild nor channel id.
    #[error("voice_connect requires a guild id or channel id")]
    VoiceConnectMissingTarget,

    /// A voice-connect promise was not resolved before its deadline.
    #[error("voice connect timed out after {0:?}")]
    VoiceConnectTimeout(std::time::Duration),

    /// The voice-connect promise was dropped without resolution (e.g. the
    /// media session was killed for another reason while waiting).
    #[error("voice connect cancelled")]
    VoiceConnectCancelled,
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Decode(err.to_string())
    }
}

/// Close codes the engine itself assigns when it tears down a transport.
///
/// These are internal sentinels, not values read off the wire (inbound
/// close codes come from the transport's close frame and are handled by
/// the lifecycle module directly as raw `u16`s).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CloseCode {
    /// Clean shutdown. Clears session state.
    Normal = 1000,
    /// Transport is going away (process exit, browser navigation). Clears
    /// session state, same as `Normal`.
    GoingAway = 1001,
    /// Internal sentinel: force a reconnect without clearing session state
    /// (heartbeat timeout, server-requested RECONNECT).
    InternalRetry = 4990,
}

impl CloseCode {
    /// Whether this close code should wipe session identity, forcing the
    /// next connect to IDENTIFY instead of RESUME.
    pub const fn clears_session(self) -> bool {
        matches!(self, CloseCode::Normal | CloseCode::GoingAway)
    }
}
