//! Media Gateway Registry & Voice Connect (§4.H).
//!
//! The registry maps `server_id -> MediaSession` and coordinates the
//! promise-based `voice_connect` handshake: a caller asks to join/move/
//! leave a voice channel, the registry sends the VOICE_STATE_UPDATE frame
//! and waits for the protocol driver to observe the matching
//! VOICE_STATE_UPDATE/VOICE_SERVER_UPDATE pair on a cancellable deadline.

use crate::error::GatewayError;
use dashmap::DashMap;
use pulse_model::Snowflake;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// The narrow interface the engine needs from a secondary voice/video
/// session (§6, "Media session contract"). Implemented by application
/// code; the engine only ever holds `Arc<dyn MediaSession>`.
pub trait MediaSession: Send + Sync {
    /// Terminal. `error` carries the reason when the kill wasn't requested
    /// by the application itself (timeout, guild left, session mismatch).
    fn kill(&self, error: Option<GatewayError>);
    fn set_endpoint(&self, endpoint: String);
    fn set_token(&self, token: String);
    fn set_channel_id(&self, channel_id: Option<Snowflake>);
    fn session_id(&self) -> Option<String>;
    fn channel_id(&self) -> Option<Snowflake>;
}

/// Default deadline for a pending voice-connect promise (§4.H).
pub const DEFAULT_VOICE_CONNECT_TIMEOUT: Duration = Duration::from_millis(30_000);

struct Pending {
    resolver: oneshot::Sender<()>,
}

/// `server_id -> MediaSession` registry plus in-flight voice-connect
/// promises, keyed the same way.
#[derive(Default)]
pub struct MediaGatewayRegistry {
    sessions: DashMap<Snowflake, Arc<dyn MediaSession>>,
    pending: DashMap<Snowflake, Pending>,
}

impl MediaGatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, server_id: Snowflake) -> Option<Arc<dyn MediaSession>> {
        self.sessions.get(&server_id).map(|e| e.value().clone())
    }

    /// Register a session directly, bypassing `voice_connect`'s promise
    /// handshake. Only for exercising the registry's callers (the
    /// protocol driver) against a session that's already "connected".
    #[cfg(test)]
    pub(crate) fn insert_for_test(&self, server_id: Snowflake, session: Arc<dyn MediaSession>) {
        self.sessions.insert(server_id, session);
    }

    /// Remove and kill the session for `server_id`, if any.
    pub fn kill(&self, server_id: Snowflake, error: Option<GatewayError>) {
        if let Some((_, session)) = self.sessions.remove(&server_id) {
            session.kill(error);
        }
        self.pending.remove(&server_id);
    }

    /// Kill every registered session. Used by `kill()` on the engine
    /// itself (§4.F).
    pub fn kill_all(&self) {
        let ids: Vec<_> = self.sessions.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.kill(id, None);
        }
    }

    /// Resolve the pending voice-connect promise for `server_id`, if one
    /// is waiting. Called by the protocol driver on a matching
    /// VOICE_STATE_UPDATE (§4.G).
    pub fn resolve(&self, server_id: Snowflake) {
        if let Some((_, pending)) = self.pending.remove(&server_id) {
            let _ = pending.resolver.send(());
        }
    }

    /// Implements the `voice_connect` decision table (§4.H).
    ///
    /// `create_session` is only invoked for the "no existing entry, join"
    /// case. `send_voice_state_update(guild_id, channel_id)` is invoked
    /// by the caller to actually emit the frame (kept as a callback so
    /// this module stays free of the send pipeline / rate bucket).
    pub async fn voice_connect<C, S>(
        &self,
        guild_id: Option<Snowflake>,
        channel_id: Option<Snowflake>,
        timeout: Duration,
        create_session: C,
        send_voice_state_update: S,
    ) -> Result<Option<Arc<dyn MediaSession>>, GatewayError>
    where
        C: FnOnce() -> Arc<dyn MediaSession>,
        S: FnOnce(Option<Snowflake>, Option<Snowflake>),
    {
        let server_id = guild_id
            .or(channel_id)
            .ok_or(GatewayError::VoiceConnectMissingTarget)?;

        let existing = self.get(server_id);

        match (existing, channel_id) {
            (None, None) => {
                send_voice_state_update(guild_id, None);
                Ok(None)
            }
            (None, Some(_)) => {
                let session = create_session();
                self.sessions.insert(server_id, session.clone());
                send_voice_state_update(guild_id, channel_id);
                self.await_connect(server_id, session, timeout).await.map(Some)
            }
            (Some(_), None) => {
                self.kill(server_id, None);
                Ok(None)
            }
            (Some(session), Some(cid)) if session.channel_id() == Some(cid) => Ok(Some(session)),
            (Some(_), Some(_)) => {
                send_voice_state_update(guild_id, channel_id);
                let session = self.get(server_id).expect("existing entry checked above");
                self.await_connect(server_id, session, timeout).await.map(Some)
            }
        }
    }

    async fn await_connect(
        &self,
        server_id: Snowflake,
        session: Arc<dyn MediaSession>,
        timeout: Duration,
    ) -> Result<Arc<dyn MediaSession>, GatewayError> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(server_id, Pending { resolver: tx });

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(())) => Ok(session),
            Ok(Err(_)) => {
                self.pending.remove(&server_id);
                Err(GatewayError::VoiceConnectCancelled)
            }
            Err(_) => {
                self.pending.remove(&server_id);
                self.kill(server_id, Some(GatewayError::VoiceConnectTimeout(timeout)));
                Err(GatewayError::VoiceConnectTimeout(timeout))
            }
        }
    }
}
