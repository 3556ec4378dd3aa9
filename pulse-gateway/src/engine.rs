//! Connection Lifecycle, Protocol Driver, and Send pipeline (§4.F, §4.G,
//! §4.Send pipeline).
//!
//! `GatewayEngine` owns exactly one logical task (`run`): transport
//! open/close/message events and timer ticks are all handled on that one
//! task, so the codec, rate bucket, heartbeat controller, and session
//! state never need cross-task synchronization while it runs (§5). Public
//! methods callable from other tasks — `send_payload`, `update_presence`,
//! `voice_connect`, `disconnect`, `kill` — hand their intent to the task
//! over a command channel instead of touching that state directly.

use crate::codec::Codec;
use crate::config::GatewayConfig;
use crate::error::{CloseCode, GatewayError};
use crate::event::DispatchEvent;
use crate::heartbeat::HeartbeatController;
use crate::media::{MediaGatewayRegistry, MediaSession, DEFAULT_VOICE_CONNECT_TIMEOUT};
use crate::metrics::EngineMetrics;
use crate::opcode::OpCode;
use crate::payload::{
    connection_properties, heartbeat_frame, GatewayFrame, GuildDeleteEvent, IdentifyPayload,
    ReadyEvent, ResumePayload,
};
use crate::presence::{PresenceBuilder, PresenceInput};
use crate::ratebucket::RateBucket;
use crate::session::{SequenceOutcome, SessionState};
use crate::transport::{GatewayTransport, TransportEvent, TungsteniteTransport};
use crate::{DEFAULT_GATEWAY_URL, GATEWAY_VERSION};

use flume::{Receiver, Sender};
use parking_lot::RwLock;
use pulse_model::{Snowflake, VoiceServerUpdateEvent, VoiceStateUpdateEvent};
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};
use url::Url;

/// How often the `select!` loop gives the rate bucket a chance to drain
/// its backlog even without a fresh `add`/`unlock` (§4.C refill-drain
/// semantics — a token refill alone doesn't run anything until something
/// calls `drain`).
const RATE_BUCKET_DRAIN_INTERVAL: Duration = Duration::from_millis(1000);

/// Coarse connection state, exposed for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Disconnected,
    Connecting,
    Handshaking,
    Identifying,
    Resuming,
    Connected,
    Reconnecting,
}

/// A user-facing request the engine task applies on its own loop.
enum Command {
    Send { op: OpCode, payload: serde_json::Value, direct: bool },
    Disconnect { code: u16, reason: String },
    Kill,
}

/// The client-side half of the gateway protocol: one WebSocket
/// connection, its session, and everything that keeps it alive.
pub struct GatewayEngine {
    config: GatewayConfig,
    state: RwLock<EngineState>,
    session: RwLock<SessionState>,
    heartbeat: HeartbeatController,
    codec: RwLock<Codec>,
    rate_bucket: RwLock<RateBucket>,
    media: Arc<MediaGatewayRegistry>,
    metrics: EngineMetrics,
    presence: PresenceBuilder,
    dead: AtomicBool,
    /// Consecutive reconnect attempts since the last successful
    /// READY/RESUMED (§4.E: both reset this to zero). `run()` checks this
    /// against `reconnect_max` before sleeping and retrying.
    reconnects: AtomicU32,
    command_tx: Sender<Command>,
    command_rx: Receiver<Command>,
}

impl GatewayEngine {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        Self::with_media_registry(config, Arc::new(MediaGatewayRegistry::new()))
    }

    pub fn with_media_registry(
        config: GatewayConfig,
        media: Arc<MediaGatewayRegistry>,
    ) -> Result<Self, GatewayError> {
        config.validate()?;
        let codec = Codec::new(config.encoding, config.compress.is_enabled())?;
        let (command_tx, command_rx) = flume::unbounded();
        let presence_default = config.presence.clone().unwrap_or_default();

        Ok(Self {
            config,
            state: RwLock::new(EngineState::Disconnected),
            session: RwLock::new(SessionState::new()),
            heartbeat: HeartbeatController::new(),
            codec: RwLock::new(codec),
            rate_bucket: RwLock::new(RateBucket::default()),
            media,
            metrics: EngineMetrics::new(),
            presence: PresenceBuilder::new(presence_default),
            dead: AtomicBool::new(false),
            reconnects: AtomicU32::new(0),
            command_tx,
            command_rx,
        })
    }

    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    pub fn sequence(&self) -> u64 {
        self.session.read().sequence
    }

    pub fn session_id(&self) -> Option<String> {
        self.session.read().session_id.clone()
    }

    pub fn latency(&self) -> Option<Duration> {
        self.heartbeat.latency()
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn media(&self) -> &Arc<MediaGatewayRegistry> {
        &self.media
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    /// Submit a frame through the Send pipeline (§4.Send pipeline). Used
    /// for everything user-callable: presence updates, voice state
    /// updates, guild member requests, stream control, lobby ops.
    pub fn send_payload(&self, op: OpCode, payload: serde_json::Value) -> Result<(), GatewayError> {
        if self.is_dead() {
            return Err(GatewayError::Dead);
        }
        self.command_tx
            .send(Command::Send { op, payload, direct: false })
            .map_err(|_| GatewayError::Dead)
    }

    /// Build and send a presence update, merging the engine's default and
    /// configured layers with `override_input` (§4.I).
    pub fn update_presence(&self, override_input: Option<PresenceInput>) -> Result<(), GatewayError> {
        let presence = self.presence.build(self.config.presence.as_ref(), override_input.as_ref());
        let value = serde_json::to_value(&presence).map_err(|e| GatewayError::Encode(e.to_string()))?;
        self.send_payload(OpCode::PresenceUpdate, value)
    }

    /// Join, move, or leave a voice channel (§4.H). `create_session` is
    /// only invoked when a brand-new media session needs to be created.
    pub async fn voice_connect<C>(
        &self,
        guild_id: Option<Snowflake>,
        channel_id: Option<Snowflake>,
        create_session: C,
    ) -> Result<Option<Arc<dyn MediaSession>>, GatewayError>
    where
        C: FnOnce() -> Arc<dyn MediaSession>,
    {
        self.media
            .voice_connect(guild_id, channel_id, DEFAULT_VOICE_CONNECT_TIMEOUT, create_session, |g, c| {
                let value = serde_json::json!({ "guild_id": g, "channel_id": c, "self_mute": false, "self_deaf": false });
                if let Err(err) = self.send_payload(OpCode::VoiceStateUpdate, value) {
                    warn!(error = %err, "failed to submit voice state update");
                }
            })
            .await
    }

    /// Request a disconnect; the running engine task tears down the
    /// transport and, per `auto_reconnect`, reconnects or goes idle.
    pub fn disconnect(&self, code: u16, reason: impl Into<String>) -> Result<(), GatewayError> {
        self.command_tx
            .send(Command::Disconnect { code, reason: reason.into() })
            .map_err(|_| GatewayError::Dead)
    }

    /// Idempotent terminal shutdown (§4.F). Marks the engine dead, kills
    /// every registered media session, and asks the task to disconnect
    /// with NORMAL so no reconnect is attempted.
    pub fn kill(&self) {
        if self.dead.swap(true, Ordering::SeqCst) {
            return;
        }
        self.media.kill_all();
        let _ = self.command_tx.send(Command::Kill);
    }

    /// Run the engine's single logical task: connect, handshake, dispatch,
    /// heartbeat, and reconnect according to `auto_reconnect`/`reconnect_max`
    /// until killed or a fatal error occurs.
    pub async fn run(&self, events_tx: Sender<DispatchEvent>) -> Result<(), GatewayError> {
        loop {
            if self.is_dead() {
                return Ok(());
            }

            match self.connect_and_run(&events_tx).await {
                Ok(()) => return Ok(()),
                Err(GatewayError::HeartbeatTimeout) => {
                    warn!("heartbeat ack never arrived, reconnecting");
                    self.cleanup(CloseCode::InternalRetry);
                    self.metrics.inc_reconnections();
                }
                Err(GatewayError::Closed { code, reason }) => {
                    warn!(code, reason = %reason, "connection closed, reconnecting");
                    let close_code = if code == CloseCode::Normal as u16 {
                        CloseCode::Normal
                    } else if code == CloseCode::GoingAway as u16 {
                        CloseCode::GoingAway
                    } else {
                        CloseCode::InternalRetry
                    };
                    self.cleanup(close_code);
                    self.metrics.inc_reconnections();
                }
                Err(err) => {
                    error!(error = %err, "engine error, reconnecting");
                    self.cleanup(CloseCode::InternalRetry);
                    self.metrics.inc_reconnections();
                }
            }

            if self.is_dead() {
                return Ok(());
            }

            if !self.config.auto_reconnect {
                self.kill();
                return Ok(());
            }

            let attempts = self.reconnects.fetch_add(1, Ordering::SeqCst) + 1;
            if attempts > self.config.reconnect_max {
                error!(attempts, "reconnect budget exceeded, killing engine");
                self.kill();
                return Err(GatewayError::Dead);
            }

            *self.state.write() = EngineState::Reconnecting;
            sleep(self.config.reconnect_delay).await;
        }
    }

    /// `cleanup(code)` (§4.F): lock and clear the bucket, reset the
    /// decompressor, wipe session state if the code clears it, stop the
    /// heartbeat timer.
    fn cleanup(&self, code: CloseCode) {
        {
            let mut bucket = self.rate_bucket.write();
            bucket.clear();
            bucket.lock();
        }
        self.codec.write().reset_compression();
        self.session.write().cleanup(code);
        self.heartbeat.clear();
    }

    fn build_gateway_url(&self) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&self.config.gateway_url)?;
        if url.path().is_empty() {
            url.set_path("/");
        }
        url.query_pairs_mut()
            .append_pair("v", &GATEWAY_VERSION.to_string())
            .append_pair("encoding", self.config.encoding.as_str());
        if let Some(compress) = self.config.compress.query_value() {
            url.query_pairs_mut().append_pair("compress", compress);
        }
        Ok(url)
    }

    /// One connection's worth of work: handshake, then the `select!`
    /// loop over transport events, the heartbeat timer, and commands.
    async fn connect_and_run(&self, events_tx: &Sender<DispatchEvent>) -> Result<(), GatewayError> {
        let url = self.build_gateway_url()?;

        *self.state.write() = EngineState::Connecting;
        info!(url = %url, "connecting to gateway");
        let mut transport = TungsteniteTransport::connect(url.as_str()).await?;
        self.drive(&mut transport, events_tx).await
    }

    /// The handshake plus `select!` loop, generic over any
    /// [`GatewayTransport`] so it can be driven against a fake transport
    /// in tests (§4.L) instead of a live socket.
    async fn drive<T: GatewayTransport>(
        &self,
        transport: &mut T,
        events_tx: &Sender<DispatchEvent>,
    ) -> Result<(), GatewayError> {
        *self.state.write() = EngineState::Handshaking;
        let interval = self.wait_for_hello(transport).await?;
        self.heartbeat.on_hello(interval);

        let resuming = !self.session.read().needs_identify();
        if resuming {
            *self.state.write() = EngineState::Resuming;
            self.send_resume(transport).await?;
        } else {
            *self.state.write() = EngineState::Identifying;
            self.send_identify(transport).await?;
        }

        self.send_heartbeat_now(transport).await?;
        let mut next_heartbeat = Instant::now() + interval;

        let (paced_tx, paced_rx) = flume::unbounded::<Vec<u8>>();
        *self.state.write() = EngineState::Connected;

        let mut drain_tick = tokio::time::interval(RATE_BUCKET_DRAIN_INTERVAL);
        drain_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = transport.recv() => {
                    match event {
                        Some(TransportEvent::Message { data, binary }) => {
                            self.metrics.inc_ws_messages();
                            self.metrics.add_bytes_received(data.len() as u64);
                            let already_inflated = !(self.config.compress.is_enabled() && binary);
                            let frame = self.codec.write().decode(&data, already_inflated)?;
                            if let Some(frame) = frame {
                                self.process_frame(frame, transport, events_tx).await?;
                            }
                        }
                        Some(TransportEvent::Closed { code, reason }) => {
                            return Err(GatewayError::Closed { code, reason });
                        }
                        Some(TransportEvent::Error(reason)) => {
                            return Err(GatewayError::Closed { code: 0, reason });
                        }
                        None => {
                            return Err(GatewayError::Closed { code: 0, reason: "transport ended".to_string() });
                        }
                    }
                }

                _ = sleep(next_heartbeat.saturating_duration_since(Instant::now())) => {
                    if !self.heartbeat.is_acked() {
                        return Err(GatewayError::HeartbeatTimeout);
                    }
                    self.send_heartbeat_now(transport).await?;
                    next_heartbeat = Instant::now() + self.heartbeat.interval().unwrap_or(interval);
                }

                bytes = paced_rx.recv_async() => {
                    if let Ok(bytes) = bytes {
                        if let Err(err) = transport.send(bytes, self.binary_framing()).await {
                            warn!(error = %err, "paced send failed");
                        }
                    }
                }

                _ = drain_tick.tick() => {
                    self.rate_bucket.write().drain();
                }

                command = self.command_rx.recv_async() => {
                    match command {
                        Ok(Command::Send { op, payload, direct }) => {
                            self.handle_send_command(op, payload, direct, transport, &paced_tx).await;
                        }
                        Ok(Command::Disconnect { code, reason }) => {
                            let _ = transport.close(code, &reason).await;
                            return Err(GatewayError::Closed { code, reason });
                        }
                        Ok(Command::Kill) => {
                            let _ = transport.close(CloseCode::Normal as u16, "killed").await;
                            return Ok(());
                        }
                        Err(_) => {
                            return Err(GatewayError::Dead);
                        }
                    }
                }
            }
        }
    }

    fn binary_framing(&self) -> bool {
        self.codec.read().encoding() == crate::etf::GatewayEncoding::Etf
    }

    /// §4.Send pipeline steps 2-4, executed once a [`Command::Send`]
    /// reaches the engine's own task.
    async fn handle_send_command<T: GatewayTransport>(
        &self,
        op: OpCode,
        payload: serde_json::Value,
        direct: bool,
        transport: &mut T,
        paced_tx: &Sender<Vec<u8>>,
    ) {
        let frame = GatewayFrame::new(op, Some(payload));
        let bytes = match self.codec.read().encode(&frame) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "encode failed, dropping frame");
                return;
            }
        };

        if direct {
            let connected = *self.state.read() == EngineState::Connected;
            if connected {
                if let Err(err) = transport.send(bytes, self.binary_framing()).await {
                    warn!(error = %err, "direct send failed");
                }
            } else {
                warn!(?op, "dropped packet: not connected");
            }
            return;
        }

        let paced_tx = paced_tx.clone();
        self.rate_bucket.write().add(Box::new(move || {
            let _ = paced_tx.send(bytes);
        }));
    }

    async fn wait_for_hello<T: GatewayTransport>(&self, transport: &mut T) -> Result<Duration, GatewayError> {
        let deadline = Duration::from_secs(10);
        let event = tokio::time::timeout(deadline, transport.recv())
            .await
            .map_err(|_| GatewayError::Closed { code: 0, reason: "timed out waiting for hello".to_string() })?
            .ok_or_else(|| GatewayError::Closed { code: 0, reason: "connection closed before hello".to_string() })?;

        let TransportEvent::Message { data, binary } = event else {
            return Err(GatewayError::Closed { code: 0, reason: "unexpected event before hello".to_string() });
        };

        let already_inflated = !(self.config.compress.is_enabled() && binary);
        let frame = self
            .codec
            .write()
            .decode(&data, already_inflated)?
            .ok_or_else(|| GatewayError::Closed { code: 0, reason: "expected hello payload".to_string() })?;

        if frame.op != OpCode::Hello {
            return Err(GatewayError::Closed { code: 0, reason: "expected hello payload".to_string() });
        }
        let d = frame.d.ok_or_else(|| GatewayError::Decode("hello frame missing d".to_string()))?;
        let interval_ms = d
            .get("heartbeat_interval")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| GatewayError::Decode("hello frame missing heartbeat_interval".to_string()))?;
        Ok(Duration::from_millis(interval_ms))
    }

    async fn send_identify<T: GatewayTransport>(&self, transport: &mut T) -> Result<(), GatewayError> {
        let shard = if self.config.shard_count > 1 {
            Some([self.config.shard_id, self.config.shard_count])
        } else {
            None
        };
        let identify = IdentifyPayload {
            token: std::borrow::Cow::Borrowed(self.config.token.as_str()),
            intents: self.config.intents,
            properties: connection_properties().clone(),
            compress: None,
            large_threshold: Some(self.config.large_threshold),
            shard,
            presence: self.config.presence.as_ref().map(|_| self.presence.build(self.config.presence.as_ref(), None)),
            guild_subscriptions: Some(self.config.guild_subscriptions),
        };
        self.metrics.inc_identifies();
        self.send_direct(transport, OpCode::Identify, &identify).await
    }

    async fn send_resume<T: GatewayTransport>(&self, transport: &mut T) -> Result<(), GatewayError> {
        let (session_id, seq) = {
            let session = self.session.read();
            (session.session_id.clone().unwrap_or_default(), session.sequence)
        };
        let resume = ResumePayload {
            token: std::borrow::Cow::Borrowed(self.config.token.as_str()),
            session_id,
            seq,
        };
        self.metrics.inc_session_resumes();
        self.send_direct(transport, OpCode::Resume, &resume).await
    }

    async fn send_heartbeat_now<T: GatewayTransport>(&self, transport: &mut T) -> Result<(), GatewayError> {
        let sequence = self.session.read().heartbeat_sequence();
        let frame = heartbeat_frame(sequence);
        let bytes = self.codec.read().encode(&frame)?;
        transport.send(bytes, self.binary_framing()).await?;
        self.heartbeat.mark_sent();
        self.metrics.inc_heartbeats_sent();
        Ok(())
    }

    /// Heartbeat, identify, and resume bypass the rate bucket (§4.D, §4.F).
    async fn send_direct<T: GatewayTransport, P: serde::Serialize>(
        &self,
        transport: &mut T,
        op: OpCode,
        payload: &P,
    ) -> Result<(), GatewayError> {
        let frame = GatewayFrame::from_payload(op, payload).map_err(|e| GatewayError::Encode(e.to_string()))?;
        let bytes = self.codec.read().encode(&frame)?;
        transport.send(bytes, self.binary_framing()).await
    }

    /// §4.G: central opcode dispatch for one decoded frame.
    async fn process_frame<T: GatewayTransport>(
        &self,
        frame: GatewayFrame,
        transport: &mut T,
        events_tx: &Sender<DispatchEvent>,
    ) -> Result<(), GatewayError> {
        self.metrics.inc_events_received();

        if let Some(seq) = frame.s {
            if self.session.write().observe_sequence(seq) == SequenceOutcome::GapDetected {
                warn!(seq, "sequence gap detected, triggering resume");
                self.session.write().begin_resume();
                self.send_resume(transport).await?;
            }
        }

        match frame.op {
            OpCode::Heartbeat => {
                debug!("server requested an immediate heartbeat");
                self.send_heartbeat_now(transport).await?;
            }
            OpCode::HeartbeatAck => {
                self.heartbeat.mark_acked();
                if let Some(latency) = self.heartbeat.latency() {
                    self.metrics.inc_heartbeats_acked();
                    self.metrics.record_heartbeat_latency(latency);
                    trace!(latency_ms = latency.as_millis(), "heartbeat acked");
                }
            }
            OpCode::Hello => {
                // Only expected once, during the handshake; a second HELLO
                // on an established connection is ignored.
            }
            OpCode::InvalidSession => {
                let resumable = frame.d.as_ref().and_then(|d| d.as_bool()).unwrap_or(false);
                let jitter = Duration::from_millis(rand::rng().random_range(1000..=6000));
                warn!(resumable, jitter_ms = jitter.as_millis(), "session invalidated");
                sleep(jitter).await;
                if resumable {
                    self.send_resume(transport).await?;
                } else {
                    self.session.write().cleanup(CloseCode::Normal);
                    self.send_identify(transport).await?;
                }
            }
            OpCode::Reconnect => {
                return Err(GatewayError::Closed {
                    code: CloseCode::InternalRetry as u16,
                    reason: "server requested reconnect".to_string(),
                });
            }
            OpCode::Dispatch => {
                self.handle_dispatch(frame, events_tx).await?;
            }
            _ => {}
        }

        Ok(())
    }

    /// The dispatch event router (§4.G): four control events are
    /// interpreted inline, everything else forwards verbatim.
    async fn handle_dispatch(
        &self,
        frame: GatewayFrame,
        events_tx: &Sender<DispatchEvent>,
    ) -> Result<(), GatewayError> {
        let name = frame.t.unwrap_or_default();
        let data = frame.d.unwrap_or(serde_json::Value::Null);

        if self.config.disabled_events.contains(&name) {
            return Ok(());
        }

        let event = match name.as_str() {
            "READY" => {
                let ready: ReadyEvent = serde_json::from_value(data.clone())?;
                self.session.write().on_ready(ready.session_id.clone(), ready.user.id, ready.trace.clone());
                self.rate_bucket.write().unlock();
                self.reconnects.store(0, Ordering::SeqCst);
                DispatchEvent::Ready(Box::new(ready))
            }
            "RESUMED" => {
                self.session.write().on_resumed();
                self.rate_bucket.write().unlock();
                self.reconnects.store(0, Ordering::SeqCst);
                DispatchEvent::Resumed
            }
            "GUILD_DELETE" => {
                let guild_delete: GuildDeleteEvent = serde_json::from_value(data.clone())?;
                if let Some(session) = self.media.get(guild_delete.id) {
                    let reason = if guild_delete.unavailable { "guild became unavailable" } else { "left the guild" };
                    session.kill(Some(GatewayError::Closed { code: 0, reason: reason.to_string() }));
                }
                DispatchEvent::GuildDelete(guild_delete)
            }
            "VOICE_SERVER_UPDATE" => {
                let voice_server: VoiceServerUpdateEvent = serde_json::from_value(data.clone())?;
                if let Some(server_id) = voice_server.guild_id.or(voice_server.channel_id) {
                    if let Some(session) = self.media.get(server_id) {
                        if let Some(endpoint) = voice_server.endpoint.clone() {
                            session.set_endpoint(endpoint);
                        }
                        session.set_token(voice_server.token.clone());
                    }
                }
                DispatchEvent::VoiceServerUpdate(voice_server)
            }
            "VOICE_STATE_UPDATE" => {
                let voice_state: VoiceStateUpdateEvent = serde_json::from_value(data.clone())?;
                self.handle_voice_state_update(&voice_state);
                DispatchEvent::VoiceStateUpdate(voice_state)
            }
            _ => DispatchEvent::Other { name, data },
        };

        self.metrics.inc_events_dispatched();
        let _ = events_tx.send_async(event).await;
        Ok(())
    }

    fn handle_voice_state_update(&self, voice_state: &VoiceStateUpdateEvent) {
        let our_user_id = self.session.read().user_id;
        if our_user_id != Some(voice_state.user_id) {
            return;
        }
        // Channel-only (guild-less) voice sessions are registered under
        // channel_id (§4.H), so fall back to it when guild_id is absent.
        let server_id = match voice_state.guild_id.or(voice_state.channel_id) {
            Some(id) => id,
            None => return,
        };
        let Some(session) = self.media.get(server_id) else { return };

        match voice_state.channel_id {
            None => session.kill(None),
            Some(channel_id) => {
                if session.session_id().as_deref().is_some_and(|s| s != voice_state.session_id) {
                    session.kill(Some(GatewayError::Closed { code: 0, reason: "different session".to_string() }));
                    return;
                }
                session.set_channel_id(Some(channel_id));
                self.media.resolve(server_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_model::Intents;

    fn test_config() -> GatewayConfig {
        GatewayConfig::new("test-token", Intents::default()).with_gateway_url(DEFAULT_GATEWAY_URL)
    }

    #[test]
    fn new_engine_starts_disconnected_and_alive() {
        let engine = GatewayEngine::new(test_config()).unwrap();
        assert_eq!(engine.state(), EngineState::Disconnected);
        assert!(!engine.is_dead());
        assert_eq!(engine.sequence(), 0);
    }

    #[test]
    fn gateway_url_carries_version_and_encoding() {
        let engine = GatewayEngine::new(test_config()).unwrap();
        let url = engine.build_gateway_url().unwrap();
        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query.get("v").map(String::as_str), Some("10"));
        assert!(query.contains_key("encoding"));
    }

    #[test]
    fn kill_is_idempotent() {
        let engine = GatewayEngine::new(test_config()).unwrap();
        engine.kill();
        assert!(engine.is_dead());
        // A second kill must not panic or double-queue commands.
        engine.kill();
        assert!(engine.is_dead());
    }

    #[test]
    fn send_payload_after_kill_is_rejected() {
        let engine = GatewayEngine::new(test_config()).unwrap();
        engine.kill();
        let err = engine.send_payload(OpCode::PresenceUpdate, serde_json::json!({})).unwrap_err();
        assert!(matches!(err, GatewayError::Dead));
    }

    #[tokio::test]
    async fn ready_dispatch_resets_the_reconnect_budget() {
        let engine = GatewayEngine::new(test_config()).unwrap();
        engine.reconnects.store(3, Ordering::SeqCst);

        let (events_tx, events_rx) = flume::unbounded();
        let ready = GatewayFrame {
            op: OpCode::Dispatch,
            d: Some(serde_json::json!({
                "v": 10,
                "user": { "id": "1", "username": "bot" },
                "session_id": "sess-1",
            })),
            s: Some(1),
            t: Some("READY".to_string()),
        };
        engine.handle_dispatch(ready, &events_tx).await.unwrap();

        assert_eq!(engine.reconnects.load(Ordering::SeqCst), 0);
        assert!(matches!(events_rx.try_recv().unwrap(), DispatchEvent::Ready(_)));
    }

    #[tokio::test]
    async fn resumed_dispatch_resets_the_reconnect_budget() {
        let engine = GatewayEngine::new(test_config()).unwrap();
        engine.reconnects.store(2, Ordering::SeqCst);

        let (events_tx, events_rx) = flume::unbounded();
        let resumed = GatewayFrame { op: OpCode::Dispatch, d: None, s: None, t: Some("RESUMED".to_string()) };
        engine.handle_dispatch(resumed, &events_tx).await.unwrap();

        assert_eq!(engine.reconnects.load(Ordering::SeqCst), 0);
        assert!(matches!(events_rx.try_recv().unwrap(), DispatchEvent::Resumed));
    }

    #[test]
    fn cleanup_with_normal_code_wipes_session() {
        let engine = GatewayEngine::new(test_config()).unwrap();
        engine.session.write().on_ready("sess-1".to_string(), Snowflake::new(1), vec![]);
        engine.cleanup(CloseCode::Normal);
        assert!(engine.session_id().is_none());
        assert_eq!(engine.sequence(), 0);
        assert!(engine.rate_bucket.read().is_locked());
    }

    #[test]
    fn cleanup_with_internal_retry_preserves_session() {
        let engine = GatewayEngine::new(test_config()).unwrap();
        engine.session.write().on_ready("sess-1".to_string(), Snowflake::new(1), vec![]);
        engine.session.write().observe_sequence(7);
        engine.cleanup(CloseCode::InternalRetry);
        assert_eq!(engine.session_id().as_deref(), Some("sess-1"));
        assert_eq!(engine.sequence(), 7);
    }

    /// A fake [`GatewayTransport`] driven from a queue of canned events,
    /// recording every frame the engine sends. Exercises `drive` without
    /// a real socket (§4.L).
    struct MockTransport {
        inbound: std::collections::VecDeque<TransportEvent>,
        pub sent: Vec<Vec<u8>>,
    }

    impl MockTransport {
        fn new(inbound: Vec<TransportEvent>) -> Self {
            Self { inbound: inbound.into(), sent: Vec::new() }
        }
    }

    #[async_trait::async_trait]
    impl GatewayTransport for MockTransport {
        async fn send(&mut self, bytes: Vec<u8>, _binary: bool) -> Result<(), GatewayError> {
            self.sent.push(bytes);
            Ok(())
        }

        async fn close(&mut self, _code: u16, _reason: &str) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<TransportEvent> {
            self.inbound.pop_front()
        }
    }

    #[tokio::test]
    async fn drive_completes_handshake_then_surfaces_closed_error() {
        let engine = GatewayEngine::new(test_config()).unwrap();
        let hello = serde_json::to_vec(&serde_json::json!({
            "op": 10,
            "d": { "heartbeat_interval": 45_000 },
        }))
        .unwrap();

        let mut transport = MockTransport::new(vec![
            TransportEvent::Message { data: hello, binary: false },
            TransportEvent::Closed { code: 1000, reason: "bye".to_string() },
        ]);

        let (events_tx, _events_rx) = flume::unbounded();
        let err = engine.drive(&mut transport, &events_tx).await.unwrap_err();

        assert!(matches!(err, GatewayError::Closed { code: 1000, .. }));
        assert_eq!(engine.state(), EngineState::Connected);
        // identify + the immediate post-handshake heartbeat were both sent
        // straight through the mock, bypassing the rate bucket.
        assert_eq!(transport.sent.len(), 2);
    }

    struct FakeMediaSession {
        channel_id: parking_lot::Mutex<Option<Snowflake>>,
        endpoint: parking_lot::Mutex<Option<String>>,
        token: parking_lot::Mutex<Option<String>>,
        killed: parking_lot::Mutex<bool>,
    }

    impl FakeMediaSession {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                channel_id: parking_lot::Mutex::new(None),
                endpoint: parking_lot::Mutex::new(None),
                token: parking_lot::Mutex::new(None),
                killed: parking_lot::Mutex::new(false),
            })
        }
    }

    impl MediaSession for FakeMediaSession {
        fn kill(&self, _error: Option<GatewayError>) {
            *self.killed.lock() = true;
        }
        fn set_endpoint(&self, endpoint: String) {
            *self.endpoint.lock() = Some(endpoint);
        }
        fn set_token(&self, token: String) {
            *self.token.lock() = Some(token);
        }
        fn set_channel_id(&self, channel_id: Option<Snowflake>) {
            *self.channel_id.lock() = channel_id;
        }
        fn session_id(&self) -> Option<String> {
            None
        }
        fn channel_id(&self) -> Option<Snowflake> {
            *self.channel_id.lock()
        }
    }

    #[test]
    fn voice_server_update_resolves_a_channel_only_session() {
        let engine = GatewayEngine::new(test_config()).unwrap();
        let channel_id = Snowflake::new(42);
        let session = FakeMediaSession::new();
        engine.media.insert_for_test(channel_id, session.clone());

        let voice_server = VoiceServerUpdateEvent {
            token: "tok".to_string(),
            guild_id: None,
            channel_id: Some(channel_id),
            endpoint: Some("voice.example.invalid:443".to_string()),
        };
        if let Some(server_id) = voice_server.guild_id.or(voice_server.channel_id) {
            if let Some(session) = engine.media.get(server_id) {
                if let Some(endpoint) = voice_server.endpoint.clone() {
                    session.set_endpoint(endpoint);
                }
                session.set_token(voice_server.token.clone());
            }
        }

        assert_eq!(session.endpoint.lock().as_deref(), Some("voice.example.invalid:443"));
        assert_eq!(session.token.lock().as_deref(), Some("tok"));
    }

    #[test]
    fn voice_state_update_resolves_a_channel_only_session() {
        let engine = GatewayEngine::new(test_config()).unwrap();
        engine.session.write().on_ready("sess-1".to_string(), Snowflake::new(7), vec![]);

        let channel_id = Snowflake::new(42);
        let session = FakeMediaSession::new();
        engine.media.insert_for_test(channel_id, session.clone());

        let voice_state = VoiceStateUpdateEvent {
            guild_id: None,
            channel_id: Some(channel_id),
            user_id: Snowflake::new(7),
            session_id: "vsess-1".to_string(),
        };
        engine.handle_voice_state_update(&voice_state);

        assert_eq!(*session.channel_id.lock(), Some(channel_id));
        assert!(!*session.killed.lock());
    }
}
