//! pulse-gateway - client-side gateway protocol engine
#![deny(unsafe_code)]
//!
//! This crate drives one real-time connection to a Discord-like chat/voice
//! gateway: handshake, heartbeat liveness, session resume, rate-limited
//! sends, and coordination with secondary voice/video ("media") sessions.
//!
//! # Cargo Features
//!
//! - `etf` - Enable Erlang Term Format encoding (more compact than JSON)
//!
//! # Example
//!
//! ```ignore
//! use pulse_gateway::{GatewayConfig, GatewayEngine};
//! use pulse_model::Intents;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfig::new("your-token", Intents::default());
//!     let engine = GatewayEngine::new(config)?;
//!
//!     let (events_tx, events_rx) = flume::unbounded();
//!     engine.run(events_tx).await?;
//!
//!     Ok(())
//! }
//! ```
mod codec;
mod compression;
pub mod config;
pub mod engine;
pub mod error;
pub mod etf;
pub mod event;
pub mod heartbeat;
pub mod media;
mod metrics;
pub mod opcode;
pub mod payload;
pub mod presence;
mod ratebucket;
pub mod session;
pub mod transport;

// Public re-exports
pub use codec::Codec;
pub use compression::StreamDecompressor;
pub use config::{Compression, GatewayConfig};
pub use engine::{EngineState, GatewayEngine};
pub use error::{CloseCode, GatewayError};
pub use etf::{EtfDecoder, EtfEncoder, EtfTerm, GatewayEncoding};
pub use event::DispatchEvent;
pub use heartbeat::HeartbeatController;
pub use media::{MediaGatewayRegistry, MediaSession};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use opcode::OpCode;
pub use payload::{
    connection_properties, ConnectionProperties, GatewayFrame, HelloPayload, IdentifyPayload,
    ReadyEvent, ResumePayload,
};
pub use presence::{PresenceBuilder, PresenceInput};
pub use session::{SequenceOutcome, SessionState};
pub use transport::{GatewayTransport, TransportEvent, TungsteniteTransport};

/// Gateway API version used by this library.
pub const GATEWAY_VERSION: u8 = 10;

/// Default gateway URL, overridden by `GatewayConfig::with_gateway_url`.
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.example.invalid";
