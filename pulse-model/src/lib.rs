//! Pulse Model - wire-level identity and presence types for the gateway protocol.
#![deny(unsafe_code)]
//!
//! This crate holds only the data the gateway engine itself needs to
//! understand: identities (`Snowflake`, `User`), the intent bitfield sent on
//! `IDENTIFY`, and the presence/activity shapes sent on `PRESENCE_UPDATE`.
//! It deliberately does not model the full event catalogue — the engine
//! forwards most dispatch payloads to the application unparsed.

pub mod intents;
pub mod presence;
pub mod snowflake;
pub mod user;
pub mod voice;

pub use intents::Intents;
pub use presence::{Activity, ActivityAssets, ActivityParty, ActivitySecrets, ActivityTimestamps,
    ActivityType, PresenceUpdate, Status};
pub use snowflake::Snowflake;
pub use user::User;
pub use voice::{VoiceServerUpdateEvent, VoiceStateUpdateEvent};
