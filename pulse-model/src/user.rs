use crate::snowflake::Snowflake;
use serde::{Deserialize, Serialize};

/// The authenticated principal carried by a `READY` payload.
///
/// Trimmed to the fields the engine actually reads (`id`, for
/// `Session State`'s `user_id`); applications that need the rest of the
/// profile read it from the raw `READY` dispatch they also receive.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: Snowflake,
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}
