//! Engine configuration (§6) and its construction-time validation.

use crate::error::GatewayError;
use crate::etf::GatewayEncoding;
use crate::presence::PresenceInput;
use pulse_model::Intents;
use std::collections::HashSet;
use std::time::Duration;

/// Compression mode for the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    ZlibStream,
}

impl Compression {
    pub fn is_enabled(self) -> bool {
        matches!(self, Compression::ZlibStream)
    }

    pub fn query_value(self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::ZlibStream => Some("zlib-stream"),
        }
    }
}

/// Construction-time configuration for a [`GatewayEngine`](crate::engine::GatewayEngine).
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub token: String,
    pub intents: Intents,
    pub gateway_url: String,
    pub auto_reconnect: bool,
    pub compress: Compression,
    pub encoding: GatewayEncoding,
    pub guild_subscriptions: bool,
    pub large_threshold: u8,
    pub presence: Option<PresenceInput>,
    pub reconnect_delay: Duration,
    pub reconnect_max: u32,
    pub shard_id: u32,
    pub shard_count: u32,
    pub disabled_events: HashSet<String>,
}

impl GatewayConfig {
    pub fn new(token: impl Into<String>, intents: Intents) -> Self {
        let preferred_encoding = if cfg!(feature = "etf") {
            GatewayEncoding::Etf
        } else {
            GatewayEncoding::Json
        };

        Self {
            token: token.into(),
            intents,
            gateway_url: crate::DEFAULT_GATEWAY_URL.to_string(),
            auto_reconnect: true,
            compress: Compression::ZlibStream,
            encoding: preferred_encoding,
            guild_subscriptions: true,
            large_threshold: 250,
            presence: None,
            reconnect_delay: Duration::from_millis(5000),
            reconnect_max: 5,
            shard_id: 0,
            shard_count: 1,
            disabled_events: HashSet::new(),
        }
    }

    pub fn with_shard(mut self, shard_id: u32, shard_count: u32) -> Self {
        self.shard_id = shard_id;
        self.shard_count = shard_count;
        self
    }

    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = url.into();
        self
    }

    /// Validate the configuration (§6, "Validation at construction").
    /// Called once by the engine at construction; the engine never starts
    /// on a configuration error.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.shard_id >= self.shard_count {
            return Err(GatewayError::InvalidConfig(format!(
                "shard_id {} must be less than shard_count {}",
                self.shard_id, self.shard_count
            )));
        }

        if self.encoding == GatewayEncoding::Etf && !cfg!(feature = "etf") {
            return Err(GatewayError::InvalidConfig(
                "binary-term encoding requires the etf feature".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_table() {
        let config = GatewayConfig::new("token", Intents::default());
        assert!(config.auto_reconnect);
        assert_eq!(config.compress, Compression::ZlibStream);
        assert!(config.guild_subscriptions);
        assert_eq!(config.large_threshold, 250);
        assert_eq!(config.reconnect_delay, Duration::from_millis(5000));
        assert_eq!(config.reconnect_max, 5);
        assert_eq!(config.shard_count, 1);
        assert_eq!(config.shard_id, 0);
        assert!(config.disabled_events.is_empty());
    }

    #[test]
    fn rejects_shard_id_out_of_range() {
        let config = GatewayConfig::new("token", Intents::default()).with_shard(2, 2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_valid_shard_range() {
        let config = GatewayConfig::new("token", Intents::default()).with_shard(1, 3);
        assert!(config.validate().is_ok());
    }
}
