//! Snowflake ID type for the gateway's wire protocol.
//!
//! The gateway uses 64-bit unsigned integers for unique identifiers,
//! but serializes them as strings in JSON to avoid precision loss in
//! clients with limited integer precision.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// An opaque 64-bit identifier (user, server, channel, session...).
///
/// Serialized as a string to prevent precision loss, but also accepts
/// bare JSON integers on the way in since some payload fields use either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Snowflake(pub u64);

impl Snowflake {
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Snowflake {
    #[inline]
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Snowflake> for u64 {
    #[inline]
    fn from(snowflake: Snowflake) -> Self {
        snowflake.0
    }
}

impl Serialize for Snowflake {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SnowflakeVisitor;

        impl<'de> serde::de::Visitor<'de> for SnowflakeVisitor {
            type Value = Snowflake;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or integer snowflake id")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Snowflake(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Snowflake(value as u64))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                value
                    .parse::<u64>()
                    .map(Snowflake)
                    .map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_any(SnowflakeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_snowflake() {
        let snowflake: Snowflake = serde_json::from_str(r#""175928847299117063""#).unwrap();
        assert_eq!(snowflake.get(), 175928847299117063);
    }

    #[test]
    fn parses_integer_snowflake() {
        let snowflake: Snowflake = serde_json::from_str("42").unwrap();
        assert_eq!(snowflake.get(), 42);
    }

    #[test]
    fn serializes_as_string() {
        let snowflake = Snowflake::new(175928847299117063);
        let json = serde_json::to_string(&snowflake).unwrap();
        assert_eq!(json, r#""175928847299117063""#);
    }
}
