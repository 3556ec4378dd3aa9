//! Erlang Term Format (ETF) codec for the `binary-term` wire encoding.
//!
//! ETF is Erlang's external binary format; gateways that offer a
//! `binary-term` alternative to JSON use a small subset of it:
//! atoms (as strings), small/large integers, floats, binaries, lists, and
//! maps. This module decodes inbound ETF frames into [`EtfTerm`] (and from
//! there into `serde_json::Value` so the rest of the engine never has to
//! know which wire encoding is in use), and encodes outbound JSON values
//! back into ETF bytes.

use crate::error::GatewayError;

/// ETF format version tag.
const ETF_VERSION: u8 = 131;

mod tags {
    pub const SMALL_INTEGER: u8 = 97;
    pub const INTEGER: u8 = 98;
    pub const FLOAT: u8 = 99;
    pub const ATOM: u8 = 100;
    pub const SMALL_TUPLE: u8 = 104;
    pub const LARGE_TUPLE: u8 = 105;
    pub const NIL: u8 = 106;
    pub const STRING: u8 = 107;
    pub const LIST: u8 = 108;
    pub const BINARY: u8 = 109;
    pub const SMALL_BIG: u8 = 110;
    pub const LARGE_BIG: u8 = 111;
    pub const MAP: u8 = 116;
    pub const ATOM_UTF8: u8 = 118;
    pub const SMALL_ATOM_UTF8: u8 = 119;
    pub const NEW_FLOAT: u8 = 70;
    pub const COMPRESSED: u8 = 80;
}

/// An ETF term (Erlang value).
#[derive(Debug, Clone, PartialEq)]
pub enum EtfTerm {
    SmallInt(u8),
    Int(i32),
    BigInt(i128),
    Float(f64),
    Atom(String),
    Tuple(Vec<EtfTerm>),
    Nil,
    String(String),
    List(Vec<EtfTerm>),
    Binary(Vec<u8>),
    Map(Vec<(EtfTerm, EtfTerm)>),
}

/// ETF decoder.
pub struct EtfDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> EtfDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Decode an ETF payload (version byte + term) into an [`EtfTerm`].
    pub fn decode(data: &[u8]) -> Result<EtfTerm, GatewayError> {
        let mut decoder = EtfDecoder::new(data);
        decoder.decode_term()
    }

    fn decode_term(&mut self) -> Result<EtfTerm, GatewayError> {
        let version = self.read_u8()?;
        if version != ETF_VERSION {
            return Err(GatewayError::Decode(format!(
                "invalid ETF version: expected {}, got {}",
                ETF_VERSION, version
            )));
        }

        self.decode_value()
    }

    fn decode_value(&mut self) -> Result<EtfTerm, GatewayError> {
        let tag = self.read_u8()?;

        match tag {
            tags::SMALL_INTEGER => Ok(EtfTerm::SmallInt(self.read_u8()?)),

            tags::INTEGER => Ok(EtfTerm::Int(self.read_i32()?)),

            tags::FLOAT => {
                let bytes = self.read_bytes(31)?;
                let s = std::str::from_utf8(bytes)
                    .map_err(|e| GatewayError::Decode(format!("invalid float string: {}", e)))?
                    .trim_end_matches('\0');
                let value: f64 = s
                    .parse()
                    .map_err(|e| GatewayError::Decode(format!("invalid float: {}", e)))?;
                Ok(EtfTerm::Float(value))
            }

            tags::NEW_FLOAT => {
                let bytes = self.read_bytes(8)?;
                let value = f64::from_be_bytes(
                    bytes
                        .try_into()
                        .map_err(|_| GatewayError::Decode("invalid float bytes".to_string()))?,
                );
                Ok(EtfTerm::Float(value))
            }

            tags::ATOM | tags::ATOM_UTF8 => {
                let len = self.read_u16()? as usize;
                let bytes = self.read_bytes(len)?;
                Ok(EtfTerm::Atom(String::from_utf8_lossy(bytes).into_owned()))
            }

            tags::SMALL_ATOM_UTF8 => {
                let len = self.read_u8()? as usize;
                let bytes = self.read_bytes(len)?;
                Ok(EtfTerm::Atom(String::from_utf8_lossy(bytes).into_owned()))
            }

            tags::SMALL_TUPLE => {
                let arity = self.read_u8()? as usize;
                let mut elements = Vec::with_capacity(arity);
                for _ in 0..arity {
                    elements.push(self.decode_value()?);
                }
                Ok(EtfTerm::Tuple(elements))
            }

            tags::LARGE_TUPLE => {
                let arity = self.read_u32()? as usize;
                let mut elements = Vec::with_capacity(arity);
                for _ in 0..arity {
                    elements.push(self.decode_value()?);
                }
                Ok(EtfTerm::Tuple(elements))
            }

            tags::NIL => Ok(EtfTerm::Nil),

            tags::STRING => {
                let len = self.read_u16()? as usize;
                let bytes = self.read_bytes(len)?;
                Ok(EtfTerm::String(String::from_utf8_lossy(bytes).into_owned()))
            }

            tags::LIST => {
                let len = self.read_u32()? as usize;
                let mut elements = Vec::with_capacity(len);
                for _ in 0..len {
                    elements.push(self.decode_value()?);
                }
                let _tail = self.decode_value()?;
                Ok(EtfTerm::List(elements))
            }

            tags::BINARY => {
                let len = self.read_u32()? as usize;
                let bytes = self.read_bytes(len)?;
                Ok(EtfTerm::Binary(bytes.to_vec()))
            }

            tags::SMALL_BIG => {
                let n = self.read_u8()? as usize;
                let sign = self.read_u8()?;
                let bytes = self.read_bytes(n)?;
                let mut value: i128 = 0;
                for (i, &byte) in bytes.iter().enumerate() {
                    value |= (byte as i128) << (i * 8);
                }
                if sign != 0 {
                    value = -value;
                }
                Ok(EtfTerm::BigInt(value))
            }

            tags::LARGE_BIG => {
                let n = self.read_u32()? as usize;
                let sign = self.read_u8()?;
                let bytes = self.read_bytes(n)?;
                let mut value: i128 = 0;
                for (i, &byte) in bytes.iter().take(16).enumerate() {
                    value |= (byte as i128) << (i * 8);
                }
                if sign != 0 {
                    value = -value;
                }
                Ok(EtfTerm::BigInt(value))
            }

            tags::MAP => {
                let arity = self.read_u32()? as usize;
                let mut pairs = Vec::with_capacity(arity);
                for _ in 0..arity {
                    let key = self.decode_value()?;
                    let value = self.decode_value()?;
                    pairs.push((key, value));
                }
                Ok(EtfTerm::Map(pairs))
            }

            tags::COMPRESSED => {
                let uncompressed_size = self.read_u32()? as usize;
                let compressed_data = &self.data[self.pos..];

                use flate2::read::ZlibDecoder;
                use std::io::Read;

                let mut decoder = ZlibDecoder::new(compressed_data);
                let mut decompressed = Vec::with_capacity(uncompressed_size);
                decoder
                    .read_to_end(&mut decompressed)
                    .map_err(|e| GatewayError::Decode(format!("ETF decompression failed: {}", e)))?;

                self.pos = self.data.len();

                let mut inner = EtfDecoder::new(&decompressed);
                inner.decode_value()
            }

            _ => Err(GatewayError::Decode(format!(
                "unknown ETF tag: {} at position {}",
                tag,
                self.pos - 1
            ))),
        }
    }

    #[inline]
    fn read_u8(&mut self) -> Result<u8, GatewayError> {
        if self.pos >= self.data.len() {
            return Err(GatewayError::Decode("unexpected end of ETF data".to_string()));
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn read_u16(&mut self) -> Result<u16, GatewayError> {
        if self.pos + 2 > self.data.len() {
            return Err(GatewayError::Decode("unexpected end of ETF data".to_string()));
        }
        let value = u16::from_be_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        Ok(value)
    }

    #[inline]
    fn read_u32(&mut self) -> Result<u32, GatewayError> {
        if self.pos + 4 > self.data.len() {
            return Err(GatewayError::Decode("unexpected end of ETF data".to_string()));
        }
        let value = u32::from_be_bytes([
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ]);
        self.pos += 4;
        Ok(value)
    }

    #[inline]
    fn read_i32(&mut self) -> Result<i32, GatewayError> {
        if self.pos + 4 > self.data.len() {
            return Err(GatewayError::Decode("unexpected end of ETF data".to_string()));
        }
        let value = i32::from_be_bytes([
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ]);
        self.pos += 4;
        Ok(value)
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], GatewayError> {
        if self.pos + n > self.data.len() {
            return Err(GatewayError::Decode("unexpected end of ETF data".to_string()));
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Convert an [`EtfTerm`] into a `serde_json::Value` so the rest of the
    /// codec can treat JSON and ETF frames identically once decoded.
    pub fn to_json_value(term: &EtfTerm) -> Result<serde_json::Value, GatewayError> {
        match term {
            EtfTerm::SmallInt(n) => Ok(serde_json::Value::Number((*n as i64).into())),
            EtfTerm::Int(n) => Ok(serde_json::Value::Number((*n as i64).into())),
            EtfTerm::BigInt(n) => {
                if *n > i64::MAX as i128 || *n < i64::MIN as i128 {
                    Ok(serde_json::Value::String(n.to_string()))
                } else {
                    Ok(serde_json::Value::Number((*n as i64).into()))
                }
            }
            EtfTerm::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| GatewayError::Decode("invalid float value".to_string())),
            EtfTerm::Atom(s) => match s.as_str() {
                "nil" | "null" => Ok(serde_json::Value::Null),
                "true" => Ok(serde_json::Value::Bool(true)),
                "false" => Ok(serde_json::Value::Bool(false)),
                _ => Ok(serde_json::Value::String(s.clone())),
            },
            EtfTerm::Tuple(elements) => {
                let arr: Result<Vec<_>, _> = elements.iter().map(Self::to_json_value).collect();
                Ok(serde_json::Value::Array(arr?))
            }
            EtfTerm::Nil => Ok(serde_json::Value::Null),
            EtfTerm::String(s) => Ok(serde_json::Value::String(s.clone())),
            EtfTerm::List(elements) => {
                let arr: Result<Vec<_>, _> = elements.iter().map(Self::to_json_value).collect();
                Ok(serde_json::Value::Array(arr?))
            }
            EtfTerm::Binary(bytes) => match String::from_utf8(bytes.clone()) {
                Ok(s) => Ok(serde_json::Value::String(s)),
                Err(_) => {
                    use base64::Engine;
                    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                    Ok(serde_json::Value::String(encoded))
                }
            },
            EtfTerm::Map(pairs) => {
                let mut map = serde_json::Map::new();
                for (key, value) in pairs {
                    let key_str = match key {
                        EtfTerm::Atom(s) => s.clone(),
                        EtfTerm::Binary(b) => String::from_utf8_lossy(b).into_owned(),
                        EtfTerm::String(s) => s.clone(),
                        _ => Self::to_json_value(key)?.to_string(),
                    };
                    map.insert(key_str, Self::to_json_value(value)?);
                }
                Ok(serde_json::Value::Object(map))
            }
        }
    }

    pub fn to_json_string(term: &EtfTerm) -> Result<String, GatewayError> {
        let value = Self::to_json_value(term)?;
        serde_json::to_string(&value).map_err(GatewayError::from)
    }
}

/// Encodes `serde_json::Value`s into ETF bytes for outbound frames.
///
/// Only the shapes the gateway itself sends (maps, strings, integers,
/// floats, bools, null, arrays) are produced; there is no tuple or big
/// binary encoding path since the engine never needs to emit one.
pub struct EtfEncoder {
    out: Vec<u8>,
}

impl EtfEncoder {
    /// Encode a JSON value as a full ETF payload, version byte included.
    pub fn encode(value: &serde_json::Value) -> Vec<u8> {
        let mut encoder = EtfEncoder {
            out: Vec::with_capacity(128),
        };
        encoder.out.push(ETF_VERSION);
        encoder.encode_value(value);
        encoder.out
    }

    fn encode_value(&mut self, value: &serde_json::Value) {
        match value {
            serde_json::Value::Null => self.encode_atom("nil"),
            serde_json::Value::Bool(true) => self.encode_atom("true"),
            serde_json::Value::Bool(false) => self.encode_atom("false"),
            serde_json::Value::Number(n) => self.encode_number(n),
            serde_json::Value::String(s) => self.encode_binary(s.as_bytes()),
            serde_json::Value::Array(items) => self.encode_list(items),
            serde_json::Value::Object(map) => self.encode_map(map),
        }
    }

    fn encode_atom(&mut self, atom: &str) {
        let bytes = atom.as_bytes();
        if bytes.len() <= u8::MAX as usize {
            self.out.push(tags::SMALL_ATOM_UTF8);
            self.out.push(bytes.len() as u8);
        } else {
            self.out.push(tags::ATOM_UTF8);
            self.out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        }
        self.out.extend_from_slice(bytes);
    }

    fn encode_number(&mut self, n: &serde_json::Number) {
        if let Some(u) = n.as_u64() {
            if u <= u8::MAX as u64 {
                self.out.push(tags::SMALL_INTEGER);
                self.out.push(u as u8);
            } else if u <= i32::MAX as u64 {
                self.out.push(tags::INTEGER);
                self.out.extend_from_slice(&(u as i32).to_be_bytes());
            } else {
                self.encode_big(u as i128);
            }
        } else if let Some(i) = n.as_i64() {
            if (0..=u8::MAX as i64).contains(&i) {
                self.out.push(tags::SMALL_INTEGER);
                self.out.push(i as u8);
            } else if (i32::MIN as i64..=i32::MAX as i64).contains(&i) {
                self.out.push(tags::INTEGER);
                self.out.extend_from_slice(&(i as i32).to_be_bytes());
            } else {
                self.encode_big(i as i128);
            }
        } else {
            let f = n.as_f64().unwrap_or(0.0);
            self.out.push(tags::NEW_FLOAT);
            self.out.extend_from_slice(&f.to_be_bytes());
        }
    }

    fn encode_big(&mut self, value: i128) {
        let sign: u8 = if value < 0 { 1 } else { 0 };
        let mut magnitude = value.unsigned_abs();
        let mut digits = Vec::new();
        while magnitude > 0 {
            digits.push((magnitude & 0xFF) as u8);
            magnitude >>= 8;
        }
        if digits.is_empty() {
            digits.push(0);
        }
        self.out.push(tags::SMALL_BIG);
        self.out.push(digits.len() as u8);
        self.out.push(sign);
        self.out.extend_from_slice(&digits);
    }

    fn encode_binary(&mut self, bytes: &[u8]) {
        self.out.push(tags::BINARY);
        self.out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        self.out.extend_from_slice(bytes);
    }

    fn encode_list(&mut self, items: &[serde_json::Value]) {
        if items.is_empty() {
            self.out.push(tags::NIL);
            return;
        }
        self.out.push(tags::LIST);
        self.out.extend_from_slice(&(items.len() as u32).to_be_bytes());
        for item in items {
            self.encode_value(item);
        }
        self.out.push(tags::NIL);
    }

    fn encode_map(&mut self, map: &serde_json::Map<String, serde_json::Value>) {
        self.out.push(tags::MAP);
        self.out.extend_from_slice(&(map.len() as u32).to_be_bytes());
        for (key, value) in map {
            self.encode_atom(key);
            self.encode_value(value);
        }
    }
}

/// Which wire encoding the gateway negotiates for this connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayEncoding {
    #[default]
    Json,
    Etf,
}

impl GatewayEncoding {
    /// The encoding name for the gateway URL's `encoding` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayEncoding::Json => "json",
            GatewayEncoding::Etf => "etf",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_small_int() {
        let data = [131, 97, 42];
        let term = EtfDecoder::decode(&data).unwrap();
        assert_eq!(term, EtfTerm::SmallInt(42));
    }

    #[test]
    fn decode_integer() {
        let data = [131, 98, 0, 0, 1, 0];
        let term = EtfDecoder::decode(&data).unwrap();
        assert_eq!(term, EtfTerm::Int(256));
    }

    #[test]
    fn decode_nil() {
        let data = [131, 106];
        let term = EtfDecoder::decode(&data).unwrap();
        assert_eq!(term, EtfTerm::Nil);
    }

    #[test]
    fn decode_binary() {
        let data = [131, 109, 0, 0, 0, 5, b'h', b'e', b'l', b'l', b'o'];
        let term = EtfDecoder::decode(&data).unwrap();
        assert_eq!(term, EtfTerm::Binary(b"hello".to_vec()));
    }

    #[test]
    fn decode_map_to_json() {
        let data = [
            131, 116, 0, 0, 0, 1, 119, 1, b'a', 97, 1,
        ];
        let term = EtfDecoder::decode(&data).unwrap();
        let json = EtfDecoder::to_json_value(&term).unwrap();
        assert_eq!(json["a"], 1);
    }

    #[test]
    fn atom_special_values() {
        assert!(EtfDecoder::to_json_value(&EtfTerm::Atom("nil".into()))
            .unwrap()
            .is_null());
        assert_eq!(
            EtfDecoder::to_json_value(&EtfTerm::Atom("true".into())).unwrap(),
            serde_json::Value::Bool(true)
        );
    }

    #[test]
    fn round_trips_a_hello_payload() {
        let value = serde_json::json!({
            "op": 10,
            "d": { "heartbeat_interval": 41250 },
            "s": serde_json::Value::Null,
            "t": serde_json::Value::Null,
        });

        let bytes = EtfEncoder::encode(&value);
        let term = EtfDecoder::decode(&bytes).unwrap();
        let decoded = EtfDecoder::to_json_value(&term).unwrap();

        assert_eq!(decoded["op"], 10);
        assert_eq!(decoded["d"]["heartbeat_interval"], 41250);
        assert!(decoded["s"].is_null());
    }

    #[test]
    fn round_trips_strings_and_lists() {
        let value = serde_json::json!({
            "token": "abc.def.ghi",
            "intents": 513,
            "shard": [0, 1],
        });
        let bytes = EtfEncoder::encode(&value);
        let term = EtfDecoder::decode(&bytes).unwrap();
        let decoded = EtfDecoder::to_json_value(&term).unwrap();

        assert_eq!(decoded["token"], "abc.def.ghi");
        assert_eq!(decoded["intents"], 513);
        assert_eq!(decoded["shard"], serde_json::json!([0, 1]));
    }
}
