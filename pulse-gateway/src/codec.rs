//! Frame codec: encodes/decodes gateway frames under either text-JSON or
//! binary-term (ETF) encoding, and folds in the Stream Decompressor when
//! compression is enabled (§4.A).

use crate::compression::StreamDecompressor;
use crate::error::GatewayError;
use crate::etf::{EtfDecoder, EtfEncoder, GatewayEncoding};
use crate::payload::GatewayFrame;
use serde::Serialize;

/// Encode/decode frames for one connection's lifetime.
///
/// A fresh `Codec` (and its decompressor) is required per connection;
/// `reset_compression` is called by the lifecycle on every disconnect.
pub struct Codec {
    encoding: GatewayEncoding,
    compressed: bool,
    decompressor: Option<StreamDecompressor>,
}

impl Codec {
    /// Construct a codec. Fails if `etf` encoding is requested but the
    /// crate was built without the `etf` feature.
    pub fn new(encoding: GatewayEncoding, compressed: bool) -> Result<Self, GatewayError> {
        if encoding == GatewayEncoding::Etf && !cfg!(feature = "etf") {
            return Err(GatewayError::InvalidConfig(
                "binary-term encoding requested but the etf feature is disabled".to_string(),
            ));
        }

        Ok(Self {
            encoding,
            compressed,
            decompressor: if compressed { Some(StreamDecompressor::new()) } else { None },
        })
    }

    pub fn encoding(&self) -> GatewayEncoding {
        self.encoding
    }

    /// Encode any serializable payload into the wire bytes for this mode.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, GatewayError> {
        match self.encoding {
            GatewayEncoding::Json => {
                serde_json::to_vec(value).map_err(|e| GatewayError::Encode(e.to_string()))
            }
            GatewayEncoding::Etf => {
                let as_value = serde_json::to_value(value)
                    .map_err(|e| GatewayError::Encode(e.to_string()))?;
                Ok(EtfEncoder::encode(&as_value))
            }
        }
    }

    /// Feed one chunk of inbound data. If compression is enabled and the
    /// chunk hasn't already been inflated upstream, the chunk is handed to
    /// the Stream Decompressor first; `Ok(None)` means "no complete frame
    /// yet", not an error.
    ///
    /// Decode errors (malformed JSON/ETF) are non-fatal and logged as a
    /// warning — the caller gets `Ok(None)`, not an error, so a single bad
    /// frame never tears down the connection. Decompression failures
    /// *are* propagated, since the engine must force a reconnect on those.
    pub fn decode(
        &mut self,
        chunk: &[u8],
        already_inflated: bool,
    ) -> Result<Option<GatewayFrame>, GatewayError> {
        let inflated;
        let bytes: &[u8] = if self.compressed && !already_inflated {
            let decompressor = self
                .decompressor
                .as_mut()
                .expect("compressed codec always carries a decompressor");
            match decompressor
                .feed(chunk)
                .map_err(|e| GatewayError::Decompression(e.to_string()))?
            {
                Some(out) => {
                    inflated = out.to_vec();
                    &inflated
                }
                None => return Ok(None),
            }
        } else {
            chunk
        };

        match self.parse(bytes) {
            Ok(frame) => Ok(Some(frame)),
            Err(err) => {
                tracing::warn!(error = %err, "dropping frame that failed to decode");
                Ok(None)
            }
        }
    }

    fn parse(&self, bytes: &[u8]) -> Result<GatewayFrame, GatewayError> {
        match self.encoding {
            GatewayEncoding::Json => {
                serde_json::from_slice(bytes).map_err(|e| GatewayError::Decode(e.to_string()))
            }
            GatewayEncoding::Etf => {
                let term = EtfDecoder::decode(bytes)?;
                let value = EtfDecoder::to_json_value(&term)?;
                serde_json::from_value(value).map_err(|e| GatewayError::Decode(e.to_string()))
            }
        }
    }

    /// Discard any partial decompression state. Called on every disconnect
    /// (§4.B: "Reset is required after any disconnect").
    pub fn reset_compression(&mut self) {
        if let Some(decompressor) = self.decompressor.as_mut() {
            decompressor.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::OpCode;

    #[test]
    fn rejects_etf_without_feature() {
        if cfg!(feature = "etf") {
            return;
        }
        assert!(Codec::new(GatewayEncoding::Etf, false).is_err());
    }

    #[test]
    fn json_round_trips_a_hello_frame() {
        let mut codec = Codec::new(GatewayEncoding::Json, false).unwrap();
        let frame = GatewayFrame::new(OpCode::Hello, Some(serde_json::json!({"heartbeat_interval": 41250})));
        let bytes = codec.encode(&frame).unwrap();
        let decoded = codec.decode(&bytes, true).unwrap().unwrap();
        assert_eq!(decoded.op, OpCode::Hello);
        assert_eq!(decoded.d.unwrap()["heartbeat_interval"], 41250);
    }

    #[test]
    fn malformed_json_is_non_fatal() {
        let mut codec = Codec::new(GatewayEncoding::Json, false).unwrap();
        let result = codec.decode(b"{not valid json", true).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn decode_returns_none_until_compressed_frame_completes() {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        let payload = r#"{"op":10,"d":{"heartbeat_interval":41250}}"#;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload.as_bytes()).unwrap();
        encoder.flush().unwrap();
        let compressed = encoder.finish().unwrap();

        let mut codec = Codec::new(GatewayEncoding::Json, true).unwrap();
        let (head, tail) = compressed.split_at(compressed.len() - 2);
        assert!(codec.decode(head, false).unwrap().is_none());
        let frame = codec.decode(tail, false).unwrap().unwrap();
        assert_eq!(frame.op, OpCode::Hello);
    }
}
