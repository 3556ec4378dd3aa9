//! Streaming zlib decompression for the gateway's `compress=zlib-stream`
//! transport option (§4.B, Stream Decompressor).
//!
//! All compressed messages share a single zlib context for the lifetime of
//! a connection. Each logical frame ends with the zlib SYNC_FLUSH suffix
//! (0x00 0x00 0xFF 0xFF); a frame is complete exactly when the accumulated
//! buffer ends with that marker.

use flate2::{Decompress, FlushDecompress, Status};

/// The four-byte end-of-frame marker appended by SYNC_FLUSH.
pub const END_OF_FRAME_MARKER: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

/// Streaming zlib-stream decompressor.
///
/// Tolerates payload splits at arbitrary chunk boundaries: `feed` only
/// attempts inflation once the buffer ends with [`END_OF_FRAME_MARKER`].
pub struct StreamDecompressor {
    /// Accumulated compressed bytes for the frame in progress.
    buffer: Vec<u8>,
    /// Reused output buffer to avoid reallocating per frame.
    output: Vec<u8>,
    decompressor: Decompress,
}

impl StreamDecompressor {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(8 * 1024),
            output: Vec::with_capacity(32 * 1024),
            decompressor: Decompress::new(true),
        }
    }

    /// Append a chunk and, if it completes a frame, return the inflated
    /// bytes. Returns `Ok(None)` when more data is needed.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Option<&[u8]>, std::io::Error> {
        self.buffer.extend_from_slice(chunk);

        if self.buffer.len() < 4 || self.buffer[self.buffer.len() - 4..] != END_OF_FRAME_MARKER {
            return Ok(None);
        }

        self.inflate()?;
        self.buffer.clear();
        Ok(Some(&self.output))
    }

    fn inflate(&mut self) -> Result<(), std::io::Error> {
        self.output.clear();
        let mut input_offset = 0;

        loop {
            if self.output.len() == self.output.capacity() {
                self.output.reserve(32 * 1024);
            }

            let len = self.output.len();
            let cap = self.output.capacity();
            self.output.resize(cap, 0);
            let dst = &mut self.output[len..];

            let prior_in = self.decompressor.total_in();
            let prior_out = self.decompressor.total_out();

            let status = self
                .decompressor
                .decompress(&self.buffer[input_offset..], dst, FlushDecompress::Sync)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

            let written = (self.decompressor.total_out() - prior_out) as usize;
            let consumed = (self.decompressor.total_in() - prior_in) as usize;
            input_offset += consumed;
            self.output.truncate(len + written);

            match status {
                Status::Ok => {
                    if input_offset >= self.buffer.len() {
                        break;
                    }
                }
                Status::BufError => continue,
                Status::StreamEnd => break,
            }
        }

        Ok(())
    }

    /// Discard any partial buffer and re-initialize the inflate context.
    /// Required after every disconnect (§4.B) so a fresh connection starts
    /// from a clean zlib dictionary.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.output.clear();
        self.decompressor.reset(true);
    }
}

impl Default for StreamDecompressor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn compress_as_stream(messages: &[&str]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        let mut out = Vec::new();
        for msg in messages {
            encoder.write_all(msg.as_bytes()).unwrap();
            encoder.flush().unwrap();
        }
        out.extend_from_slice(encoder.finish().unwrap().as_slice());
        out
    }

    #[test]
    fn emits_nothing_before_the_marker() {
        let mut d = StreamDecompressor::new();
        let full = compress_as_stream(&["{\"op\":10}"]);
        // Feed everything except the trailing marker.
        let (head, _tail) = full.split_at(full.len() - 2);
        assert!(d.feed(head).unwrap().is_none());
    }

    #[test]
    fn emits_one_frame_per_marker() {
        let mut d = StreamDecompressor::new();
        let payload = r#"{"op":10,"d":{"heartbeat_interval":41250}}"#;
        let full = compress_as_stream(&[payload]);
        let out = d.feed(&full).unwrap().expect("frame should be complete");
        assert_eq!(out, payload.as_bytes());
    }

    #[test]
    fn tolerates_arbitrary_chunk_splits() {
        let payload = r#"{"t":"READY","s":1,"op":0,"d":{"v":9}}"#;
        let full = compress_as_stream(&[payload]);

        for split in 1..full.len() {
            let mut d = StreamDecompressor::new();
            let (a, b) = full.split_at(split);
            let first = d.feed(a).unwrap();
            if let Some(out) = first {
                assert_eq!(out, payload.as_bytes());
                continue;
            }
            let out = d.feed(b).unwrap().expect("frame should complete");
            assert_eq!(out, payload.as_bytes());
        }
    }

    #[test]
    fn reset_clears_buffered_state() {
        let mut d = StreamDecompressor::new();
        let full = compress_as_stream(&["{\"op\":10}"]);
        let (head, _) = full.split_at(full.len() - 2);
        d.feed(head).unwrap();
        d.reset();
        assert!(d.buffer.is_empty());
    }
}
