//! Incremental JSON message decoder for chunked responses.
//!
//! The controller writes one JSON object per state change. Transport chunks do
//! not line up with messages: a chunk may hold half a message or several.
//! The decoder buffers bytes and yields every complete top-level value.

use serde_json::Value;

use crate::error::DecodeError;

/// Upper bound for a single buffered, still-incomplete message
pub const MAX_PENDING_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug)]
pub struct JsonStreamDecoder {
    buffer: Vec<u8>,
    limit: usize,
}

impl Default for JsonStreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonStreamDecoder {
    pub fn new() -> Self {
        Self::with_limit(MAX_PENDING_BYTES)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            limit,
        }
    }

    /// Feed a transport chunk; returns the messages it completed, in order.
    ///
    /// Malformed segments are reported as errors and skipped up to the next
    /// `{` so the stream can resynchronize.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<Value, DecodeError>> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        let mut consumed = 0;

        while consumed < self.buffer.len() {
            let rest = &self.buffer[consumed..];
            let mut values = serde_json::Deserializer::from_slice(rest).into_iter::<Value>();
            match values.next() {
                // Only whitespace left
                None => consumed = self.buffer.len(),
                Some(Ok(value)) => {
                    consumed += values.byte_offset();
                    frames.push(Ok(value));
                }
                Some(Err(err)) if err.is_eof() => break,
                Some(Err(err)) => {
                    // Resume at the next byte that can open a message
                    let skip = rest
                        .iter()
                        .skip(1)
                        .position(|&b| b == b'{')
                        .map(|pos| pos + 1)
                        .unwrap_or(rest.len());
                    consumed += skip;
                    frames.push(Err(DecodeError::Syntax(err)));
                }
            }
        }

        self.buffer.drain(..consumed);

        if self.buffer.len() > self.limit {
            self.buffer.clear();
            frames.push(Err(DecodeError::Overflow { limit: self.limit }));
        }

        frames
    }

    /// Bytes of an incomplete message still waiting for more input
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
