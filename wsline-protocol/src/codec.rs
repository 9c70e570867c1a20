//! Receive buffer for incoming frames.

use crate::error::WebSocketError;
use crate::frame::Frame;
use crate::{Result, DEFAULT_MAX_MESSAGE_SIZE};
use bytes::BytesMut;

/// Accumulates transport bytes and extracts whole frames from the head.
///
/// Bytes that do not yet form a complete frame stay buffered until the next
/// [`Decoder::extend`]. Decoded payloads share memory with this buffer.
pub struct Decoder {
    buffer: BytesMut,
    max_frame_size: usize,
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Creates a decoder that rejects frames announcing more than
    /// `max_frame_size` payload bytes.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            max_frame_size,
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next frame from the buffer.
    ///
    /// `Ok(None)` means the buffer holds a partial frame (or nothing).
    pub fn decode_frame(&mut self) -> Result<Option<Frame>> {
        Frame::decode_with_limit(&mut self.buffer, self.max_frame_size)
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Checks that `size` bytes fit in a single message.
    pub fn check_message_size(&self, size: usize) -> Result<()> {
        if size > self.max_frame_size {
            return Err(WebSocketError::message_too_large(
                size as u64,
                self.max_frame_size,
            ));
        }
        Ok(())
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
