//! Binary frame format (RFC 6455 section 5.2).
//!
//! ```text
//!  0                   1                   2                   3
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| payload len |    extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |            (16/64)            |
//! |N|V|V|V|       |S|             |  (if payload len == 126/127)  |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |  extended payload length continued, if payload len == 127     |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               | masking key, if MASK set      |
//! +-------------------------------+-------------------------------+
//! | masking key (continued)       |          payload data         |
//! +-------------------------------+ - - - - - - - - - - - - - - - +
//! ```

use crate::error::WebSocketError;
use crate::{Result, MAX_PAYLOAD_HIGH_WORD};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const FIN: u8 = 0b1000_0000;
const RSV1: u8 = 0b0100_0000;
const RSV2: u8 = 0b0010_0000;
const RSV3: u8 = 0b0001_0000;
const OPCODE: u8 = 0b0000_1111;
const MASK: u8 = 0b1000_0000;
const LENGTH: u8 = 0b0111_1111;

/// Largest length encoded directly in the 7-bit field.
const SMALL_LENGTH: usize = 125;
/// Marker for a 16-bit extended length.
const LENGTH_16: u8 = 126;
/// Marker for a 64-bit extended length.
const LENGTH_64: u8 = 127;

/// Frame opcode (RFC 6455 section 11.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    /// Any value RFC 6455 leaves reserved.
    Reserved(u8),
}

impl OpCode {
    pub fn as_u8(&self) -> u8 {
        match self {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
            OpCode::Reserved(op) => *op & OPCODE,
        }
    }

    /// Control opcodes have the high bit of the nibble set.
    pub fn is_control(&self) -> bool {
        self.as_u8() & 0x8 != 0
    }
}

impl From<u8> for OpCode {
    fn from(value: u8) -> Self {
        match value & OPCODE {
            0x0 => OpCode::Continuation,
            0x1 => OpCode::Text,
            0x2 => OpCode::Binary,
            0x8 => OpCode::Close,
            0x9 => OpCode::Ping,
            0xA => OpCode::Pong,
            op => OpCode::Reserved(op),
        }
    }
}

/// A single WebSocket frame.
///
/// A decoded frame's payload is already unmasked and shares memory with the
/// buffer it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub rsv1: bool,
    pub rsv2: bool,
    pub rsv3: bool,
    pub opcode: OpCode,
    /// Masking key. Required client-to-server, forbidden server-to-client.
    pub mask: Option<[u8; 4]>,
    pub payload: Bytes,
}

impl Frame {
    /// Creates a final, unmasked frame.
    pub fn new(opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            mask: None,
            payload: payload.into(),
        }
    }

    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Text, payload)
    }

    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Binary, payload)
    }

    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Ping, payload)
    }

    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Pong, payload)
    }

    /// Creates a close frame, optionally carrying a status code and reason.
    pub fn close(status: Option<u16>, reason: &str) -> Self {
        let payload = match status {
            Some(code) => {
                let mut buf = BytesMut::with_capacity(2 + reason.len());
                buf.put_u16(code);
                buf.put_slice(reason.as_bytes());
                buf.freeze()
            }
            None => Bytes::new(),
        };
        Self::new(OpCode::Close, payload)
    }

    pub fn with_fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }

    pub fn with_mask(mut self, mask: [u8; 4]) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Masks the frame with 4 fresh bytes from a cryptographically secure RNG.
    pub fn with_random_mask(self) -> Self {
        self.with_mask(rand::random())
    }

    /// Returns the reserved bits packed as `RSV1 RSV2 RSV3`.
    pub fn rsv_bits(&self) -> u8 {
        (u8::from(self.rsv1) << 2) | (u8::from(self.rsv2) << 1) | u8::from(self.rsv3)
    }

    pub fn is_control(&self) -> bool {
        self.opcode.is_control()
    }

    /// Returns the status code of a close frame, if it carries one.
    pub fn close_status(&self) -> Option<u16> {
        if self.opcode != OpCode::Close || self.payload.len() < 2 {
            return None;
        }
        Some(u16::from_be_bytes([self.payload[0], self.payload[1]]))
    }

    /// Returns the number of bytes [`Frame::encode`] produces.
    pub fn encoded_len(&self) -> usize {
        let len = self.payload.len();
        let length_field = if len <= SMALL_LENGTH {
            1
        } else if len <= u16::MAX as usize {
            3
        } else {
            9
        };
        let mask = if self.mask.is_some() { 4 } else { 0 };
        1 + length_field + mask + len
    }

    /// Encodes the frame into a new buffer.
    pub fn encode(&self) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_to(&mut buf)?;
        Ok(buf)
    }

    /// Appends the encoded frame to `buf`.
    pub fn encode_to(&self, buf: &mut BytesMut) -> Result<()> {
        let len = self.payload.len();
        if ((len as u64) >> 32) as u32 >= MAX_PAYLOAD_HIGH_WORD {
            return Err(WebSocketError::invalid_payload_length());
        }

        buf.reserve(self.encoded_len());

        let mut b0 = self.opcode.as_u8() & OPCODE;
        if self.fin {
            b0 |= FIN;
        }
        if self.rsv1 {
            b0 |= RSV1;
        }
        if self.rsv2 {
            b0 |= RSV2;
        }
        if self.rsv3 {
            b0 |= RSV3;
        }
        buf.put_u8(b0);

        let mask_bit = if self.mask.is_some() { MASK } else { 0 };
        if len <= SMALL_LENGTH {
            buf.put_u8(mask_bit | len as u8);
        } else if len <= u16::MAX as usize {
            buf.put_u8(mask_bit | LENGTH_16);
            buf.put_u16(len as u16);
        } else {
            buf.put_u8(mask_bit | LENGTH_64);
            buf.put_u64(len as u64);
        }

        match self.mask {
            Some(mask) => {
                buf.put_slice(&mask);
                let start = buf.len();
                buf.put_slice(&self.payload);
                apply_mask(&mut buf[start..], mask);
            }
            None => buf.put_slice(&self.payload),
        }

        Ok(())
    }

    /// Decodes one frame from the head of `buf`.
    ///
    /// Returns `Ok(Some(frame))` and consumes the frame's bytes if a complete
    /// frame was available, `Ok(None)` without consuming anything if more data
    /// is needed, or `Err` on protocol errors.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>> {
        Self::decode_with_limit(buf, usize::MAX)
    }

    /// Like [`Frame::decode`], rejecting frames whose header announces more
    /// than `max_payload` bytes before any of the payload arrives.
    pub fn decode_with_limit(buf: &mut BytesMut, max_payload: usize) -> Result<Option<Self>> {
        if buf.len() < 2 {
            return Ok(None);
        }

        let b0 = buf[0];
        let b1 = buf[1];
        let mut offset = 2;

        let length = match b1 & LENGTH {
            LENGTH_16 => {
                if buf.len() < offset + 2 {
                    return Ok(None);
                }
                let len = u16::from_be_bytes([buf[2], buf[3]]) as u64;
                offset += 2;
                len
            }
            LENGTH_64 => {
                if buf.len() < offset + 8 {
                    return Ok(None);
                }
                let high = u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]);
                if high >= MAX_PAYLOAD_HIGH_WORD {
                    return Err(WebSocketError::invalid_payload_length());
                }
                let low = u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]);
                offset += 8;
                (u64::from(high) << 32) | u64::from(low)
            }
            len => u64::from(len),
        };

        if length > max_payload as u64 {
            return Err(WebSocketError::message_too_large(length, max_payload));
        }
        let length =
            usize::try_from(length).map_err(|_| WebSocketError::invalid_payload_length())?;

        let mask = if b1 & MASK != 0 {
            if buf.len() < offset + 4 {
                return Ok(None);
            }
            let key = [
                buf[offset],
                buf[offset + 1],
                buf[offset + 2],
                buf[offset + 3],
            ];
            offset += 4;
            Some(key)
        } else {
            None
        };

        if buf.len() - offset < length {
            return Ok(None);
        }

        buf.advance(offset);
        let mut payload = buf.split_to(length);
        if let Some(key) = mask {
            apply_mask(&mut payload, key);
        }

        Ok(Some(Self {
            fin: b0 & FIN != 0,
            rsv1: b0 & RSV1 != 0,
            rsv2: b0 & RSV2 != 0,
            rsv3: b0 & RSV3 != 0,
            opcode: OpCode::from(b0),
            mask,
            payload: payload.freeze(),
        }))
    }
}

/// XORs `data` in place with the 4-byte `mask`, byte `i` with `mask[i % 4]`.
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i & 3];
    }
}
