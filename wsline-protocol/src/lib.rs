//! # wsline-protocol
//!
//! Wire protocol implementation for wsline (RFC 6455 WebSocket).
//!
//! This crate provides:
//! - Binary frame encoding/decoding with the three payload length classes
//! - A receive buffer that tolerates partial reads
//! - Opening handshake key generation, validation and accept digest
//! - Error kinds and RFC close status codes
//!
//! Nothing in here performs I/O; see `wsline-core` for the connection engine.

pub mod codec;
pub mod error;
pub mod frame;
pub mod handshake;

pub use codec::Decoder;
pub use error::{status, ErrorCode, WebSocketError};
pub use frame::{Frame, OpCode};
pub use handshake::{accept_key, generate_key, ClientHandshake, ServerHandshake, GUID};

/// Protocol version sent in `Sec-WebSocket-Version`.
pub const WEBSOCKET_VERSION: u16 = 13;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Upper bound (exclusive) for the high 32-bit word of a 64-bit payload length.
///
/// Keeps every accepted length below 2^53.
pub const MAX_PAYLOAD_HIGH_WORD: u32 = 0x20_0000;

/// Default ceiling for a single (possibly reassembled) message: 64 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

pub type Result<T, E = WebSocketError> = std::result::Result<T, E>;
