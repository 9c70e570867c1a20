//! # wsline-core
//!
//! Connection engine for wsline.
//!
//! This crate provides:
//! - A sans-I/O per-connection state machine ([`Connection`])
//! - Fragment reassembly, control frame handling and masking rules
//! - Close sequencing and teardown with pending-operation resolution
//! - A tokio adapter that drives the engine over any async stream ([`WebSocket`])

pub mod engine;
pub mod socket;

pub use engine::{
    Completion, Connection, EngineConfig, Handler, MessageKind, ReadyState, Role, Transport,
};
pub use socket::{
    Connecting, Event, Message, SocketConfig, WebSocket, WebSocketReceiver, WebSocketSender,
    DEFAULT_HIGH_WATER_MARK, DEFAULT_READ_BUFFER_SIZE,
};
pub use wsline_protocol::{ErrorCode, WebSocketError};
