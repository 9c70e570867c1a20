//! # wsline-client
//!
//! WebSocket client for wsline.
//!
//! This crate provides:
//! - `ws://` / `wss://` URL handling and connection settings
//! - TCP connect with optional TLS (custom CA, mTLS, SNI override)
//! - The HTTP/1.1 upgrade request and response verification
//! - Hand-off of the upgraded stream to a [`wsline_core::WebSocket`]

pub mod client;
pub mod connection;
pub mod error;
pub mod stream;
pub mod tls;

pub use client::{connect, Client};
pub use connection::{ConnectionConfig, TlsClientConfig};
pub use error::ClientError;
pub use wsline_core::{Event, Message, WebSocket, WebSocketReceiver, WebSocketSender};
