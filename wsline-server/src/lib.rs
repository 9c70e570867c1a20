//! # wsline-server
//!
//! WebSocket server for wsline.
//!
//! This crate provides:
//! - TCP accept loop with a connection limit and optional TLS
//! - HTTP/1.1 upgrade handling (`101`, or `426`/`400` when refused)
//! - A per-socket [`Handler`] running application code
//! - YAML and environment configuration

pub mod config;
pub mod error;
pub mod server;
pub mod stream;
pub mod tls;

pub use config::{Config, ConfigError, NetworkConfig, TlsConfig, WebSocketConfig};
pub use error::ServerError;
pub use server::{Handler, Server, ServerConfig, ServerStats};
pub use wsline_core::{Event, Message, SocketConfig, WebSocket};
