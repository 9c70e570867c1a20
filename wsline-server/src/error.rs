//! Server error types.

use crate::config::ConfigError;
use thiserror::Error;
use wsline_protocol::WebSocketError;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    WebSocket(#[from] WebSocketError),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("server shutting down")]
    ShuttingDown,

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),
}
