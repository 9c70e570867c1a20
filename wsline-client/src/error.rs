//! Client error types.

use std::io;
use thiserror::Error;
use wsline_protocol::{ErrorCode, WebSocketError};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    WebSocket(#[from] WebSocketError),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("connect timeout")]
    Timeout,

    #[error("server answered {0} instead of 101 Switching Protocols")]
    UnexpectedStatus(u16),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),
}

impl ClientError {
    /// Returns the WebSocket error kind, if this error has one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ClientError::WebSocket(err) => Some(err.code()),
            _ => None,
        }
    }
}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self {
        ClientError::WebSocket(WebSocketError::network(err))
    }
}

impl From<hyper::Error> for ClientError {
    fn from(err: hyper::Error) -> Self {
        io::Error::other(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_is_network_error() {
        let err: ClientError = io::Error::new(io::ErrorKind::ConnectionRefused, "refused").into();
        assert_eq!(err.code(), Some(ErrorCode::NetworkError));
        assert!(err.to_string().starts_with("NETWORK_ERROR"));
    }

    #[test]
    fn test_non_protocol_errors_have_no_code() {
        assert_eq!(ClientError::Timeout.code(), None);
        assert!(ClientError::UnexpectedStatus(404).to_string().contains("404"));
    }
}
