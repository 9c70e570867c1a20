//! WebSocket error kinds and close status codes.

use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Close status codes surfaced with errors.
///
/// See RFC 6455 section 7.4.1.
pub mod status {
    /// Normal closure.
    pub const NORMAL_CLOSURE: u16 = 1000;
    /// The endpoint is going away, e.g. a server shutting down.
    pub const GOING_AWAY: u16 = 1001;
    /// The peer violated the protocol.
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Closed without a close frame. Never sent on the wire.
    pub const ABNORMAL_CLOSURE: u16 = 1006;
    /// A message was too big to process.
    pub const MESSAGE_TOO_LARGE: u16 = 1009;

    /// Returns whether `code` may appear in a close frame on the wire.
    ///
    /// 1005, 1006 and 1015 are reserved for local reporting only.
    pub fn is_sendable(code: u16) -> bool {
        matches!(code, 1000..=1003 | 1007..=1014 | 3000..=4999)
    }
}

/// Errors produced by the codec, the connection engine and the handshake.
///
/// Every protocol and usage error is terminal for the connection it occurred on.
#[derive(Debug, Clone, Error)]
pub enum WebSocketError {
    #[error("EXPECTED_MASK: {0}")]
    ExpectedMask(String),

    #[error("UNEXPECTED_MASK: {0}")]
    UnexpectedMask(String),

    #[error("INVALID_RESERVED_BITS: {0}")]
    InvalidReservedBits(String),

    #[error("UNEXPECTED_CONTINUATION: {0}")]
    UnexpectedContinuation(String),

    #[error("EXPECTED_CONTINUATION: {0}")]
    ExpectedContinuation(String),

    #[error("UNEXPECTED_CONTROL: {0}")]
    UnexpectedControl(String),

    #[error("INVALID_OPCODE: {0}")]
    InvalidOpcode(String),

    #[error("INVALID_PAYLOAD_LENGTH: {0}")]
    InvalidPayloadLength(String),

    #[error("MESSAGE_TOO_LARGE: {size} bytes (max {max})")]
    MessageTooLarge { size: u64, max: usize },

    #[error("INVALID_UPGRADE_HEADER: {0}")]
    InvalidUpgradeHeader(String),

    #[error("INVALID_VERSION_HEADER: {0}")]
    InvalidVersionHeader(String),

    #[error("INVALID_KEY_HEADER: {0}")]
    InvalidKeyHeader(String),

    #[error("INVALID_ACCEPT_HEADER: {0}")]
    InvalidAcceptHeader(String),

    #[error("NETWORK_ERROR: {message}")]
    Network {
        message: String,
        #[source]
        cause: Arc<io::Error>,
    },

    #[error("NOT_CONNECTED: {0}")]
    NotConnected(String),

    #[error("WRITE_PENDING: {0}")]
    WritePending(String),

    #[error("CONNECTION_CLOSED: {0}")]
    ConnectionClosed(String),
}

impl WebSocketError {
    pub fn expected_mask() -> Self {
        Self::ExpectedMask("MASK must be set".into())
    }

    pub fn unexpected_mask() -> Self {
        Self::UnexpectedMask("MASK must be unset".into())
    }

    pub fn invalid_reserved_bits(bits: u8) -> Self {
        Self::InvalidReservedBits(format!("RSV bits must be unset, got {:#05b}", bits))
    }

    pub fn unexpected_continuation() -> Self {
        Self::UnexpectedContinuation("no fragmented message in progress".into())
    }

    pub fn expected_continuation() -> Self {
        Self::ExpectedContinuation("fragmented message in progress".into())
    }

    pub fn unexpected_control() -> Self {
        Self::UnexpectedControl("control frames must not be fragmented".into())
    }

    pub fn invalid_opcode(opcode: u8) -> Self {
        Self::InvalidOpcode(format!("invalid opcode {:#x}", opcode))
    }

    pub fn invalid_payload_length() -> Self {
        Self::InvalidPayloadLength("Invalid payload length".into())
    }

    pub fn message_too_large(size: u64, max: usize) -> Self {
        Self::MessageTooLarge { size, max }
    }

    pub fn invalid_upgrade_header() -> Self {
        Self::InvalidUpgradeHeader("Invalid Upgrade header".into())
    }

    pub fn invalid_version_header() -> Self {
        Self::InvalidVersionHeader("Invalid Sec-WebSocket-Version header".into())
    }

    pub fn invalid_key_header() -> Self {
        Self::InvalidKeyHeader("Invalid Sec-WebSocket-Key header".into())
    }

    pub fn invalid_accept_header() -> Self {
        Self::InvalidAcceptHeader("Invalid Sec-WebSocket-Accept header".into())
    }

    /// Wraps a transport failure, keeping the original cause attached.
    pub fn network(cause: io::Error) -> Self {
        Self::Network {
            message: cause.to_string(),
            cause: Arc::new(cause),
        }
    }

    pub fn not_connected() -> Self {
        Self::NotConnected("no transport attached".into())
    }

    pub fn write_pending() -> Self {
        Self::WritePending("a data write is already awaiting drain".into())
    }

    pub fn connection_closed() -> Self {
        Self::ConnectionClosed("connection destroyed".into())
    }

    /// Returns the stable kind of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ExpectedMask(_) => ErrorCode::ExpectedMask,
            Self::UnexpectedMask(_) => ErrorCode::UnexpectedMask,
            Self::InvalidReservedBits(_) => ErrorCode::InvalidReservedBits,
            Self::UnexpectedContinuation(_) => ErrorCode::UnexpectedContinuation,
            Self::ExpectedContinuation(_) => ErrorCode::ExpectedContinuation,
            Self::UnexpectedControl(_) => ErrorCode::UnexpectedControl,
            Self::InvalidOpcode(_) => ErrorCode::InvalidOpcode,
            Self::InvalidPayloadLength(_) => ErrorCode::InvalidPayloadLength,
            Self::MessageTooLarge { .. } => ErrorCode::MessageTooLarge,
            Self::InvalidUpgradeHeader(_) => ErrorCode::InvalidUpgradeHeader,
            Self::InvalidVersionHeader(_) => ErrorCode::InvalidVersionHeader,
            Self::InvalidKeyHeader(_) => ErrorCode::InvalidKeyHeader,
            Self::InvalidAcceptHeader(_) => ErrorCode::InvalidAcceptHeader,
            Self::Network { .. } => ErrorCode::NetworkError,
            Self::NotConnected(_) => ErrorCode::NotConnected,
            Self::WritePending(_) => ErrorCode::WritePending,
            Self::ConnectionClosed(_) => ErrorCode::ConnectionClosed,
        }
    }

    /// Returns the close status to report for this error.
    pub fn status(&self) -> u16 {
        self.code().status()
    }

    /// Returns whether the peer is at fault.
    pub fn is_protocol_violation(&self) -> bool {
        self.status() != status::ABNORMAL_CLOSURE
    }
}

/// Stable error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Framing
    ExpectedMask,
    UnexpectedMask,
    InvalidReservedBits,
    UnexpectedContinuation,
    ExpectedContinuation,
    UnexpectedControl,
    InvalidOpcode,
    InvalidPayloadLength,
    MessageTooLarge,

    // Handshake
    InvalidUpgradeHeader,
    InvalidVersionHeader,
    InvalidKeyHeader,
    InvalidAcceptHeader,

    // Transport and usage
    NetworkError,
    NotConnected,
    WritePending,
    ConnectionClosed,
}

impl ErrorCode {
    /// Maps the kind to its RFC 6455 close status.
    pub fn status(&self) -> u16 {
        match self {
            ErrorCode::InvalidPayloadLength | ErrorCode::MessageTooLarge => {
                status::MESSAGE_TOO_LARGE
            }
            ErrorCode::NetworkError
            | ErrorCode::NotConnected
            | ErrorCode::WritePending
            | ErrorCode::ConnectionClosed => status::ABNORMAL_CLOSURE,
            _ => status::PROTOCOL_ERROR,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::ExpectedMask => "EXPECTED_MASK",
            ErrorCode::UnexpectedMask => "UNEXPECTED_MASK",
            ErrorCode::InvalidReservedBits => "INVALID_RESERVED_BITS",
            ErrorCode::UnexpectedContinuation => "UNEXPECTED_CONTINUATION",
            ErrorCode::ExpectedContinuation => "EXPECTED_CONTINUATION",
            ErrorCode::UnexpectedControl => "UNEXPECTED_CONTROL",
            ErrorCode::InvalidOpcode => "INVALID_OPCODE",
            ErrorCode::InvalidPayloadLength => "INVALID_PAYLOAD_LENGTH",
            ErrorCode::MessageTooLarge => "MESSAGE_TOO_LARGE",
            ErrorCode::InvalidUpgradeHeader => "INVALID_UPGRADE_HEADER",
            ErrorCode::InvalidVersionHeader => "INVALID_VERSION_HEADER",
            ErrorCode::InvalidKeyHeader => "INVALID_KEY_HEADER",
            ErrorCode::InvalidAcceptHeader => "INVALID_ACCEPT_HEADER",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::NotConnected => "NOT_CONNECTED",
            ErrorCode::WritePending => "WRITE_PENDING",
            ErrorCode::ConnectionClosed => "CONNECTION_CLOSED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_status_mapping() {
        assert_eq!(WebSocketError::expected_mask().status(), 1002);
        assert_eq!(WebSocketError::unexpected_mask().status(), 1002);
        assert_eq!(WebSocketError::invalid_opcode(0x3).status(), 1002);
        assert_eq!(WebSocketError::invalid_key_header().status(), 1002);
        assert_eq!(WebSocketError::invalid_payload_length().status(), 1009);
        assert_eq!(WebSocketError::message_too_large(10, 5).status(), 1009);
        assert_eq!(WebSocketError::not_connected().status(), 1006);
    }

    #[test]
    fn test_local_only_status_not_sendable() {
        assert!(status::is_sendable(status::NORMAL_CLOSURE));
        assert!(status::is_sendable(status::GOING_AWAY));
        assert!(status::is_sendable(4000));
        assert!(!status::is_sendable(1005));
        assert!(!status::is_sendable(status::ABNORMAL_CLOSURE));
        assert!(!status::is_sendable(1015));
        assert!(!status::is_sendable(999));
    }

    #[test]
    fn test_protocol_violation() {
        assert!(WebSocketError::expected_continuation().is_protocol_violation());
        assert!(WebSocketError::invalid_accept_header().is_protocol_violation());
        assert!(!WebSocketError::write_pending().is_protocol_violation());
        assert!(!WebSocketError::network(io::Error::other("reset")).is_protocol_violation());
    }

    #[test]
    fn test_error_display_carries_code() {
        let err = WebSocketError::expected_mask();
        assert_eq!(err.to_string(), "EXPECTED_MASK: MASK must be set");

        let err = WebSocketError::invalid_opcode(0xB);
        assert!(err.to_string().starts_with("INVALID_OPCODE"));
        assert!(err.to_string().contains("0xb"));

        let err = WebSocketError::message_too_large(2048, 1024);
        assert!(err.to_string().contains("2048"));
        assert!(err.to_string().contains("1024"));
    }

    #[test]
    fn test_network_error_keeps_cause() {
        let err = WebSocketError::network(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert_eq!(err.code(), ErrorCode::NetworkError);
        assert!(err.to_string().contains("refused"));

        let source = err.source().expect("cause attached");
        assert!(source.to_string().contains("refused"));
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::ExpectedMask.to_string(), "EXPECTED_MASK");
        assert_eq!(
            ErrorCode::UnexpectedContinuation.to_string(),
            "UNEXPECTED_CONTINUATION"
        );
        assert_eq!(ErrorCode::NetworkError.to_string(), "NETWORK_ERROR");
        assert_eq!(
            WebSocketError::invalid_version_header().code().to_string(),
            "INVALID_VERSION_HEADER"
        );
    }

    #[test]
    fn test_error_is_cloneable() {
        let err = WebSocketError::network(io::Error::other("boom"));
        let copy = err.clone();
        assert_eq!(copy.code(), err.code());
        assert_eq!(copy.to_string(), err.to_string());
    }
}
