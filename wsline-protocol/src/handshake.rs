//! Opening handshake (RFC 6455 sections 4.1 and 4.2).
//!
//! Only the WebSocket-specific headers are handled here; carrying them over
//! HTTP/1.1 is left to the caller.

use crate::error::WebSocketError;
use crate::{Result, WEBSOCKET_VERSION};
use base64::prelude::*;
use http::header::{
    HeaderMap, HeaderName, HeaderValue, CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_VERSION, UPGRADE,
};
use sha1::{Digest, Sha1};

/// Magic string appended to the client key before hashing.
pub const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Generates a `Sec-WebSocket-Key`: 16 random bytes, base64 encoded.
pub fn generate_key() -> String {
    let nonce: [u8; 16] = rand::random();
    BASE64_STANDARD.encode(nonce)
}

/// Computes `Sec-WebSocket-Accept` for a client key: base64(SHA-1(key ++ GUID)).
pub fn accept_key(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(GUID.as_bytes());
    BASE64_STANDARD.encode(sha1.finalize())
}

/// Returns whether `key` is exactly 22 base64 characters followed by `==`.
pub fn is_valid_key(key: &str) -> bool {
    let bytes = key.as_bytes();
    bytes.len() == 24
        && bytes.ends_with(b"==")
        && bytes[..22]
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || *b == b'+' || *b == b'/')
}

/// Returns whether the request asks for a protocol upgrade at all.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers.contains_key(UPGRADE)
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

fn check_upgrade(headers: &HeaderMap) -> Result<()> {
    match header_str(headers, UPGRADE) {
        Some(value) if value.eq_ignore_ascii_case("websocket") => Ok(()),
        _ => Err(WebSocketError::invalid_upgrade_header()),
    }
}

/// Client side of the handshake. Holds the key until the response arrives.
#[derive(Debug, Clone)]
pub struct ClientHandshake {
    key: String,
}

impl ClientHandshake {
    pub fn new() -> Self {
        Self::with_key(generate_key())
    }

    pub fn with_key(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Adds the upgrade headers to an outbound request.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<()> {
        let key =
            HeaderValue::from_str(&self.key).map_err(|_| WebSocketError::invalid_key_header())?;

        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(SEC_WEBSOCKET_VERSION, HeaderValue::from(WEBSOCKET_VERSION));
        headers.insert(SEC_WEBSOCKET_KEY, key);
        Ok(())
    }

    /// Validates the headers of the `101` response.
    pub fn verify(&self, headers: &HeaderMap) -> Result<()> {
        check_upgrade(headers)?;

        let expected = accept_key(&self.key);
        match header_str(headers, SEC_WEBSOCKET_ACCEPT) {
            Some(accept) if accept == expected => Ok(()),
            _ => Err(WebSocketError::invalid_accept_header()),
        }
    }
}

impl Default for ClientHandshake {
    fn default() -> Self {
        Self::new()
    }
}

/// Server side of the handshake: a validated request and its accept digest.
#[derive(Debug, Clone)]
pub struct ServerHandshake {
    accept: String,
}

impl ServerHandshake {
    /// Validates an upgrade request's headers.
    pub fn validate(headers: &HeaderMap) -> Result<Self> {
        check_upgrade(headers)?;

        let version = header_str(headers, SEC_WEBSOCKET_VERSION)
            .and_then(|v| v.parse::<u16>().ok())
            .ok_or_else(WebSocketError::invalid_version_header)?;
        if version != 8 && version != WEBSOCKET_VERSION {
            return Err(WebSocketError::invalid_version_header());
        }

        let key = header_str(headers, SEC_WEBSOCKET_KEY)
            .filter(|key| is_valid_key(key))
            .ok_or_else(WebSocketError::invalid_key_header)?;

        Ok(Self {
            accept: accept_key(key),
        })
    }

    pub fn accept(&self) -> &str {
        &self.accept
    }

    /// Adds the headers of the `101` response.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<()> {
        let accept = HeaderValue::from_str(&self.accept)
            .map_err(|_| WebSocketError::invalid_accept_header())?;

        headers.insert(UPGRADE, HeaderValue::from_static("WebSocket"));
        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(SEC_WEBSOCKET_ACCEPT, accept);
        Ok(())
    }
}
