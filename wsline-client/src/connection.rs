//! Connection settings and transport establishment.

use crate::error::ClientError;
use crate::stream::ClientStream;
use crate::tls::create_tls_connector;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpStream;
use url::{Host, Url};
use wsline_core::{SocketConfig, DEFAULT_HIGH_WATER_MARK};
use wsline_protocol::DEFAULT_MAX_MESSAGE_SIZE;

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// TLS configuration for client connections.
#[derive(Debug, Clone, Default)]
pub struct TlsClientConfig {
    /// Use TLS even for a `ws://` URL.
    pub enabled: bool,
    /// Path to PEM-encoded CA certificate(s) for server verification.
    /// If None, the bundled web PKI roots are used.
    pub ca_cert_path: Option<PathBuf>,
    /// Path to PEM-encoded client certificate (for mTLS).
    pub client_cert_path: Option<PathBuf>,
    /// Path to PEM-encoded client private key (for mTLS).
    pub client_key_path: Option<PathBuf>,
    /// Skip server certificate verification (INSECURE - development only).
    pub insecure: bool,
    /// Server name for SNI (defaults to the URL host).
    pub server_name: Option<String>,
}

impl TlsClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self.enabled = true;
        self
    }

    pub fn with_client_cert(
        mut self,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert_path = Some(cert_path.into());
        self.client_key_path = Some(key_path.into());
        self.enabled = true;
        self
    }

    pub fn with_insecure(mut self) -> Self {
        self.insecure = true;
        self.enabled = true;
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }
}

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Target `ws://` or `wss://` URL.
    pub url: Url,
    /// Host to connect to, without IPv6 brackets.
    pub host: String,
    pub port: u16,
    /// Connection timeout (TCP and TLS).
    pub connect_timeout: Duration,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
    pub max_message_size: usize,
    pub high_water_mark: usize,
    /// Extra request headers, sent as-is (e.g. `Sec-WebSocket-Protocol`).
    pub headers: Vec<(String, String)>,
    /// TLS options. A `wss://` URL uses TLS even when this is `None`.
    pub tls: Option<TlsClientConfig>,
}

impl ConnectionConfig {
    /// Parses a `ws://` or `wss://` URL. Ports default to 80 and 443.
    pub fn new(url: &str) -> Result<Self, ClientError> {
        let url = Url::parse(url).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", url, e)))?;
        Self::from_url(url)
    }

    pub fn from_url(url: Url) -> Result<Self, ClientError> {
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(ClientError::InvalidUrl(format!(
                    "unsupported scheme {:?}, expected ws or wss",
                    other
                )))
            }
        }

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(ClientError::InvalidUrl(format!("{}: missing host", url))),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ClientError::InvalidUrl(format!("{}: missing port", url)))?;

        Ok(Self {
            url,
            host,
            port,
            connect_timeout: Duration::from_secs(10),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            headers: Vec::new(),
            tls: None,
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_high_water_mark(mut self, size: usize) -> Self {
        self.high_water_mark = size;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_tls(mut self, tls_config: TlsClientConfig) -> Self {
        self.tls = Some(tls_config);
        self
    }

    pub fn is_tls(&self) -> bool {
        self.url.scheme() == "wss" || self.tls.as_ref().is_some_and(|tls| tls.enabled)
    }

    /// Request target: path plus query.
    pub fn resource(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }

    /// Value of the `Host` header; the port is omitted when it is the default.
    pub fn host_header(&self) -> String {
        let host = self.url.host_str().unwrap_or(&self.host);
        match self.url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    pub fn socket_config(&self) -> SocketConfig {
        SocketConfig::default()
            .with_max_message_size(self.max_message_size)
            .with_high_water_mark(self.high_water_mark)
            .with_read_buffer_size(self.read_buffer_size)
    }
}

/// Opens the TCP connection and, for `wss`, completes the TLS handshake.
pub async fn open_stream(config: &ConnectionConfig) -> Result<ClientStream, ClientError> {
    tracing::debug!("Connecting to {}:{}...", config.host, config.port);

    let tcp_stream = tokio::time::timeout(
        config.connect_timeout,
        TcpStream::connect((config.host.as_str(), config.port)),
    )
    .await
    .map_err(|_| {
        tracing::debug!("Connection timeout");
        ClientError::Timeout
    })?
    .map_err(|e| {
        tracing::debug!("Connection failed: {}", e);
        ClientError::from(e)
    })?;

    // Small frames (control, echoes) should not wait for Nagle.
    tcp_stream.set_nodelay(true).ok();

    if !config.is_tls() {
        return Ok(ClientStream::Plain { stream: tcp_stream });
    }

    let tls_config = config.tls.clone().unwrap_or_default();
    let (connector, server_name) = create_tls_connector(&tls_config, &config.host)?;

    tracing::debug!("Performing TLS handshake...");
    let tls_stream = tokio::time::timeout(
        config.connect_timeout,
        connector.connect(server_name, tcp_stream),
    )
    .await
    .map_err(|_| ClientError::Timeout)?
    .map_err(|e| {
        tracing::debug!("TLS handshake failed: {}", e);
        ClientError::from(e)
    })?;

    tracing::debug!("TLS handshake complete");
    Ok(ClientStream::Tls { stream: tls_stream })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wsline_protocol::ErrorCode;

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::new("ws://example.com/chat").unwrap();
        assert_eq!(config.host, "example.com");
        assert_eq!(config.port, 80);
        assert!(!config.is_tls());
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
    }

    #[test]
    fn test_wss_defaults_to_tls_and_443() {
        let config = ConnectionConfig::new("wss://example.com").unwrap();
        assert_eq!(config.port, 443);
        assert!(config.is_tls());
        assert_eq!(config.resource(), "/");
        assert_eq!(config.host_header(), "example.com");
    }

    #[test]
    fn test_resource_and_host_header() {
        let config = ConnectionConfig::new("ws://127.0.0.1:9001/feed?room=a&x=1").unwrap();
        assert_eq!(config.port, 9001);
        assert_eq!(config.resource(), "/feed?room=a&x=1");
        assert_eq!(config.host_header(), "127.0.0.1:9001");
    }

    #[test]
    fn test_ipv6_host() {
        let config = ConnectionConfig::new("ws://[::1]:8080/").unwrap();
        assert_eq!(config.host, "::1");
        assert_eq!(config.host_header(), "[::1]:8080");
    }

    #[test]
    fn test_invalid_urls() {
        assert!(matches!(
            ConnectionConfig::new("http://example.com"),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(
            ConnectionConfig::new("not a url"),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_tls_enabled_for_ws_url() {
        let config = ConnectionConfig::new("ws://localhost:9001")
            .unwrap()
            .with_tls(TlsClientConfig::new().with_insecure());
        assert!(config.is_tls());
    }

    #[tokio::test]
    async fn test_tls_handshake_failure_is_network_error() {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
        });

        let config = ConnectionConfig::new(&format!("ws://{}/", addr))
            .unwrap()
            .with_tls(TlsClientConfig::new().with_insecure());
        match open_stream(&config).await {
            Err(err) => assert_eq!(err.code(), Some(ErrorCode::NetworkError)),
            Ok(_) => panic!("handshake with a plain TCP peer succeeded"),
        }
    }

    #[test]
    fn test_config_buffer_clamping() {
        let config = ConnectionConfig::new("ws://localhost")
            .unwrap()
            .with_read_buffer_size(100);
        assert_eq!(config.read_buffer_size, MIN_READ_BUFFER_SIZE);

        let config = ConnectionConfig::new("ws://localhost")
            .unwrap()
            .with_read_buffer_size(10 * 1024 * 1024);
        assert_eq!(config.read_buffer_size, MAX_READ_BUFFER_SIZE);
    }

    #[test]
    fn test_socket_config_follows_settings() {
        let config = ConnectionConfig::new("ws://localhost")
            .unwrap()
            .with_max_message_size(1024)
            .with_high_water_mark(4096)
            .with_header("Sec-WebSocket-Protocol", "chat");
        let socket = config.socket_config();
        assert_eq!(socket.max_message_size, 1024);
        assert_eq!(socket.high_water_mark, 4096);
        assert_eq!(config.headers.len(), 1);
    }
}
