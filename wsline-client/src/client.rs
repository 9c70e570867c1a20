//! Opening handshake over HTTP/1.1 and socket startup.

use crate::connection::{open_stream, ConnectionConfig};
use crate::error::ClientError;
use crate::stream::ClientStream;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, HOST};
use http::{Method, Request, StatusCode};
use http_body_util::Empty;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use wsline_core::{Connecting, WebSocket};
use wsline_protocol::{ClientHandshake, WebSocketError};

/// WebSocket client bound to one target URL.
#[derive(Debug, Clone)]
pub struct Client {
    config: ConnectionConfig,
}

impl Client {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Opens a new connection: TCP, optional TLS, then the upgrade request.
    ///
    /// Bytes the server sent right behind its `101` response are handed to
    /// the socket before anything else it reads.
    pub async fn connect(&self) -> Result<WebSocket, ClientError> {
        let connecting = Connecting::new(&self.config.socket_config());

        match self.handshake().await {
            Ok((stream, read_ahead)) => {
                tracing::debug!(
                    "{} upgraded ({} bytes read ahead)",
                    self.config.url,
                    read_ahead.len()
                );
                Ok(connecting.attach(stream, read_ahead).await?)
            }
            Err(ClientError::WebSocket(err)) => Err(connecting.abort(err).await.into()),
            Err(err) => {
                connecting.abort(WebSocketError::connection_closed()).await;
                Err(err)
            }
        }
    }

    async fn handshake(&self) -> Result<(ClientStream, Bytes), ClientError> {
        let stream = open_stream(&self.config).await?;

        let (mut sender, conn) = http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.with_upgrades().await {
                tracing::debug!("HTTP connection error: {}", e);
            }
        });

        let handshake = ClientHandshake::new();
        let request = self.build_request(&handshake)?;

        tracing::debug!("Sending upgrade request for {}", self.config.resource());
        let mut response = sender.send_request(request).await?;

        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            return Err(ClientError::UnexpectedStatus(response.status().as_u16()));
        }
        handshake.verify(response.headers())?;

        let upgraded = hyper::upgrade::on(&mut response).await?;
        let parts = upgraded
            .downcast::<TokioIo<ClientStream>>()
            .map_err(|_| ClientError::InvalidRequest("upgraded stream has unexpected type".into()))?;

        Ok((parts.io.into_inner(), parts.read_buf))
    }

    fn build_request(&self, handshake: &ClientHandshake) -> Result<Request<Empty<Bytes>>, ClientError> {
        let mut request = Request::builder()
            .method(Method::GET)
            .uri(self.config.resource())
            .header(HOST, self.config.host_header())
            .body(Empty::new())
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;

        let headers = request.headers_mut();
        for (name, value) in &self.config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ClientError::InvalidRequest(format!("header {:?}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ClientError::InvalidRequest(format!("header {:?}: {}", name, e)))?;
            headers.append(name, value);
        }
        handshake.apply(headers)?;

        Ok(request)
    }
}

/// Connects to a `ws://` or `wss://` URL with default settings.
pub async fn connect(url: &str) -> Result<WebSocket, ClientError> {
    Client::new(ConnectionConfig::new(url)?).connect().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use wsline_core::Message;
    use wsline_protocol::{accept_key, ErrorCode, Frame};

    /// Reads an HTTP request head and returns its `Sec-WebSocket-Key`.
    async fn read_request(stream: &mut TcpStream) -> (String, String) {
        let mut buf = BytesMut::new();
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            assert!(stream.read_buf(&mut buf).await.unwrap() > 0);
        }
        let head = String::from_utf8(buf.to_vec()).unwrap();
        let key = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("sec-websocket-key")
                    .then(|| value.trim().to_string())
            })
            .unwrap();
        (head, key)
    }

    /// Serves one connection: answers with `respond(key)` and returns the request head.
    async fn serve_once(
        respond: impl FnOnce(&str) -> Vec<u8> + Send + 'static,
    ) -> (String, tokio::task::JoinHandle<(String, TcpStream)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/chat?room=1", listener.local_addr().unwrap());

        let task = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let (head, key) = read_request(&mut stream).await;
            stream.write_all(&respond(&key)).await.unwrap();
            (head, stream)
        });
        (url, task)
    }

    fn switching(accept: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            accept
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn test_read_ahead_delivered_first() {
        let (url, server) = serve_once(|key| {
            let mut response = switching(&accept_key(key));
            response.extend_from_slice(&Frame::text("welcome").encode().unwrap());
            response
        })
        .await;

        let config = ConnectionConfig::new(&url)
            .unwrap()
            .with_header("Sec-WebSocket-Protocol", "chat");
        let mut socket = Client::new(config).connect().await.unwrap();

        let message = socket.next_message().await.unwrap().unwrap();
        assert_eq!(message, Message::text("welcome"));

        let (head, _stream) = server.await.unwrap();
        assert!(head.starts_with("GET /chat?room=1 HTTP/1.1\r\n"));
        let lower = head.to_ascii_lowercase();
        assert!(lower.contains("upgrade: websocket"));
        assert!(lower.contains("sec-websocket-version: 13"));
        assert!(lower.contains("sec-websocket-protocol: chat"));
    }

    #[tokio::test]
    async fn test_wrong_accept_rejected() {
        let (url, _server) = serve_once(|_| switching("AAAAAAAAAAAAAAAAAAAAAAAAAAA=")).await;

        let err = connect(&url).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidAcceptHeader));
    }

    #[tokio::test]
    async fn test_non_upgrade_response_rejected() {
        let (url, _server) = serve_once(|_| {
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n".to_vec()
        })
        .await;

        let err = connect(&url).await.unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedStatus(404)));
    }

    #[tokio::test]
    async fn test_connect_refused_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect(&format!("ws://{}", addr)).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NetworkError));
    }
}
