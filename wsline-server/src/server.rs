//! TCP server with HTTP/1.1 upgrade to WebSocket.

use crate::error::ServerError;
use crate::stream::MaybeTlsStream;
use bytes::Bytes;
use http::header::{HeaderValue, CONNECTION, CONTENT_TYPE, UPGRADE};
use http::{Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use wsline_core::{SocketConfig, WebSocket};
use wsline_protocol::handshake::is_upgrade_request;
use wsline_protocol::{status, ServerHandshake, WebSocketError};

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Limits applied to every upgraded socket.
    pub socket: SocketConfig,
    /// TLS acceptor (if TLS is enabled).
    pub tls_acceptor: Option<Arc<TlsAcceptor>>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("max_connections", &self.max_connections)
            .field("socket", &self.socket)
            .field("tls_enabled", &self.tls_acceptor.is_some())
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], crate::config::DEFAULT_PORT)),
            max_connections: 1000,
            socket: SocketConfig::default(),
            tls_acceptor: None,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            bind_addr: config.network.bind_addr,
            max_connections: config.network.max_connections,
            socket: config.websocket.socket_config(),
            tls_acceptor: None,
        }
    }

    pub fn with_socket_config(mut self, socket: SocketConfig) -> Self {
        self.socket = socket;
        self
    }

    /// Sets the TLS acceptor.
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls_acceptor = Some(Arc::new(acceptor));
        self
    }

    /// Returns whether TLS is enabled.
    pub fn tls_enabled(&self) -> bool {
        self.tls_acceptor.is_some()
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub upgrades_total: AtomicU64,
    /// Requests answered with 4xx instead of an upgrade.
    pub rejected_total: AtomicU64,
    pub errors_total: AtomicU64,
}

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Application code run for every upgraded socket.
///
/// Implemented for any `Fn(WebSocket, SocketAddr) -> impl Future<Output = ()>`.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, socket: WebSocket, peer: SocketAddr) -> BoxFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(WebSocket, SocketAddr) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn call(&self, socket: WebSocket, peer: SocketAddr) -> BoxFuture {
        Box::pin(self(socket, peer))
    }
}

/// State every connection task needs.
struct Shared {
    socket: SocketConfig,
    handler: Arc<dyn Handler>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
}

/// Decrements the active count once the HTTP connection and any socket
/// upgraded from it are gone.
struct ConnectionGuard {
    stats: Arc<ServerStats>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.stats.connections_active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// WebSocket server for wsline.
pub struct Server {
    config: ServerConfig,
    shared: Arc<Shared>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: ServerConfig, handler: impl Handler) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let shared = Shared {
            socket: config.socket.clone(),
            handler: Arc::new(handler),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
        };
        Self {
            config,
            shared: Arc::new(shared),
            running: AtomicBool::new(false),
        }
    }

    /// Binds `bind_addr` and runs until [`Server::shutdown`].
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Runs the accept loop on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        self.running.store(true, Ordering::SeqCst);

        let tls_mode = if self.config.tls_enabled() {
            "TLS"
        } else {
            "plain"
        };
        tracing::info!(
            "Server listening on {} ({})",
            listener.local_addr()?,
            tls_mode
        );

        let mut shutdown_rx = self.shared.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((tcp_stream, addr)) => self.accept(tcp_stream, addr),
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn accept(&self, tcp_stream: TcpStream, addr: SocketAddr) {
        let stats = &self.shared.stats;
        if stats.connections_active.load(Ordering::Relaxed) >= self.config.max_connections as u64 {
            tracing::warn!("Connection limit reached, rejecting {}", addr);
            return;
        }

        stats.connections_total.fetch_add(1, Ordering::Relaxed);
        stats.connections_active.fetch_add(1, Ordering::Relaxed);
        let guard = Arc::new(ConnectionGuard {
            stats: stats.clone(),
        });

        let tls_acceptor = self.config.tls_acceptor.clone();
        let shared = self.shared.clone();
        let mut conn_shutdown = self.shared.shutdown.subscribe();

        tokio::spawn(async move {
            let _ = tcp_stream.set_nodelay(true);

            let stream =
                match Self::maybe_tls_accept(tcp_stream, tls_acceptor.as_deref(), addr).await {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::warn!("[{}] TLS handshake failed: {}", addr, e);
                        shared.stats.errors_total.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                };

            let tls_status = match (stream.is_tls(), stream.has_client_cert()) {
                (true, true) => " (mTLS)",
                (true, false) => " (TLS)",
                _ => "",
            };
            tracing::debug!("Client connected: {}{}", addr, tls_status);

            let service = {
                let shared = shared.clone();
                service_fn(move |req| {
                    let response = handle_request(&shared, req, addr, &guard);
                    async move { Ok::<_, Infallible>(response) }
                })
            };

            let conn = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .with_upgrades();

            tokio::select! {
                result = conn => {
                    if let Err(e) = result {
                        tracing::debug!("[{}] HTTP connection error: {}", addr, e);
                        shared.stats.errors_total.fetch_add(1, Ordering::Relaxed);
                    }
                }
                _ = conn_shutdown.recv() => {
                    tracing::debug!("[{}] Shutdown signal received", addr);
                }
            }
        });
    }

    /// Optionally performs TLS handshake on the stream.
    async fn maybe_tls_accept(
        tcp_stream: TcpStream,
        acceptor: Option<&TlsAcceptor>,
        addr: SocketAddr,
    ) -> Result<MaybeTlsStream, ServerError> {
        match acceptor {
            Some(acceptor) => {
                tracing::debug!("[{}] Performing TLS handshake", addr);
                let tls_stream = acceptor
                    .accept(tcp_stream)
                    .await
                    .map_err(|e| ServerError::TlsHandshake(e.to_string()))?;
                tracing::debug!("[{}] TLS handshake complete", addr);
                Ok(MaybeTlsStream::Tls { stream: tls_stream })
            }
            None => Ok(MaybeTlsStream::Plain { stream: tcp_stream }),
        }
    }

    /// Signals the server and every open socket to stop.
    ///
    /// Open sockets are closed with status 1001.
    pub fn shutdown(&self) {
        let _ = self.shared.shutdown.send(());
    }

    /// Waits until no connection is active, e.g. after [`Server::shutdown`]
    /// while sockets finish their closing handshake.
    ///
    /// Returns `false` if connections are still active after `timeout`.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let stats = &self.shared.stats;
        tokio::time::timeout(timeout, async {
            while stats.connections_active.load(Ordering::Relaxed) > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .is_ok()
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.shared.stats
    }
}

fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

fn bad_request(body: String) -> Response<Full<Bytes>> {
    let mut response = text_response(StatusCode::BAD_REQUEST, body);
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

fn handle_request(
    shared: &Arc<Shared>,
    mut req: Request<Incoming>,
    peer: SocketAddr,
    guard: &Arc<ConnectionGuard>,
) -> Response<Full<Bytes>> {
    if !is_upgrade_request(req.headers()) {
        tracing::debug!("[{}] {} {} without upgrade", peer, req.method(), req.uri());
        shared.stats.rejected_total.fetch_add(1, Ordering::Relaxed);
        let mut response = text_response(
            StatusCode::UPGRADE_REQUIRED,
            "This service requires use of the websocket protocol\n".to_string(),
        );
        response
            .headers_mut()
            .insert(UPGRADE, HeaderValue::from_static("websocket"));
        return response;
    }

    let handshake = if req.method() == Method::GET {
        ServerHandshake::validate(req.headers())
    } else {
        Err(WebSocketError::invalid_upgrade_header())
    };
    let handshake = match handshake {
        Ok(handshake) => handshake,
        Err(e) => {
            tracing::warn!("[{}] Rejected upgrade of {}: {}", peer, req.uri(), e);
            shared.stats.rejected_total.fetch_add(1, Ordering::Relaxed);
            return bad_request(format!("{}\n", e));
        }
    };

    let mut response = Response::new(Full::default());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    if let Err(e) = handshake.apply(response.headers_mut()) {
        shared.stats.rejected_total.fetch_add(1, Ordering::Relaxed);
        return bad_request(format!("{}\n", e));
    }

    let shared = shared.clone();
    let guard = guard.clone();
    let resource = req.uri().to_string();
    tokio::spawn(async move {
        let upgraded = match hyper::upgrade::on(&mut req).await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                tracing::debug!("[{}] Upgrade failed: {}", peer, e);
                shared.stats.errors_total.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        let parts = match upgraded.downcast::<TokioIo<MaybeTlsStream>>() {
            Ok(parts) => parts,
            Err(_) => {
                tracing::error!("[{}] Upgraded stream has unexpected type", peer);
                shared.stats.errors_total.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        shared.stats.upgrades_total.fetch_add(1, Ordering::Relaxed);
        tracing::info!("[{}] WebSocket opened on {}", peer, resource);

        let socket = WebSocket::server(parts.io.into_inner(), parts.read_buf, &shared.socket);
        let closer = socket.sender();
        let mut shutdown = shared.shutdown.subscribe();

        tokio::select! {
            _ = shared.handler.call(socket, peer) => {}
            _ = shutdown.recv() => {
                let _ = closer.close_with(status::GOING_AWAY, "server shutting down").await;
            }
        }

        tracing::info!("[{}] WebSocket closed", peer);
        drop(guard);
    });

    response
}
