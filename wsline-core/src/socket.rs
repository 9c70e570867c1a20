//! Tokio adapter that runs a [`Connection`] over an async byte stream.
//!
//! Each socket owns one driver task. The task reads from the stream, flushes
//! queued frames and executes commands from [`WebSocketSender`] handles.
//! Everything the peer does shows up as an [`Event`] on the
//! [`WebSocketReceiver`].

use crate::engine::{Completion, Connection, EngineConfig, Handler, MessageKind, Role, Transport};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use wsline_protocol::{Result, WebSocketError, DEFAULT_MAX_MESSAGE_SIZE};

/// Default buffering threshold above which sends wait for the stream.
pub const DEFAULT_HIGH_WATER_MARK: usize = 64 * 1024;

/// Default size of a single read from the stream.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

const COMMAND_QUEUE_SIZE: usize = 64;

/// Per-socket settings.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub max_message_size: usize,
    pub high_water_mark: usize,
    pub read_buffer_size: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl SocketConfig {
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_high_water_mark(mut self, size: usize) -> Self {
        self.high_water_mark = size;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            max_message_size: self.max_message_size,
        }
    }
}

/// A complete data message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(Bytes),
    Binary(Bytes),
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Message::Text(Bytes::from(text.into()))
    }

    pub fn binary(data: impl Into<Bytes>) -> Self {
        Message::Binary(data.into())
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Text(_) => MessageKind::Text,
            Message::Binary(_) => MessageKind::Binary,
        }
    }

    pub fn payload(&self) -> &Bytes {
        match self {
            Message::Text(data) | Message::Binary(data) => data,
        }
    }

    pub fn into_payload(self) -> Bytes {
        match self {
            Message::Text(data) | Message::Binary(data) => data,
        }
    }

    /// Returns the text of a text message, if it is valid UTF-8.
    ///
    /// Validation is left to the application; the engine delivers raw bytes.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(data) => std::str::from_utf8(data).ok(),
            Message::Binary(_) => None,
        }
    }

    fn from_parts(kind: MessageKind, payload: Bytes) -> Self {
        match kind {
            MessageKind::Text => Message::Text(payload),
            MessageKind::Binary => Message::Binary(payload),
        }
    }
}

/// Something the peer did.
#[derive(Debug, Clone)]
pub enum Event {
    Message(Message),
    Ping(Bytes),
    Pong(Bytes),
    /// The peer sent CLOSE; no messages follow.
    Close(Option<u16>),
    /// The connection failed. The receiver ends right after.
    Error(WebSocketError),
}

struct ChannelHandler {
    events: mpsc::UnboundedSender<Event>,
}

impl ChannelHandler {
    fn emit(&self, event: Event) {
        // The receiver may be gone; the connection still finishes its close.
        let _ = self.events.send(event);
    }
}

impl Handler for ChannelHandler {
    fn on_message(&mut self, kind: MessageKind, payload: Bytes) {
        self.emit(Event::Message(Message::from_parts(kind, payload)));
    }

    fn on_end(&mut self, status: Option<u16>) {
        self.emit(Event::Close(status));
    }

    fn on_ping(&mut self, payload: Bytes) {
        self.emit(Event::Ping(payload));
    }

    fn on_pong(&mut self, payload: Bytes) {
        self.emit(Event::Pong(payload));
    }

    fn on_error(&mut self, error: &WebSocketError) {
        self.emit(Event::Error(error.clone()));
    }
}

/// Bytes waiting to be written, shared between the engine and the driver.
struct WriteQueue {
    pending: BytesMut,
    in_flight: usize,
    high_water_mark: usize,
    shutdown: bool,
    destroyed: bool,
}

type SharedQueue = Arc<Mutex<WriteQueue>>;

impl WriteQueue {
    fn shared(high_water_mark: usize) -> SharedQueue {
        Arc::new(Mutex::new(Self {
            pending: BytesMut::new(),
            in_flight: 0,
            high_water_mark,
            shutdown: false,
            destroyed: false,
        }))
    }

    fn buffered(&self) -> usize {
        self.pending.len() + self.in_flight
    }
}

/// [`Transport`] backed by the driver's write queue.
struct StreamTransport {
    queue: SharedQueue,
}

impl Transport for StreamTransport {
    fn write(&mut self, data: Bytes) -> bool {
        let mut queue = self.queue.lock();
        if queue.shutdown || queue.destroyed {
            return true;
        }
        queue.pending.extend_from_slice(&data);
        queue.buffered() < queue.high_water_mark
    }

    fn end(&mut self, data: Bytes) {
        let mut queue = self.queue.lock();
        if queue.shutdown || queue.destroyed {
            return;
        }
        queue.pending.extend_from_slice(&data);
        queue.shutdown = true;
    }

    fn destroy(&mut self) {
        self.queue.lock().destroyed = true;
    }
}

type Engine = Connection<StreamTransport, ChannelHandler>;
type Reply = oneshot::Sender<Result<()>>;

enum Command {
    Send(Message, Reply),
    Ping(Bytes, Reply),
    Pong(Bytes, Reply),
    Close(Option<u16>, String, Reply),
}

/// Cloneable write half of a socket.
#[derive(Clone)]
pub struct WebSocketSender {
    commands: mpsc::Sender<Command>,
    role: Role,
}

impl WebSocketSender {
    pub fn role(&self) -> Role {
        self.role
    }

    /// Sends a message. Resolves once the stream has taken the bytes, or
    /// after a flush when the socket was above its high-water mark.
    ///
    /// Concurrent sends are written in the order they were issued.
    pub async fn send(&self, message: Message) -> Result<()> {
        self.request(|reply| Command::Send(message, reply)).await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Message::text(text)).await
    }

    pub async fn send_binary(&self, data: impl Into<Bytes>) -> Result<()> {
        self.send(Message::binary(data)).await
    }

    pub async fn ping(&self, payload: impl Into<Bytes>) -> Result<()> {
        let payload = payload.into();
        self.request(|reply| Command::Ping(payload, reply)).await
    }

    pub async fn pong(&self, payload: impl Into<Bytes>) -> Result<()> {
        let payload = payload.into();
        self.request(|reply| Command::Pong(payload, reply)).await
    }

    /// Starts the closing handshake with an empty CLOSE.
    pub async fn close(&self) -> Result<()> {
        self.request(|reply| Command::Close(None, String::new(), reply))
            .await
    }

    pub async fn close_with(&self, status: u16, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        self.request(|reply| Command::Close(Some(status), reason, reply))
            .await
    }

    async fn request(&self, command: impl FnOnce(Reply) -> Command) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| WebSocketError::connection_closed())?;
        response
            .await
            .map_err(|_| WebSocketError::connection_closed())?
    }
}

/// Read half of a socket.
pub struct WebSocketReceiver {
    events: mpsc::UnboundedReceiver<Event>,
}

impl WebSocketReceiver {
    /// Returns the next event, or `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Returns the next data message, skipping control traffic.
    ///
    /// Ends with `None` after the peer's CLOSE or when the connection drops,
    /// and yields the error if the connection failed.
    pub async fn next_message(&mut self) -> Option<Result<Message>> {
        loop {
            match self.events.recv().await? {
                Event::Message(message) => return Some(Ok(message)),
                Event::Error(err) => return Some(Err(err)),
                Event::Close(_) => return None,
                Event::Ping(_) | Event::Pong(_) => continue,
            }
        }
    }
}

/// A running WebSocket connection.
pub struct WebSocket {
    sender: WebSocketSender,
    receiver: WebSocketReceiver,
}

impl std::fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocket")
            .field("role", &self.sender.role)
            .field("closed", &self.sender.commands.is_closed())
            .finish()
    }
}

impl WebSocket {
    /// Runs the server side over an upgraded stream.
    ///
    /// `read_ahead` holds bytes the HTTP layer read past the request; they are
    /// processed before anything read from `stream`.
    pub fn server<S>(stream: S, read_ahead: Bytes, config: &SocketConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let queue = WriteQueue::shared(config.high_water_mark);
        let transport = StreamTransport {
            queue: queue.clone(),
        };
        let handler = ChannelHandler { events: events_tx };
        let mut conn = Connection::server(transport, handler, &config.engine());

        if !read_ahead.is_empty() {
            // Failures are already on the event channel.
            let _ = conn.receive(&read_ahead);
        }

        Self::spawn(stream, conn, queue, events_rx, config.read_buffer_size)
    }

    fn spawn<S>(
        stream: S,
        conn: Engine,
        queue: SharedQueue,
        events: mpsc::UnboundedReceiver<Event>,
        read_buffer_size: usize,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let role = conn.role();
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
        tokio::spawn(drive(stream, conn, queue, commands_rx, read_buffer_size));

        Self {
            sender: WebSocketSender {
                commands: commands_tx,
                role,
            },
            receiver: WebSocketReceiver { events },
        }
    }

    pub fn role(&self) -> Role {
        self.sender.role
    }

    pub fn sender(&self) -> WebSocketSender {
        self.sender.clone()
    }

    /// Splits into independently owned write and read halves.
    pub fn split(self) -> (WebSocketSender, WebSocketReceiver) {
        (self.sender, self.receiver)
    }

    pub async fn send(&self, message: Message) -> Result<()> {
        self.sender.send(message).await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.sender.send_text(text).await
    }

    pub async fn send_binary(&self, data: impl Into<Bytes>) -> Result<()> {
        self.sender.send_binary(data).await
    }

    pub async fn ping(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.sender.ping(payload).await
    }

    pub async fn pong(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.sender.pong(payload).await
    }

    pub async fn close(&self) -> Result<()> {
        self.sender.close().await
    }

    pub async fn close_with(&self, status: u16, reason: impl Into<String>) -> Result<()> {
        self.sender.close_with(status, reason).await
    }

    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    pub async fn next_message(&mut self) -> Option<Result<Message>> {
        self.receiver.next_message().await
    }
}

/// A client connection whose HTTP handshake is still in progress.
///
/// The engine exists from the start so that the open continuation is settled
/// exactly once, either by [`Connecting::attach`] or [`Connecting::abort`].
pub struct Connecting {
    conn: Engine,
    queue: SharedQueue,
    events: mpsc::UnboundedReceiver<Event>,
    opened: oneshot::Receiver<Result<()>>,
    read_buffer_size: usize,
}

impl Connecting {
    pub fn new(config: &SocketConfig) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let handler = ChannelHandler { events: events_tx };
        let mut conn = Connection::client(handler, &config.engine());

        let (opened_tx, opened) = oneshot::channel();
        conn.open(Box::new(move |result| {
            let _ = opened_tx.send(result);
        }));

        Self {
            conn,
            queue: WriteQueue::shared(config.high_water_mark),
            events,
            opened,
            read_buffer_size: config.read_buffer_size,
        }
    }

    /// Binds the upgraded stream and starts the socket.
    pub async fn attach<S>(mut self, stream: S, read_ahead: Bytes) -> Result<WebSocket>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let transport = StreamTransport {
            queue: self.queue.clone(),
        };
        if let Err(err) = self.conn.attach(transport, &read_ahead) {
            tracing::debug!("read-ahead rejected: {}", err);
        }

        match self.opened.await {
            Ok(Ok(())) => Ok(WebSocket::spawn(
                stream,
                self.conn,
                self.queue,
                self.events,
                self.read_buffer_size,
            )),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(WebSocketError::connection_closed()),
        }
    }

    /// Gives up on the handshake and returns the error the open resolved with.
    pub async fn abort(mut self, error: WebSocketError) -> WebSocketError {
        self.conn.destroy(Some(error));
        match self.opened.await {
            Ok(Err(err)) => err,
            _ => WebSocketError::connection_closed(),
        }
    }
}

/// Completion that forwards a write result to the caller.
fn reply_with(reply: Reply) -> Completion {
    Box::new(move |result| {
        let _ = reply.send(result);
    })
}

fn submit(conn: &mut Engine, message: Message, reply: Reply) {
    let kind = message.kind();
    conn.send(message.into_payload(), kind, reply_with(reply));
}

fn execute(conn: &mut Engine, command: Command, deferred: &mut VecDeque<(Message, Reply)>) {
    match command {
        // The engine holds one waiting write; later sends queue here in order.
        Command::Send(message, reply) => {
            if conn.has_pending_write() || !deferred.is_empty() {
                deferred.push_back((message, reply));
            } else {
                submit(conn, message, reply);
            }
        }
        Command::Ping(payload, reply) => {
            let _ = reply.send(conn.ping(payload));
        }
        Command::Pong(payload, reply) => {
            let _ = reply.send(conn.pong(payload));
        }
        Command::Close(status, reason, reply) => {
            let _ = reply.send(conn.close_with(status, &reason));
        }
    }
}

fn submit_deferred(conn: &mut Engine, deferred: &mut VecDeque<(Message, Reply)>) {
    while !conn.has_pending_write() {
        match deferred.pop_front() {
            Some((message, reply)) => submit(conn, message, reply),
            None => break,
        }
    }
}

async fn write_chunk<W>(writer: &mut W, chunk: Option<&Bytes>) -> io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    match chunk {
        Some(chunk) => writer.write(chunk).await,
        None => std::future::pending().await,
    }
}

async fn drive<S>(
    stream: S,
    mut conn: Engine,
    queue: SharedQueue,
    mut commands: mpsc::Receiver<Command>,
    read_buffer_size: usize,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let role = conn.role();
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut read_buf = BytesMut::with_capacity(read_buffer_size);
    let mut chunk: Option<Bytes> = None;
    let mut deferred: VecDeque<(Message, Reply)> = VecDeque::new();
    let mut reading = true;
    let mut commands_open = true;
    let mut write_shut = false;

    loop {
        let (shutdown, destroyed) = {
            let mut queue = queue.lock();
            if chunk.is_none() && !queue.pending.is_empty() {
                let next = queue.pending.split().freeze();
                queue.in_flight = next.len();
                chunk = Some(next);
            }
            (queue.shutdown, queue.destroyed)
        };

        if chunk.is_none() {
            if destroyed {
                break;
            }
            if shutdown && !write_shut {
                write_shut = true;
                if let Err(e) = writer.shutdown().await {
                    tracing::debug!("{:?} shutdown failed: {}", role, e);
                }
            }
        }

        read_buf.reserve(read_buffer_size);

        tokio::select! {
            result = write_chunk(&mut writer, chunk.as_ref()) => match result {
                Ok(0) => {
                    chunk = None;
                    queue.lock().pending.clear();
                    conn.on_transport_error(io::ErrorKind::WriteZero.into());
                }
                Ok(n) => {
                    let rest = chunk.take().map(|c| c.slice(n..)).filter(|c| !c.is_empty());
                    let flushed = {
                        let mut queue = queue.lock();
                        queue.in_flight = rest.as_ref().map_or(0, Bytes::len);
                        queue.buffered() == 0
                    };
                    chunk = rest;
                    if flushed {
                        conn.drain();
                        submit_deferred(&mut conn, &mut deferred);
                    }
                }
                Err(e) => {
                    chunk = None;
                    queue.lock().pending.clear();
                    conn.on_transport_error(e);
                }
            },
            result = reader.read_buf(&mut read_buf), if reading => match result {
                Ok(0) => {
                    reading = false;
                    conn.on_transport_close();
                }
                Ok(_) => {
                    let data = read_buf.split();
                    // Protocol errors tear the engine down and reach the
                    // receiver as events.
                    let _ = conn.receive(&data);
                }
                Err(e) => {
                    reading = false;
                    conn.on_transport_error(e);
                }
            },
            command = commands.recv(), if commands_open => match command {
                Some(command) => execute(&mut conn, command, &mut deferred),
                None => {
                    // Every handle is gone; nobody can observe the rest.
                    commands_open = false;
                    let _ = conn.close();
                }
            },
        }
    }

    for (_, reply) in deferred {
        let _ = reply.send(Err(WebSocketError::connection_closed()));
    }
    tracing::debug!("{:?} socket driver finished", role);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, DuplexStream};
    use wsline_protocol::{ErrorCode, Frame, OpCode};

    fn pair(config: &SocketConfig) -> (WebSocket, DuplexStream) {
        let (server_io, client_io) = duplex(64 * 1024);
        (WebSocket::server(server_io, Bytes::new(), config), client_io)
    }

    async fn connected(config: &SocketConfig) -> (WebSocket, WebSocket) {
        let (server, client_io) = pair(config);
        let client = Connecting::new(config)
            .attach(client_io, Bytes::new())
            .await
            .unwrap();
        (server, client)
    }

    async fn read_frame(io: &mut DuplexStream, buf: &mut BytesMut) -> Option<Frame> {
        loop {
            if let Some(frame) = Frame::decode(buf).unwrap() {
                return Some(frame);
            }
            if io.read_buf(buf).await.unwrap() == 0 {
                return None;
            }
        }
    }

    #[tokio::test]
    async fn test_message_both_ways() {
        let (mut server, mut client) = connected(&SocketConfig::default()).await;

        client.send_text("hello").await.unwrap();
        let message = server.next_message().await.unwrap().unwrap();
        assert_eq!(message.as_text(), Some("hello"));

        server.send_binary(vec![1u8, 2, 3]).await.unwrap();
        let message = client.next_message().await.unwrap().unwrap();
        assert_eq!(message, Message::Binary(Bytes::from_static(&[1, 2, 3])));
    }

    #[tokio::test]
    async fn test_debug_shows_role() {
        let (server, client) = connected(&SocketConfig::default()).await;
        assert!(format!("{:?}", server).contains("Server"));
        assert!(format!("{:?}", client).contains("Client"));
    }

    #[tokio::test]
    async fn test_client_frames_are_masked() {
        let (client_io, mut raw) = duplex(4096);
        let client = Connecting::new(&SocketConfig::default())
            .attach(client_io, Bytes::new())
            .await
            .unwrap();

        client.send_text("abc").await.unwrap();
        let mut buf = BytesMut::new();
        let frame = read_frame(&mut raw, &mut buf).await.unwrap();
        assert!(frame.mask.is_some());
        assert_eq!(&frame.payload[..], b"abc");
    }

    #[tokio::test]
    async fn test_read_ahead_processed_first() {
        let (server_io, mut raw) = duplex(4096);
        let early = Frame::text("early").with_random_mask().encode().unwrap();
        let mut server = WebSocket::server(server_io, early.freeze(), &SocketConfig::default());

        let late = Frame::text("late").with_random_mask().encode().unwrap();
        raw.write_all(&late).await.unwrap();

        let first = server.next_message().await.unwrap().unwrap();
        let second = server.next_message().await.unwrap().unwrap();
        assert_eq!(first.as_text(), Some("early"));
        assert_eq!(second.as_text(), Some("late"));
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (mut server, mut client) = connected(&SocketConfig::default()).await;

        client.ping("are you there").await.unwrap();
        match server.recv().await.unwrap() {
            Event::Ping(payload) => assert_eq!(&payload[..], b"are you there"),
            other => panic!("unexpected event {:?}", other),
        }
        match client.recv().await.unwrap() {
            Event::Pong(payload) => assert_eq!(&payload[..], b"are you there"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_handshake() {
        let (mut server, mut client) = connected(&SocketConfig::default()).await;

        client.close_with(1000, "bye").await.unwrap();

        match server.recv().await.unwrap() {
            Event::Close(status) => assert_eq!(status, Some(1000)),
            other => panic!("unexpected event {:?}", other),
        }
        match client.recv().await.unwrap() {
            Event::Close(status) => assert_eq!(status, Some(1000)),
            other => panic!("unexpected event {:?}", other),
        }

        assert!(server.recv().await.is_none());
        assert!(client.recv().await.is_none());

        let err = client.send_text("too late").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConnectionClosed);
    }

    #[tokio::test]
    async fn test_protocol_error_sends_close() {
        let (server_io, mut raw) = duplex(4096);
        let mut server = WebSocket::server(server_io, Bytes::new(), &SocketConfig::default());

        // Unmasked frame from a client.
        raw.write_all(&Frame::text("hi").encode().unwrap())
            .await
            .unwrap();

        match server.recv().await.unwrap() {
            Event::Error(err) => assert_eq!(err.code(), ErrorCode::ExpectedMask),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(server.recv().await.is_none());

        let mut buf = BytesMut::new();
        let frame = read_frame(&mut raw, &mut buf).await.unwrap();
        assert_eq!(frame.opcode, OpCode::Close);
        assert_eq!(frame.close_status(), Some(1002));
        assert!(read_frame(&mut raw, &mut buf).await.is_none());
    }

    #[tokio::test]
    async fn test_peer_hangup_ends_receiver() {
        let (mut server, client_io) = pair(&SocketConfig::default());
        drop(client_io);

        assert!(server.recv().await.is_none());
        let err = server.send_text("x").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConnectionClosed);
    }

    #[tokio::test]
    async fn test_concurrent_sends_all_delivered() {
        let config = SocketConfig::default().with_high_water_mark(16);
        let (server, mut client) = connected(&config).await;
        let sender = server.sender();

        let mut tasks = Vec::new();
        for i in 0..20u32 {
            let sender = sender.clone();
            tasks.push(tokio::spawn(async move {
                sender.send_binary(vec![i as u8; 100]).await
            }));
            // Give each send a chance to reach the driver in order.
            tokio::task::yield_now().await;
        }

        let mut received = Vec::new();
        for _ in 0..20 {
            let message = client.next_message().await.unwrap().unwrap();
            received.push(message.payload()[0]);
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let mut sorted = received.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20u8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_abort_reports_error() {
        let connecting = Connecting::new(&SocketConfig::default());
        let err = connecting
            .abort(WebSocketError::invalid_accept_header())
            .await;
        assert_eq!(err.code(), ErrorCode::InvalidAcceptHeader);
    }

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let config = SocketConfig::default().with_max_message_size(16);
        let (mut server, client) = connected(&config).await;

        client.send_binary(vec![0u8; 64]).await.unwrap();
        match server.recv().await.unwrap() {
            Event::Error(err) => assert_eq!(err.code(), ErrorCode::MessageTooLarge),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
