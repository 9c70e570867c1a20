//! Connection engine - turns transport bytes into messages and back.
//!
//! The engine never performs I/O. A [`Transport`] receives encoded frames and a
//! [`Handler`] is told about everything the peer does. Whoever owns the engine
//! feeds it with [`Connection::receive`] and reports transport completion via
//! [`Connection::drain`], [`Connection::on_transport_close`] and
//! [`Connection::on_transport_error`].

use bytes::{Bytes, BytesMut};
use std::io;
use wsline_protocol::{
    Decoder, Frame, OpCode, Result, WebSocketError, DEFAULT_MAX_MESSAGE_SIZE, MAX_CONTROL_PAYLOAD,
};

/// Continuation for an operation that completes later (open, data write).
pub type Completion = Box<dyn FnOnce(Result<()>) + Send>;

/// Which end of the connection this engine speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Lifecycle of a connection.
///
/// Transitions are monotonic: `Connecting -> Open -> Closing -> Closed`, with
/// any state allowed to jump straight to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Kind of a data message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Binary,
}

impl MessageKind {
    pub fn opcode(self) -> OpCode {
        match self {
            MessageKind::Text => OpCode::Text,
            MessageKind::Binary => OpCode::Binary,
        }
    }
}

/// Write side of the underlying byte stream.
pub trait Transport {
    /// Queues bytes for writing. Returns `false` when the transport is above
    /// its buffering threshold; the owner must call [`Connection::drain`]
    /// once everything has been flushed.
    fn write(&mut self, data: Bytes) -> bool;

    /// Queues final bytes and half-closes the write side after them.
    fn end(&mut self, data: Bytes);

    /// Tears the stream down. Already queued bytes may still be flushed.
    fn destroy(&mut self);
}

/// Application callbacks. All methods run synchronously inside the engine.
pub trait Handler {
    fn on_open(&mut self) {}

    /// A complete (possibly reassembled) data message.
    fn on_message(&mut self, kind: MessageKind, payload: Bytes);

    /// The peer sent CLOSE; no further messages will be delivered.
    fn on_end(&mut self, _status: Option<u16>) {}

    fn on_ping(&mut self, _payload: Bytes) {}

    fn on_pong(&mut self, _payload: Bytes) {}

    fn on_error(&mut self, _error: &WebSocketError) {}

    /// Always the last callback.
    fn on_close(&mut self) {}
}

/// Engine limits.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Ceiling for a single frame and for a reassembled message.
    pub max_message_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// One WebSocket connection.
pub struct Connection<T: Transport, H: Handler> {
    role: Role,
    state: ReadyState,
    transport: Option<T>,
    handler: H,
    decoder: Decoder,

    /// Frames of the message being reassembled, first one carries the opcode.
    fragments: Vec<Frame>,
    fragment_bytes: usize,

    pending_open: Option<Completion>,
    pending_write: Option<Completion>,

    close_sent: bool,
    close_received: bool,
}

impl<T: Transport, H: Handler> Connection<T, H> {
    /// Creates a connection with no transport yet, in `Connecting`.
    pub fn new(role: Role, handler: H, config: &EngineConfig) -> Self {
        Self {
            role,
            state: ReadyState::Connecting,
            transport: None,
            handler,
            decoder: Decoder::with_max_frame_size(config.max_message_size),
            fragments: Vec::new(),
            fragment_bytes: 0,
            pending_open: None,
            pending_write: None,
            close_sent: false,
            close_received: false,
        }
    }

    /// Creates a client connection awaiting its transport.
    pub fn client(handler: H, config: &EngineConfig) -> Self {
        Self::new(Role::Client, handler, config)
    }

    /// Creates a server connection. The handshake is already done, so it
    /// starts `Open`.
    pub fn server(transport: T, handler: H, config: &EngineConfig) -> Self {
        let mut conn = Self::new(Role::Server, handler, config);
        conn.bind(transport);
        conn
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ReadyState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ReadyState::Open
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// Returns whether a data write is waiting for [`Connection::drain`].
    pub fn has_pending_write(&self) -> bool {
        self.pending_write.is_some()
    }

    /// Bytes received but not yet forming a complete frame.
    pub fn buffered(&self) -> usize {
        self.decoder.buffered()
    }

    /// Registers a continuation resolved once a transport is attached, or
    /// with an error if the connection is destroyed first.
    pub fn open(&mut self, done: Completion) {
        match self.state {
            ReadyState::Closed => done(Err(WebSocketError::connection_closed())),
            ReadyState::Connecting if self.pending_open.is_some() => done(Err(
                WebSocketError::NotConnected("open already pending".into()),
            )),
            ReadyState::Connecting => self.pending_open = Some(done),
            _ => done(Ok(())),
        }
    }

    /// Binds a live transport after a successful client handshake.
    ///
    /// `read_ahead` holds bytes the HTTP layer read past the handshake; they
    /// are processed before anything else arrives.
    pub fn attach(&mut self, transport: T, read_ahead: &[u8]) -> Result<()> {
        if self.state != ReadyState::Connecting {
            let mut transport = transport;
            transport.destroy();
            return Err(WebSocketError::connection_closed());
        }

        self.bind(transport);
        if let Some(done) = self.pending_open.take() {
            done(Ok(()));
        }

        if read_ahead.is_empty() {
            Ok(())
        } else {
            self.receive(read_ahead)
        }
    }

    fn bind(&mut self, transport: T) {
        tracing::debug!("{:?} connection open", self.role);
        self.transport = Some(transport);
        self.state = ReadyState::Open;
        self.handler.on_open();
    }

    /// Feeds bytes read from the transport.
    ///
    /// A returned error has already torn the connection down and been
    /// reported to the handler.
    pub fn receive(&mut self, data: &[u8]) -> Result<()> {
        if self.close_received || self.state == ReadyState::Closed {
            tracing::trace!("ignoring {} bytes after close", data.len());
            return Ok(());
        }

        self.decoder.extend(data);
        while !self.close_received && self.state != ReadyState::Closed {
            let frame = match self.decoder.decode_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => return Err(self.fail(err)),
            };
            if let Err(err) = self.on_frame(frame) {
                return Err(self.fail(err));
            }
        }
        Ok(())
    }

    fn on_frame(&mut self, frame: Frame) -> Result<()> {
        tracing::trace!(
            "frame fin={} opcode={:?} len={}",
            frame.fin,
            frame.opcode,
            frame.payload.len()
        );

        let rsv = frame.rsv_bits();
        if rsv != 0 {
            return Err(WebSocketError::invalid_reserved_bits(rsv));
        }

        if frame.is_control() && frame.payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(WebSocketError::invalid_payload_length());
        }

        // Empty frames may omit the mask in either direction.
        if !frame.payload.is_empty() {
            match (self.role, frame.mask.is_some()) {
                (Role::Server, false) => return Err(WebSocketError::expected_mask()),
                (Role::Client, true) => return Err(WebSocketError::unexpected_mask()),
                _ => {}
            }
        }

        if !frame.fin {
            if self.fragments.is_empty() {
                if frame.opcode == OpCode::Continuation {
                    return Err(WebSocketError::unexpected_continuation());
                }
                if frame.is_control() {
                    return Err(WebSocketError::unexpected_control());
                }
            } else if frame.opcode != OpCode::Continuation {
                return Err(WebSocketError::expected_continuation());
            }
            self.push_fragment(frame)?;
            return Ok(());
        }

        let frame = if frame.opcode == OpCode::Continuation {
            if self.fragments.is_empty() {
                return Err(WebSocketError::unexpected_continuation());
            }
            self.push_fragment(frame)?;
            self.reassemble()
        } else if !self.fragments.is_empty() {
            return Err(WebSocketError::expected_continuation());
        } else {
            frame
        };

        self.dispatch(frame)
    }

    fn push_fragment(&mut self, frame: Frame) -> Result<()> {
        self.fragment_bytes += frame.payload.len();
        self.decoder.check_message_size(self.fragment_bytes)?;
        self.fragments.push(frame);
        Ok(())
    }

    fn reassemble(&mut self) -> Frame {
        let opcode = self.fragments[0].opcode;
        let mut payload = BytesMut::with_capacity(self.fragment_bytes);
        for fragment in self.fragments.drain(..) {
            payload.extend_from_slice(&fragment.payload);
        }
        self.fragment_bytes = 0;
        Frame::new(opcode, payload.freeze())
    }

    fn dispatch(&mut self, frame: Frame) -> Result<()> {
        match frame.opcode {
            OpCode::Text => self.handler.on_message(MessageKind::Text, frame.payload),
            OpCode::Binary => self.handler.on_message(MessageKind::Binary, frame.payload),
            OpCode::Close => {
                let status = frame.close_status();
                tracing::debug!("{:?} received close, status {:?}", self.role, status);

                self.close_received = true;
                self.decoder.clear();
                if self.state == ReadyState::Open {
                    self.state = ReadyState::Closing;
                }
                self.handler.on_end(status);

                if !self.close_sent {
                    self.close_sent = true;
                    let echo_status =
                        status.filter(|&code| wsline_protocol::status::is_sendable(code));
                    let echo = self.encode(Frame::close(echo_status, ""))?;
                    if let Some(transport) = self.transport.as_mut() {
                        transport.end(echo);
                    }
                }
            }
            OpCode::Ping => {
                let pong = self.encode(Frame::pong(frame.payload.clone()))?;
                if let Some(transport) = self.transport.as_mut() {
                    transport.write(pong);
                }
                self.handler.on_ping(frame.payload);
            }
            OpCode::Pong => self.handler.on_pong(frame.payload),
            op => return Err(WebSocketError::invalid_opcode(op.as_u8())),
        }
        Ok(())
    }

    /// Encodes an outbound frame, masking it when acting as the client.
    fn encode(&self, frame: Frame) -> Result<Bytes> {
        let frame = match self.role {
            Role::Client => frame.with_random_mask(),
            Role::Server => frame,
        };
        Ok(frame.encode()?.freeze())
    }

    /// Sends one unfragmented data message.
    ///
    /// `done` runs immediately when the transport accepted the bytes without
    /// pushback, otherwise at the next [`Connection::drain`]. Only one write
    /// may wait at a time; a second one fails with `WRITE_PENDING`.
    pub fn send(&mut self, payload: Bytes, kind: MessageKind, done: Completion) {
        if self.transport.is_none() {
            let err = match self.state {
                ReadyState::Connecting => WebSocketError::not_connected(),
                _ => WebSocketError::connection_closed(),
            };
            return done(Err(err));
        }
        if self.close_sent {
            return done(Err(WebSocketError::connection_closed()));
        }
        if self.pending_write.is_some() {
            return done(Err(WebSocketError::write_pending()));
        }

        let data = match self.encode(Frame::new(kind.opcode(), payload)) {
            Ok(data) => data,
            Err(err) => return done(Err(err)),
        };

        let flushed = match self.transport.as_mut() {
            Some(transport) => transport.write(data),
            None => true,
        };
        if flushed {
            done(Ok(()));
        } else {
            self.pending_write = Some(done);
        }
    }

    /// Reports that the transport flushed everything it had buffered.
    pub fn drain(&mut self) {
        if let Some(done) = self.pending_write.take() {
            done(Ok(()));
        }
    }

    pub fn ping(&mut self, payload: Bytes) -> Result<()> {
        self.send_control(Frame::ping(payload))
    }

    /// Sends an unsolicited PONG (a heartbeat the peer does not answer).
    pub fn pong(&mut self, payload: Bytes) -> Result<()> {
        self.send_control(Frame::pong(payload))
    }

    fn send_control(&mut self, frame: Frame) -> Result<()> {
        if self.transport.is_none() {
            return Err(WebSocketError::not_connected());
        }
        if self.close_sent {
            return Err(WebSocketError::connection_closed());
        }
        if frame.payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(WebSocketError::invalid_payload_length());
        }

        let data = self.encode(frame)?;
        if let Some(transport) = self.transport.as_mut() {
            transport.write(data);
        }
        Ok(())
    }

    /// Starts the closing handshake with an empty CLOSE.
    pub fn close(&mut self) -> Result<()> {
        self.close_with(None, "")
    }

    /// Starts the closing handshake, optionally carrying a status and reason.
    ///
    /// Closing before a transport is attached cancels the connection.
    /// Repeated calls are no-ops.
    pub fn close_with(&mut self, status: Option<u16>, reason: &str) -> Result<()> {
        if self.transport.is_none() {
            self.destroy(None);
            return Ok(());
        }
        if self.close_sent {
            return Ok(());
        }

        let frame = Frame::close(status, reason);
        if frame.payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(WebSocketError::invalid_payload_length());
        }

        tracing::debug!("{:?} sending close, status {:?}", self.role, status);
        let data = self.encode(frame)?;
        self.close_sent = true;
        self.state = ReadyState::Closing;
        if let Some(transport) = self.transport.as_mut() {
            transport.end(data);
        }
        Ok(())
    }

    /// The transport reported a failure.
    pub fn on_transport_error(&mut self, error: io::Error) {
        self.destroy(Some(WebSocketError::network(error)));
    }

    /// The transport closed (peer hung up, or our half-close completed).
    pub fn on_transport_close(&mut self) {
        self.destroy(None);
    }

    /// Sends a CLOSE carrying the error's status, then tears down.
    fn fail(&mut self, err: WebSocketError) -> WebSocketError {
        tracing::debug!("{:?} connection failed: {}", self.role, err);

        if err.is_protocol_violation() && !self.close_sent {
            self.close_sent = true;
            if let Ok(data) = self.encode(Frame::close(Some(err.status()), "")) {
                if let Some(transport) = self.transport.as_mut() {
                    transport.end(data);
                }
            }
        }

        self.destroy(Some(err.clone()));
        err
    }

    /// Tears the connection down and releases the transport.
    ///
    /// Pending continuations resolve with `error`, or `CONNECTION_CLOSED`
    /// when there is none. Idempotent.
    pub fn destroy(&mut self, error: Option<WebSocketError>) {
        if self.state == ReadyState::Closed {
            return;
        }
        tracing::debug!("{:?} connection closed", self.role);
        self.state = ReadyState::Closed;

        if let Some(mut transport) = self.transport.take() {
            transport.destroy();
        }

        let pending_err = error
            .clone()
            .unwrap_or_else(WebSocketError::connection_closed);
        if let Some(done) = self.pending_open.take() {
            done(Err(pending_err.clone()));
        }
        if let Some(done) = self.pending_write.take() {
            done(Err(pending_err));
        }

        self.fragments.clear();
        self.fragment_bytes = 0;
        self.decoder.clear();

        if let Some(err) = &error {
            self.handler.on_error(err);
        }
        self.handler.on_close();
    }
}
