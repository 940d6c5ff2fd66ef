//! One WebSocket connection: stream, pipeline and lifecycle state.
//!
//! Everything a connection sends or receives runs through its [`Pipeline`].
//! The half-close primitives [`Connection::close_read`],
//! [`Connection::close_write`] and [`Connection::disconnect`] move the
//! [`ConnectionState`]; [`crate::middleware::CloseHandler`] drives them during
//! the closing handshake.
//!
//! Raw transport errors become [`WsError`]s here, through the codec's
//! [`From`] conversion or [`WsError::from_transport`], and nowhere deeper.

mod state;

use std::{
    any::Any,
    collections::HashMap,
    fmt,
    io::{self, Write},
    net::Shutdown,
    sync::Arc,
    time::Instant,
};

use http::{Request, Response, StatusCode, Uri};
use log::{debug, info};
pub use state::ConnectionState;

use crate::{
    codec,
    config::WebSocketConfig,
    error::{Result, WsError},
    fragment::Fragmenter,
    handshake::{self, HttpMessage, wire},
    message::{DEFAULT_CLOSE_REASON, DEFAULT_CLOSE_STATUS, Message},
    message_assembler::MessageAssembler,
    metrics::{self, Direction},
    middleware::{Middleware, Pipeline, subprotocol},
    transport::{Source, Transport},
};

/// Which end of the handshake this connection plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Sends the upgrade request.
    Client,
    /// Answers the upgrade request.
    Server,
}

/// A WebSocket connection over one [`Transport`].
pub struct Connection {
    stream: Box<dyn Transport>,
    role: Role,
    state: ConnectionState,
    config: WebSocketConfig,
    pipeline: Arc<Pipeline>,
    assembler: MessageAssembler,
    fragmenter: Fragmenter,
    peer: String,
    uri: Option<Uri>,
    handshake_request: Option<Request<()>>,
    handshake_response: Option<Response<()>>,
    metadata: HashMap<String, Box<dyn Any + Send>>,
    write_closed_at: Option<Instant>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("pipeline", &self.pipeline)
            .field("metadata_keys", &self.metadata.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wrap `stream`, applying `config`'s timeout to it.
    ///
    /// # Errors
    ///
    /// Fails when the stream rejects the timeout.
    pub fn new(
        mut stream: Box<dyn Transport>,
        config: WebSocketConfig,
        role: Role,
        pipeline: Arc<Pipeline>,
    ) -> Result<Self> {
        stream
            .set_timeout(config.timeout)
            .map_err(WsError::from_transport)?;
        let peer = stream.peer_name();
        Ok(Self {
            assembler: MessageAssembler::new(config.decode_options()),
            fragmenter: Fragmenter::new(config.frame_size),
            stream,
            role,
            state: ConnectionState::Open,
            config,
            pipeline,
            peer,
            uri: None,
            handshake_request: None,
            handshake_response: None,
            metadata: HashMap::new(),
            write_closed_at: None,
        })
    }

    /// Handshake role.
    #[must_use]
    pub fn role(&self) -> Role { self.role }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState { self.state }

    /// Whether messages can still be received.
    #[must_use]
    pub fn is_readable(&self) -> bool { self.state.is_readable() }

    /// Whether messages can still be sent.
    #[must_use]
    pub fn is_writable(&self) -> bool { self.state.is_writable() }

    /// `false` once closed locally or the stream was released.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state != ConnectionState::Closed && self.stream.is_connected()
    }

    /// Identity of the remote end.
    #[must_use]
    pub fn peer_name(&self) -> &str { &self.peer }

    /// Configuration in effect.
    #[must_use]
    pub fn config(&self) -> &WebSocketConfig { &self.config }

    /// Middleware pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline { &self.pipeline }

    /// Attach a middleware to this connection only.
    ///
    /// The pipeline is copied on first write if it is shared.
    pub fn add_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        Arc::make_mut(&mut self.pipeline).attach(middleware);
    }

    /// URI the client handshake targeted.
    #[must_use]
    pub fn uri(&self) -> Option<&Uri> { self.uri.as_ref() }

    /// Upgrade request as sent or received.
    #[must_use]
    pub fn handshake_request(&self) -> Option<&Request<()>> { self.handshake_request.as_ref() }

    /// Upgrade response as sent or received.
    #[must_use]
    pub fn handshake_response(&self) -> Option<&Response<()>> { self.handshake_response.as_ref() }

    /// Subprotocol agreed during the handshake.
    #[must_use]
    pub fn subprotocol(&self) -> Option<&str> {
        self.meta::<String>(subprotocol::SELECTED_KEY)
            .map(String::as_str)
    }

    /// Metadata value stored under `key`, if it has type `T`.
    ///
    /// Keys are free-form; middlewares prefix theirs with their own name.
    #[must_use]
    pub fn meta<T: Any>(&self, key: &str) -> Option<&T> {
        self.metadata.get(key).and_then(|v| v.downcast_ref())
    }

    /// Mutable metadata value stored under `key`, if it has type `T`.
    pub fn meta_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.metadata.get_mut(key).and_then(|v| v.downcast_mut())
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set_meta<T: Any + Send>(&mut self, key: impl Into<String>, value: T) {
        self.metadata.insert(key.into(), Box::new(value));
    }

    /// Remove `key`; returns whether it was present.
    pub fn remove_meta(&mut self, key: &str) -> bool { self.metadata.remove(key).is_some() }

    /// Run the client side of the upgrade against `uri`.
    ///
    /// The request travels through the outgoing HTTP chain, the response
    /// through the incoming one, and the response is then verified.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Handshake`] when the server refuses or answers
    /// incorrectly; middlewares may raise [`WsError::Reconnect`] or
    /// [`WsError::TooManyRedirects`].
    pub fn handshake_client(&mut self, uri: &Uri) -> Result<()> {
        let request = handshake::client_request(uri, &self.config)?;
        self.uri = Some(uri.clone());
        let pipeline = Arc::clone(&self.pipeline);
        pipeline.run_http_outgoing(self, request.into())?;
        let response = pipeline.run_http_incoming(self)?.into_response()?;
        let request = self
            .handshake_request
            .as_ref()
            .ok_or_else(|| WsError::Handshake("request was not sent".into()))?;
        let verdict = handshake::verify_response(request, &response);
        self.handshake_response = Some(response);
        verdict?;
        debug!("client handshake with {} complete", self.peer);
        Ok(())
    }

    /// Run the server side of the upgrade.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Handshake`] when the request is invalid or the
    /// response sent was not `101 Switching Protocols`.
    pub fn handshake_server(&mut self) -> Result<()> {
        let pipeline = Arc::clone(&self.pipeline);
        let request = pipeline.run_http_incoming(self)?.into_request()?;
        let response = handshake::server_response(&request);
        self.handshake_request = Some(request);
        pipeline.run_http_outgoing(self, response.into())?;
        match self.handshake_response.as_ref().map(Response::status) {
            Some(status) if status == StatusCode::SWITCHING_PROTOCOLS => {
                debug!("server handshake with {} complete", self.peer);
                Ok(())
            }
            Some(status) => Err(WsError::Handshake(format!("upgrade refused with {status}"))),
            None => Err(WsError::Handshake("response was not sent".into())),
        }
    }

    /// Send `message` through the outgoing chain.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::ConnectionClosed`] when the write side is closed,
    /// or whatever the chain raises. Connection-level failures release the
    /// stream.
    pub fn send(&mut self, message: Message) -> Result<()> {
        if !self.is_writable() {
            return Err(WsError::closed(format!("cannot send in state {}", self.state)));
        }
        let pipeline = Arc::clone(&self.pipeline);
        let result = pipeline.run_outgoing(self, message);
        self.check(result)
    }

    /// Send a text message.
    ///
    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn text(&mut self, content: impl Into<String>) -> Result<()> {
        self.send(Message::text(content))
    }

    /// Send a binary message.
    ///
    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn binary(&mut self, content: impl Into<bytes::Bytes>) -> Result<()> {
        self.send(Message::binary(content))
    }

    /// Send a ping.
    ///
    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn ping(&mut self, content: impl Into<bytes::Bytes>) -> Result<()> {
        self.send(Message::ping(content))
    }

    /// Send a pong.
    ///
    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn pong(&mut self, content: impl Into<bytes::Bytes>) -> Result<()> {
        self.send(Message::pong(content))
    }

    /// Start the closing handshake with status 1000 and reason `ttfn`.
    ///
    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn close(&mut self) -> Result<()> {
        self.close_with(DEFAULT_CLOSE_STATUS, DEFAULT_CLOSE_REASON)
    }

    /// Start the closing handshake with an explicit status and reason.
    ///
    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn close_with(&mut self, status: u16, reason: &str) -> Result<()> {
        self.send(Message::close(status, reason))
    }

    /// Pull one message through the incoming chain.
    ///
    /// Blocks until a message completes; call it once the stream is
    /// readable.
    ///
    /// # Errors
    ///
    /// Message-level errors leave the connection usable. Connection-level
    /// errors release the stream.
    pub fn receive(&mut self) -> Result<Message> {
        if !self.is_readable() {
            return Err(WsError::closed(format!("cannot receive in state {}", self.state)));
        }
        let pipeline = Arc::clone(&self.pipeline);
        let result = pipeline.run_incoming(self);
        self.check(result)
    }

    /// Run the tick chain.
    ///
    /// A connection left in `WriteClosed` for longer than the configured
    /// timeout is released instead: the peer never acknowledged our close.
    ///
    /// # Errors
    ///
    /// Whatever the chain raises.
    pub fn tick(&mut self) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }
        if self.close_ack_overdue() {
            debug!("no close acknowledgement from {} within {:?}", self.peer, self.config.timeout);
            self.disconnect();
            return Ok(());
        }
        let pipeline = Arc::clone(&self.pipeline);
        let result = pipeline.run_tick(self);
        self.check(result)
    }

    fn close_ack_overdue(&self) -> bool {
        self.state == ConnectionState::WriteClosed
            && !self.config.timeout.is_zero()
            && self
                .write_closed_at
                .is_some_and(|at| at.elapsed() >= self.config.timeout)
    }

    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result
            && err.is_connection_level()
            && self.state != ConnectionState::Closed
        {
            debug!("connection to {} failed: {err}", self.peer);
            self.disconnect();
        }
        result
    }

    /// Non-blocking readiness check used by event loops.
    ///
    /// # Errors
    ///
    /// Propagates the stream's probe error.
    pub fn poll_readable(&mut self) -> io::Result<bool> {
        if !self.is_readable() {
            return Ok(false);
        }
        self.stream.poll_readable()
    }

    /// Stream handle for the loop's poller, if the transport has one.
    pub(crate) fn source(&self) -> Option<Source<'_>> { self.stream.source() }

    /// Shut down the read direction.
    ///
    /// From `WriteClosed` this completes the closing handshake.
    pub fn close_read(&mut self) {
        let next = self.state.after_close_read();
        if next == ConnectionState::Closed {
            self.disconnect();
            return;
        }
        if let Err(err) = self.stream.shutdown(Shutdown::Read) {
            debug!("read shutdown on {} failed: {err}", self.peer);
        }
        self.transition(next);
    }

    /// Shut down the write direction.
    ///
    /// From `ReadClosed` this completes the closing handshake.
    pub fn close_write(&mut self) {
        let next = self.state.after_close_write();
        if next == ConnectionState::Closed {
            self.disconnect();
            return;
        }
        if let Err(err) = self.stream.shutdown(Shutdown::Write) {
            debug!("write shutdown on {} failed: {err}", self.peer);
        }
        self.write_closed_at = Some(Instant::now());
        self.transition(next);
    }

    /// Release the stream and enter `Closed`.
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.stream.close();
        self.assembler.reset();
        self.transition(ConnectionState::Closed);
        info!("connection to {} closed", self.peer);
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            tracing::debug!(peer = %self.peer, from = %self.state, to = %next, "state transition");
            self.state = next;
        }
    }

    /// Assemble one message straight from the stream, bypassing the pipeline.
    ///
    /// # Errors
    ///
    /// Decoding and transport failures.
    pub fn read_message(&mut self) -> Result<Message> {
        let message = self.assembler.assemble(&mut self.stream)?;
        tracing::debug!(peer = %self.peer, kind = message.kind().as_str(), len = message.content().len(), "message received");
        Ok(message)
    }

    /// Fragment and write one message, bypassing the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::ConnectionClosed`] when the write side is closed,
    /// or the classified transport failure.
    pub fn write_message(&mut self, message: &Message) -> Result<()> {
        if !self.is_writable() {
            return Err(WsError::closed(format!("cannot write in state {}", self.state)));
        }
        for frame in self.fragmenter.fragment(message) {
            codec::write_frame(&mut self.stream, &frame, self.config.push_masked)?;
            metrics::inc_frames(Direction::Outbound);
        }
        tracing::debug!(peer = %self.peer, kind = message.kind().as_str(), len = message.content().len(), "message sent");
        Ok(())
    }

    /// Read the peer's handshake head: a response for clients, a request for
    /// servers.
    ///
    /// # Errors
    ///
    /// Transport failures and malformed heads.
    pub fn read_http(&mut self) -> Result<HttpMessage> {
        let head = wire::read_head(&mut self.stream).map_err(WsError::from_transport)?;
        match self.role {
            Role::Client => wire::parse_response(&head).map(HttpMessage::Response),
            Role::Server => wire::parse_request(&head).map(HttpMessage::Request),
        }
    }

    /// Write a handshake head and remember it.
    ///
    /// # Errors
    ///
    /// Transport failures.
    pub fn write_http(&mut self, message: HttpMessage) -> Result<()> {
        let bytes = match &message {
            HttpMessage::Request(req) => wire::serialize_request(req),
            HttpMessage::Response(res) => wire::serialize_response(res),
        };
        self.stream
            .write_all(&bytes)
            .and_then(|()| self.stream.flush())
            .map_err(WsError::from_transport)?;
        match message {
            HttpMessage::Request(req) => self.handshake_request = Some(req),
            HttpMessage::Response(res) => self.handshake_response = Some(res),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
