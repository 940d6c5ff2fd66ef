//! Ordered middleware chains around the connection's I/O.
//!
//! A [`Pipeline`] keeps five chains: incoming messages, outgoing messages,
//! incoming handshake HTTP, outgoing handshake HTTP, and periodic ticks. A
//! [`Middleware`] declares through [`Capabilities`] which of them it joins and
//! is registered only there, in attachment order.
//!
//! Running a chain builds a [`Stack`] over the registered middlewares and the
//! pipeline's [`Terminal`]. Each middleware receives the stack by value and
//! either calls the matching `handle_*` continuation or short-circuits. With
//! `[m1, m2, m3]` attached, a call nests `m1 → m2 → m3 → terminal` and
//! results unwind `m3 → m2 → m1`.

pub mod close;
pub mod ping;
pub mod ping_interval;
pub mod redirect;
pub mod subprotocol;

use std::{fmt, sync::Arc};

pub use close::CloseHandler;
pub use ping::PingResponder;
pub use ping_interval::PingInterval;
pub use redirect::FollowRedirect;
pub use subprotocol::SubprotocolNegotiation;

use crate::{connection::Connection, error::Result, handshake::HttpMessage, message::Message};

/// Chains a middleware takes part in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Incoming message chain.
    pub incoming: bool,
    /// Outgoing message chain.
    pub outgoing: bool,
    /// Incoming handshake chain.
    pub http_incoming: bool,
    /// Outgoing handshake chain.
    pub http_outgoing: bool,
    /// Tick chain.
    pub tick: bool,
}

impl Capabilities {
    /// Member of no chain.
    pub const NONE: Self = Self {
        incoming: false,
        outgoing: false,
        http_incoming: false,
        http_outgoing: false,
        tick: false,
    };

    /// Add the incoming message chain.
    #[must_use]
    pub const fn incoming(mut self) -> Self {
        self.incoming = true;
        self
    }

    /// Add the outgoing message chain.
    #[must_use]
    pub const fn outgoing(mut self) -> Self {
        self.outgoing = true;
        self
    }

    /// Add the incoming handshake chain.
    #[must_use]
    pub const fn http_incoming(mut self) -> Self {
        self.http_incoming = true;
        self
    }

    /// Add the outgoing handshake chain.
    #[must_use]
    pub const fn http_outgoing(mut self) -> Self {
        self.http_outgoing = true;
        self
    }

    /// Add the tick chain.
    #[must_use]
    pub const fn tick(mut self) -> Self {
        self.tick = true;
        self
    }
}

/// A participant in one or more chains.
///
/// Every hook defaults to passing straight through, so implementors override
/// only the hooks matching their [`Capabilities`].
///
/// # Examples
///
/// ```
/// use wsframe::{
///     connection::Connection,
///     error::Result,
///     message::Message,
///     middleware::{Capabilities, Middleware, Stack},
/// };
///
/// /// Upper-cases incoming text.
/// struct Shout;
///
/// impl Middleware for Shout {
///     fn capabilities(&self) -> Capabilities { Capabilities::NONE.incoming() }
///
///     fn incoming(&self, stack: Stack<'_>, conn: &mut Connection) -> Result<Message> {
///         let msg = stack.handle_incoming(conn)?;
///         let upper = msg.as_text()?.to_uppercase();
///         Ok(msg.with_content(upper))
///     }
/// }
/// ```
pub trait Middleware: Send + Sync {
    /// Chains to register this middleware in.
    fn capabilities(&self) -> Capabilities;

    /// Name used in logs.
    fn name(&self) -> &'static str { std::any::type_name::<Self>() }

    /// Wrap the pull of one incoming message.
    ///
    /// # Errors
    ///
    /// Propagates errors from the rest of the chain or raises its own.
    fn incoming(&self, stack: Stack<'_>, conn: &mut Connection) -> Result<Message> {
        stack.handle_incoming(conn)
    }

    /// Wrap the push of one outgoing message.
    ///
    /// # Errors
    ///
    /// Propagates errors from the rest of the chain or raises its own.
    fn outgoing(&self, stack: Stack<'_>, conn: &mut Connection, message: Message) -> Result<()> {
        stack.handle_outgoing(conn, message)
    }

    /// Wrap reading the peer's handshake message.
    ///
    /// # Errors
    ///
    /// Propagates errors from the rest of the chain or raises its own.
    fn http_incoming(&self, stack: Stack<'_>, conn: &mut Connection) -> Result<HttpMessage> {
        stack.handle_http_incoming(conn)
    }

    /// Wrap writing the local handshake message.
    ///
    /// # Errors
    ///
    /// Propagates errors from the rest of the chain or raises its own.
    fn http_outgoing(
        &self,
        stack: Stack<'_>,
        conn: &mut Connection,
        message: HttpMessage,
    ) -> Result<()> {
        stack.handle_http_outgoing(conn, message)
    }

    /// Wrap a periodic tick.
    ///
    /// # Errors
    ///
    /// Propagates errors from the rest of the chain or raises its own.
    fn tick(&self, stack: Stack<'_>, conn: &mut Connection) -> Result<()> { stack.handle_tick(conn) }
}

/// Operation at the bottom of every chain.
///
/// [`WireTerminal`] performs real I/O on the connection's stream; tests may
/// substitute their own.
pub trait Terminal: Send + Sync {
    /// Produce one incoming message.
    ///
    /// # Errors
    ///
    /// Returns decoding and transport failures.
    fn incoming(&self, conn: &mut Connection) -> Result<Message>;

    /// Consume one outgoing message.
    ///
    /// # Errors
    ///
    /// Returns transport failures.
    fn outgoing(&self, conn: &mut Connection, message: Message) -> Result<()>;

    /// Produce the peer's handshake message.
    ///
    /// # Errors
    ///
    /// Returns parse and transport failures.
    fn http_incoming(&self, conn: &mut Connection) -> Result<HttpMessage>;

    /// Consume the local handshake message.
    ///
    /// # Errors
    ///
    /// Returns transport failures.
    fn http_outgoing(&self, conn: &mut Connection, message: HttpMessage) -> Result<()>;

    /// End of the tick chain.
    ///
    /// # Errors
    ///
    /// The default never fails.
    fn tick(&self, _conn: &mut Connection) -> Result<()> { Ok(()) }
}

/// Terminal backed by the connection's codec and stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct WireTerminal;

impl Terminal for WireTerminal {
    fn incoming(&self, conn: &mut Connection) -> Result<Message> { conn.read_message() }

    fn outgoing(&self, conn: &mut Connection, message: Message) -> Result<()> {
        conn.write_message(&message)
    }

    fn http_incoming(&self, conn: &mut Connection) -> Result<HttpMessage> { conn.read_http() }

    fn http_outgoing(&self, conn: &mut Connection, message: HttpMessage) -> Result<()> {
        conn.write_http(message)
    }
}

/// Remaining middlewares of one chain invocation plus the terminal.
///
/// Consumed by value: each `handle_*` call pops the head and hands it the
/// rest, so the terminal runs at most once per invocation. A middleware
/// cannot continue the chain twice:
///
/// ```compile_fail,E0382
/// use wsframe::{
///     connection::Connection,
///     error::Result,
///     message::Message,
///     middleware::{Capabilities, Middleware, Stack},
/// };
///
/// struct Twice;
///
/// impl Middleware for Twice {
///     fn capabilities(&self) -> Capabilities { Capabilities::NONE.incoming() }
///
///     fn incoming(&self, stack: Stack<'_>, conn: &mut Connection) -> Result<Message> {
///         let _ = stack.handle_incoming(conn)?;
///         stack.handle_incoming(conn)
///     }
/// }
/// ```
pub struct Stack<'a> {
    chain: &'a [Arc<dyn Middleware>],
    terminal: &'a dyn Terminal,
}

impl fmt::Debug for Stack<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("remaining", &self.chain.len())
            .finish_non_exhaustive()
    }
}

impl<'a> Stack<'a> {
    /// Build a stack over `chain` ending in `terminal`.
    #[must_use]
    pub const fn new(chain: &'a [Arc<dyn Middleware>], terminal: &'a dyn Terminal) -> Self {
        Self { chain, terminal }
    }

    /// Middlewares not yet run.
    #[must_use]
    pub const fn remaining(&self) -> usize { self.chain.len() }

    /// Continue the incoming message chain.
    ///
    /// # Errors
    ///
    /// Whatever the next middleware or the terminal returns.
    pub fn handle_incoming(self, conn: &mut Connection) -> Result<Message> {
        match self.chain.split_first() {
            Some((head, rest)) => head.incoming(Self::new(rest, self.terminal), conn),
            None => self.terminal.incoming(conn),
        }
    }

    /// Continue the outgoing message chain.
    ///
    /// # Errors
    ///
    /// Whatever the next middleware or the terminal returns.
    pub fn handle_outgoing(self, conn: &mut Connection, message: Message) -> Result<()> {
        match self.chain.split_first() {
            Some((head, rest)) => head.outgoing(Self::new(rest, self.terminal), conn, message),
            None => self.terminal.outgoing(conn, message),
        }
    }

    /// Continue the incoming handshake chain.
    ///
    /// # Errors
    ///
    /// Whatever the next middleware or the terminal returns.
    pub fn handle_http_incoming(self, conn: &mut Connection) -> Result<HttpMessage> {
        match self.chain.split_first() {
            Some((head, rest)) => head.http_incoming(Self::new(rest, self.terminal), conn),
            None => self.terminal.http_incoming(conn),
        }
    }

    /// Continue the outgoing handshake chain.
    ///
    /// # Errors
    ///
    /// Whatever the next middleware or the terminal returns.
    pub fn handle_http_outgoing(self, conn: &mut Connection, message: HttpMessage) -> Result<()> {
        match self.chain.split_first() {
            Some((head, rest)) => head.http_outgoing(Self::new(rest, self.terminal), conn, message),
            None => self.terminal.http_outgoing(conn, message),
        }
    }

    /// Continue the tick chain.
    ///
    /// # Errors
    ///
    /// Whatever the next middleware or the terminal returns.
    pub fn handle_tick(self, conn: &mut Connection) -> Result<()> {
        match self.chain.split_first() {
            Some((head, rest)) => head.tick(Self::new(rest, self.terminal), conn),
            None => self.terminal.tick(conn),
        }
    }
}

/// The five chains and their terminal.
#[derive(Clone)]
pub struct Pipeline {
    incoming: Vec<Arc<dyn Middleware>>,
    outgoing: Vec<Arc<dyn Middleware>>,
    http_incoming: Vec<Arc<dyn Middleware>>,
    http_outgoing: Vec<Arc<dyn Middleware>>,
    tick: Vec<Arc<dyn Middleware>>,
    terminal: Arc<dyn Terminal>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |chain: &[Arc<dyn Middleware>]| chain.iter().map(|m| m.name()).collect::<Vec<_>>();
        f.debug_struct("Pipeline")
            .field("incoming", &names(&self.incoming))
            .field("outgoing", &names(&self.outgoing))
            .field("http_incoming", &names(&self.http_incoming))
            .field("http_outgoing", &names(&self.http_outgoing))
            .field("tick", &names(&self.tick))
            .finish_non_exhaustive()
    }
}

impl Default for Pipeline {
    fn default() -> Self { Self::new() }
}

impl Pipeline {
    /// Empty chains over [`WireTerminal`].
    #[must_use]
    pub fn new() -> Self { Self::with_terminal(Arc::new(WireTerminal)) }

    /// Empty chains over a custom terminal.
    #[must_use]
    pub fn with_terminal(terminal: Arc<dyn Terminal>) -> Self {
        Self {
            incoming: Vec::new(),
            outgoing: Vec::new(),
            http_incoming: Vec::new(),
            http_outgoing: Vec::new(),
            tick: Vec::new(),
            terminal,
        }
    }

    /// Pipeline with [`CloseHandler`] and [`PingResponder`] attached.
    ///
    /// Clients and servers start from this.
    #[must_use]
    pub fn standard() -> Self {
        let mut pipeline = Self::new();
        pipeline.attach(CloseHandler);
        pipeline.attach(PingResponder);
        pipeline
    }

    /// Register `middleware` at the end of every chain it declares.
    pub fn attach<M: Middleware + 'static>(&mut self, middleware: M) -> &mut Self {
        self.attach_arc(Arc::new(middleware))
    }

    /// Register a shared middleware.
    pub fn attach_arc(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        let caps = middleware.capabilities();
        tracing::debug!(middleware = middleware.name(), ?caps, "middleware attached");
        for (member, chain) in [
            (caps.incoming, &mut self.incoming),
            (caps.outgoing, &mut self.outgoing),
            (caps.http_incoming, &mut self.http_incoming),
            (caps.http_outgoing, &mut self.http_outgoing),
            (caps.tick, &mut self.tick),
        ] {
            if member {
                chain.push(Arc::clone(&middleware));
            }
        }
        self
    }

    /// Number of middlewares on each chain, in the order incoming, outgoing,
    /// HTTP incoming, HTTP outgoing, tick.
    #[must_use]
    pub fn chain_lengths(&self) -> [usize; 5] {
        [
            self.incoming.len(),
            self.outgoing.len(),
            self.http_incoming.len(),
            self.http_outgoing.len(),
            self.tick.len(),
        ]
    }

    /// Run the incoming message chain.
    ///
    /// # Errors
    ///
    /// Propagates the chain's error.
    pub fn run_incoming(&self, conn: &mut Connection) -> Result<Message> {
        Stack::new(&self.incoming, &*self.terminal).handle_incoming(conn)
    }

    /// Run the outgoing message chain.
    ///
    /// # Errors
    ///
    /// Propagates the chain's error.
    pub fn run_outgoing(&self, conn: &mut Connection, message: Message) -> Result<()> {
        Stack::new(&self.outgoing, &*self.terminal).handle_outgoing(conn, message)
    }

    /// Run the incoming handshake chain.
    ///
    /// # Errors
    ///
    /// Propagates the chain's error.
    pub fn run_http_incoming(&self, conn: &mut Connection) -> Result<HttpMessage> {
        Stack::new(&self.http_incoming, &*self.terminal).handle_http_incoming(conn)
    }

    /// Run the outgoing handshake chain.
    ///
    /// # Errors
    ///
    /// Propagates the chain's error.
    pub fn run_http_outgoing(&self, conn: &mut Connection, message: HttpMessage) -> Result<()> {
        Stack::new(&self.http_outgoing, &*self.terminal).handle_http_outgoing(conn, message)
    }

    /// Run the tick chain.
    ///
    /// # Errors
    ///
    /// Propagates the chain's error.
    pub fn run_tick(&self, conn: &mut Connection) -> Result<()> {
        Stack::new(&self.tick, &*self.terminal).handle_tick(conn)
    }
}

#[cfg(test)]
mod tests;
