//! Tests for message exchange and the closing handshake over in-memory
//! streams.

use std::{
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use rstest::{fixture, rstest};

use super::{Connection, ConnectionState};
use crate::{
    error::{Result, WsError},
    message::{CloseCode, Message, MessageKind},
    middleware::{Capabilities, CloseHandler, Middleware, Pipeline, PingResponder, Stack},
    test_helpers::handshaken_pair,
};

#[fixture]
fn pair() -> (Connection, Connection) {
    handshaken_pair(Pipeline::standard(), Pipeline::standard()).expect("handshake")
}

/// Counts close messages handed to the outgoing chain.
#[derive(Clone, Default)]
struct CloseCounter(Arc<AtomicUsize>);

impl Middleware for CloseCounter {
    fn capabilities(&self) -> Capabilities { Capabilities::NONE.outgoing() }

    fn outgoing(&self, stack: Stack<'_>, conn: &mut Connection, message: Message) -> Result<()> {
        let is_close = message.kind() == MessageKind::Close;
        stack.handle_outgoing(conn, message)?;
        if is_close {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[rstest]
fn text_and_binary_cross_in_both_directions(pair: (Connection, Connection)) {
    let (mut client, mut server) = pair;
    client.text("hi").expect("send");
    let msg = server.receive().expect("receive");
    assert_eq!(msg.kind(), MessageKind::Text);
    assert_eq!(msg.as_text().expect("utf8"), "hi");

    server.binary(vec![1u8, 2, 3]).expect("send");
    let msg = client.receive().expect("receive");
    assert_eq!(msg.kind(), MessageKind::Binary);
    assert_eq!(&msg.content()[..], &[1, 2, 3]);
}

#[rstest]
fn large_messages_are_fragmented_and_reassembled(pair: (Connection, Connection)) {
    let (mut client, mut server) = pair;
    let body = "x".repeat(client.config().frame_size.get() * 3 + 7);
    client.text(body.clone()).expect("send");
    assert_eq!(server.receive().expect("receive").as_text().expect("utf8"), body);
}

#[test]
fn close_handshake_reaches_closed_on_both_sides_with_one_ack() {
    let client_closes = CloseCounter::default();
    let server_closes = CloseCounter::default();
    let mut client_pipeline = Pipeline::standard();
    client_pipeline.attach(client_closes.clone());
    let mut server_pipeline = Pipeline::standard();
    server_pipeline.attach(server_closes.clone());
    let (mut a, mut b) = handshaken_pair(client_pipeline, server_pipeline).expect("handshake");

    a.close_with(CloseCode::NORMAL, "bye").expect("close");
    assert_eq!(a.state(), ConnectionState::WriteClosed);
    assert!(a.is_readable() && !a.is_writable());

    let close = b.receive().expect("peer close");
    assert_eq!(close.kind(), MessageKind::Close);
    assert_eq!(close.close_status(), Some(CloseCode::NORMAL));
    assert_eq!(close.as_text().expect("reason"), "bye");
    assert_eq!(b.state(), ConnectionState::Closed);

    let ack = a.receive().expect("ack");
    assert_eq!(ack.kind(), MessageKind::Close);
    assert_eq!(ack.close_status(), Some(CloseCode::NORMAL));
    assert_eq!(a.state(), ConnectionState::Closed);

    assert_eq!(client_closes.0.load(Ordering::SeqCst), 1);
    assert_eq!(server_closes.0.load(Ordering::SeqCst), 1);
}

type StateLog = Arc<Mutex<Vec<(&'static str, &'static str, ConnectionState)>>>;

/// Records the connection state around every close passing through.
///
/// Attached ahead of [`CloseHandler`] so it sees the state changes the
/// handler makes.
struct CloseStates {
    side: &'static str,
    log: StateLog,
}

impl CloseStates {
    fn record(&self, event: &'static str, conn: &Connection) {
        self.log.lock().expect("lock").push((self.side, event, conn.state()));
    }
}

impl Middleware for CloseStates {
    fn capabilities(&self) -> Capabilities { Capabilities::NONE.incoming().outgoing() }

    fn incoming(&self, stack: Stack<'_>, conn: &mut Connection) -> Result<Message> {
        let message = stack.handle_incoming(conn)?;
        if message.kind() == MessageKind::Close {
            self.record("received", conn);
        }
        Ok(message)
    }

    fn outgoing(&self, stack: Stack<'_>, conn: &mut Connection, message: Message) -> Result<()> {
        let is_close = message.kind() == MessageKind::Close;
        if is_close {
            self.record("sending", conn);
        }
        stack.handle_outgoing(conn, message)?;
        if is_close {
            self.record("sent", conn);
        }
        Ok(())
    }
}

fn logged_pipeline(side: &'static str, log: &StateLog) -> Pipeline {
    let mut pipeline = Pipeline::new();
    pipeline
        .attach(CloseStates {
            side,
            log: Arc::clone(log),
        })
        .attach(CloseHandler)
        .attach(PingResponder);
    pipeline
}

#[test]
fn close_handshake_moves_through_half_closed_states_in_order() {
    use ConnectionState::{Closed, Open, ReadClosed, WriteClosed};

    let log = StateLog::default();
    let (mut a, mut b) =
        handshaken_pair(logged_pipeline("a", &log), logged_pipeline("b", &log)).expect("handshake");

    a.close_with(CloseCode::NORMAL, "bye").expect("close");
    b.receive().expect("peer close");
    a.receive().expect("ack");

    assert_eq!(
        *log.lock().expect("lock"),
        [
            ("a", "sending", Open),
            ("a", "sent", WriteClosed),
            ("b", "sending", ReadClosed),
            ("b", "sent", Closed),
            ("b", "received", Closed),
            ("a", "received", Closed),
        ]
    );
}

#[rstest]
fn unacknowledged_close_is_released_after_the_timeout(pair: (Connection, Connection)) {
    let (mut client, _server) = pair;
    client.config.timeout = Duration::from_millis(20);
    client.close().expect("close");

    client.tick().expect("tick");
    assert_eq!(client.state(), ConnectionState::WriteClosed);

    thread::sleep(Duration::from_millis(60));
    client.tick().expect("tick");
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(!client.is_connected());
}

#[rstest]
fn default_close_uses_normal_status(pair: (Connection, Connection)) {
    let (mut client, mut server) = pair;
    client.close().expect("close");
    let close = server.receive().expect("close");
    assert_eq!(close.close_status(), Some(CloseCode::NORMAL));
    assert_eq!(close.as_text().expect("reason"), "ttfn");
}

#[rstest]
fn sending_after_local_close_is_refused(pair: (Connection, Connection)) {
    let (mut client, _server) = pair;
    client.close().expect("close");
    let err = client.text("late").expect_err("write side closed");
    assert!(matches!(err, WsError::ConnectionClosed(_)));
}

#[rstest]
fn vanished_peer_forces_closed_during_close_handshake(pair: (Connection, Connection)) {
    let (mut client, server) = pair;
    client.close().expect("close");
    drop(server);
    let err = client.receive().expect_err("peer gone");
    assert!(err.is_connection_level());
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(!client.is_connected());
}

#[rstest]
fn ping_is_answered_once_with_the_same_payload(pair: (Connection, Connection)) {
    let (mut client, mut server) = pair;
    client.ping("x").expect("ping");
    client.text("after").expect("text");

    assert_eq!(server.receive().expect("ping").kind(), MessageKind::Ping);
    let pong = client.receive().expect("pong");
    assert_eq!(pong.kind(), MessageKind::Pong);
    assert_eq!(&pong.content()[..], b"x");
    assert!(!client.poll_readable().expect("poll"));

    assert_eq!(server.receive().expect("text").as_text().expect("utf8"), "after");
}

#[rstest]
fn metadata_is_typed_and_keyed(pair: (Connection, Connection)) {
    let (mut client, _server) = pair;
    client.set_meta("app.counter", 1u32);
    *client.meta_mut::<u32>("app.counter").expect("present") += 1;
    assert_eq!(client.meta::<u32>("app.counter"), Some(&2));
    assert_eq!(client.meta::<String>("app.counter"), None);
    assert!(client.remove_meta("app.counter"));
    assert!(!client.remove_meta("app.counter"));
}

#[rstest]
fn handshake_messages_are_kept(pair: (Connection, Connection)) {
    let (client, server) = pair;
    assert!(client.handshake_request().is_some());
    assert_eq!(
        client.handshake_response().map(http::Response::status),
        Some(http::StatusCode::SWITCHING_PROTOCOLS)
    );
    assert_eq!(
        server.handshake_request().map(|r| r.uri().path()),
        Some("/")
    );
}

#[test]
fn unmasked_frames_are_rejected_by_servers() {
    use std::io::Write as _;

    use crate::{
        codec,
        config::WebSocketConfig,
        connection::Role,
        frame::{Frame, OpCode},
        transport::memory::duplex,
    };

    let (mut raw, server_end) = duplex("client", "server");
    let mut server = Connection::new(
        Box::new(server_end),
        WebSocketConfig::server(),
        Role::Server,
        Arc::new(Pipeline::standard()),
    )
    .expect("connection");
    raw.write_all(&codec::encode(&Frame::final_frame(OpCode::Text, "plain"), false))
        .expect("write");

    let err = server.receive().expect_err("unmasked");
    assert!(matches!(err, WsError::Protocol(_)));
    assert_eq!(server.state(), ConnectionState::Closed);
}
