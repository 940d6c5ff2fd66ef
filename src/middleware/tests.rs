//! Tests for chain registration, ordering and the built-in middlewares that
//! need no peer.

use std::{
    io::Write,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use http::Uri;
use rstest::{fixture, rstest};

use super::{
    Capabilities,
    CloseHandler,
    FollowRedirect,
    Middleware,
    PingInterval,
    PingResponder,
    Pipeline,
    Stack,
    SubprotocolNegotiation,
    Terminal,
    ping_interval::DEADLINE_KEY,
};
use crate::{
    config::WebSocketConfig,
    connection::{Connection, Role},
    error::{Result, WsError},
    handshake::HttpMessage,
    message::{Message, MessageKind},
    test_helpers::{TEST_TIMEOUT, handshaken_pair, raw_pair},
    transport::memory::duplex,
};

/// Appends its tag after the inner chain on the way in, before it on the way
/// out.
struct Tag(&'static str);

impl Middleware for Tag {
    fn capabilities(&self) -> Capabilities { Capabilities::NONE.incoming().outgoing().tick() }

    fn incoming(&self, stack: Stack<'_>, conn: &mut Connection) -> Result<Message> {
        let msg = stack.handle_incoming(conn)?;
        let tagged = format!("{}{}", msg.as_text()?, self.0);
        Ok(msg.with_content(tagged))
    }

    fn outgoing(&self, stack: Stack<'_>, conn: &mut Connection, message: Message) -> Result<()> {
        let tagged = format!("{}{}", message.as_text()?, self.0);
        stack.handle_outgoing(conn, message.with_content(tagged))
    }
}

/// Answers without calling the rest of the chain.
struct ShortCircuit;

impl Middleware for ShortCircuit {
    fn capabilities(&self) -> Capabilities { Capabilities::NONE.incoming() }

    fn incoming(&self, _stack: Stack<'_>, _conn: &mut Connection) -> Result<Message> {
        Ok(Message::text("short"))
    }
}

#[derive(Default)]
struct Recorder {
    pulls: AtomicUsize,
    ticks: AtomicUsize,
    sent: Mutex<Vec<String>>,
}

impl Recorder {
    fn sent(&self) -> Vec<String> { self.sent.lock().expect("recorder lock").clone() }
}

impl Terminal for Recorder {
    fn incoming(&self, _conn: &mut Connection) -> Result<Message> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        Ok(Message::text("terminal"))
    }

    fn outgoing(&self, _conn: &mut Connection, message: Message) -> Result<()> {
        self.sent
            .lock()
            .expect("recorder lock")
            .push(message.as_text()?.to_owned());
        Ok(())
    }

    fn http_incoming(&self, _conn: &mut Connection) -> Result<HttpMessage> {
        Err(WsError::Handshake("not used".into()))
    }

    fn http_outgoing(&self, _conn: &mut Connection, _message: HttpMessage) -> Result<()> { Ok(()) }

    fn tick(&self, _conn: &mut Connection) -> Result<()> {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    recorder: Arc<Recorder>,
    conn: Connection,
    _peer: Connection,
}

#[fixture]
fn harness() -> Harness {
    let recorder = Arc::new(Recorder::default());
    let mut pipeline = Pipeline::with_terminal(recorder.clone());
    pipeline.attach(Tag("X")).attach(Tag("Y")).attach(Tag("Z"));
    let (conn, peer) = raw_pair(pipeline, Pipeline::new()).expect("pair");
    Harness {
        recorder,
        conn,
        _peer: peer,
    }
}

#[rstest]
fn incoming_results_unwind_in_reverse_attachment_order(harness: Harness) {
    let Harness {
        recorder, mut conn, ..
    } = harness;
    let msg = conn.receive().expect("receive");
    assert_eq!(msg.as_text().expect("utf8"), "terminalZYX");
    assert_eq!(recorder.pulls.load(Ordering::SeqCst), 1);
}

#[rstest]
fn outgoing_messages_are_rewritten_in_attachment_order(harness: Harness) {
    let Harness {
        recorder, mut conn, ..
    } = harness;
    conn.text("m").expect("send");
    conn.text("n").expect("send");
    assert_eq!(recorder.sent(), ["mXYZ", "nXYZ"]);
}

#[rstest]
fn tick_passes_through_to_the_terminal(harness: Harness) {
    let Harness {
        recorder, mut conn, ..
    } = harness;
    conn.tick().expect("tick");
    assert_eq!(recorder.ticks.load(Ordering::SeqCst), 1);
}

#[test]
fn short_circuit_skips_terminal() {
    let recorder = Arc::new(Recorder::default());
    let mut pipeline = Pipeline::with_terminal(recorder.clone());
    pipeline.attach(Tag("X")).attach(ShortCircuit).attach(Tag("Z"));
    let (mut conn, _peer) = raw_pair(pipeline, Pipeline::new()).expect("pair");

    let msg = conn.receive().expect("receive");
    assert_eq!(msg.as_text().expect("utf8"), "shortX");
    assert_eq!(recorder.pulls.load(Ordering::SeqCst), 0);
}

#[test]
fn middlewares_join_only_declared_chains() {
    let mut pipeline = Pipeline::new();
    pipeline
        .attach(CloseHandler)
        .attach(PingResponder)
        .attach(PingInterval::default())
        .attach(FollowRedirect::default())
        .attach(SubprotocolNegotiation::new(["chat"], false));
    assert_eq!(pipeline.chain_lengths(), [2, 2, 2, 1, 1]);
}

#[test]
fn interval_ping_goes_out_once_the_deadline_passes() {
    let mut client_pipeline = Pipeline::new();
    client_pipeline.attach(PingInterval::new(Some(Duration::from_millis(20))));
    let (mut client, mut server) =
        handshaken_pair(client_pipeline, Pipeline::standard()).expect("handshake");

    client.tick().expect("first tick arms the deadline");
    let armed = *client.meta::<Instant>(DEADLINE_KEY).expect("deadline");
    thread::sleep(Duration::from_millis(30));
    client.tick().expect("second tick pings");

    let ping = server.receive().expect("ping");
    assert_eq!(ping.kind(), MessageKind::Ping);
    let rearmed = *client.meta::<Instant>(DEADLINE_KEY).expect("deadline");
    assert!(rearmed > armed);

    let pong = client.receive().expect("pong");
    assert_eq!(pong.kind(), MessageKind::Pong);
}

#[test]
fn outgoing_traffic_postpones_the_interval_ping() {
    let mut client_pipeline = Pipeline::new();
    client_pipeline.attach(PingInterval::new(Some(Duration::from_secs(60))));
    let (mut client, _server) =
        handshaken_pair(client_pipeline, Pipeline::standard()).expect("handshake");

    assert!(client.meta::<Instant>(DEADLINE_KEY).is_none());
    client.text("traffic").expect("send");
    let deadline = *client.meta::<Instant>(DEADLINE_KEY).expect("deadline");
    assert!(deadline > Instant::now() + Duration::from_secs(59));
}

fn redirected_client(pipeline: &Arc<Pipeline>, location: &str) -> Result<()> {
    let (client_end, mut server_end) = duplex("client", "server");
    write!(
        server_end,
        "HTTP/1.1 302 Found\r\nLocation: {location}\r\n\r\n"
    )
    .expect("write redirect");
    let mut client = Connection::new(
        Box::new(client_end),
        WebSocketConfig::client().timeout(TEST_TIMEOUT),
        Role::Client,
        Arc::clone(pipeline),
    )?;
    client.handshake_client(&Uri::from_static("ws://origin.test:9000/start"))
}

#[test]
fn redirects_request_reconnects_until_the_limit() {
    let mut pipeline = Pipeline::standard();
    pipeline.attach(FollowRedirect::new(1));
    let pipeline = Arc::new(pipeline);

    let err = redirected_client(&pipeline, "/moved").expect_err("redirect");
    let WsError::Reconnect { target } = err else {
        panic!("expected reconnect, got {err:?}");
    };
    assert_eq!(target.to_string(), "ws://origin.test:9000/moved");

    let err = redirected_client(&pipeline, "ws://elsewhere.test/").expect_err("limit");
    assert!(matches!(err, WsError::TooManyRedirects { limit: 1 }));
    assert_eq!(err.severity(), crate::error::Severity::Fatal);
}

#[rstest]
#[case::overlap(&["a", "b"], &["b", "c"], false, Some("b"))]
#[case::client_order_wins(&["b", "a"], &["a", "b"], false, Some("b"))]
#[case::none_optional(&["a"], &["z"], false, None)]
fn subprotocol_agreement(
    #[case] offered: &[&str],
    #[case] supported: &[&str],
    #[case] require: bool,
    #[case] expected: Option<&str>,
) {
    let mut client_pipeline = Pipeline::standard();
    client_pipeline.attach(SubprotocolNegotiation::new(offered.iter().copied(), require));
    let mut server_pipeline = Pipeline::standard();
    server_pipeline.attach(SubprotocolNegotiation::new(supported.iter().copied(), require));

    let (client, server) = handshaken_pair(client_pipeline, server_pipeline).expect("handshake");
    assert_eq!(client.subprotocol(), expected);
    assert_eq!(server.subprotocol(), expected);
}

#[test]
fn required_subprotocol_without_overlap_refuses_upgrade() {
    let mut client_pipeline = Pipeline::standard();
    client_pipeline.attach(SubprotocolNegotiation::new(["a"], true));
    let mut server_pipeline = Pipeline::standard();
    server_pipeline.attach(SubprotocolNegotiation::new(["z"], true));

    let err = handshaken_pair(client_pipeline, server_pipeline).expect_err("refused");
    assert!(matches!(err, WsError::Handshake(_)));
}
