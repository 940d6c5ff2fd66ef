//! Server loop tests over in-memory streams.

use std::{
    io::Write as _,
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

use super::{SHUTDOWN_REASON, Server};
use crate::{
    config::WebSocketConfig,
    connection::{Connection, ConnectionState, Role},
    error::{Result, WsError},
    message::{CloseCode, MessageKind},
    middleware::Pipeline,
    test_helpers::{TEST_TIMEOUT, TEST_URI, handshaken_pair},
    transport::{
        Connector,
        memory::{MemoryConnector, listener},
    },
};

#[fixture]
fn memory_server() -> (Server, MemoryConnector) {
    let (acceptor, connector) = listener("server");
    let server = Server::new(WebSocketConfig::server().timeout(TEST_TIMEOUT)).with_acceptor(acceptor);
    (server, connector)
}

fn connect(connector: &MemoryConnector) -> Connection {
    let uri = Uri::from_static(TEST_URI);
    let config = WebSocketConfig::client().timeout(TEST_TIMEOUT);
    let stream = connector.connect(&uri, &config).expect("connect");
    let mut conn = Connection::new(stream, config, Role::Client, Arc::new(Pipeline::standard()))
        .expect("connection");
    conn.handshake_client(&uri).expect("handshake");
    conn
}

/// Run the server loop on a scoped thread while `body` plays the clients.
fn run_with<R>(server: &mut Server, body: impl FnOnce() -> R) -> (Result<()>, R) {
    let stop = server.stop_handle();
    thread::scope(|scope| {
        let loop_thread = scope.spawn(|| server.start());
        let out = body();
        stop.stop();
        (loop_thread.join().expect("server thread"), out)
    })
}

#[rstest]
fn echoes_text_and_fires_lifecycle_events(memory_server: (Server, MemoryConnector)) {
    let (mut server, connector) = memory_server;
    let connects = Arc::new(AtomicUsize::new(0));
    let disconnects = Arc::new(AtomicUsize::new(0));
    let (c, d) = (Arc::clone(&connects), Arc::clone(&disconnects));
    server
        .handlers_mut()
        .on_connect(move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .on_disconnect(move |_, _| {
            d.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .on_text(|conn, message, _| conn.send(message));

    let (result, reply) = run_with(&mut server, || {
        let mut client = connect(&connector);
        client.text("hi").expect("send");
        let reply = client.receive().expect("echo");
        client.close().expect("close");
        let ack = client.receive().expect("ack");
        assert_eq!(ack.kind(), MessageKind::Close);
        assert_eq!(client.state(), ConnectionState::Closed);
        reply
    });

    result.expect("clean stop");
    assert_eq!(reply.kind(), MessageKind::Text);
    assert_eq!(reply.as_text().expect("utf8"), "hi");
    assert_eq!(connects.load(Ordering::SeqCst), 1);
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(server.connection_count(), 0);
}

#[rstest]
fn handler_broadcast_reaches_every_client(memory_server: (Server, MemoryConnector)) {
    let (mut server, connector) = memory_server;
    server.handlers_mut().on_text(|_, message, ctl| {
        ctl.broadcast(message);
        Ok(())
    });

    let (result, (a, b)) = run_with(&mut server, || {
        let mut first = connect(&connector);
        let mut second = connect(&connector);
        // the second client is registered once its handshake returned
        first.text("all").expect("send");
        let a = first.receive().expect("first copy");
        let b = second.receive().expect("second copy");
        (a, b)
    });

    result.expect("clean stop");
    assert_eq!(a.as_text().expect("utf8"), "all");
    assert_eq!(b.as_text().expect("utf8"), "all");
}

#[rstest]
fn handler_stop_shuts_clients_down_with_going_away(memory_server: (Server, MemoryConnector)) {
    let (mut server, connector) = memory_server;
    server.handlers_mut().on_text(|_, _, ctl| {
        ctl.stop();
        Ok(())
    });

    let (result, close) = run_with(&mut server, || {
        let mut client = connect(&connector);
        client.text("stop").expect("send");
        client.receive().expect("server close")
    });

    result.expect("clean stop");
    assert_eq!(close.close_status(), Some(CloseCode::GOING_AWAY));
    assert_eq!(close.as_text().expect("utf8"), SHUTDOWN_REASON);
}

#[rstest]
fn fatal_handler_errors_end_the_loop(memory_server: (Server, MemoryConnector)) {
    let (mut server, connector) = memory_server;
    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reported);
    server
        .handlers_mut()
        .on_text(|_, _, _| Err(WsError::Config("handler gave up".into())))
        .on_error(move |conn, err, _| sink.lock().expect("lock").push((conn.is_none(), err.to_string())));

    let (result, kind) = run_with(&mut server, || {
        let mut client = connect(&connector);
        client.text("boom").expect("send");
        client.receive().expect("server close").kind()
    });

    assert!(matches!(result, Err(WsError::Config(_))));
    assert_eq!(kind, MessageKind::Close);
    let reported = reported.lock().expect("lock");
    assert_eq!(reported.len(), 1);
    assert!(reported[0].0);
}

#[rstest]
fn failed_handshakes_are_not_registered(memory_server: (Server, MemoryConnector)) {
    let (mut server, connector) = memory_server;
    let uri = Uri::from_static(TEST_URI);
    let mut raw = connector
        .connect(&uri, &WebSocketConfig::client())
        .expect("connect");
    raw.write_all(b"GET / HTTP/1.1\r\nHost: memory.test\r\n\r\n")
        .expect("write");

    server.run_once().expect("iteration");
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn starting_an_unbound_server_is_a_config_error() {
    let mut server = Server::new(WebSocketConfig::server());
    assert!(matches!(server.start(), Err(WsError::Config(_))));
}

#[rstest]
fn colliding_peer_names_get_suffixes(memory_server: (Server, MemoryConnector)) {
    let (mut server, _connector) = memory_server;
    let (_client, peer) = handshaken_pair(Pipeline::new(), Pipeline::new()).expect("pair");
    server.connections.insert("client".into(), peer);
    assert_eq!(server.unique_key("client".into()), "client#2");
    assert_eq!(server.unique_key("other".into()), "other");
}

#[test]
fn stop_wakes_an_idle_tcp_server() {
    let mut server = Server::new(WebSocketConfig::server().timeout(Duration::from_secs(60)))
        .bind("127.0.0.1:0")
        .expect("bind");
    let stop = server.stop_handle();
    let started = Instant::now();

    let (result, ()) = run_with(&mut server, || {
        thread::sleep(Duration::from_millis(50));
        stop.stop();
    });

    result.expect("clean stop");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn tcp_clients_are_served_through_the_poller() {
    let mut server = Server::new(WebSocketConfig::server().timeout(TEST_TIMEOUT))
        .bind("127.0.0.1:0")
        .expect("bind");
    server.handlers_mut().on_text(|conn, message, _| conn.send(message));
    let addr = server.local_addr().expect("addr");
    let uri: Uri = format!("ws://{addr}/").parse().expect("uri");

    let (result, replies) = run_with(&mut server, || {
        let config = WebSocketConfig::client().timeout(TEST_TIMEOUT);
        let mut clients: Vec<Connection> = (0..2)
            .map(|_| {
                let stream = crate::transport::TcpConnector
                    .connect(&uri, &config)
                    .expect("connect");
                let mut conn =
                    Connection::new(stream, config.clone(), Role::Client, Arc::new(Pipeline::standard()))
                        .expect("connection");
                conn.handshake_client(&uri).expect("handshake");
                conn
            })
            .collect();
        clients
            .iter_mut()
            .enumerate()
            .map(|(i, conn)| {
                conn.text(format!("n{i}")).expect("send");
                conn.receive().expect("echo").as_text().expect("utf8").to_owned()
            })
            .collect::<Vec<_>>()
    });

    result.expect("clean stop");
    assert_eq!(replies, ["n0", "n1"]);
    assert_eq!(server.connection_count(), 0);
}
