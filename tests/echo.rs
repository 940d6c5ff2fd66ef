//! End-to-end exchanges with a TCP echo server.

use std::time::Duration;

use rstest::{fixture, rstest};
use wsframe::{Client, CloseCode, ConnectionState, MessageKind, WebSocketConfig, WsError};
use wsframe_testing::{EchoServer, TEST_TIMEOUT};

#[fixture]
fn server() -> EchoServer { EchoServer::start().expect("echo server") }

fn connected(server: &EchoServer) -> Client {
    let mut client = Client::new(&server.uri("/"), WebSocketConfig::client().timeout(TEST_TIMEOUT))
        .expect("uri");
    client.connect().expect("connect");
    client
}

#[rstest]
fn text_is_echoed(server: EchoServer) {
    let mut client = connected(&server);
    client.text("hi").expect("send");
    let reply = client.receive().expect("reply");
    assert_eq!(reply.kind(), MessageKind::Text);
    assert_eq!(reply.as_text().expect("utf8"), "hi");
}

#[rstest]
#[case::empty(0)]
#[case::one_frame(100)]
#[case::many_frames(70_000)]
fn binary_is_echoed_whatever_its_size(server: EchoServer, #[case] len: usize) {
    let mut client = connected(&server);
    let body: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    client.binary(body.clone()).expect("send");
    let reply = client.receive().expect("reply");
    assert_eq!(reply.kind(), MessageKind::Binary);
    assert_eq!(&reply.content()[..], &body[..]);
}

#[rstest]
fn close_is_acknowledged_over_tcp(server: EchoServer) {
    let mut client = connected(&server);
    client.close_with(CloseCode::NORMAL, "done").expect("close");
    assert_eq!(
        client.connection().map(wsframe::Connection::state),
        Some(ConnectionState::WriteClosed)
    );
    let ack = client.receive().expect("ack");
    assert_eq!(ack.kind(), MessageKind::Close);
    assert_eq!(ack.close_status(), Some(CloseCode::NORMAL));
    assert!(!client.is_connected());
}

#[rstest]
fn ping_gets_a_pong_before_the_echo(server: EchoServer) {
    let mut client = connected(&server);
    client.ping("x").expect("ping");
    client.text("after").expect("text");
    let pong = client.receive().expect("pong");
    assert_eq!(pong.kind(), MessageKind::Pong);
    assert_eq!(&pong.content()[..], b"x");
    assert_eq!(client.receive().expect("echo").as_text().expect("utf8"), "after");
}

#[rstest]
fn server_shutdown_sends_going_away(server: EchoServer) {
    let mut client = connected(&server);
    // the echo proves the connection is registered before shutdown
    client.text("sync").expect("send");
    client.receive().expect("echo");
    server.shutdown().expect("clean stop");

    let close = client.receive().expect("close");
    assert_eq!(close.close_status(), Some(CloseCode::GOING_AWAY));
    assert!(!client.is_connected());
}

#[test]
fn connecting_to_a_closed_port_fails_at_connection_level() {
    let addr = {
        let server = EchoServer::start().expect("echo server");
        let addr = server.addr();
        server.shutdown().expect("clean stop");
        addr
    };
    let mut client = Client::new(
        &format!("ws://{addr}/"),
        WebSocketConfig::client().timeout(Duration::from_millis(500)),
    )
    .expect("uri");
    let err = client.connect().expect_err("nothing listening");
    assert!(err.is_connection_level(), "unexpected {err:?}");
    assert!(!matches!(err, WsError::Handshake(_)));
}
