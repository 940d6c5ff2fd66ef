//! Demo binary for `wsframe`: an echo server and a one-shot client.

mod cli;

use std::{net::SocketAddr, process::ExitCode, time::Duration};

use clap::Parser;
use cli::{Cli, Command};
use wsframe::{
    Client,
    FollowRedirect,
    PingInterval,
    Result,
    Server,
    SubprotocolNegotiation,
    WebSocketConfig,
    WsError,
};

fn main() -> ExitCode {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout);
    let result = match cli.command {
        Command::Serve {
            bind,
            metrics_bind,
            subprotocols,
            ping_interval,
        } => serve(bind, metrics_bind, subprotocols, ping_interval, timeout),
        Command::Send {
            uri,
            text,
            subprotocols,
            max_redirects,
        } => send(&uri, text, subprotocols, max_redirects, timeout),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "wsframe failed");
            ExitCode::FAILURE
        }
    }
}

fn serve(
    bind: SocketAddr,
    metrics_bind: Option<SocketAddr>,
    subprotocols: Vec<String>,
    ping_interval: Option<u64>,
    timeout: Duration,
) -> Result<()> {
    if let Some(addr) = metrics_bind {
        install_metrics(addr)?;
    }
    let mut server = Server::new(WebSocketConfig::server().timeout(timeout)).bind(bind)?;
    if !subprotocols.is_empty() {
        server.add_middleware(SubprotocolNegotiation::new(subprotocols, false));
    }
    if let Some(secs) = ping_interval {
        server.add_middleware(PingInterval::new(Some(Duration::from_secs(secs))));
    }
    server
        .handlers_mut()
        .on_text(|conn, message, _| conn.send(message))
        .on_binary(|conn, message, _| conn.send(message));
    tracing::info!(addr = ?server.local_addr(), "echo server ready");
    server.start()
}

fn send(
    uri: &str,
    text: String,
    subprotocols: Vec<String>,
    max_redirects: u32,
    timeout: Duration,
) -> Result<()> {
    let mut client = Client::new(uri, WebSocketConfig::client().timeout(timeout))?;
    client.add_middleware(FollowRedirect::new(max_redirects));
    if !subprotocols.is_empty() {
        client.add_middleware(SubprotocolNegotiation::new(subprotocols, false));
    }
    client.connect()?;
    if let Some(protocol) = client.subprotocol() {
        tracing::info!(protocol, "subprotocol agreed");
    }
    client.text(text)?;
    let reply = client.receive()?;
    match reply.as_text() {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{} bytes of {}", reply.content().len(), reply.kind().as_str()),
    }
    client.close()?;
    if let Err(e) = client.receive() {
        tracing::debug!(error = %e, "no close acknowledgement");
    }
    client.disconnect();
    Ok(())
}

#[cfg(feature = "metrics")]
fn install_metrics(addr: SocketAddr) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WsError::Config(format!("metrics exporter: {e}")))
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(addr: SocketAddr) -> Result<()> {
    Err(WsError::Config(format!(
        "cannot serve metrics on {addr}: built without the metrics feature"
    )))
}
