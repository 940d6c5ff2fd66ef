//! Command line interface for the `wsframe` demo binary.
//!
//! `serve` runs an echo server, `send` sends one message and prints the reply.

use std::net::SocketAddr;

use clap::{Parser, Subcommand};

/// Command line arguments for the `wsframe` binary.
#[derive(Debug, Parser)]
#[command(name = "wsframe", version, about = "WebSocket echo server and client")]
pub struct Cli {
    /// Seconds allowed for reads, writes, and each readiness wait.
    #[arg(long, default_value_t = 60, global = true)]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Echo every text and binary message back to its sender.
    Serve {
        /// Address to listen on.
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,

        /// Serve Prometheus metrics on this address.
        #[arg(long)]
        metrics_bind: Option<SocketAddr>,

        /// Subprotocol to accept; repeat in order of preference.
        #[arg(long = "subprotocol")]
        subprotocols: Vec<String>,

        /// Seconds between keep-alive pings on idle connections.
        #[arg(long)]
        ping_interval: Option<u64>,
    },
    /// Send one text message and print the first reply.
    Send {
        /// Server to connect to, for example `ws://127.0.0.1:8080/`.
        #[arg(short, long)]
        uri: String,

        /// Message to send.
        #[arg(short, long)]
        text: String,

        /// Subprotocol to offer; repeat in order of preference.
        #[arg(long = "subprotocol")]
        subprotocols: Vec<String>,

        /// Redirects to follow during the handshake.
        #[arg(long, default_value_t = 5)]
        max_redirects: u32,
    },
}
