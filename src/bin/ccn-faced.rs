//! ccn-faced - face manager daemon
//!
//! Opens the local endpoint and the configured listeners, then runs the
//! poll loop until SIGINT or SIGTERM. Inbound frames are logged and
//! discarded; a forwarding engine plugs in through `FrameHandler`.
//!
//! # Usage
//!
//! ```bash
//! # Router with defaults (UDP/TCP on 9896, local socket in $XDG_RUNTIME_DIR)
//! ccn-faced
//!
//! # Consumer node, custom socket, datagram local endpoint
//! ccn-faced --node-type consumer --local-socket /tmp/ccnd.sock --local-kind datagram
//!
//! # With config file and verbose logging
//! RUST_LOG=ccn_face=debug ccn-faced --config /etc/ccnd/faces.toml
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

use ccn_face::daemon::{EventLoop, FrameHandler, ShutdownFlag};
use ccn_face::face::LocalKind;
use ccn_face::{FaceConfig, FaceId, FaceManager, NodeType};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum NodeArg {
    Router,
    Consumer,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LocalArg {
    Stream,
    Datagram,
}

/// Face manager daemon of a CCN forwarder
#[derive(Parser, Debug)]
#[command(name = "ccn-faced")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "CCND_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Port of the UDP and TCP listeners
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Node role
    #[arg(long, value_enum)]
    node_type: Option<NodeArg>,

    /// Filesystem path of the local socket
    #[arg(long, value_name = "PATH")]
    local_socket: Option<PathBuf>,

    /// Local endpoint flavor
    #[arg(long, value_enum)]
    local_kind: Option<LocalArg>,

    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[arg(short = 'l', long, env = "CCND_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn apply(&self, config: &mut FaceConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(node) = self.node_type {
            config.node_type = match node {
                NodeArg::Router => NodeType::Router,
                NodeArg::Consumer => NodeType::Consumer,
            };
        }
        if let Some(path) = &self.local_socket {
            config.local_socket_path = Some(path.clone());
        }
        if let Some(kind) = self.local_kind {
            config.local_kind = match kind {
                LocalArg::Stream => LocalKind::Stream,
                LocalArg::Datagram => LocalKind::Datagram,
            };
        }
    }
}

/// Logs inbound bytes and drops them.
#[derive(Debug, Default)]
struct TraceSink {
    frames: u64,
    bytes: u64,
}

impl FrameHandler for TraceSink {
    fn on_frame(&mut self, faces: &mut FaceManager, face: FaceId, data: &[u8]) -> usize {
        self.frames += 1;
        self.bytes += data.len() as u64;
        tracing::debug!(%face, len = data.len(), local = faces.is_local(face), "frame received");
        data.len()
    }

    fn on_face_closed(&mut self, face: FaceId) {
        tracing::debug!(%face, "face gone");
    }
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("ccn_face={level},ccn_faced={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    // Block the shutdown signals before anything else spawns a thread.
    let shutdown = ShutdownFlag::on_signals().context("failed to install signal handling")?;

    let mut config = FaceConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        node_type = %config.node_type,
        port = config.port,
        "ccn-faced starting"
    );

    let mut faces = FaceManager::with_config(config);
    faces
        .open_configured()
        .context("failed to open the local endpoint")?;

    let mut event_loop = EventLoop::new(faces, TraceSink::default());
    event_loop.run(&shutdown).context("event loop failed")?;

    let handler = event_loop.handler();
    info!(frames = handler.frames, bytes = handler.bytes, "ccn-faced stopped");
    Ok(())
}
