//! ccn-putstream - publish stdin as a paced stream of content objects
//!
//! Reads stdin in fixed blocks and sends each block as one chunk over the
//! face manager's local endpoint, paced to a target bit rate. Stops at end of
//! input, on SIGINT/SIGTERM, or when the daemon sends the face close
//! notification, then prints transmit and jitter statistics.
//!
//! ```bash
//! cat video.ts | ccn-putstream ccnx:/stream/video -r 8 -b 1200
//! ```

mod frame;
mod pacing;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use ccn_face::core::constants::FACE_CLOSE_NOTIFICATION;
use ccn_face::face::{LocalProfile, NamespacePolicy};
use clap::Parser;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};

use crate::frame::object_header;
use crate::pacing::{JitterStats, clamp_block_size, clamp_rate, send_interval};

/// Publish stdin as a paced stream of content objects
#[derive(Parser, Debug)]
#[command(name = "ccn-putstream")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Content name prefix
    uri: String,

    /// Rate in Mbps (1-32)
    #[arg(short = 'r', long, default_value_t = 5)]
    rate: u32,

    /// Block size in bytes (60-1460)
    #[arg(short = 'b', long, default_value_t = 1024)]
    block_size: usize,

    /// Local socket path of the daemon
    #[arg(short = 's', long, env = "CCND_LOCAL_SOCKET", value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

/// Why publishing ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    EndOfInput,
    Stopped,
}

/// Transmit statistics.
#[derive(Debug, Default)]
struct Report {
    frames: u64,
    bytes: u64,
    duration: Duration,
    jitter: JitterStats,
}

impl Report {
    fn print(&self) {
        let secs = self.duration.as_secs();
        eprintln!("[putstream] Tx Frames = {}", self.frames);
        eprintln!("[putstream] Tx Bytes  = {}", self.bytes);
        eprintln!("[putstream] Duration  = {secs} sec");
        if secs > 0 {
            eprintln!("[putstream] Throughput = {} bps", self.bytes * 8 / secs);
        }
        if self.frames > 0 {
            eprintln!("[putstream] Jitter (Ave) = {} us", self.jitter.average_us(self.frames));
            eprintln!("[putstream] Jitter (Max) = {} us", self.jitter.max_us());
            eprintln!("[putstream] Jitter (Var) = {} us", self.jitter.variance_us(self.frames));
        }
    }
}

/// Read blocks from `input` and write them as chunks to `out` every
/// `interval`, until end of input or `stop` resolves.
async fn publish<R, W>(
    mut input: R,
    mut out: W,
    name: &str,
    block_size: usize,
    interval: Duration,
    mut stop: oneshot::Receiver<()>,
) -> Result<(StopReason, Report)>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut ticker = tokio::time::interval(interval.max(Duration::from_micros(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut buf = vec![0u8; block_size];
    let mut report = Report::default();
    let mut chunk: u32 = 0;
    let start = Instant::now();
    let mut last_end: Option<Instant> = None;

    let reason = loop {
        tokio::select! {
            biased;
            _ = &mut stop => break StopReason::Stopped,
            _ = ticker.tick() => {}
        }
        if let Some(end) = last_end {
            report.jitter.record(end.elapsed());
        }

        let n = input.read(&mut buf).await.context("stdin read failed")?;
        if n == 0 {
            break StopReason::EndOfInput;
        }
        let header = object_header(name, chunk, n)?;
        out.write_all(&header).await.context("send failed")?;
        out.write_all(&buf[..n]).await.context("send failed")?;

        report.frames += 1;
        report.bytes += n as u64;
        chunk = chunk.wrapping_add(1);
        last_end = Some(Instant::now());
    };

    out.flush().await.ok();
    report.duration = last_end.map_or(Duration::ZERO, |end| end - start);
    Ok((reason, report))
}

/// Resolve when the daemon sends the close notification or the connection
/// ends.
async fn watch_close<R: AsyncRead + Unpin>(mut reader: R) {
    let mut seen = Vec::new();
    let mut buf = [0u8; 512];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                seen.extend_from_slice(&buf[..n]);
                if seen
                    .windows(FACE_CLOSE_NOTIFICATION.len())
                    .any(|w| w == FACE_CLOSE_NOTIFICATION)
                {
                    tracing::info!("close notification received");
                    return;
                }
                let keep = seen.len().saturating_sub(FACE_CLOSE_NOTIFICATION.len());
                seen.drain(..keep);
            }
        }
    }
}

async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = term.recv() => {}
    }
    tracing::info!("caught signal");
    Ok(())
}

async fn connect(socket: Option<PathBuf>) -> Result<UnixStream> {
    let profile = match socket {
        Some(path) => LocalProfile::resolve(NamespacePolicy::Filesystem, Some(path.as_path()), ""),
        None => LocalProfile::default(),
    };
    let stream = profile
        .connect_stream()
        .with_context(|| format!("daemon is not running at {profile}"))?;
    stream.set_nonblocking(true)?;
    Ok(UnixStream::from_std(stream)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("ccn_putstream={}", args.log_level))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let rate = clamp_rate(args.rate);
    let block_size = clamp_block_size(args.block_size);
    let interval = send_interval(rate, block_size);

    let stream = connect(args.socket).await?;
    let (reader, writer) = stream.into_split();

    eprintln!("[putstream] URI         = {}", args.uri);
    eprintln!("[putstream] Rate        = {rate} Mbps");
    eprintln!("[putstream] Block Size  = {block_size} Bytes");

    let (stop_tx, stop_rx) = oneshot::channel();
    tokio::spawn(async move {
        tokio::select! {
            _ = watch_close(reader) => {}
            res = wait_for_signal() => {
                if let Err(e) = res {
                    tracing::warn!(error = %e, "signal handling unavailable");
                    std::future::pending::<()>().await;
                }
            }
        }
        stop_tx.send(()).ok();
    });

    let (reason, report) = publish(
        tokio::io::stdin(),
        writer,
        &args.uri,
        block_size,
        interval,
        stop_rx,
    )
    .await?;

    tracing::info!(?reason, "publishing stopped");
    report.print();
    Ok(())
}
