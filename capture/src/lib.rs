//! PVD capture tool library
//!
//! Accepts one PhysX client connection and writes its comm-stream to disk.
//! Only whole groups are ever written: the [`ResyncBuffer`] holds back the
//! tail of each read until the rest of its group arrives, and drops it if the
//! client goes away first.

pub mod config;

pub use config::CaptureConfig;

use std::future::Future;
use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use openpvd_shared::protocol::{FramerState, ProtocolError, ResyncBuffer};
use openpvd_shared::utils::humanise_bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Log capture progress every this many groups
const PROGRESS_INTERVAL: u64 = 1024;

/// Why a capture stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureEnd {
    /// Client closed the connection
    #[default]
    Disconnected,
    /// The end-of-stream group was received
    Terminated,
    /// No data arrived within the idle timeout
    IdleTimeout,
    /// Cancellation was requested
    Cancelled,
}

/// Outcome of one capture
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Bytes written to the output
    pub bytes_written: u64,
    /// Complete event groups written
    pub groups: u64,
    /// Largest group payload seen
    pub largest_group: u32,
    /// Bytes of an incomplete group dropped at the end
    pub dropped_bytes: usize,
    /// Bytes received after the end-of-stream group
    pub ignored_bytes: u64,
    pub end: CaptureEnd,
}

/// Bind the configured port and capture one client connection
pub async fn run_capture(config: &CaptureConfig, cancel: CancellationToken) -> Result<CaptureStats> {
    config.validate()?;

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to listen on port {}", config.port))?;

    serve_once(listener, config, cancel).await
}

/// Accept a single connection on `listener` and stream it to the output file
pub async fn serve_once(
    listener: TcpListener,
    config: &CaptureConfig,
    cancel: CancellationToken,
) -> Result<CaptureStats> {
    info!(
        "Waiting for PVD connection from client on {} ...",
        listener.local_addr()?
    );

    let (socket, peer) = tokio::select! {
        accepted = listener.accept() => accepted.context("Failed to accept PVD client")?,
        _ = cancel.cancelled() => {
            info!("Cancelled before a client connected");
            return Ok(CaptureStats {
                end: CaptureEnd::Cancelled,
                ..CaptureStats::default()
            });
        }
    };
    socket.set_nodelay(true)?;

    info!(
        "Connection established with {}, streaming data to [{}] ...",
        peer,
        config.output_path.display()
    );

    let file = tokio::fs::File::create(&config.output_path)
        .await
        .with_context(|| format!("Failed to create {}", config.output_path.display()))?;
    let mut writer = BufWriter::new(file);

    let stats = capture_stream(socket, &mut writer, config, &cancel).await?;

    info!(
        "Closing ... {} groups, {} written",
        stats.groups,
        humanise_bytes(stats.bytes_written)
    );
    Ok(stats)
}

/// Copy whole groups from `reader` to `writer` until the stream ends.
///
/// Disconnects, idle timeouts and cancellation end the capture normally;
/// protocol errors and write failures are returned.
pub async fn capture_stream<R, W>(
    mut reader: R,
    writer: &mut W,
    config: &CaptureConfig,
    cancel: &CancellationToken,
) -> Result<CaptureStats>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let capacity = config.buffer_bytes();
    let mut resync = ResyncBuffer::new(capacity);
    let mut scratch = vec![0u8; capacity];
    let mut stats = CaptureStats::default();
    let mut next_progress = PROGRESS_INTERVAL;

    loop {
        let room = resync.room();
        if room == 0 {
            return Err(ProtocolError::GroupExceedsBuffer {
                needed: resync.pending() + 1,
                capacity,
            }
            .into());
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Capture cancelled");
                stats.end = CaptureEnd::Cancelled;
                break;
            }
            result = read_idle(reader.read(&mut scratch[..room]), config.idle_timeout) => result,
        };

        let n = match result {
            Some(Ok(0)) => {
                debug!("client closed the connection");
                stats.end = CaptureEnd::Disconnected;
                break;
            }
            Some(Ok(n)) => n,
            Some(Err(e)) if is_disconnect(&e) => {
                info!("Connection lost: {}", e);
                stats.end = CaptureEnd::Disconnected;
                break;
            }
            Some(Err(e)) => return Err(e).context("Socket read failed"),
            None => {
                warn!(
                    "No data for {:?}, giving up on the client",
                    config.idle_timeout.unwrap_or_default()
                );
                stats.end = CaptureEnd::IdleTimeout;
                break;
            }
        };

        let awaiting_header = resync.state() == FramerState::AwaitingHeader;
        let committed = resync.feed(&scratch[..n])?;
        if awaiting_header && resync.state() != FramerState::AwaitingHeader {
            info!("Stream initialised successfully");
        }

        if !committed.bytes.is_empty() {
            writer
                .write_all(&committed.bytes)
                .await
                .context("Failed to write capture output")?;
            stats.bytes_written += committed.bytes.len() as u64;
        }

        if resync.groups() >= next_progress {
            info!(
                "events : {:>16} | largest data : {}",
                resync.groups(),
                resync.largest_group()
            );
            next_progress = (resync.groups() / PROGRESS_INTERVAL + 1) * PROGRESS_INTERVAL;
        }

        if committed.terminated {
            info!("End of stream received");
            stats.end = CaptureEnd::Terminated;
            break;
        }
    }

    stats.dropped_bytes = resync.discard_pending();
    if stats.dropped_bytes > 0 {
        info!(
            "Dropping {} bytes of an incomplete event group",
            stats.dropped_bytes
        );
    }
    if resync.ignored_bytes() > 0 {
        warn!(
            "Ignored {} bytes received after the end of the stream",
            resync.ignored_bytes()
        );
    }

    writer
        .flush()
        .await
        .context("Failed to flush capture output")?;

    stats.groups = resync.groups();
    stats.largest_group = resync.largest_group();
    stats.ignored_bytes = resync.ignored_bytes();
    Ok(stats)
}

/// Await a read, giving up with `None` after `limit` of silence
async fn read_idle<F>(read: F, limit: Option<Duration>) -> Option<io::Result<usize>>
where
    F: Future<Output = io::Result<usize>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, read).await.ok(),
        None => Some(read.await),
    }
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
