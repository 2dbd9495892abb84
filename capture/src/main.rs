//! PVD capture tool
//!
//! Waits for a PhysX client to connect on the PVD port and records its
//! comm-stream to a `.pxd2` file for later filtering or replay.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use openpvd_capture::{run_capture, CaptureConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "opvd-capture")]
#[command(about = "Capture a PVD comm-stream to disk", long_about = None)]
#[command(version)]
struct Args {
    /// Where to write the captured stream
    #[arg(short, long, default_value = "captured.pxd2", env = "OPVD_CAPTURE_OUT")]
    out: PathBuf,

    /// Port to accept the PVD client on
    #[arg(short, long, default_value_t = 5425, env = "OPVD_CAPTURE_PORT")]
    port: u16,

    /// Receive buffer size in KB; must hold the largest event group
    #[arg(short, long, default_value_t = 768)]
    buf: u32,

    /// Stop after this long without data (e.g. "500ms", "30s", "5m")
    #[arg(long)]
    idle_timeout: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose)?;

    let idle_timeout = args
        .idle_timeout
        .as_deref()
        .map(openpvd_shared::utils::parse_duration)
        .transpose()
        .context("Failed to parse idle timeout")?;

    let config = CaptureConfig {
        port: args.port,
        output_path: args.out,
        buffer_kb: args.buf,
        idle_timeout,
    };
    config.validate()?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, finishing capture");
            on_interrupt.cancel();
        }
    });

    run_capture(&config, cancel).await?;
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    Ok(())
}
