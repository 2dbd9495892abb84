//! PVD filter tool
//!
//! Replays a `.pxd2` capture, limits how many instances of chosen classes
//! stay alive, and writes the result to a file or streams it to a viewer.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use openpvd_filter::config::{self, parse_limit, resolve_limits};
use openpvd_filter::{run_filter, FilterConfig, OutputMode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "opvd-filter")]
#[command(about = "Filter a captured PVD comm-stream", long_about = None)]
#[command(version)]
struct Args {
    /// Captured stream to load
    #[arg(short, long)]
    pxd: PathBuf,

    /// Maximum number of live PxTriangleMesh instances
    #[arg(long)]
    meshlimit: Option<u64>,

    /// Maximum number of live instances of a class, as CLASS=N (repeatable)
    #[arg(long = "limit", value_name = "CLASS=N", value_parser = parse_limit)]
    limits: Vec<(String, u64)>,

    /// TOML file with a [limits] table; command-line limits take precedence
    #[arg(long)]
    policy: Option<PathBuf>,

    /// Also write the run summary as JSON
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Skip the per-event transcript
    #[arg(long)]
    no_transcript: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    output: Option<Output>,
}

#[derive(Subcommand, Debug)]
enum Output {
    /// Write the filtered stream to a file
    #[command(name = "to_file")]
    ToFile {
        #[arg(short, long, default_value = "filtered.pxd2")]
        out: PathBuf,
    },

    /// Stream the filtered events to a listening viewer
    #[command(name = "to_net")]
    ToNet {
        #[arg(short, long, default_value = "127.0.0.1")]
        out: String,

        #[arg(short, long, default_value_t = config::DEFAULT_PORT)]
        port: u16,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose)?;

    let output = match args.output {
        None => OutputMode::None,
        Some(Output::ToFile { out }) => OutputMode::File(out),
        Some(Output::ToNet { out, port }) => OutputMode::Network { address: out, port },
    };

    let config = FilterConfig {
        limits: resolve_limits(args.policy.as_deref(), args.meshlimit, &args.limits)?,
        output,
        summary_json: args.summary_json,
        transcript: !args.no_transcript,
        ..FilterConfig::new(args.pxd)
    };

    run_filter(&config)?;
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    Ok(())
}
