//! PVD filter tool library
//!
//! Replays a captured comm-stream event by event, drops instances beyond
//! their class ceiling along with everything that refers to them, and
//! re-emits the survivors to a file or a listening viewer.

pub mod config;
pub mod engine;
pub mod retry;
pub mod summary;
pub mod transcript;
pub mod transport;

pub use config::{FilterConfig, OutputMode};
pub use engine::{ClassStats, FilterEngine, FilterState};
pub use summary::FilterSummary;

use std::fs::File;
use std::io::BufReader;

use anyhow::{Context, Result};
use openpvd_shared::protocol::{EventGroup, GroupBuilder, StreamReader};
use tracing::{debug, info, warn};

use crate::transcript::Transcript;
use crate::transport::send;

/// Log filter progress every this many events
const PROGRESS_INTERVAL: u64 = 5000;

/// Filter the capture named by `config`, writing survivors to its output
pub fn run_filter(config: &FilterConfig) -> Result<FilterSummary> {
    config.validate()?;

    info!("Loading : {}", config.input.display());
    let file = File::open(&config.input)
        .with_context(|| format!("Failed to open {}", config.input.display()))?;
    let mut reader = StreamReader::new(BufReader::new(file));
    let header = reader
        .read_header()
        .context("Failed to read stream header")?;

    let mut engine = FilterEngine::new();
    if config.transcript {
        let path = config.transcript_path();
        match Transcript::create(&path) {
            Ok(transcript) => {
                debug!("Transcript at {}", path.display());
                engine = engine.with_transcript(transcript);
            }
            Err(e) => warn!("Cannot create transcript {}: {}", path.display(), e),
        }
    }

    let mut state = config.filter_state();
    for (class, limit) in &config.limits {
        info!("Limiting [{}] instances to {}", class, limit);
    }

    let mut transport = transport::open(&config.output);
    transport
        .connect()
        .with_context(|| format!("Failed to open output {}", transport.describe()))?;

    let emitting = config.output.is_some();
    if emitting {
        send(transport.as_mut(), &header.to_bytes()).context("Failed to write stream header")?;
    }

    let mut events = 0u64;
    while let Some(group) = reader.next_group().context("Failed to read event group")? {
        let mut builder = GroupBuilder::new(&group.header);

        for event in group.events() {
            let event = event.with_context(|| {
                format!(
                    "Failed to decode event in group {} at timestamp {}",
                    reader.groups_read(),
                    group.header.timestamp
                )
            })?;

            if engine.evaluate(&mut state, &group.header, &event) && emitting {
                builder.push(&event);
            }

            events += 1;
            if events % PROGRESS_INTERVAL == 0 {
                info!(" ... {:>8} events", events);
            }
        }

        if let Some(bytes) = builder.finish() {
            send(transport.as_mut(), &bytes).context("Failed to write event group")?;
        }
    }

    if emitting {
        send(transport.as_mut(), &EventGroup::sentinel().to_bytes())
            .context("Failed to write end of stream")?;
    }
    transport.flush().context("Failed to flush output")?;
    if emitting {
        info!(
            "Wrote {} bytes to {}",
            transport.written(),
            transport.describe()
        );
    }
    drop(transport);

    let summary = engine.finish();
    if let Some(path) = &config.summary_json {
        summary.write_json(path)?;
    }
    Ok(summary)
}

