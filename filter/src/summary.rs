//! End-of-run report: frame count and memory usage by instance type

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use openpvd_shared::utils::humanise_bytes;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::ClassStats;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSummary {
    pub frames: u64,
    pub events: u64,
    pub kept: u64,
    pub dropped: u64,
    /// Instances still alive when the stream ended
    pub live_instances: u64,
    pub classes: BTreeMap<String, ClassStats>,
}

impl FilterSummary {
    /// Report through the log, one line per class
    pub fn log(&self) {
        info!("- - - - - - - - - - - - - - - - - - - - - - - -");
        info!("{:>32} = {}", "number of frames", self.frames);
        info!(
            "{:>32} = {} kept, {} dropped",
            "events", self.kept, self.dropped
        );
        info!("memory usage by instance type");
        for (class, stats) in &self.classes {
            info!(
                "{:>32} = {:>8}x = {}",
                class,
                stats.created,
                humanise_bytes(stats.bytes)
            );
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.classes.values().map(|stats| stats.bytes).sum()
    }

    /// Write the summary as pretty JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create summary file: {}", path.display()))?;

        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .context("Failed to serialize filter summary to JSON")?;

        info!("Summary written to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> FilterSummary {
        let mut classes = BTreeMap::new();
        classes.insert(
            "Box".to_string(),
            ClassStats {
                live: 1,
                created: 3,
                filtered: 2,
                bytes: 2048,
            },
        );
        classes.insert(
            crate::engine::UNKNOWN_CLASS.to_string(),
            ClassStats {
                bytes: 16,
                ..ClassStats::default()
            },
        );
        FilterSummary {
            frames: 4,
            events: 20,
            kept: 17,
            dropped: 3,
            live_instances: 1,
            classes,
        }
    }

    #[test]
    fn test_total_bytes() {
        assert_eq!(summary().total_bytes(), 2064);
    }

    #[test]
    fn test_write_json() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("summary.json");

        summary().write_json(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["frames"], 4);
        assert_eq!(parsed["classes"]["Box"]["filtered"], 2);

        let back: FilterSummary = serde_json::from_str(&contents).unwrap();
        assert_eq!(back, summary());
    }

    #[test]
    fn test_write_json_to_missing_directory_fails() {
        let err = summary()
            .write_json(Path::new("/definitely/not/here/summary.json"))
            .unwrap_err();
        assert!(err.to_string().contains("Failed to create summary file"));
    }
}
