//! Filter configuration and instance-limit policy

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::FilterState;

/// Class limited by `--meshlimit`
pub const MESH_CLASS: &str = "PxTriangleMesh";

/// Default port of a PVD viewer
pub const DEFAULT_PORT: u16 = 5425;

/// Where the filtered stream goes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Decode and audit only
    #[default]
    None,
    File(PathBuf),
    Network { address: String, port: u16 },
}

impl OutputMode {
    pub fn is_some(&self) -> bool {
        !matches!(self, OutputMode::None)
    }
}

/// Filter configuration, built once from the command line
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Captured stream to replay
    pub input: PathBuf,

    /// Live-instance ceiling per class name
    pub limits: BTreeMap<String, u64>,

    pub output: OutputMode,

    /// Optional JSON summary path
    pub summary_json: Option<PathBuf>,

    /// Write the per-event transcript next to the input
    pub transcript: bool,
}

impl FilterConfig {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            limits: BTreeMap::new(),
            output: OutputMode::None,
            summary_json: None,
            transcript: true,
        }
    }

    /// `<input stem>.stream.log`, next to the input
    pub fn transcript_path(&self) -> PathBuf {
        self.input.with_extension("stream.log")
    }

    /// Filter state seeded with the configured ceilings
    pub fn filter_state(&self) -> FilterState {
        let mut state = FilterState::new();
        for (class, limit) in &self.limits {
            state.set_limit(class.clone(), *limit);
        }
        state
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.input.is_file() {
            anyhow::bail!("Cannot find PXD file [{}]", self.input.display());
        }

        match &self.output {
            OutputMode::File(path) if path.as_os_str().is_empty() => {
                anyhow::bail!("Output path must not be empty");
            }
            OutputMode::File(path) if path == &self.input => {
                anyhow::bail!("Output would overwrite the input [{}]", path.display());
            }
            OutputMode::Network { address, .. } if address.is_empty() => {
                anyhow::bail!("Output address must not be empty");
            }
            _ => {}
        }

        Ok(())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LimitError {
    #[error("expected CLASS=N, got {0:?}")]
    MissingSeparator(String),

    #[error("empty class name in {0:?}")]
    EmptyClass(String),

    #[error("invalid instance count in {0:?}")]
    InvalidCount(String),
}

/// Parse a `CLASS=N` limit argument
pub fn parse_limit(s: &str) -> Result<(String, u64), LimitError> {
    let (class, count) = s
        .split_once('=')
        .ok_or_else(|| LimitError::MissingSeparator(s.to_string()))?;

    let class = class.trim();
    if class.is_empty() {
        return Err(LimitError::EmptyClass(s.to_string()));
    }

    let count = count
        .trim()
        .parse()
        .map_err(|_| LimitError::InvalidCount(s.to_string()))?;

    Ok((class.to_string(), count))
}

/// Policy file contents
///
/// ```toml
/// [limits]
/// PxTriangleMesh = 100
/// PxConvexMesh = 20
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyFile {
    #[serde(default)]
    pub limits: BTreeMap<String, u64>,
}

impl PolicyFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read policy file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse policy file {}", path.display()))
    }
}

/// Merge ceilings from the policy file, `--meshlimit` and `--limit`, in
/// increasing precedence
pub fn resolve_limits(
    policy: Option<&Path>,
    meshlimit: Option<u64>,
    limits: &[(String, u64)],
) -> Result<BTreeMap<String, u64>> {
    let mut merged = match policy {
        Some(path) => PolicyFile::load(path)?.limits,
        None => BTreeMap::new(),
    };

    if let Some(limit) = meshlimit {
        merged.insert(MESH_CLASS.to_string(), limit);
    }
    for (class, limit) in limits {
        merged.insert(class.clone(), *limit);
    }

    Ok(merged)
}
