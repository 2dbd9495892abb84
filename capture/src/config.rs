//! Configuration for the capture tool

use std::path::PathBuf;
use std::time::Duration;

/// Default PVD listen port
pub const DEFAULT_PORT: u16 = 5425;

/// Default receive buffer size in KB
pub const DEFAULT_BUFFER_KB: u32 = 768;

/// Largest receive buffer accepted (1 GiB)
const MAX_BUFFER_KB: u32 = 1024 * 1024;

/// Capture configuration, built once from the command line
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// TCP port to accept the PVD client on
    pub port: u16,

    /// Where the captured stream is written
    pub output_path: PathBuf,

    /// Receive buffer size in KB; bounds the largest group that can be captured
    pub buffer_kb: u32,

    /// Stop capturing after this long without data (None = wait forever)
    pub idle_timeout: Option<Duration>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            output_path: PathBuf::from("captured.pxd2"),
            buffer_kb: DEFAULT_BUFFER_KB,
            idle_timeout: None,
        }
    }
}

impl CaptureConfig {
    /// Receive buffer size in bytes
    pub fn buffer_bytes(&self) -> usize {
        self.buffer_kb as usize * 1024
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.buffer_kb == 0 {
            anyhow::bail!("Receive buffer must be at least 1 KB");
        }

        if self.buffer_kb > MAX_BUFFER_KB {
            anyhow::bail!("Receive buffer too large (max {} KB)", MAX_BUFFER_KB);
        }

        if self.output_path.as_os_str().is_empty() {
            anyhow::bail!("Output path must not be empty");
        }

        if self.idle_timeout == Some(Duration::ZERO) {
            anyhow::bail!("Idle timeout must be greater than 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.port, 5425);
        assert_eq!(config.output_path, PathBuf::from("captured.pxd2"));
        assert_eq!(config.buffer_bytes(), 768 * 1024);
        assert!(config.idle_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_zero_buffer() {
        let config = CaptureConfig {
            buffer_kb: 0,
            ..CaptureConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_buffer_too_large() {
        let config = CaptureConfig {
            buffer_kb: MAX_BUFFER_KB + 1,
            ..CaptureConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_idle_timeout() {
        let config = CaptureConfig {
            idle_timeout: Some(Duration::ZERO),
            ..CaptureConfig::default()
        };
        assert!(config.validate().is_err());

        let config = CaptureConfig {
            idle_timeout: Some(Duration::from_secs(30)),
            ..CaptureConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_empty_output() {
        let config = CaptureConfig {
            output_path: PathBuf::new(),
            ..CaptureConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
