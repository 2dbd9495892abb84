//! Utility functions and helpers

use anyhow::{bail, Result};
use std::time::Duration;

/// Convert bytes to a hexadecimal string
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Parse a duration string (e.g., "250ms", "30s", "5m", "1h")
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        bail!("empty duration");
    }

    if let Some(num_str) = s.strip_suffix("ms") {
        let millis: u64 = num_str.parse()?;
        Ok(Duration::from_millis(millis))
    } else if let Some(num_str) = s.strip_suffix('s') {
        let secs: u64 = num_str.parse()?;
        Ok(Duration::from_secs(secs))
    } else if let Some(num_str) = s.strip_suffix('m') {
        let mins: u64 = num_str.parse()?;
        Ok(Duration::from_secs(mins * 60))
    } else if let Some(num_str) = s.strip_suffix('h') {
        let hours: u64 = num_str.parse()?;
        Ok(Duration::from_secs(hours * 3600))
    } else {
        // Default to seconds if no suffix
        let secs: u64 = s.parse()?;
        Ok(Duration::from_secs(secs))
    }
}

/// Human-readable byte count in powers of 1024 ("0 bytes", "12 kB", "3.5 MB")
pub fn humanise_bytes(bytes: u64) -> String {
    match bytes {
        0 => return "0 bytes".to_string(),
        1 => return "1 byte".to_string(),
        _ => {}
    }

    let mut exponent = 0;
    let mut scaled = bytes;
    while scaled >= 1024 && exponent < 5 {
        scaled /= 1024;
        exponent += 1;
    }
    let quotient = bytes as f64 / 1024f64.powi(exponent);

    match exponent {
        0 => format!("{:.0} bytes", quotient),
        1 => format!("{:.0} kB", quotient),
        2 => format!("{:.1} MB", quotient),
        3 => format!("{:.2} GB", quotient),
        4 => format!("{:.2} TB", quotient),
        _ => format!("{:.2} PB", quotient),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap().as_secs(), 30);
        assert_eq!(parse_duration("5m").unwrap().as_secs(), 300);
        assert_eq!(parse_duration("1h").unwrap().as_secs(), 3600);
        assert_eq!(parse_duration("60").unwrap().as_secs(), 60);
        assert_eq!(parse_duration("250ms").unwrap().as_millis(), 250);
        assert!(parse_duration("").is_err());
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_bytes_to_hex() {
        assert_eq!(bytes_to_hex(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
    }

    #[test]
    fn test_humanise_bytes() {
        assert_eq!(humanise_bytes(0), "0 bytes");
        assert_eq!(humanise_bytes(1), "1 byte");
        assert_eq!(humanise_bytes(512), "512 bytes");
        assert_eq!(humanise_bytes(2048), "2 kB");
        assert_eq!(humanise_bytes(1536 * 1024), "1.5 MB");
        assert_eq!(humanise_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
        assert_eq!(humanise_bytes(u64::MAX), "16384.00 PB");
    }
}
