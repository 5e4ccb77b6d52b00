//! Human-readable byte sizes such as `1kb` or `2.5 MB`.
//!
//! Units are powers of 1024. A bare number is a byte count; fractional
//! results are truncated.

use crate::{ConfigError, Result};

const UNITS: [(&str, u64); 6] = [
    ("b", 1),
    ("kb", 1 << 10),
    ("mb", 1 << 20),
    ("gb", 1 << 30),
    ("tb", 1 << 40),
    ("pb", 1 << 50),
];

/// Parse a size string for the configuration key `key`.
pub fn parse_size(key: &str, raw: &str) -> Result<u64> {
    let invalid = |reason: &str| ConfigError::ParseError {
        key: key.to_string(),
        value: raw.to_string(),
        reason: reason.to_string(),
    };

    let lowered = raw.trim().to_ascii_lowercase();
    let split_at = lowered
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(lowered.len());
    let (number, unit) = lowered.split_at(split_at);
    let unit = unit.trim();

    if number.is_empty() {
        return Err(invalid("expected a number"));
    }

    let multiplier = if unit.is_empty() {
        1
    } else {
        UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, m)| *m)
            .ok_or_else(|| invalid("unknown unit"))?
    };

    if !number.contains('.') {
        let whole: u64 = number.parse().map_err(|_| invalid("expected a number"))?;
        return whole
            .checked_mul(multiplier)
            .ok_or_else(|| invalid("size overflows"));
    }

    let value: f64 = number.parse().map_err(|_| invalid("expected a number"))?;
    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes >= u64::MAX as f64 {
        return Err(invalid("size overflows"));
    }
    Ok(bytes as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_numbers() {
        assert_eq!(parse_size("t", "1024").unwrap(), 1024);
        assert_eq!(parse_size("t", " 0 ").unwrap(), 0);
    }

    #[test]
    fn test_units() {
        assert_eq!(parse_size("t", "1kb").unwrap(), 1024);
        assert_eq!(parse_size("t", "1KB").unwrap(), 1024);
        assert_eq!(parse_size("t", "2 mb").unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_size("t", "1.5kb").unwrap(), 1536);
        assert_eq!(parse_size("t", "10b").unwrap(), 10);
    }

    #[test]
    fn test_invalid() {
        assert!(parse_size("t", "kb").is_err());
        assert!(parse_size("t", "12 parsecs").is_err());
        assert!(parse_size("t", "-1kb").is_err());
        assert!(parse_size("t", "1..2kb").is_err());
    }
}
