use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Display unit for transfer amounts and throughput.
///
/// Byte counts are converted with fixed divisors: 1 for `B`, 1024 for
/// `KB`, 1024² for `MB`.
///
/// # Examples
///
/// ```
/// use sperf::DisplayUnit;
///
/// assert_eq!(DisplayUnit::MB.convert(2 * 1024 * 1024), 2.0);
/// assert_eq!("kb".parse::<DisplayUnit>().unwrap(), DisplayUnit::KB);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DisplayUnit {
    /// Bytes
    B,
    /// Kibibytes (1024 bytes)
    KB,
    /// Mebibytes (1024² bytes)
    #[default]
    MB,
}

impl DisplayUnit {
    /// Divisor applied to a raw byte count for this unit.
    pub fn divisor(self) -> u64 {
        match self {
            DisplayUnit::B => 1,
            DisplayUnit::KB => 1024,
            DisplayUnit::MB => 1024 * 1024,
        }
    }

    /// Converts a raw byte count into this unit.
    pub fn convert(self, bytes: u64) -> f64 {
        bytes as f64 / self.divisor() as f64
    }

    pub fn label(self) -> &'static str {
        match self {
            DisplayUnit::B => "B",
            DisplayUnit::KB => "KB",
            DisplayUnit::MB => "MB",
        }
    }
}

impl fmt::Display for DisplayUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DisplayUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "B" => Ok(DisplayUnit::B),
            "KB" => Ok(DisplayUnit::KB),
            "MB" => Ok(DisplayUnit::MB),
            other => Err(Error::Config(format!(
                "unknown unit '{}', expected B, KB or MB",
                other
            ))),
        }
    }
}

/// Parses a byte-limit argument with an optional unit suffix.
///
/// Accepts a plain byte count (`"500000"`) or a count suffixed with
/// `B`, `KB` or `MB` (`"64KB"`, `"10MB"`), case-insensitive.
///
/// # Examples
///
/// ```
/// use sperf::units::parse_byte_limit;
///
/// assert_eq!(parse_byte_limit("500000").unwrap(), 500_000);
/// assert_eq!(parse_byte_limit("10MB").unwrap(), 10 * 1024 * 1024);
/// ```
pub fn parse_byte_limit(s: &str) -> Result<u64> {
    let s = s.trim();
    let upper = s.to_ascii_uppercase();

    let (digits, unit) = if let Some(prefix) = upper.strip_suffix("KB") {
        (prefix, DisplayUnit::KB)
    } else if let Some(prefix) = upper.strip_suffix("MB") {
        (prefix, DisplayUnit::MB)
    } else if let Some(prefix) = upper.strip_suffix('B') {
        (prefix, DisplayUnit::B)
    } else {
        (upper.as_str(), DisplayUnit::B)
    };

    let count: u64 = digits
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid byte limit '{}'", s)))?;

    count
        .checked_mul(unit.divisor())
        .ok_or_else(|| Error::Config(format!("byte limit '{}' overflows", s)))
}
