use crate::units::DisplayUnit;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default control/data port.
pub const DEFAULT_PORT: u16 = 8088;

/// Default payload block size for the transfer loops.
pub const DEFAULT_BLOCK_SIZE: usize = 128 * 1024;

/// Default test duration when no byte limit is given.
pub const DEFAULT_DURATION: Duration = Duration::from_secs(25);

/// Session role: traffic source or traffic sink.
///
/// The source (client) generates bytes; the sink (server) consumes them
/// until the source closes its connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Generates traffic until a duration or byte bound is reached
    Source,
    /// Consumes traffic until the peer closes or an explicit bound is hit
    Sink,
}

/// Transfer bound for a source-side stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Wall-clock limit, checked before each block
    Time(Duration),
    /// Exact total-byte limit, never overshot
    Bytes(u64),
}

/// Configuration for a measurement session.
///
/// Immutable for the session's lifetime: build it up front, validate it,
/// and pass it into the session coordinator. There is no global state.
///
/// # Examples
///
/// ```
/// use sperf::{Config, DisplayUnit};
/// use std::time::Duration;
///
/// let config = Config::source("192.168.1.20", 8088)
///     .with_duration(Duration::from_secs(10))
///     .with_parallel(4)
///     .with_unit(DisplayUnit::KB);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source (client) or sink (server)
    pub role: Role,

    /// Target address (source) or bind address (sink)
    pub addr: String,

    /// Port the control and data connections use
    pub port: u16,

    /// Wall-clock transfer bound
    pub duration: Option<Duration>,

    /// Total-byte transfer bound; authoritative over `duration` when both
    /// are set
    pub byte_limit: Option<u64>,

    /// Number of parallel data streams
    pub parallel: usize,

    /// Cadence of interval reports
    pub interval: Duration,

    /// Unit used for reported amounts and rates
    pub unit: DisplayUnit,

    /// Payload block size for the transfer loops
    pub block_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: Role::Source,
            addr: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            duration: Some(DEFAULT_DURATION),
            byte_limit: None,
            parallel: 1,
            interval: Duration::from_secs(1),
            unit: DisplayUnit::MB,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl Config {
    /// Creates a source (client) configuration targeting `addr:port`.
    pub fn source(addr: impl Into<String>, port: u16) -> Self {
        Self {
            role: Role::Source,
            addr: addr.into(),
            port,
            ..Default::default()
        }
    }

    /// Creates a sink (server) configuration for a listener on
    /// `addr:port`. Sinks carry no transfer bound by default; they run
    /// until the source closes its connections.
    pub fn sink(addr: impl Into<String>, port: u16) -> Self {
        Self {
            role: Role::Sink,
            addr: addr.into(),
            port,
            duration: None,
            ..Default::default()
        }
    }

    /// Sets the wall-clock transfer bound.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Sets the total-byte transfer bound. Takes precedence over the
    /// duration bound when both are present.
    pub fn with_byte_limit(mut self, byte_limit: u64) -> Self {
        self.byte_limit = Some(byte_limit);
        self
    }

    /// Sets the number of parallel data streams.
    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel;
        self
    }

    /// Sets the interval report cadence.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the display unit for reports.
    pub fn with_unit(mut self, unit: DisplayUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Sets the payload block size used by the transfer loops.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Resolves the authoritative transfer bound for this configuration.
    ///
    /// The byte limit wins over the duration when both are set. `None`
    /// is only meaningful for sinks, which then run until peer close.
    pub fn bound(&self) -> Option<Bound> {
        match (self.byte_limit, self.duration) {
            (Some(bytes), _) => Some(Bound::Bytes(bytes)),
            (None, Some(duration)) => Some(Bound::Time(duration)),
            (None, None) => None,
        }
    }

    /// Checks the session invariants.
    pub fn validate(&self) -> Result<()> {
        if self.parallel < 1 {
            return Err(Error::Config(
                "parallel stream count must be at least 1".to_string(),
            ));
        }
        if self.interval.is_zero() {
            return Err(Error::Config(
                "report interval must be greater than zero".to_string(),
            ));
        }
        if self.block_size == 0 {
            return Err(Error::Config(
                "block size must be greater than zero".to_string(),
            ));
        }
        if self.addr.is_empty() {
            return Err(Error::Config("address must not be empty".to_string()));
        }
        if self.role == Role::Source && self.bound().is_none() {
            return Err(Error::Config(
                "source requires a duration or byte limit".to_string(),
            ));
        }
        Ok(())
    }
}
