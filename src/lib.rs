//! sperf - parallel TCP throughput measurement
//!
//! This library measures achievable network throughput between a traffic
//! source (client) and a traffic sink (server), reporting bandwidth over
//! fixed intervals and in aggregate across any number of parallel
//! streams.
//!
//! # Features
//!
//! - Duration-bound or exact byte-bound transfers
//! - Parallel data streams with lock-free per-stream accounting
//! - Drift-corrected interval reporting
//! - Asynchronous I/O using tokio

pub mod config;
pub mod error;
pub mod protocol;
pub mod report;
pub mod session;
pub mod stats;
pub mod ticker;
pub mod units;
pub mod worker;

pub use config::{Bound, Config, Role};
pub use error::{Error, Result};
pub use report::{ReportEmitter, RowSink};
pub use session::Session;
pub use stats::{Aggregator, ByteCounter, IntervalSnapshot, SessionResult, SessionStatus};
pub use units::DisplayUnit;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
