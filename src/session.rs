//! Session coordination.
//!
//! The coordinator performs the control handshake, establishes the data
//! connections, then runs one worker per stream plus the interval clock
//! and folds everything into a final [`SessionResult`].

use crate::config::{Bound, Config, Role};
use crate::protocol::{deserialize_message, serialize_message, Message, PROTOCOL_VERSION};
use crate::report::{ReportEmitter, RowSink};
use crate::stats::{Aggregator, SessionResult, SessionStatus};
use crate::ticker::IntervalClock;
use crate::units::DisplayUnit;
use crate::worker::{run_sink, run_source, WorkerOutcome};
use crate::{Error, Result};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::timeout;

/// Bounded retry policy for connection establishment.
pub const CONNECT_ATTEMPTS: u32 = 3;
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Deadline for the peer's half of the handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for each expected data connection on the sink.
pub const ACCEPT_TIMEOUT: Duration = Duration::from_secs(10);

/// How one stream moves bytes.
#[derive(Debug, Clone, Copy)]
enum StreamMode {
    Source(Bound),
    Sink(Option<u64>),
}

/// One measurement session between a source and a sink.
///
/// # Examples
///
/// ```no_run
/// use sperf::{Config, Session};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::source("127.0.0.1", 8088)
///     .with_duration(Duration::from_secs(10))
///     .with_parallel(4);
///
/// let session = Session::new(config)?.with_row_sink(|row: &str| println!("{}", row));
/// let result = session.run().await?;
/// println!("{} bytes in {:?}", result.total_bytes, result.elapsed);
/// # Ok(())
/// # }
/// ```
pub struct Session {
    config: Config,
    row_sink: Arc<dyn RowSink>,
}

impl Session {
    /// Creates a session from a validated configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            row_sink: Arc::new(|_: &str| {}),
        })
    }

    /// Attaches the output layer's row sink. Without one, report rows
    /// are dropped (results are still returned).
    pub fn with_row_sink<S: RowSink + 'static>(mut self, sink: S) -> Self {
        self.row_sink = Arc::new(sink);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs a source-role session: handshake, open the data connections,
    /// transfer until the bound is hit, and return the final result.
    ///
    /// # Errors
    ///
    /// `Error::Handshake` if the sink does not confirm the parameters,
    /// `Error::Connection` if the control connection cannot be opened
    /// within the retry policy, `Error::PartialConnect` if fewer than
    /// the configured number of data connections come up.
    pub async fn run(&self) -> Result<SessionResult> {
        if self.config.role != Role::Source {
            return Err(Error::Config(
                "run() requires a source configuration; sinks use serve()".to_string(),
            ));
        }

        let addr = format!("{}:{}", self.config.addr, self.config.port);
        let mut control = connect_with_retry(&addr).await?;
        info!("Control connection established to {}", addr);

        let setup = Message::setup(
            self.config.duration,
            self.config.byte_limit,
            self.config.parallel,
            self.config.unit,
        );
        control.write_all(&serialize_message(&setup)?).await?;
        control.flush().await?;

        let ack = timeout(HANDSHAKE_TIMEOUT, deserialize_message(&mut control))
            .await
            .map_err(|_| Error::Handshake("timed out waiting for acknowledgment".to_string()))?
            .map_err(|e| Error::Handshake(format!("invalid acknowledgment: {}", e)))?;

        match ack {
            Message::SetupAck { version } if version == PROTOCOL_VERSION => {
                debug!("Setup acknowledged");
            }
            Message::SetupAck { version } => {
                return Err(Error::Handshake(format!(
                    "peer speaks protocol version {}, expected {}",
                    version, PROTOCOL_VERSION
                )));
            }
            Message::Error { message } => {
                return Err(Error::Handshake(format!("peer rejected setup: {}", message)));
            }
            _ => {
                return Err(Error::Handshake("expected SetupAck".to_string()));
            }
        }

        // Data connections are tagged by index through their open order;
        // the sink associates them by arrival order.
        let mut streams = Vec::with_capacity(self.config.parallel);
        for index in 0..self.config.parallel {
            match connect_with_retry(&addr).await {
                Ok(stream) => {
                    debug!("Data connection {} open", index);
                    streams.push(stream);
                }
                Err(e) => {
                    warn!("Data connection {} could not be established: {}", index, e);
                    return Err(Error::PartialConnect {
                        established: index,
                        required: self.config.parallel,
                    });
                }
            }
        }

        let bound = self
            .config
            .bound()
            .expect("validated source config carries a bound");
        let modes = source_modes(bound, self.config.parallel);

        self.drive(streams, modes, self.config.unit).await
    }

    /// Serves exactly one sink-role session on an already-bound
    /// listener: accept the control connection, negotiate, accept the
    /// data connections by arrival order, and consume until the source
    /// closes them. The process layer owns binding and can loop.
    pub async fn serve(&self, listener: &TcpListener) -> Result<SessionResult> {
        if self.config.role != Role::Sink {
            return Err(Error::Config(
                "serve() requires a sink configuration; sources use run()".to_string(),
            ));
        }

        let (mut control, peer) = listener.accept().await?;
        info!("Control connection accepted from {}", peer);

        let setup = timeout(HANDSHAKE_TIMEOUT, deserialize_message(&mut control))
            .await
            .map_err(|_| Error::Handshake("timed out waiting for setup".to_string()))?
            .map_err(|e| Error::Handshake(format!("invalid setup: {}", e)))?;

        let (parallel, unit) = match setup {
            Message::Setup {
                version,
                duration_secs,
                byte_limit,
                parallel,
                unit,
            } => {
                if version != PROTOCOL_VERSION {
                    let reason = format!(
                        "unsupported protocol version {}, expected {}",
                        version, PROTOCOL_VERSION
                    );
                    reject(&mut control, &reason).await;
                    return Err(Error::Handshake(reason));
                }
                if parallel < 1 {
                    let reason = "parallel stream count must be at least 1".to_string();
                    reject(&mut control, &reason).await;
                    return Err(Error::Handshake(reason));
                }
                info!(
                    "Session negotiated with {}: parallel={}, duration_secs={:?}, byte_limit={:?}, unit={}",
                    peer, parallel, duration_secs, byte_limit, unit
                );
                (parallel, unit)
            }
            _ => {
                let reason = "expected Setup".to_string();
                reject(&mut control, &reason).await;
                return Err(Error::Handshake(reason));
            }
        };

        control
            .write_all(&serialize_message(&Message::setup_ack())?)
            .await?;
        control.flush().await?;

        let mut streams = Vec::with_capacity(parallel);
        for index in 0..parallel {
            match timeout(ACCEPT_TIMEOUT, listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    debug!("Data connection {} accepted from {}", index, addr);
                    streams.push(stream);
                }
                Ok(Err(e)) => {
                    warn!("Accepting data connection {} failed: {}", index, e);
                    return Err(Error::PartialConnect {
                        established: index,
                        required: parallel,
                    });
                }
                Err(_) => {
                    warn!("Timed out waiting for data connection {}", index);
                    return Err(Error::PartialConnect {
                        established: index,
                        required: parallel,
                    });
                }
            }
        }

        let modes = vec![StreamMode::Sink(self.config.byte_limit); parallel];
        self.drive(streams, modes, unit).await
    }

    /// Shared transfer engine: one worker task per stream, one interval
    /// clock, snapshots drained on every tick, finalize when the last
    /// worker is done.
    async fn drive(
        &self,
        streams: Vec<TcpStream>,
        modes: Vec<StreamMode>,
        unit: DisplayUnit,
    ) -> Result<SessionResult> {
        debug_assert_eq!(streams.len(), modes.len());
        let parallel = streams.len();
        let block_size = self.config.block_size;
        let emitter = ReportEmitter::new(unit, self.row_sink.clone());

        let origin = Instant::now();
        let mut aggregator = Aggregator::start_at(origin, parallel);
        let mut clock = IntervalClock::start_at(origin, self.config.interval);

        let mut workers = JoinSet::new();
        for (index, (mut stream, mode)) in streams.into_iter().zip(modes).enumerate() {
            let counter = aggregator.counter(index);
            workers.spawn(async move {
                let outcome = match mode {
                    StreamMode::Source(bound) => {
                        run_source(&mut stream, bound, &counter, block_size).await
                    }
                    StreamMode::Sink(limit) => {
                        run_sink(&mut stream, limit, &counter, block_size).await
                    }
                };
                (index, outcome)
            });
        }

        emitter.header();

        let mut failed = 0usize;
        loop {
            tokio::select! {
                _ = clock.tick() => {
                    let snapshot = aggregator.snapshot(Instant::now());
                    emitter.interval(&snapshot);
                }
                joined = workers.join_next() => match joined {
                    Some(Ok((index, WorkerOutcome::Complete))) => {
                        debug!("Stream {} complete", index);
                    }
                    Some(Ok((index, WorkerOutcome::Failed(e)))) => {
                        warn!("Stream {} failed: {}", index, e);
                        failed += 1;
                    }
                    Some(Err(e)) => {
                        warn!("Stream worker task failed: {}", e);
                        failed += 1;
                    }
                    None => break,
                }
            }
        }

        let status = if failed > 0 {
            SessionStatus::Partial
        } else {
            SessionStatus::Complete
        };
        let result = aggregator.finalize(Instant::now(), status);
        emitter.result(&result);

        if failed > 0 {
            warn!(
                "Session finished partial: {} of {} streams failed, {} bytes transferred",
                failed, parallel, result.total_bytes
            );
        } else {
            info!(
                "Session complete: {} bytes in {:.2}s across {} streams",
                result.total_bytes,
                result.elapsed.as_secs_f64(),
                parallel
            );
        }
        Ok(result)
    }
}

/// Per-stream modes for a source session. A session-wide byte limit is
/// split across the streams so the session total lands exactly on the
/// limit; a duration bound applies to every stream as-is.
fn source_modes(bound: Bound, parallel: usize) -> Vec<StreamMode> {
    match bound {
        Bound::Time(limit) => vec![StreamMode::Source(Bound::Time(limit)); parallel],
        Bound::Bytes(limit) => split_byte_limit(limit, parallel)
            .into_iter()
            .map(|share| StreamMode::Source(Bound::Bytes(share)))
            .collect(),
    }
}

/// Splits a session-wide byte limit into per-stream shares that sum
/// exactly to the limit.
fn split_byte_limit(limit: u64, parallel: usize) -> Vec<u64> {
    let n = parallel as u64;
    let base = limit / n;
    let extra = (limit % n) as usize;
    (0..parallel)
        .map(|i| base + u64::from(i < extra))
        .collect()
}

async fn reject(control: &mut TcpStream, reason: &str) {
    if let Ok(bytes) = serialize_message(&Message::error(reason)) {
        let _ = control.write_all(&bytes).await;
        let _ = control.flush().await;
    }
}

async fn connect_with_retry(addr: &str) -> Result<TcpStream> {
    let mut last_err = None;
    for attempt in 1..=CONNECT_ATTEMPTS {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(
                    "Connect attempt {}/{} to {} failed: {}",
                    attempt, CONNECT_ATTEMPTS, addr, e
                );
                last_err = Some(e);
                if attempt < CONNECT_ATTEMPTS {
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                }
            }
        }
    }
    Err(Error::Connection(format!(
        "{} unreachable after {} attempts: {}",
        addr,
        CONNECT_ATTEMPTS,
        last_err.expect("at least one attempt")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_byte_limit_sums_exactly() {
        for (limit, parallel) in [(10u64, 1usize), (10, 3), (7, 4), (0, 2), (1, 5), (1000, 7)] {
            let shares = split_byte_limit(limit, parallel);
            assert_eq!(shares.len(), parallel);
            assert_eq!(shares.iter().sum::<u64>(), limit, "limit {}", limit);
            // Shares differ by at most one byte
            let min = shares.iter().min().unwrap();
            let max = shares.iter().max().unwrap();
            assert!(max - min <= 1);
        }
    }

    #[test]
    fn test_session_rejects_invalid_config() {
        let config = Config::source("127.0.0.1", 8088).with_parallel(0);
        assert!(Session::new(config).is_err());
    }

    #[tokio::test]
    async fn test_run_rejects_sink_role() {
        let session = Session::new(Config::sink("127.0.0.1", 8088)).unwrap();
        assert!(matches!(session.run().await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_serve_rejects_source_role() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let session = Session::new(Config::source("127.0.0.1", 8088)).unwrap();
        assert!(matches!(
            session.serve(&listener).await,
            Err(Error::Config(_))
        ));
    }
}
