//! Per-stream transfer loops.
//!
//! One worker exclusively owns one data connection and its byte counter.
//! Workers are generic over the transport so the loops can be exercised
//! against in-memory pipes and mock transports in tests.

use crate::config::Bound;
use crate::stats::ByteCounter;
use crate::Error;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Terminal status of one stream worker.
#[derive(Debug)]
pub enum WorkerOutcome {
    /// The worker sent its full quota or observed a clean peer close
    Complete,
    /// The worker terminated on a transfer error; siblings keep running
    Failed(Error),
}

impl WorkerOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, WorkerOutcome::Complete)
    }
}

fn transfer_err(err: std::io::Error) -> WorkerOutcome {
    WorkerOutcome::Failed(Error::Transfer(err))
}

/// Source-side worker: writes fixed-size blocks until the bound is hit.
///
/// The duration bound is checked against the wall clock before each
/// block. Under a byte bound the final block is truncated so the total
/// lands exactly on the limit, never past it. Short writes are retried
/// by `write_all`; the counter is incremented once per fully-written
/// block and never double-counted. On completion the write side is shut
/// down, which is the in-band completion signal to the peer.
pub async fn run_source<S>(
    conn: &mut S,
    bound: Bound,
    counter: &ByteCounter,
    block_size: usize,
) -> WorkerOutcome
where
    S: AsyncWrite + Unpin,
{
    let block = vec![0u8; block_size];
    let started = Instant::now();

    loop {
        let chunk: &[u8] = match bound {
            Bound::Time(limit) => {
                if started.elapsed() >= limit {
                    break;
                }
                &block
            }
            Bound::Bytes(limit) => {
                let sent = counter.get();
                if sent >= limit {
                    break;
                }
                let remaining = (limit - sent).min(block_size as u64) as usize;
                &block[..remaining]
            }
        };

        if let Err(e) = conn.write_all(chunk).await {
            return transfer_err(e);
        }
        counter.add(chunk.len() as u64);
    }

    if let Err(e) = conn.shutdown().await {
        return transfer_err(e);
    }
    WorkerOutcome::Complete
}

/// Sink-side worker: reads until peer close or an explicit byte bound.
///
/// A read of zero bytes is the peer's completion signal, not an error.
pub async fn run_sink<S>(
    conn: &mut S,
    byte_limit: Option<u64>,
    counter: &ByteCounter,
    block_size: usize,
) -> WorkerOutcome
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; block_size];

    loop {
        if let Some(limit) = byte_limit {
            if counter.get() >= limit {
                break;
            }
        }

        match conn.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => counter.add(n as u64),
            Err(e) => return transfer_err(e),
        }
    }

    WorkerOutcome::Complete
}
