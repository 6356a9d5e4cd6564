use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic byte count for a single stream.
///
/// Cheap cloneable handle; the owning worker is the only writer, the
/// aggregator only reads. Single-writer discipline keeps the hot path
/// lock-free.
#[derive(Debug, Clone, Default)]
pub struct ByteCounter {
    inner: Arc<AtomicU64>,
}

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds transferred bytes. Called only by the owning worker.
    pub fn add(&self, bytes: u64) {
        self.inner.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Current cumulative count.
    pub fn get(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}

/// Session-wide view of one reporting interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalSnapshot {
    /// Interval start, as an offset from session start
    pub start: Duration,
    /// Interval end, as an offset from session start
    pub end: Duration,
    /// Bytes transferred across all streams during this interval
    pub bytes: u64,
    /// Bytes transferred across all streams since session start
    pub cumulative: u64,
}

/// Terminal status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Every stream finished its transfer normally
    Complete,
    /// At least one stream terminated on a transfer error; totals reflect
    /// only bytes actually transferred
    Partial,
}

/// Final aggregation of a session. Created once, at session end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    pub total_bytes: u64,
    pub elapsed: Duration,
    /// Per-stream totals, ordered by stream index
    pub per_stream: Vec<u64>,
    pub status: SessionStatus,
}

impl SessionResult {
    pub fn is_partial(&self) -> bool {
        self.status == SessionStatus::Partial
    }

    /// Average throughput in bytes per second over the whole session.
    pub fn bytes_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.total_bytes as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

struct StreamSlot {
    counter: ByteCounter,
    /// Cumulative count observed at the previous snapshot
    previous: u64,
}

/// Merges per-stream byte counts into interval and final totals.
///
/// Each stream's delta is computed against a private baseline before
/// summation, so intervals are disjoint and sum exactly to the final
/// total under any worker scheduling.
pub struct Aggregator {
    origin: Instant,
    slots: Vec<StreamSlot>,
    last_offset: Duration,
}

impl Aggregator {
    /// Creates an aggregator for `parallel` streams with the session
    /// start pinned to `origin`.
    pub fn start_at(origin: Instant, parallel: usize) -> Self {
        let slots = (0..parallel)
            .map(|_| StreamSlot {
                counter: ByteCounter::new(),
                previous: 0,
            })
            .collect();
        Self {
            origin,
            slots,
            last_offset: Duration::ZERO,
        }
    }

    pub fn start(parallel: usize) -> Self {
        Self::start_at(Instant::now(), parallel)
    }

    pub fn origin(&self) -> Instant {
        self.origin
    }

    pub fn stream_count(&self) -> usize {
        self.slots.len()
    }

    /// Hands out the counter for a stream index. The worker owns the
    /// write side; the aggregator keeps reading its clone.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn counter(&self, index: usize) -> ByteCounter {
        self.slots[index].counter.clone()
    }

    /// Captures one interval: per-stream deltas against the previous
    /// baselines, then advances the baselines to the just-read values.
    pub fn snapshot(&mut self, now: Instant) -> IntervalSnapshot {
        let mut bytes = 0u64;
        let mut cumulative = 0u64;

        for slot in &mut self.slots {
            let current = slot.counter.get();
            bytes += current - slot.previous;
            cumulative += current;
            slot.previous = current;
        }

        let end = now.saturating_duration_since(self.origin);
        let snapshot = IntervalSnapshot {
            start: self.last_offset,
            end,
            bytes,
            cumulative,
        };
        self.last_offset = end;
        snapshot
    }

    /// Captures any bytes transferred after the last snapshot and
    /// produces the immutable session result.
    pub fn finalize(mut self, now: Instant, status: SessionStatus) -> SessionResult {
        // Tail snapshot keeps the interval sums equal to the total.
        let tail = self.snapshot(now);
        let per_stream: Vec<u64> = self.slots.iter().map(|s| s.counter.get()).collect();

        SessionResult {
            total_bytes: tail.cumulative,
            elapsed: now.saturating_duration_since(self.origin),
            per_stream,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_counter_monotonic() {
        let counter = ByteCounter::new();
        assert_eq!(counter.get(), 0);
        counter.add(100);
        counter.add(50);
        assert_eq!(counter.get(), 150);

        let clone = counter.clone();
        clone.add(10);
        assert_eq!(counter.get(), 160);
    }

    #[test]
    fn test_snapshot_deltas_are_disjoint() {
        let origin = Instant::now();
        let mut agg = Aggregator::start_at(origin, 2);
        let c0 = agg.counter(0);
        let c1 = agg.counter(1);

        c0.add(1000);
        c1.add(500);
        let first = agg.snapshot(origin + Duration::from_secs(1));
        assert_eq!(first.start, Duration::ZERO);
        assert_eq!(first.end, Duration::from_secs(1));
        assert_eq!(first.bytes, 1500);
        assert_eq!(first.cumulative, 1500);

        c0.add(200);
        let second = agg.snapshot(origin + Duration::from_secs(2));
        assert_eq!(second.start, Duration::from_secs(1));
        assert_eq!(second.end, Duration::from_secs(2));
        assert_eq!(second.bytes, 200);
        assert_eq!(second.cumulative, 1700);

        // Idle interval reports zero, not a repeat
        let third = agg.snapshot(origin + Duration::from_secs(3));
        assert_eq!(third.bytes, 0);
        assert_eq!(third.cumulative, 1700);
    }

    #[test]
    fn test_finalize_captures_tail() {
        let origin = Instant::now();
        let mut agg = Aggregator::start_at(origin, 1);
        let counter = agg.counter(0);

        counter.add(100);
        let snap = agg.snapshot(origin + Duration::from_secs(1));
        assert_eq!(snap.bytes, 100);

        // Bytes after the last tick still land in the total
        counter.add(42);
        let result = agg.finalize(origin + Duration::from_secs(2), SessionStatus::Complete);
        assert_eq!(result.total_bytes, 142);
        assert_eq!(result.per_stream, vec![142]);
        assert_eq!(result.elapsed, Duration::from_secs(2));
        assert!(!result.is_partial());
    }

    #[test]
    fn test_per_stream_totals_ordered_by_index() {
        let origin = Instant::now();
        let agg_slots = 4;
        let mut agg = Aggregator::start_at(origin, agg_slots);
        for i in 0..agg_slots {
            agg.counter(i).add((i as u64 + 1) * 10);
        }
        let result = agg.finalize(origin + Duration::from_secs(1), SessionStatus::Complete);
        assert_eq!(result.per_stream, vec![10, 20, 30, 40]);
        assert_eq!(result.total_bytes, 100);
    }

    #[test]
    fn test_intervals_sum_to_total_across_threads() {
        let origin = Instant::now();
        let mut agg = Aggregator::start_at(origin, 4);
        let counters: Vec<ByteCounter> = (0..4).map(|i| agg.counter(i)).collect();

        let handles: Vec<_> = counters
            .into_iter()
            .map(|counter| {
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        counter.add(7);
                    }
                })
            })
            .collect();

        // Snapshot concurrently with the writers
        let mut interval_sum = 0u64;
        for tick in 1..=20u64 {
            let snap = agg.snapshot(origin + Duration::from_millis(tick));
            interval_sum += snap.bytes;
        }

        for handle in handles {
            handle.join().unwrap();
        }

        // One more snapshot captures whatever the periodic ones missed
        let tail = agg.snapshot(origin + Duration::from_millis(21));
        interval_sum += tail.bytes;

        let result = agg.finalize(origin + Duration::from_millis(22), SessionStatus::Complete);
        assert_eq!(result.total_bytes, 4 * 10_000 * 7);
        assert_eq!(interval_sum, result.total_bytes);
        assert_eq!(result.per_stream.iter().sum::<u64>(), result.total_bytes);
    }

    #[test]
    fn test_bytes_per_second() {
        let result = SessionResult {
            total_bytes: 10_000,
            elapsed: Duration::from_secs(4),
            per_stream: vec![10_000],
            status: SessionStatus::Complete,
        };
        assert_eq!(result.bytes_per_second(), 2500.0);

        let zero = SessionResult {
            total_bytes: 0,
            elapsed: Duration::ZERO,
            per_stream: vec![],
            status: SessionStatus::Complete,
        };
        assert_eq!(zero.bytes_per_second(), 0.0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: for any interleaving of counter updates and
            /// snapshot calls, interval bytes (including the finalize
            /// tail) sum exactly to the session total.
            #[test]
            fn prop_interval_sums_equal_total(
                streams in 1usize..8,
                ops in proptest::collection::vec((0usize..8, 1u64..10_000), 0..200),
                ticks in 1u64..16,
            ) {
                let origin = Instant::now();
                let mut agg = Aggregator::start_at(origin, streams);
                let counters: Vec<ByteCounter> =
                    (0..streams).map(|i| agg.counter(i)).collect();

                let mut interval_sum = 0u64;
                let mut expected = 0u64;
                let per_tick = (ops.len() / ticks as usize).max(1);

                for (i, (stream, bytes)) in ops.iter().enumerate() {
                    counters[stream % streams].add(*bytes);
                    expected += bytes;
                    if i % per_tick == 0 {
                        let snap = agg.snapshot(origin + Duration::from_millis(i as u64 + 1));
                        interval_sum += snap.bytes;
                    }
                }

                // The tail snapshot is what finalize performs internally
                let tail = agg.snapshot(origin + Duration::from_secs(3599));
                interval_sum += tail.bytes;

                let result = agg.finalize(
                    origin + Duration::from_secs(3600),
                    SessionStatus::Complete,
                );
                prop_assert_eq!(interval_sum, result.total_bytes);
                prop_assert_eq!(result.total_bytes, expected);
                prop_assert_eq!(result.per_stream.iter().sum::<u64>(), expected);
            }
        }
    }
}
