//! Drift-corrected interval clock.
//!
//! Ticks are scheduled at `origin + n * period`, not relative to when
//! the previous tick was observed, so report cadence does not drift
//! over long sessions. A tick that cannot be delivered on time is
//! skipped rather than bursted.

use std::time::{Duration, Instant};
use tokio::time::{self, Interval, MissedTickBehavior};

/// Fires at a fixed cadence measured from session start.
///
/// The coordinator polls [`tick`](IntervalClock::tick) from its select
/// loop and simply stops polling at session end; any pending tick is
/// dropped in favor of the final aggregation.
pub struct IntervalClock {
    interval: Interval,
}

impl IntervalClock {
    /// Creates a clock whose n-th tick fires at `origin + n * period`.
    pub fn start_at(origin: Instant, period: Duration) -> Self {
        let origin = time::Instant::from_std(origin);
        let mut interval = time::interval_at(origin + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }

    /// Waits for the next tick.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The clock origin is a std Instant while the paused runtime runs on
    // a virtual clock, so offsets carry a sub-millisecond skew; assert
    // windows, not exact instants.
    const SLACK: Duration = Duration::from_millis(50);

    #[tokio::test(start_paused = true)]
    async fn test_ticks_at_fixed_offsets() {
        let origin = Instant::now();
        let mut clock = IntervalClock::start_at(origin, Duration::from_secs(1));

        let before = time::Instant::now();
        for n in 1..=5u64 {
            clock.tick().await;
            let elapsed = time::Instant::now().duration_since(before);
            let expected = Duration::from_secs(n);
            assert!(
                elapsed >= expected && elapsed < expected + SLACK,
                "tick {} at {:?}",
                n,
                elapsed
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_cumulative_drift() {
        let origin = Instant::now();
        let mut clock = IntervalClock::start_at(origin, Duration::from_millis(250));

        let before = time::Instant::now();
        // Simulate slow tick handling; the schedule stays anchored to the
        // origin instead of accumulating the handling delay
        for _ in 0..4 {
            clock.tick().await;
            time::sleep(Duration::from_millis(10)).await;
        }
        let elapsed = time::Instant::now().duration_since(before);
        let expected = Duration::from_millis(4 * 250 + 10);
        assert!(
            elapsed >= expected && elapsed < expected + SLACK,
            "drifted to {:?}",
            elapsed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missed_ticks_are_skipped() {
        let origin = Instant::now();
        let mut clock = IntervalClock::start_at(origin, Duration::from_millis(100));

        // Stall past several tick deadlines
        time::sleep(Duration::from_millis(450)).await;

        clock.tick().await;
        let first = time::Instant::now();
        clock.tick().await;
        let second = time::Instant::now();

        // One immediate catch-up tick, then the cadence resumes on the
        // original schedule rather than bursting the backlog
        assert!(second.duration_since(first) >= Duration::from_millis(50));
    }
}
